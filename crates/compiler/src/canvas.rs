//! Converts user-authored canvas graphs into engine prompt graphs.
//!
//! Canvas nodes carry editor-level types ("loadModel", "sampler", ...)
//! and loosely-typed settings; edges carry editor handle names. The
//! converter maps each editor type onto its engine class with defaults
//! filled in, normalizes handle names onto engine input names, and
//! resolves source handles to output slot indices. Unknown node types
//! pass through verbatim with a warning so custom engine nodes keep
//! working.

use serde_json::{json, Value};
use tracing::warn;

use prism_core::params::{CanvasEdge, CanvasNode};
use rand::Rng;

use crate::graph::{InputValue, PromptGraph, PromptNode};
use crate::{Compiled, CompileError};

/// Compile a canvas graph. Every edge must reference nodes that exist;
/// a dangling edge fails the whole job rather than silently dropping
/// the connection.
pub fn compile_canvas(nodes: &[CanvasNode], edges: &[CanvasEdge]) -> Result<Compiled, CompileError> {
    let mut graph = PromptGraph::new();
    let mut warnings = Vec::new();

    for node in nodes {
        let prompt_node = convert_node(node, &mut graph, &mut warnings);
        graph.insert(node.id.clone(), prompt_node);
    }

    for edge in edges {
        apply_edge(edge, nodes, &mut graph)?;
    }

    Ok(Compiled { graph, warnings })
}

// ---------------------------------------------------------------------------
// Node conversion
// ---------------------------------------------------------------------------

/// Map one editor node onto its engine class and default inputs.
///
/// `controlNet` expands into two engine nodes; the extra loader is
/// inserted into `graph` directly under a derived id.
fn convert_node(node: &CanvasNode, graph: &mut PromptGraph, warnings: &mut Vec<String>) -> PromptNode {
    let data = &node.data;
    match node.node_type.as_str() {
        "loadModel" => PromptNode::new("CheckpointLoaderSimple").input(
            "ckpt_name",
            lit_or(data, "model", json!("v1-5-pruned-emaonly.ckpt")),
        ),
        "prompt" => PromptNode::new("CLIPTextEncode").input("text", lit_or(data, "prompt", json!(""))),
        "sampler" => PromptNode::new("KSampler")
            .input("seed", seed_or_random(data))
            .input("steps", lit_or(data, "steps", json!(20)))
            .input("cfg", lit_or(data, "cfg", json!(8.0)))
            .input("sampler_name", lit_or(data, "sampler", json!("euler")))
            .input("scheduler", InputValue::lit("normal"))
            .input("denoise", InputValue::lit(json!(1.0))),
        "emptyLatent" => PromptNode::new("EmptyLatentImage")
            .input("width", lit_or(data, "width", json!(512)))
            .input("height", lit_or(data, "height", json!(512)))
            .input("batch_size", lit_or(data, "batch_size", json!(1))),
        "vaeEncode" => PromptNode::new("VAEEncode"),
        "vaeDecode" => PromptNode::new("VAEDecode"),
        "output" => PromptNode::new("SaveImage").input("filename_prefix", InputValue::lit("Prism")),
        "loadImage" => PromptNode::new("LoadImage")
            .input("image", lit_or(data, "filename", json!("example.png")))
            .input("upload", InputValue::lit("image")),
        "lora" => PromptNode::new("LoraLoader")
            .input(
                "lora_name",
                lit_or(data, "lora_name", json!("lcm-lora-sdv1-5.safetensors")),
            )
            .input("strength_model", lit_or(data, "strength_model", json!(1.0)))
            .input("strength_clip", lit_or(data, "strength_clip", json!(1.0))),
        "controlNet" => {
            // Editor shows one node; the engine needs a separate loader.
            let loader_id = format!("{}_loader", node.id);
            graph.insert(
                loader_id.clone(),
                PromptNode::new("ControlNetLoader").input(
                    "control_net_name",
                    lit_or(data, "model", json!("control_v11p_sd15_canny.pth")),
                ),
            );
            PromptNode::new("ControlNetApply")
                .input("strength", lit_or(data, "strength", json!(1.0)))
                .input("start_percent", InputValue::lit(json!(0.0)))
                .input("end_percent", InputValue::lit(json!(1.0)))
                .input("control_net", InputValue::link(loader_id, 0))
        }
        // upscale_model and image arrive over edges.
        "upscale" => PromptNode::new("ImageUpscaleWithModel"),
        "faceSwap" => PromptNode::new("ReActorFaceSwap")
            .input("enabled", InputValue::lit(true))
            .input("input_faces_order", InputValue::lit("large-small"))
            .input("input_faces_index", InputValue::lit("0"))
            .input("detect_gender_input", InputValue::lit("no"))
            .input("detect_gender_source", InputValue::lit("no"))
            .input("face_restore_model", InputValue::lit("codeformer-v0.1.0.pth"))
            .input("face_restore_visibility", InputValue::lit(1))
            .input("codeformer_weight", InputValue::lit(json!(0.5))),
        "inpaint" => PromptNode::new("VAEEncodeForInpaint")
            .input("grow_mask_by", lit_or(data, "blur", json!(6))),
        "latentUpscale" => PromptNode::new("LatentUpscale")
            .input(
                "upscale_method",
                lit_or(data, "upscale_method", json!("nearest-exact")),
            )
            .input("width", lit_or(data, "width", json!(1024)))
            .input("height", lit_or(data, "height", json!(1024)))
            .input("crop", InputValue::lit("disabled")),
        "conditioningAverage" => PromptNode::new("ConditioningAverage")
            .input("conditioning_to_strength", lit_or(data, "strength", json!(0.5))),
        "svdLoader" => PromptNode::new("SVD_img2vid_Conditioning")
            .input("video_frames", lit_or(data, "video_frames", json!(25)))
            .input("motion_bucket_id", lit_or(data, "motion_bucket_id", json!(127)))
            .input("fps", lit_or(data, "fps", json!(12)))
            .input("augmentation_level", lit_or(data, "augmentation_level", json!(0.0)))
            .input("width", lit_or(data, "width", json!(1024)))
            .input("height", lit_or(data, "height", json!(576))),
        "videoLinearCFG" => PromptNode::new("VideoLinearCFGGuidance")
            .input("min_cfg", lit_or(data, "min_cfg", json!(1.0))),
        "clipVision" => PromptNode::new("CLIPVisionLoader")
            .input("clip_name", lit_or(data, "model", json!("clip_vision_g.safetensors"))),
        "videoCombine" => PromptNode::new("VHS_VideoCombine")
            .input("frame_rate", lit_or(data, "fps", json!(12)))
            .input("loop_count", InputValue::lit(0))
            .input("filename_prefix", InputValue::lit("Prism_Video"))
            .input("format", lit_or(data, "format", json!("video/h264-mp4")))
            .input("pix_fmt", InputValue::lit("yuv420p"))
            .input("crf", InputValue::lit(19))
            .input("save_output", InputValue::lit(true))
            .input("pingpong", InputValue::lit(false))
            .input("save_metadata", InputValue::lit(true))
            .input("trim_last_frame", InputValue::lit(0)),
        other => {
            // Passthrough keeps custom engine nodes usable; the editor
            // type is assumed to be the engine class name.
            warn!(node_id = %node.id, node_type = %other, "unknown canvas node type, passing through");
            warnings.push(format!("Unknown node type: {other}"));
            let mut passthrough = PromptNode::new(other);
            if let Value::Object(map) = data {
                for (key, value) in map {
                    passthrough
                        .inputs
                        .insert(key.clone(), InputValue::Literal(value.clone()));
                }
            }
            passthrough
        }
    }
}

/// Read `data[key]`, falling back to `default` when the key is missing
/// or carries an empty/zero/false value (mirrors how the editor leaves
/// untouched fields).
fn lit_or(data: &Value, key: &str, default: Value) -> InputValue {
    let value = match data.get(key) {
        Some(v) if !is_unset(v) => v.clone(),
        _ => default,
    };
    InputValue::Literal(value)
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
        _ => false,
    }
}

fn seed_or_random(data: &Value) -> InputValue {
    match data.get("seed").and_then(Value::as_i64) {
        Some(seed) if seed > 0 => InputValue::lit(seed),
        _ => InputValue::lit(rand::rng().random_range(0i64..10_000_000)),
    }
}

// ---------------------------------------------------------------------------
// Edge wiring
// ---------------------------------------------------------------------------

/// Resolve one edge into `target.inputs[name] = [source, slot]`.
fn apply_edge(edge: &CanvasEdge, nodes: &[CanvasNode], graph: &mut PromptGraph) -> Result<(), CompileError> {
    if !graph.nodes.contains_key(&edge.target) {
        return Err(CompileError::DanglingEdge(edge.target.clone()));
    }
    let source = nodes
        .iter()
        .find(|n| n.id == edge.source)
        .ok_or_else(|| CompileError::DanglingEdge(edge.source.clone()))?;

    let Some(handle) = edge.target_handle.as_deref().filter(|h| !h.is_empty()) else {
        // An unlabeled edge carries no input name to bind to.
        return Ok(());
    };

    let mut input_name = normalize_handle(handle);
    let target_class = graph
        .nodes
        .get(&edge.target)
        .map(|n| n.class_type.clone())
        .unwrap_or_default();
    // VAEDecode's latent input is called "samples" on the engine side.
    if target_class == "VAEDecode" && input_name == "latent" {
        input_name = "samples".to_string();
    }

    let slot = output_slot(&source.node_type, edge.source_handle.as_deref());
    if let Some(target) = graph.nodes.get_mut(&edge.target) {
        target
            .inputs
            .insert(input_name, InputValue::link(edge.source.clone(), slot));
    }
    Ok(())
}

/// Editor handle names onto engine input names. Unmapped handles pass
/// through unchanged.
fn normalize_handle(handle: &str) -> String {
    match handle {
        "latent_in" => "latent_image",
        "clip_in" => "clip",
        "model_in" => "model",
        "conditioning_in" => "conditioning",
        "image_in" => "image",
        "face" => "face_image",
        other => other,
    }
    .to_string()
}

/// Output slot index of `source_handle` on an editor node type.
///
/// Multi-output types select by handle; single-output types are always
/// slot 0, as is anything unrecognized.
fn output_slot(source_type: &str, source_handle: Option<&str>) -> u32 {
    match (source_type, source_handle) {
        ("loadModel", Some("clip")) => 1,
        ("loadModel", Some("vae")) => 2,
        ("lora", Some("clip_out")) => 1,
        ("loadImage", Some("mask")) => 1,
        ("svdLoader", Some("negative")) => 1,
        ("svdLoader", Some("latent")) => 2,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn node(id: &str, node_type: &str, data: Value) -> CanvasNode {
        CanvasNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            data,
        }
    }

    fn edge(source: &str, source_handle: &str, target: &str, target_handle: &str) -> CanvasEdge {
        CanvasEdge {
            source: source.to_string(),
            target: target.to_string(),
            source_handle: Some(source_handle.to_string()),
            target_handle: Some(target_handle.to_string()),
        }
    }

    fn txt2img_canvas() -> (Vec<CanvasNode>, Vec<CanvasEdge>) {
        let nodes = vec![
            node("model", "loadModel", json!({"model": "sd15.safetensors"})),
            node("pos", "prompt", json!({"prompt": "a cat"})),
            node("neg", "prompt", json!({})),
            node("latent", "emptyLatent", json!({"width": 768})),
            node("ksampler", "sampler", json!({"seed": 42, "steps": 30})),
            node("decode", "vaeDecode", json!({})),
            node("save", "output", json!({})),
        ];
        let edges = vec![
            edge("model", "model", "ksampler", "model_in"),
            edge("model", "clip", "pos", "clip_in"),
            edge("model", "clip", "neg", "clip_in"),
            edge("pos", "conditioning", "ksampler", "positive"),
            edge("neg", "conditioning", "ksampler", "negative"),
            edge("latent", "latent", "ksampler", "latent_in"),
            edge("ksampler", "latent_out", "decode", "samples"),
            edge("model", "vae", "decode", "vae"),
            edge("decode", "image", "save", "images"),
        ];
        (nodes, edges)
    }

    #[test]
    fn converts_full_txt2img_canvas() {
        let (nodes, edges) = txt2img_canvas();
        let compiled = compile_canvas(&nodes, &edges).unwrap();
        assert!(compiled.warnings.is_empty());

        let graph = &compiled.graph;
        assert_eq!(graph.len(), 7);
        let sampler = graph.get("ksampler").unwrap();
        assert_eq!(sampler.class_type, "KSampler");
        assert_eq!(sampler.inputs["model"], InputValue::link("model", 0));
        assert_eq!(sampler.inputs["positive"], InputValue::link("pos", 0));
        assert_eq!(sampler.inputs["negative"], InputValue::link("neg", 0));
        assert_eq!(sampler.inputs["latent_image"], InputValue::link("latent", 0));
        assert_eq!(sampler.inputs["seed"], InputValue::lit(42));
        assert_eq!(sampler.inputs["steps"], InputValue::lit(30));
        // clip vs vae handle picks the checkpoint output slot.
        assert_eq!(graph.get("pos").unwrap().inputs["clip"], InputValue::link("model", 1));
        assert_eq!(graph.get("decode").unwrap().inputs["vae"], InputValue::link("model", 2));
        graph.validate().unwrap();
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let nodes = vec![node("latent", "emptyLatent", json!({"width": 0}))];
        let compiled = compile_canvas(&nodes, &[]).unwrap();
        let latent = compiled.graph.get("latent").unwrap();
        // Zero counts as unset, like an untouched editor field.
        assert_eq!(latent.inputs["width"], InputValue::lit(512));
        assert_eq!(latent.inputs["height"], InputValue::lit(512));
        assert_eq!(latent.inputs["batch_size"], InputValue::lit(1));
    }

    #[test]
    fn dangling_target_is_an_error() {
        let nodes = vec![node("a", "prompt", json!({}))];
        let edges = vec![edge("a", "conditioning", "ghost", "positive")];
        assert_matches!(
            compile_canvas(&nodes, &edges),
            Err(CompileError::DanglingEdge(id)) if id == "ghost"
        );
    }

    #[test]
    fn dangling_source_is_an_error() {
        let nodes = vec![node("a", "output", json!({}))];
        let edges = vec![edge("ghost", "image", "a", "images")];
        assert_matches!(
            compile_canvas(&nodes, &edges),
            Err(CompileError::DanglingEdge(id)) if id == "ghost"
        );
    }

    #[test]
    fn control_net_gets_a_loader_node() {
        let nodes = vec![node("cn", "controlNet", json!({"model": "canny.pth"}))];
        let compiled = compile_canvas(&nodes, &[]).unwrap();
        let apply = compiled.graph.get("cn").unwrap();
        assert_eq!(apply.class_type, "ControlNetApply");
        assert_eq!(apply.inputs["control_net"], InputValue::link("cn_loader", 0));
        let loader = compiled.graph.get("cn_loader").unwrap();
        assert_eq!(loader.class_type, "ControlNetLoader");
        assert_eq!(loader.inputs["control_net_name"], InputValue::lit("canny.pth"));
    }

    #[test]
    fn vae_decode_latent_handle_becomes_samples() {
        let nodes = vec![
            node("ksampler", "sampler", json!({"seed": 1})),
            node("decode", "vaeDecode", json!({})),
        ];
        let edges = vec![edge("ksampler", "latent_out", "decode", "latent")];
        let compiled = compile_canvas(&nodes, &edges).unwrap();
        let decode = compiled.graph.get("decode").unwrap();
        assert_eq!(decode.inputs["samples"], InputValue::link("ksampler", 0));
        assert!(!decode.inputs.contains_key("latent"));
    }

    #[test]
    fn load_image_mask_handle_selects_slot_one() {
        let nodes = vec![
            node("img", "loadImage", json!({"filename": "in.png"})),
            node("enc", "inpaint", json!({"blur": 8})),
        ];
        let edges = vec![
            edge("img", "image", "enc", "pixels"),
            edge("img", "mask", "enc", "mask"),
        ];
        let compiled = compile_canvas(&nodes, &edges).unwrap();
        let enc = compiled.graph.get("enc").unwrap();
        assert_eq!(enc.inputs["pixels"], InputValue::link("img", 0));
        assert_eq!(enc.inputs["mask"], InputValue::link("img", 1));
        assert_eq!(enc.inputs["grow_mask_by"], InputValue::lit(8));
    }

    #[test]
    fn svd_loader_handles_map_to_slots() {
        let nodes = vec![
            node("svd", "svdLoader", json!({})),
            node("ksampler", "sampler", json!({"seed": 1})),
        ];
        let edges = vec![
            edge("svd", "positive", "ksampler", "positive"),
            edge("svd", "negative", "ksampler", "negative"),
            edge("svd", "latent", "ksampler", "latent_in"),
        ];
        let compiled = compile_canvas(&nodes, &edges).unwrap();
        let sampler = compiled.graph.get("ksampler").unwrap();
        assert_eq!(sampler.inputs["positive"], InputValue::link("svd", 0));
        assert_eq!(sampler.inputs["negative"], InputValue::link("svd", 1));
        assert_eq!(sampler.inputs["latent_image"], InputValue::link("svd", 2));
    }

    #[test]
    fn unknown_type_passes_through_with_warning() {
        let nodes = vec![node(
            "x",
            "SomeCustomNode",
            json!({"knob": 3, "label": "y"}),
        )];
        let compiled = compile_canvas(&nodes, &[]).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert!(compiled.warnings[0].contains("SomeCustomNode"));
        let passthrough = compiled.graph.get("x").unwrap();
        assert_eq!(passthrough.class_type, "SomeCustomNode");
        assert_eq!(passthrough.inputs["knob"], InputValue::lit(3));
    }

    #[test]
    fn unlabeled_edge_is_skipped() {
        let nodes = vec![
            node("a", "prompt", json!({})),
            node("b", "output", json!({})),
        ];
        let edges = vec![CanvasEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            source_handle: None,
            target_handle: None,
        }];
        let compiled = compile_canvas(&nodes, &edges).unwrap();
        assert!(compiled.graph.get("b").unwrap().inputs.get("").is_none());
        assert!(!compiled.graph.get("b").unwrap().inputs.contains_key("images"));
    }

    #[test]
    fn sampler_zero_seed_is_randomized() {
        let nodes = vec![node("s", "sampler", json!({"seed": 0}))];
        let compiled = compile_canvas(&nodes, &[]).unwrap();
        let InputValue::Literal(seed) = &compiled.graph.get("s").unwrap().inputs["seed"] else {
            panic!("seed must be a literal");
        };
        assert!(seed.as_i64().unwrap() >= 0);
    }
}

//! Fixed prompt graphs for the known job kinds.
//!
//! Each kind deterministically expands to a small graph: checkpoint load,
//! positive/negative text encode, a kind-specific latent source, sampler,
//! decode, save. The node ids are stable constants so that two
//! compilations of the same parameters produce structurally identical
//! graphs (the only exception is an unset seed, which is drawn fresh).

use prism_core::params::{
    GenerationParams, Image2VideoParams, ImageParams, VideoSettings,
};
use rand::Rng;
use serde_json::json;

use crate::graph::{InputValue, PromptGraph, PromptNode};
use crate::CompileError;

/// Stable node ids of the fixed graphs.
mod ids {
    pub const CHECKPOINT: &str = "1";
    pub const PROMPT_POS: &str = "2";
    pub const PROMPT_NEG: &str = "3";
    pub const LATENT_EMPTY: &str = "4";
    pub const SAMPLER: &str = "5";
    pub const VAE_DECODE: &str = "6";
    pub const SAVE_IMAGE: &str = "7";
    pub const LOAD_IMAGE: &str = "8";
    pub const VAE_ENCODE: &str = "9";
    pub const LOAD_MASK: &str = "10";
    pub const VAE_ENCODE_INPAINT: &str = "11";
    pub const CLIP_VISION: &str = "12";
    pub const UPSCALE_PIXELS: &str = "15";
    pub const SVD_CONDITION: &str = "16";
    pub const VIDEO_CFG: &str = "17";
    pub const VIDEO_SAMPLER: &str = "18";
    pub const VIDEO_DECODE: &str = "19";
    pub const VIDEO_COMBINE: &str = "20";
}

const DEFAULT_CHECKPOINT: &str = "v1-5-pruned-emaonly.safetensors";
const DEFAULT_VIDEO_CHECKPOINT: &str = "svd_xt.safetensors";
const DEFAULT_CLIP_VISION: &str = "clip_vision_g.safetensors";
const SAVE_PREFIX: &str = "Prism";
const VIDEO_PREFIX: &str = "Prism_Video";

/// Compile a known-kind parameter set into its fixed graph.
pub fn compile_simple(params: &GenerationParams) -> Result<PromptGraph, CompileError> {
    match params {
        GenerationParams::Text2Image(p) => {
            let mut graph = PromptGraph::new();
            add_empty_latent(&mut graph, p);
            add_image_pipeline(&mut graph, p, ids::LATENT_EMPTY, 1.0);
            Ok(graph)
        }
        GenerationParams::Image2Image(p) => {
            let mut graph = PromptGraph::new();
            add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
            add_vae_encode(&mut graph, ids::LOAD_IMAGE);
            add_image_pipeline(&mut graph, &p.image, ids::VAE_ENCODE, params.effective_denoise());
            Ok(graph)
        }
        GenerationParams::Upscale(p) => {
            let mut graph = PromptGraph::new();
            add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
            graph.insert(
                ids::UPSCALE_PIXELS,
                PromptNode::new("ImageScaleBy")
                    .input("image", InputValue::link(ids::LOAD_IMAGE, 0))
                    .input("upscale_method", InputValue::lit("area"))
                    .input("scale_by", InputValue::lit(json!(p.upscale_factor))),
            );
            add_vae_encode(&mut graph, ids::UPSCALE_PIXELS);
            add_image_pipeline(&mut graph, &p.image, ids::VAE_ENCODE, params.effective_denoise());
            Ok(graph)
        }
        GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => {
            let mut graph = PromptGraph::new();
            add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
            add_load_image(&mut graph, ids::LOAD_MASK, &p.mask_filename);
            // LoadImage exposes the mask on slot 1 (alpha channel).
            add_inpaint_encode(&mut graph, InputValue::link(ids::LOAD_MASK, 1), p.grow_mask_by);
            add_image_pipeline(
                &mut graph,
                &p.image,
                ids::VAE_ENCODE_INPAINT,
                params.effective_denoise(),
            );
            Ok(graph)
        }
        GenerationParams::AutoMaskInpaint(p) => {
            let mut graph = PromptGraph::new();
            add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
            // No separate mask upload: the source image's own alpha mask
            // drives the inpaint region.
            add_inpaint_encode(&mut graph, InputValue::link(ids::LOAD_IMAGE, 1), p.grow_mask_by);
            add_image_pipeline(
                &mut graph,
                &p.image,
                ids::VAE_ENCODE_INPAINT,
                params.effective_denoise(),
            );
            Ok(graph)
        }
        GenerationParams::Image2Video(p) => Ok(compile_img2vid(p)),
        GenerationParams::Text2Video(p) => {
            let mut graph = PromptGraph::new();
            add_empty_latent(&mut graph, &p.image);
            add_image_pipeline(&mut graph, &p.image, ids::LATENT_EMPTY, 1.0);
            // The decoded still frame seeds the video conditioner.
            strip_save_node(&mut graph);
            add_video_tail(
                &mut graph,
                InputValue::link(ids::VAE_DECODE, 0),
                &p.video,
                VideoSampling {
                    seed: p.image.seed,
                    steps: p.image.steps,
                    cfg_scale: p.image.cfg_scale,
                    width: p.image.width,
                    height: p.image.height,
                },
            );
            Ok(graph)
        }
        GenerationParams::VideoInpaint(p) => {
            let mut graph = PromptGraph::new();
            add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
            add_load_image(&mut graph, ids::LOAD_MASK, &p.mask_filename);
            add_inpaint_encode(&mut graph, InputValue::link(ids::LOAD_MASK, 1), 6);
            add_image_pipeline(
                &mut graph,
                &p.image,
                ids::VAE_ENCODE_INPAINT,
                params.effective_denoise(),
            );
            strip_save_node(&mut graph);
            add_video_tail(
                &mut graph,
                InputValue::link(ids::VAE_DECODE, 0),
                &p.video,
                VideoSampling {
                    seed: p.image.seed,
                    steps: p.image.steps,
                    cfg_scale: p.image.cfg_scale,
                    width: p.image.width,
                    height: p.image.height,
                },
            );
            Ok(graph)
        }
        GenerationParams::CustomGraph(_) => {
            Err(CompileError::Unsupported(prism_core::JobKind::CustomGraph))
        }
    }
}

// ---------------------------------------------------------------------------
// Shared sub-graphs
// ---------------------------------------------------------------------------

/// Checkpoint, text encodes, sampler, decode, save — the common trunk of
/// every image kind. `latent_source` names the node feeding the sampler.
fn add_image_pipeline(graph: &mut PromptGraph, p: &ImageParams, latent_source: &str, denoise: f64) {
    let checkpoint = p
        .model_id
        .clone()
        .unwrap_or_else(|| DEFAULT_CHECKPOINT.to_string());

    graph.insert(
        ids::CHECKPOINT,
        PromptNode::new("CheckpointLoaderSimple").input("ckpt_name", InputValue::lit(checkpoint)),
    );
    graph.insert(
        ids::PROMPT_POS,
        PromptNode::new("CLIPTextEncode")
            .input("text", InputValue::lit(p.prompt.clone()))
            .input("clip", InputValue::link(ids::CHECKPOINT, 1)),
    );
    graph.insert(
        ids::PROMPT_NEG,
        PromptNode::new("CLIPTextEncode")
            .input("text", InputValue::lit(p.negative_prompt.clone()))
            .input("clip", InputValue::link(ids::CHECKPOINT, 1)),
    );
    graph.insert(
        ids::SAMPLER,
        PromptNode::new("KSampler")
            .input("model", InputValue::link(ids::CHECKPOINT, 0))
            .input("positive", InputValue::link(ids::PROMPT_POS, 0))
            .input("negative", InputValue::link(ids::PROMPT_NEG, 0))
            .input("latent_image", InputValue::link(latent_source, 0))
            .input("seed", InputValue::lit(resolve_seed(p.seed)))
            .input("steps", InputValue::lit(p.steps))
            .input("cfg", InputValue::lit(json!(p.cfg_scale)))
            .input("sampler_name", InputValue::lit(sampler_name(&p.sampler)))
            .input("scheduler", InputValue::lit(scheduler_name(&p.sampler)))
            .input("denoise", InputValue::lit(json!(denoise))),
    );
    graph.insert(
        ids::VAE_DECODE,
        PromptNode::new("VAEDecode")
            .input("samples", InputValue::link(ids::SAMPLER, 0))
            .input("vae", InputValue::link(ids::CHECKPOINT, 2)),
    );
    graph.insert(
        ids::SAVE_IMAGE,
        PromptNode::new("SaveImage")
            .input("filename_prefix", InputValue::lit(SAVE_PREFIX))
            .input("images", InputValue::link(ids::VAE_DECODE, 0)),
    );
}

fn add_empty_latent(graph: &mut PromptGraph, p: &ImageParams) {
    graph.insert(
        ids::LATENT_EMPTY,
        PromptNode::new("EmptyLatentImage")
            .input("width", InputValue::lit(p.width))
            .input("height", InputValue::lit(p.height))
            .input("batch_size", InputValue::lit(p.batch_size)),
    );
}

fn add_load_image(graph: &mut PromptGraph, id: &str, filename: &str) {
    graph.insert(
        id,
        PromptNode::new("LoadImage")
            .input("image", InputValue::lit(filename))
            .input("upload", InputValue::lit("image")),
    );
}

fn add_vae_encode(graph: &mut PromptGraph, pixel_source: &str) {
    graph.insert(
        ids::VAE_ENCODE,
        PromptNode::new("VAEEncode")
            .input("pixels", InputValue::link(pixel_source, 0))
            .input("vae", InputValue::link(ids::CHECKPOINT, 2)),
    );
}

fn add_inpaint_encode(graph: &mut PromptGraph, mask: InputValue, grow_mask_by: u32) {
    graph.insert(
        ids::VAE_ENCODE_INPAINT,
        PromptNode::new("VAEEncodeForInpaint")
            .input("pixels", InputValue::link(ids::LOAD_IMAGE, 0))
            .input("vae", InputValue::link(ids::CHECKPOINT, 2))
            .input("mask", mask)
            .input("grow_mask_by", InputValue::lit(grow_mask_by)),
    );
}

/// Image-to-video: SVD conditioning over a loaded source frame.
fn compile_img2vid(p: &Image2VideoParams) -> PromptGraph {
    let mut graph = PromptGraph::new();
    let checkpoint = p
        .model_id
        .clone()
        .unwrap_or_else(|| DEFAULT_VIDEO_CHECKPOINT.to_string());

    graph.insert(
        ids::CHECKPOINT,
        PromptNode::new("CheckpointLoaderSimple").input("ckpt_name", InputValue::lit(checkpoint)),
    );
    add_load_image(&mut graph, ids::LOAD_IMAGE, &p.image_filename);
    add_video_tail(
        &mut graph,
        InputValue::link(ids::LOAD_IMAGE, 0),
        &p.video,
        VideoSampling {
            seed: p.seed,
            steps: p.steps,
            cfg_scale: p.cfg_scale,
            width: p.width,
            height: p.height,
        },
    );
    graph
}

/// Sampling knobs the video tail inherits from its source kind.
struct VideoSampling {
    seed: Option<i64>,
    steps: u32,
    cfg_scale: f64,
    width: u32,
    height: u32,
}

/// SVD conditioner, linear CFG guidance, video sampler, decode, combine.
fn add_video_tail(
    graph: &mut PromptGraph,
    init_image: InputValue,
    video: &VideoSettings,
    sampling: VideoSampling,
) {
    graph.insert(
        ids::CLIP_VISION,
        PromptNode::new("CLIPVisionLoader").input("clip_name", InputValue::lit(DEFAULT_CLIP_VISION)),
    );
    graph.insert(
        ids::SVD_CONDITION,
        PromptNode::new("SVD_img2vid_Conditioning")
            .input("clip_vision", InputValue::link(ids::CLIP_VISION, 0))
            .input("init_image", init_image)
            .input("vae", InputValue::link(ids::CHECKPOINT, 2))
            .input("width", InputValue::lit(sampling.width))
            .input("height", InputValue::lit(sampling.height))
            .input("video_frames", InputValue::lit(video.video_frames))
            .input("motion_bucket_id", InputValue::lit(video.motion_bucket_id))
            .input("fps", InputValue::lit(video.fps))
            .input(
                "augmentation_level",
                InputValue::lit(json!(video.augmentation_level)),
            ),
    );
    graph.insert(
        ids::VIDEO_CFG,
        PromptNode::new("VideoLinearCFGGuidance")
            .input("model", InputValue::link(ids::CHECKPOINT, 0))
            .input("min_cfg", InputValue::lit(json!(video.min_cfg))),
    );
    graph.insert(
        ids::VIDEO_SAMPLER,
        PromptNode::new("KSampler")
            .input("model", InputValue::link(ids::VIDEO_CFG, 0))
            .input("positive", InputValue::link(ids::SVD_CONDITION, 0))
            .input("negative", InputValue::link(ids::SVD_CONDITION, 1))
            .input("latent_image", InputValue::link(ids::SVD_CONDITION, 2))
            .input("seed", InputValue::lit(resolve_seed(sampling.seed)))
            .input("steps", InputValue::lit(sampling.steps))
            .input("cfg", InputValue::lit(json!(sampling.cfg_scale)))
            .input("sampler_name", InputValue::lit("euler"))
            .input("scheduler", InputValue::lit("karras"))
            .input("denoise", InputValue::lit(json!(1.0))),
    );
    graph.insert(
        ids::VIDEO_DECODE,
        PromptNode::new("VAEDecode")
            .input("samples", InputValue::link(ids::VIDEO_SAMPLER, 0))
            .input("vae", InputValue::link(ids::CHECKPOINT, 2)),
    );
    graph.insert(
        ids::VIDEO_COMBINE,
        PromptNode::new("VHS_VideoCombine")
            .input("images", InputValue::link(ids::VIDEO_DECODE, 0))
            .input("frame_rate", InputValue::lit(video.fps))
            .input("loop_count", InputValue::lit(0u32))
            .input("filename_prefix", InputValue::lit(VIDEO_PREFIX))
            .input("format", InputValue::lit("video/h264-mp4"))
            .input("pix_fmt", InputValue::lit("yuv420p"))
            .input("crf", InputValue::lit(19u32))
            .input("save_output", InputValue::lit(true))
            .input("pingpong", InputValue::lit(false))
            .input("save_metadata", InputValue::lit(true))
            .input("trim_last_frame", InputValue::lit(0u32)),
    );
}

/// Drop the still-image save node when its decode output only feeds a
/// video tail.
fn strip_save_node(graph: &mut PromptGraph) {
    graph.nodes.remove(ids::SAVE_IMAGE);
}

// ---------------------------------------------------------------------------
// Name normalization and seeds
// ---------------------------------------------------------------------------

/// Map a user-facing sampler label onto an engine sampler name.
fn sampler_name(raw: &str) -> &'static str {
    match raw.to_lowercase().as_str() {
        "euler" => "euler",
        "euler a" | "euler_a" | "euler_ancestral" => "euler_ancestral",
        "dpm++ 2m" | "dpm++ 2m karras" => "dpmpp_2m",
        "dpm++ sde" | "dpm++ sde karras" => "dpmpp_sde",
        "ddim" => "ddim",
        "lms" => "lms",
        "uni_pc" => "uni_pc",
        _ => "euler",
    }
}

/// Scheduler is implied by the sampler label.
fn scheduler_name(raw: &str) -> &'static str {
    if raw.to_lowercase().contains("karras") {
        "karras"
    } else {
        "normal"
    }
}

/// An explicit non-negative seed is honored; `None` or `-1` draws a fresh
/// one. Matches the seed range the engine UI uses.
fn resolve_seed(seed: Option<i64>) -> i64 {
    match seed {
        Some(s) if s >= 0 => s,
        _ => rand::rng().random_range(0..10_000_000),
    }
}

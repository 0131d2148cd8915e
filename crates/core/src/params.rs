//! Validated, kind-specific job parameters.
//!
//! Parameters arrive from the (out-of-scope) HTTP layer as raw JSON and are
//! parsed into a tagged union keyed by [`JobKind`]. Each variant carries its
//! own strict schema; downstream code dispatches on the tag instead of
//! probing loosely-typed fields. Once a job is admitted the parameter set is
//! immutable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::CoreError;
use crate::job::JobKind;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_dim() -> u32 {
    512
}

fn default_steps() -> u32 {
    20
}

fn default_cfg() -> f64 {
    7.0
}

fn default_sampler() -> String {
    "euler_a".to_string()
}

fn default_batch() -> u32 {
    1
}

fn default_grow_mask() -> u32 {
    6
}

fn default_upscale_factor() -> f64 {
    2.0
}

fn default_video_frames() -> u32 {
    25
}

fn default_motion_bucket() -> u32 {
    127
}

fn default_fps() -> u32 {
    12
}

fn default_min_cfg() -> f64 {
    1.0
}

fn require_source(
    name: &str,
    filename: &str,
    inline: &Option<String>,
) -> Result<(), CoreError> {
    if filename.is_empty() && inline.is_none() {
        return Err(CoreError::Validation(format!(
            "either {name}_filename or {name}_data must be provided"
        )));
    }
    Ok(())
}

fn push_uploaded<'a>(inputs: &mut Vec<&'a str>, filename: &'a str, inline: &Option<String>) {
    if inline.is_none() {
        inputs.push(filename);
    }
}

// ---------------------------------------------------------------------------
// Shared parameter blocks
// ---------------------------------------------------------------------------

/// Core sampling parameters shared by every image-producing kind.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImageParams {
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub negative_prompt: String,

    #[serde(default = "default_dim")]
    #[validate(range(min = 128, max = 2048))]
    pub width: u32,

    #[serde(default = "default_dim")]
    #[validate(range(min = 128, max = 2048))]
    pub height: u32,

    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 150))]
    pub steps: u32,

    #[serde(default = "default_cfg")]
    #[validate(range(min = 1.0, max = 30.0))]
    pub cfg_scale: f64,

    /// Explicit seed. `None` or `-1` means "pick one at compile time".
    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default = "default_sampler")]
    pub sampler: String,

    /// Checkpoint to load. `None` falls back to the engine default model.
    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default = "default_batch")]
    #[validate(range(min = 1, max = 4))]
    pub batch_size: u32,

    #[serde(default = "default_batch")]
    #[validate(range(min = 1, max = 4))]
    pub batch_count: u32,
}

/// SVD conditioning parameters shared by the video kinds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VideoSettings {
    #[serde(default = "default_video_frames")]
    #[validate(range(min = 1, max = 120))]
    pub video_frames: u32,

    #[serde(default = "default_motion_bucket")]
    #[validate(range(min = 1, max = 255))]
    pub motion_bucket_id: u32,

    #[serde(default = "default_fps")]
    #[validate(range(min = 1, max = 60))]
    pub fps: u32,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub augmentation_level: f64,

    #[serde(default = "default_min_cfg")]
    #[validate(range(min = 0.0, max = 30.0))]
    pub min_cfg: f64,
}

// ---------------------------------------------------------------------------
// Per-kind variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Img2ImgParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    /// Engine-assigned filename of a previously uploaded source image.
    /// Empty when the source arrives inline as `image_data`.
    #[serde(default)]
    pub image_filename: String,

    /// Base64 source image. The worker uploads it and substitutes the
    /// assigned filename before compilation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InpaintParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    #[serde(default)]
    pub image_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    /// Black/white mask image; white regions are regenerated.
    #[serde(default)]
    pub mask_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_data: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,

    /// Pixels to dilate the mask by before encoding.
    #[serde(default = "default_grow_mask")]
    #[validate(range(max = 64))]
    pub grow_mask_by: u32,
}

/// Inpaint without a separate mask upload: the mask is derived from the
/// source image's alpha channel at load time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AutoMaskInpaintParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    #[serde(default)]
    pub image_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,

    #[serde(default = "default_grow_mask")]
    #[validate(range(max = 64))]
    pub grow_mask_by: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpscaleParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    #[serde(default)]
    pub image_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    #[serde(default = "default_upscale_factor")]
    #[validate(range(min = 1.0, max = 4.0))]
    pub upscale_factor: f64,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Text2VideoParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    #[serde(flatten)]
    #[validate(nested)]
    pub video: VideoSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Image2VideoParams {
    #[serde(default)]
    pub image_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    #[serde(default = "default_dim")]
    #[validate(range(min = 128, max = 2048))]
    pub width: u32,

    #[serde(default = "default_dim")]
    #[validate(range(min = 128, max = 2048))]
    pub height: u32,

    #[serde(default)]
    pub seed: Option<i64>,

    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 150))]
    pub steps: u32,

    #[serde(default = "default_cfg")]
    #[validate(range(min = 1.0, max = 30.0))]
    pub cfg_scale: f64,

    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(flatten)]
    #[validate(nested)]
    pub video: VideoSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VideoInpaintParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub image: ImageParams,

    #[serde(default)]
    pub image_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    #[serde(default)]
    pub mask_filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_data: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub denoising_strength: Option<f64>,

    #[serde(flatten)]
    #[validate(nested)]
    pub video: VideoSettings,
}

// ---------------------------------------------------------------------------
// User-authored canvas graphs
// ---------------------------------------------------------------------------

/// One node in a user-authored editor graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Editor-side node settings, interpreted per node type.
    #[serde(default)]
    pub data: Value,
}

/// One edge in a user-authored editor graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomGraphParams {
    #[validate(length(min = 1))]
    pub nodes: Vec<CanvasNode>,
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// The validated parameter set of a job, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GenerationParams {
    #[serde(rename = "txt2img")]
    Text2Image(ImageParams),
    #[serde(rename = "img2img")]
    Image2Image(Img2ImgParams),
    #[serde(rename = "inpaint")]
    Inpaint(InpaintParams),
    #[serde(rename = "outpaint")]
    Outpaint(InpaintParams),
    #[serde(rename = "upscale")]
    Upscale(UpscaleParams),
    #[serde(rename = "txt2vid")]
    Text2Video(Text2VideoParams),
    #[serde(rename = "img2vid")]
    Image2Video(Image2VideoParams),
    #[serde(rename = "auto_mask_inpaint")]
    AutoMaskInpaint(AutoMaskInpaintParams),
    #[serde(rename = "video_inpaint")]
    VideoInpaint(VideoInpaintParams),
    #[serde(rename = "custom_graph")]
    CustomGraph(CustomGraphParams),
}

impl GenerationParams {
    /// Parse raw caller JSON into the variant matching `kind`.
    ///
    /// The caller's kind always wins: any `type` field present in the raw
    /// payload is overwritten before deserialization.
    pub fn from_value(kind: JobKind, raw: Value) -> Result<Self, CoreError> {
        let mut obj = match raw {
            Value::Object(map) => map,
            _ => {
                return Err(CoreError::Validation(
                    "parameters must be a JSON object".to_string(),
                ))
            }
        };
        obj.insert("type".to_string(), Value::String(kind.to_string()));
        serde_json::from_value(Value::Object(obj))
            .map_err(|e| CoreError::Validation(format!("invalid parameters for {kind}: {e}")))
    }

    /// Run schema validation on the active variant.
    pub fn validate(&self) -> Result<(), CoreError> {
        let result = match self {
            GenerationParams::Text2Image(p) => p.validate(),
            GenerationParams::Image2Image(p) => p.validate(),
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => p.validate(),
            GenerationParams::Upscale(p) => p.validate(),
            GenerationParams::Text2Video(p) => p.validate(),
            GenerationParams::Image2Video(p) => p.validate(),
            GenerationParams::AutoMaskInpaint(p) => p.validate(),
            GenerationParams::VideoInpaint(p) => p.validate(),
            GenerationParams::CustomGraph(p) => p.validate(),
        };
        result.map_err(|e| CoreError::Validation(e.to_string()))?;
        self.check_input_sources()
    }

    /// Every source input must come from somewhere: an uploaded filename
    /// or an inline payload.
    fn check_input_sources(&self) -> Result<(), CoreError> {
        match self {
            GenerationParams::Image2Image(p) => {
                require_source("image", &p.image_filename, &p.image_data)
            }
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => {
                require_source("image", &p.image_filename, &p.image_data)?;
                require_source("mask", &p.mask_filename, &p.mask_data)
            }
            GenerationParams::Upscale(p) => {
                require_source("image", &p.image_filename, &p.image_data)
            }
            GenerationParams::Image2Video(p) => {
                require_source("image", &p.image_filename, &p.image_data)
            }
            GenerationParams::AutoMaskInpaint(p) => {
                require_source("image", &p.image_filename, &p.image_data)
            }
            GenerationParams::VideoInpaint(p) => {
                require_source("image", &p.image_filename, &p.image_data)?;
                require_source("mask", &p.mask_filename, &p.mask_data)
            }
            _ => Ok(()),
        }
    }

    /// The job kind this parameter set belongs to.
    pub fn kind(&self) -> JobKind {
        match self {
            GenerationParams::Text2Image(_) => JobKind::Text2Image,
            GenerationParams::Image2Image(_) => JobKind::Image2Image,
            GenerationParams::Inpaint(_) => JobKind::Inpaint,
            GenerationParams::Outpaint(_) => JobKind::Outpaint,
            GenerationParams::Upscale(_) => JobKind::Upscale,
            GenerationParams::Text2Video(_) => JobKind::Text2Video,
            GenerationParams::Image2Video(_) => JobKind::Image2Video,
            GenerationParams::AutoMaskInpaint(_) => JobKind::AutoMaskInpaint,
            GenerationParams::VideoInpaint(_) => JobKind::VideoInpaint,
            GenerationParams::CustomGraph(_) => JobKind::CustomGraph,
        }
    }

    /// Requested output dimensions, where the kind has any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            GenerationParams::Text2Image(p) => Some((p.width, p.height)),
            GenerationParams::Image2Image(p) => Some((p.image.width, p.image.height)),
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => {
                Some((p.image.width, p.image.height))
            }
            GenerationParams::Upscale(p) => Some((p.image.width, p.image.height)),
            GenerationParams::Text2Video(p) => Some((p.image.width, p.image.height)),
            GenerationParams::Image2Video(p) => Some((p.width, p.height)),
            GenerationParams::AutoMaskInpaint(p) => Some((p.image.width, p.image.height)),
            GenerationParams::VideoInpaint(p) => Some((p.image.width, p.image.height)),
            GenerationParams::CustomGraph(_) => None,
        }
    }

    /// Requested sampler step count, where the kind has one.
    pub fn steps(&self) -> Option<u32> {
        match self {
            GenerationParams::Text2Image(p) => Some(p.steps),
            GenerationParams::Image2Image(p) => Some(p.image.steps),
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => Some(p.image.steps),
            GenerationParams::Upscale(p) => Some(p.image.steps),
            GenerationParams::Text2Video(p) => Some(p.image.steps),
            GenerationParams::Image2Video(p) => Some(p.steps),
            GenerationParams::AutoMaskInpaint(p) => Some(p.image.steps),
            GenerationParams::VideoInpaint(p) => Some(p.image.steps),
            GenerationParams::CustomGraph(_) => None,
        }
    }

    /// `batch_size × batch_count` for costing. Kinds without batching
    /// count as a single render.
    pub fn batch_multiplier(&self) -> u32 {
        let image = match self {
            GenerationParams::Text2Image(p) => Some(p),
            GenerationParams::Image2Image(p) => Some(&p.image),
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => Some(&p.image),
            GenerationParams::Upscale(p) => Some(&p.image),
            GenerationParams::AutoMaskInpaint(p) => Some(&p.image),
            _ => None,
        };
        image.map_or(1, |p| p.batch_size * p.batch_count)
    }

    /// Engine filenames of previously uploaded assets this job reads.
    ///
    /// The facade checks these against the asset store before admission.
    /// Inputs arriving inline are excluded: they have no asset record
    /// until the worker uploads them.
    pub fn required_inputs(&self) -> Vec<&str> {
        let mut inputs = Vec::new();
        match self {
            GenerationParams::Image2Image(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
            }
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
                push_uploaded(&mut inputs, &p.mask_filename, &p.mask_data);
            }
            GenerationParams::Upscale(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
            }
            GenerationParams::Image2Video(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
            }
            GenerationParams::AutoMaskInpaint(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
            }
            GenerationParams::VideoInpaint(p) => {
                push_uploaded(&mut inputs, &p.image_filename, &p.image_data);
                push_uploaded(&mut inputs, &p.mask_filename, &p.mask_data);
            }
            _ => {}
        }
        inputs
    }

    /// Denoising strength with the kind-specific default applied.
    ///
    /// Text-to-image always samples from pure noise.
    pub fn effective_denoise(&self) -> f64 {
        match self {
            GenerationParams::Image2Image(p) => p.denoising_strength.unwrap_or(0.75),
            GenerationParams::Inpaint(p) | GenerationParams::Outpaint(p) => {
                p.denoising_strength.unwrap_or(0.9)
            }
            GenerationParams::AutoMaskInpaint(p) => p.denoising_strength.unwrap_or(0.9),
            GenerationParams::VideoInpaint(p) => p.denoising_strength.unwrap_or(0.9),
            GenerationParams::Upscale(p) => p.denoising_strength.unwrap_or(0.35),
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn minimal_txt2img_gets_defaults() {
        let params =
            GenerationParams::from_value(JobKind::Text2Image, json!({"prompt": "a cat"})).unwrap();
        params.validate().unwrap();
        let GenerationParams::Text2Image(p) = &params else {
            panic!("wrong variant");
        };
        assert_eq!(p.width, 512);
        assert_eq!(p.height, 512);
        assert_eq!(p.steps, 20);
        assert_eq!(p.cfg_scale, 7.0);
        assert_eq!(p.sampler, "euler_a");
        assert_eq!(p.batch_size, 1);
        assert!(p.seed.is_none());
    }

    #[test]
    fn caller_kind_overrides_embedded_tag() {
        let raw = json!({"type": "img2img", "prompt": "a cat"});
        let params = GenerationParams::from_value(JobKind::Text2Image, raw).unwrap();
        assert_eq!(params.kind(), JobKind::Text2Image);
    }

    #[test]
    fn img2img_requires_an_image_source() {
        let params =
            GenerationParams::from_value(JobKind::Image2Image, json!({"prompt": "x"})).unwrap();
        assert_matches!(params.validate(), Err(CoreError::Validation(message)) if message.contains("image_filename"));
    }

    #[test]
    fn inline_payload_satisfies_the_source_requirement() {
        let params = GenerationParams::from_value(
            JobKind::Image2Image,
            json!({"prompt": "x", "image_data": "aGVsbG8="}),
        )
        .unwrap();
        params.validate().unwrap();
        // Nothing to check against the asset store: the upload happens
        // in the worker.
        assert!(params.required_inputs().is_empty());
    }

    #[test]
    fn inpaint_checks_image_and_mask_sources_independently() {
        let params = GenerationParams::from_value(
            JobKind::Inpaint,
            json!({"prompt": "x", "image_data": "aGVsbG8="}),
        )
        .unwrap();
        assert_matches!(params.validate(), Err(CoreError::Validation(message)) if message.contains("mask_filename"));
    }

    #[test]
    fn inline_payloads_survive_serialization() {
        let params = GenerationParams::from_value(
            JobKind::Image2Image,
            json!({"prompt": "x", "image_data": "aGVsbG8="}),
        )
        .unwrap();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["image_data"], "aGVsbG8=");
        assert!(value.get("mask_data").is_none());
    }

    #[test]
    fn oversize_dimensions_rejected() {
        let params = GenerationParams::from_value(
            JobKind::Text2Image,
            json!({"prompt": "a cat", "width": 4096}),
        )
        .unwrap();
        assert_matches!(params.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn empty_prompt_rejected() {
        let params =
            GenerationParams::from_value(JobKind::Text2Image, json!({"prompt": ""})).unwrap();
        assert_matches!(params.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn denoise_defaults_differ_by_kind() {
        let i2i = GenerationParams::from_value(
            JobKind::Image2Image,
            json!({"prompt": "x", "image_filename": "a.png"}),
        )
        .unwrap();
        assert_eq!(i2i.effective_denoise(), 0.75);

        let inpaint = GenerationParams::from_value(
            JobKind::Inpaint,
            json!({"prompt": "x", "image_filename": "a.png", "mask_filename": "m.png"}),
        )
        .unwrap();
        assert_eq!(inpaint.effective_denoise(), 0.9);

        let upscale = GenerationParams::from_value(
            JobKind::Upscale,
            json!({"prompt": "x", "image_filename": "a.png"}),
        )
        .unwrap();
        assert_eq!(upscale.effective_denoise(), 0.35);
    }

    #[test]
    fn caller_overrides_denoise_default() {
        let i2i = GenerationParams::from_value(
            JobKind::Image2Image,
            json!({"prompt": "x", "image_filename": "a.png", "denoising_strength": 0.5}),
        )
        .unwrap();
        assert_eq!(i2i.effective_denoise(), 0.5);
    }

    #[test]
    fn required_inputs_cover_image_and_mask() {
        let inpaint = GenerationParams::from_value(
            JobKind::Inpaint,
            json!({"prompt": "x", "image_filename": "a.png", "mask_filename": "m.png"}),
        )
        .unwrap();
        assert_eq!(inpaint.required_inputs(), vec!["a.png", "m.png"]);

        let t2i =
            GenerationParams::from_value(JobKind::Text2Image, json!({"prompt": "x"})).unwrap();
        assert!(t2i.required_inputs().is_empty());
    }

    #[test]
    fn batch_multiplier_for_batched_kinds() {
        let params = GenerationParams::from_value(
            JobKind::Text2Image,
            json!({"prompt": "x", "batch_size": 2, "batch_count": 3}),
        )
        .unwrap();
        assert_eq!(params.batch_multiplier(), 6);
    }

    #[test]
    fn custom_graph_requires_nodes() {
        let params =
            GenerationParams::from_value(JobKind::CustomGraph, json!({"nodes": [], "edges": []}))
                .unwrap();
        assert_matches!(params.validate(), Err(CoreError::Validation(_)));
    }
}

//! Static output-slot tables for known engine node classes.

/// Number of output slots a known engine class exposes, or `None` for
/// classes the compiler does not recognize (pass-through custom nodes).
pub fn output_count(class_type: &str) -> Option<u32> {
    let count = match class_type {
        // model, clip, vae
        "CheckpointLoaderSimple" => 3,
        // model, clip
        "LoraLoader" => 2,
        // image, mask (mask derived from the alpha channel)
        "LoadImage" => 2,
        // positive, negative, latent
        "SVD_img2vid_Conditioning" => 3,
        "CLIPTextEncode"
        | "KSampler"
        | "EmptyLatentImage"
        | "VAEDecode"
        | "VAEEncode"
        | "VAEEncodeForInpaint"
        | "ImageScaleBy"
        | "LatentUpscale"
        | "ControlNetLoader"
        | "ControlNetApply"
        | "ImageUpscaleWithModel"
        | "ReActorFaceSwap"
        | "ConditioningAverage"
        | "VideoLinearCFGGuidance"
        | "CLIPVisionLoader" => 1,
        // terminal sinks
        "SaveImage" | "VHS_VideoCombine" => 0,
        _ => return None,
    };
    Some(count)
}

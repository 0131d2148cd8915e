//! Credit costing.
//!
//! One credit is the prepaid unit debited at admission. The estimate is
//! final: `credits_used` is set exactly once, before the job becomes
//! visible to the worker pool, and completion incurs no further charge.

use crate::job::JobKind;
use crate::params::GenerationParams;

/// Base credit cost per render for a job kind.
pub fn base_cost(kind: JobKind) -> u32 {
    match kind {
        JobKind::Text2Image => 1,
        JobKind::Image2Image => 2,
        JobKind::Inpaint | JobKind::Outpaint | JobKind::AutoMaskInpaint => 2,
        JobKind::Upscale => 2,
        JobKind::Text2Video | JobKind::Image2Video | JobKind::VideoInpaint => 5,
        JobKind::CustomGraph => 3,
    }
}

/// Total credit cost for a validated submission:
/// `base_cost × batch_size × batch_count`.
pub fn estimate_cost(params: &GenerationParams) -> u32 {
    base_cost(params.kind()) * params.batch_multiplier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn txt2img_base_is_one_credit() {
        assert_eq!(base_cost(JobKind::Text2Image), 1);
    }

    #[test]
    fn video_kinds_cost_more() {
        assert!(base_cost(JobKind::Image2Video) > base_cost(JobKind::Image2Image));
    }

    #[test]
    fn estimate_scales_with_batch() {
        let params = GenerationParams::from_value(
            JobKind::Text2Image,
            json!({"prompt": "x", "batch_size": 4, "batch_count": 2}),
        )
        .unwrap();
        assert_eq!(estimate_cost(&params), 8);
    }
}

//! Generation job kinds.

use serde::{Deserialize, Serialize};

/// The kind of generation a job performs.
///
/// Every kind except [`CustomGraph`](Self::CustomGraph) carries a flat,
/// kind-specific parameter set and compiles to a fixed prompt graph.
/// `CustomGraph` carries a user-authored node/edge canvas instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[serde(rename = "txt2img")]
    Text2Image,
    #[serde(rename = "img2img")]
    Image2Image,
    Inpaint,
    Outpaint,
    Upscale,
    #[serde(rename = "txt2vid")]
    Text2Video,
    #[serde(rename = "img2vid")]
    Image2Video,
    AutoMaskInpaint,
    VideoInpaint,
    CustomGraph,
}

impl JobKind {
    /// True for kinds that render video frames rather than still images.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            JobKind::Text2Video | JobKind::Image2Video | JobKind::VideoInpaint
        )
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobKind::Text2Image => "txt2img",
            JobKind::Image2Image => "img2img",
            JobKind::Inpaint => "inpaint",
            JobKind::Outpaint => "outpaint",
            JobKind::Upscale => "upscale",
            JobKind::Text2Video => "txt2vid",
            JobKind::Image2Video => "img2vid",
            JobKind::AutoMaskInpaint => "auto_mask_inpaint",
            JobKind::VideoInpaint => "video_inpaint",
            JobKind::CustomGraph => "custom_graph",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_names_match_wire_strings() {
        let json = serde_json::to_string(&JobKind::Text2Image).unwrap();
        assert_eq!(json, "\"txt2img\"");
        let kind: JobKind = serde_json::from_str("\"auto_mask_inpaint\"").unwrap();
        assert_eq!(kind, JobKind::AutoMaskInpaint);
    }

    #[test]
    fn video_kinds_flagged() {
        assert!(JobKind::Image2Video.is_video());
        assert!(!JobKind::Upscale.is_video());
    }
}

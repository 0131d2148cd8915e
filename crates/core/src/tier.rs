//! Account tiers and their resource ceilings.
//!
//! The tier determines queue priority, the maximum resolution and step
//! count a submission may request, and nothing else. Billing itself is a
//! collaborator concern.

use serde::{Deserialize, Serialize};

/// Account class of the submitting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Standard,
    Pro,
    Enterprise,
}

impl Tier {
    /// Queue priority class. Higher dequeues first.
    pub fn priority(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Standard => 1,
            Tier::Pro => 2,
            Tier::Enterprise => 3,
        }
    }

    /// Largest edge (width or height, in pixels) this tier may request.
    pub fn max_resolution(&self) -> u32 {
        match self {
            Tier::Free => 768,
            Tier::Standard => 1024,
            Tier::Pro => 1536,
            Tier::Enterprise => 2048,
        }
    }

    /// Maximum sampler step count this tier may request.
    pub fn max_steps(&self) -> u32 {
        match self {
            Tier::Free => 30,
            Tier::Standard => 50,
            Tier::Pro => 100,
            Tier::Enterprise => 150,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Metadata accompanying an uploaded selfie
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSelfieRequest {
    #[validate(length(min = 1, max = 128))]
    #[serde(alias = "userId")]
    pub user_id: String,
    /// Overrides the configured match threshold for this submission only
    #[validate(range(min = -1.0, max = 1.0))]
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Lets a retried upload reuse the candidate from the first attempt
    #[validate(length(min = 1, max = 128))]
    #[serde(default, alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
}

impl SubmitSelfieRequest {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            threshold: None,
            idempotency_key: None,
        }
    }
}

/// Parameters for a pool-free comparison of two uploaded images
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompareRequest {
    #[validate(range(min = -1.0, max = 1.0))]
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for CompareRequest {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    crate::core::DEFAULT_MATCH_THRESHOLD
}

use serde::{Deserialize, Serialize};
use crate::models::domain::MatchResult;

/// Response for a selfie submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitSelfieResponse {
    pub match_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

impl From<&MatchResult> for SubmitSelfieResponse {
    fn from(result: &MatchResult) -> Self {
        Self {
            match_found: result.is_match(),
            matched_user_id: result.matched_user_id().map(str::to_string),
            similarity_score: result.score(),
        }
    }
}

/// Response for a pairwise comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub similarity_score: f64,
    pub is_match: bool,
    pub threshold: f64,
}

/// Error payload, same shape for every caller-facing failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

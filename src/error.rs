use thiserror::Error;

use crate::core::similarity::SimilarityError;
use crate::models::ErrorResponse;
use crate::services::{EmbedError, StoreError};

/// Errors reported to callers of the matching and compare operations
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(#[from] SimilarityError),

    #[error("Candidate store unavailable: {0}")]
    StoreUnavailable(String),

    /// A row the submission depends on no longer exists (purged by retention)
    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MatchError {
    /// Transient infrastructure failure; the whole submission may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MatchError::StoreUnavailable(_) | MatchError::EmbedderUnavailable(_)
        )
    }

    /// Bad input the caller has to fix before trying again
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MatchError::UnreadableImage(_)
                | MatchError::InvalidEmbedding(_)
                | MatchError::InvalidRequest(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::UnreadableImage(_) => "unreadable_image",
            MatchError::InvalidEmbedding(_) => "invalid_embedding",
            MatchError::StoreUnavailable(_) => "store_unavailable",
            MatchError::CandidateNotFound(_) => "candidate_not_found",
            MatchError::EmbedderUnavailable(_) => "embedder_unavailable",
            MatchError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<StoreError> for MatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => MatchError::CandidateNotFound(id.to_string()),
            other => MatchError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<EmbedError> for MatchError {
    fn from(value: EmbedError) -> Self {
        match value {
            EmbedError::UnreadableImage(reason) => MatchError::UnreadableImage(reason),
            EmbedError::InvalidOutput(reason) => MatchError::EmbedderUnavailable(reason),
            other => MatchError::EmbedderUnavailable(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for MatchError {
    fn from(value: validator::ValidationErrors) -> Self {
        MatchError::InvalidRequest(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let store = MatchError::from(StoreError::Timeout(250));
        assert!(store.is_retryable());
        assert!(!store.is_caller_error());
        assert_eq!(store.kind(), "store_unavailable");

        let image = MatchError::from(EmbedError::UnreadableImage("truncated".into()));
        assert!(image.is_caller_error());
        assert!(!image.is_retryable());

        let embedding = MatchError::from(SimilarityError::ZeroMagnitude);
        assert!(embedding.is_caller_error());

        let gone = MatchError::from(StoreError::NotFound(crate::models::CandidateId::new()));
        assert!(matches!(gone, MatchError::CandidateNotFound(_)));
        assert!(!gone.is_retryable());
        assert!(!gone.is_caller_error());
        assert_eq!(gone.kind(), "candidate_not_found");
    }

    #[test]
    fn test_error_response_shape() {
        let response = MatchError::StoreUnavailable("deadline elapsed".into()).to_response();
        assert_eq!(response.error, "store_unavailable");
        assert!(response.retryable);
        assert!(response.message.contains("deadline elapsed"));
    }
}

use thiserror::Error;

use crate::models::Embedding;

/// Reasons a pair of embeddings cannot be scored
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimilarityError {
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("expected {expected} dimensions, got {actual}")]
    UnexpectedDimensions { expected: usize, actual: usize },

    #[error("empty embedding")]
    Empty,

    #[error("zero-magnitude embedding")]
    ZeroMagnitude,

    #[error("non-finite component at index {0}")]
    NonFinite(usize),
}

/// Bounded similarity between two embeddings
pub trait SimilarityScorer: Send + Sync {
    /// Score in [-1, 1]; never NaN
    fn score(&self, a: &Embedding, b: &Embedding) -> Result<f64, SimilarityError>;
}

/// Cosine similarity scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer;

impl SimilarityScorer for CosineScorer {
    #[inline]
    fn score(&self, a: &Embedding, b: &Embedding) -> Result<f64, SimilarityError> {
        cosine_similarity(a.as_slice(), b.as_slice())
    }
}

/// Cosine similarity of two vectors
///
/// Accumulates in f64 and divides by `sqrt(|a|² · |b|²)`, which is the dot
/// product of the two unit-normalized vectors. The result is clamped to
/// [-1, 1] to absorb rounding at the extremes.
///
/// # Errors
/// Empty input, mismatched lengths, non-finite components, and
/// zero-magnitude vectors are rejected instead of producing NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(SimilarityError::Empty);
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (i, (&x, &y)) in a.iter().zip(b.iter()).enumerate() {
        if !x.is_finite() || !y.is_finite() {
            return Err(SimilarityError::NonFinite(i));
        }
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return Err(SimilarityError::ZeroMagnitude);
    }

    Ok((dot / denom).clamp(-1.0, 1.0))
}

/// Check that an embedding can take part in scoring at all
pub fn validate_embedding(
    embedding: &Embedding,
    expected_dimensions: Option<usize>,
) -> Result<(), SimilarityError> {
    let values = embedding.as_slice();
    if values.is_empty() {
        return Err(SimilarityError::Empty);
    }
    if let Some(expected) = expected_dimensions {
        if values.len() != expected {
            return Err(SimilarityError::UnexpectedDimensions {
                expected,
                actual: values.len(),
            });
        }
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(SimilarityError::NonFinite(i));
    }
    if values.iter().all(|v| *v == 0.0) {
        return Err(SimilarityError::ZeroMagnitude);
    }
    Ok(())
}

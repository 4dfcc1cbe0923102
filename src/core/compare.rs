use std::sync::Arc;

use crate::core::matcher::DEFAULT_MATCH_THRESHOLD;
use crate::core::similarity::{CosineScorer, SimilarityScorer};
use crate::error::MatchError;
use crate::models::Embedding;
use crate::services::embedder::Embedder;

/// Outcome of comparing exactly two images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub score: f64,
    pub is_match: bool,
    pub threshold: f64,
}

/// Pool-free pairwise comparison
///
/// Embeds both images and scores them; nothing is stored and no window
/// applies. `is_match` uses the same strict inequality as the matching engine.
#[derive(Clone)]
pub struct CompareService {
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn SimilarityScorer>,
}

impl CompareService {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            scorer: Arc::new(CosineScorer),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Compare two images at the default threshold
    pub async fn compare_default(&self, image_a: &[u8], image_b: &[u8]) -> Result<Comparison, MatchError> {
        self.compare(image_a, image_b, DEFAULT_MATCH_THRESHOLD).await
    }

    pub async fn compare(
        &self,
        image_a: &[u8],
        image_b: &[u8],
        threshold: f64,
    ) -> Result<Comparison, MatchError> {
        let (a, b) = tokio::try_join!(self.embedder.embed(image_a), self.embedder.embed(image_b))?;
        self.compare_embeddings(&a, &b, threshold)
    }

    pub fn compare_embeddings(
        &self,
        a: &Embedding,
        b: &Embedding,
        threshold: f64,
    ) -> Result<Comparison, MatchError> {
        let score = self.scorer.score(a, b)?;
        tracing::debug!("Compared two images: score {:.4} (threshold {})", score, threshold);

        Ok(Comparison {
            score,
            is_match: score > threshold,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedder::EmbedError;
    use async_trait::async_trait;

    /// Reads the image bytes as little-endian f32 components
    struct RawEmbedder;

    #[async_trait]
    impl Embedder for RawEmbedder {
        async fn embed(&self, image: &[u8]) -> Result<Embedding, EmbedError> {
            if image.len() % 4 != 0 || image.is_empty() {
                return Err(EmbedError::UnreadableImage("length is not a multiple of 4".into()));
            }
            Ok(Embedding::new(
                image
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ))
        }

        fn model_name(&self) -> &str {
            "raw"
        }

        fn dimensions(&self) -> Option<usize> {
            None
        }
    }

    fn raw(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn test_compare_above_threshold() {
        let service = CompareService::new(Arc::new(RawEmbedder));
        let result = service
            .compare(&raw(&[1.0, 0.0]), &raw(&[0.6, 0.8]), 0.5)
            .await
            .unwrap();

        assert!((result.score - 0.6).abs() < 1e-6);
        assert!(result.is_match);
        assert_eq!(result.threshold, 0.5);
    }

    #[tokio::test]
    async fn test_compare_is_strict_at_threshold() {
        let service = CompareService::new(Arc::new(RawEmbedder));
        let result = service
            .compare(&raw(&[1.0, 1.0, 0.0, 0.0]), &raw(&[1.0, 0.0, 1.0, 0.0]), 0.5)
            .await
            .unwrap();

        assert_eq!(result.score, 0.5);
        assert!(!result.is_match);
    }

    #[tokio::test]
    async fn test_compare_default_threshold() {
        let service = CompareService::new(Arc::new(RawEmbedder));
        let result = service
            .compare_default(&raw(&[1.0, 0.0]), &raw(&[0.6, 0.8]))
            .await
            .unwrap();

        assert_eq!(result.threshold, 0.90);
        assert!(!result.is_match);
    }

    #[tokio::test]
    async fn test_compare_unreadable_image() {
        let service = CompareService::new(Arc::new(RawEmbedder));
        let err = service.compare(b"abc", &raw(&[1.0]), 0.5).await.unwrap_err();
        assert!(matches!(err, MatchError::UnreadableImage(_)));
    }

    #[tokio::test]
    async fn test_compare_dimension_mismatch() {
        let service = CompareService::new(Arc::new(RawEmbedder));
        let err = service
            .compare(&raw(&[1.0, 0.0]), &raw(&[1.0, 0.0, 0.0]), 0.5)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidEmbedding(_)));
    }
}

use async_trait::async_trait;
use image::imageops::FilterType;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::models::Embedding;

/// Errors that can occur while turning image bytes into an embedding
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Embedding service returned error: {0}")]
    ApiError(String),

    #[error("Invalid embedding output: {0}")]
    InvalidOutput(String),

    #[error("Embedder unavailable: {0}")]
    Unavailable(String),
}

/// Image-to-vector capability
///
/// Constructed once per process and shared behind an `Arc`; implementations
/// must be deterministic for identical bytes and model version.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, image: &[u8]) -> Result<Embedding, EmbedError>;

    fn model_name(&self) -> &str;

    /// Output dimensionality, when known up front
    fn dimensions(&self) -> Option<usize>;
}

/// CLIP channel statistics, reused to center thumbnail pixels
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// Default thumbnail edge, giving 16 * 16 * 3 = 768 dimensions
pub const DEFAULT_THUMBNAIL_SIDE: u32 = 16;

/// Deterministic reference embedder
///
/// Decodes the image, downsamples it to a `side x side` RGB thumbnail,
/// normalizes each channel with CLIP mean/std, and L2-normalizes the result.
/// Decoding runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct ThumbnailEmbedder {
    side: u32,
    model_name: String,
}

impl Default for ThumbnailEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_SIDE)
    }
}

impl ThumbnailEmbedder {
    pub fn new(side: u32) -> Self {
        let side = side.max(1);
        Self {
            side,
            model_name: format!("thumbnail-rgb-{}", side),
        }
    }

    /// Synchronous embedding, exposed for benches and blocking callers
    pub fn embed_blocking(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| EmbedError::UnreadableImage(e.to_string()))?;

        let thumb = image
            .resize_exact(self.side, self.side, FilterType::Triangle)
            .to_rgb8();

        let mut values: Vec<f32> = thumb
            .pixels()
            .flat_map(|p| {
                let [r, g, b] = p.0;
                [r, g, b]
                    .into_iter()
                    .enumerate()
                    .map(|(c, v)| (v as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c])
            })
            .collect();

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            return Err(EmbedError::InvalidOutput("degenerate thumbnail".to_string()));
        }
        for v in &mut values {
            *v /= norm;
        }

        Ok(Embedding::new(values))
    }
}

#[async_trait]
impl Embedder for ThumbnailEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Embedding, EmbedError> {
        let this = self.clone();
        let bytes = image.to_vec();
        tokio::task::spawn_blocking(move || this.embed_blocking(&bytes))
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> Option<usize> {
        Some((self.side * self.side * 3) as usize)
    }
}

/// Caps concurrent calls into an embedder that is not safe to share freely
///
/// Callers beyond `max_concurrency` wait for a permit; no other lock is held.
pub struct BoundedEmbedder<E> {
    inner: E,
    permits: Semaphore,
}

impl<E: Embedder> BoundedEmbedder<E> {
    pub fn new(inner: E, max_concurrency: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrency.max(1)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<E: Embedder> Embedder for BoundedEmbedder<E> {
    async fn embed(&self, image: &[u8]) -> Result<Embedding, EmbedError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;
        self.inner.embed(image).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> Option<usize> {
        self.inner.dimensions()
    }
}

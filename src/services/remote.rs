use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::Embedding;
use crate::services::embedder::{EmbedError, Embedder};

/// Response body of the embedding service
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    model: Option<String>,
}

/// Client for an out-of-process model service
///
/// Posts raw image bytes to `{endpoint}/embed?model={model}` and expects
/// `{"embedding": [...]}` back. A 4xx reply means the service could not
/// decode the image; anything else that fails is treated as transient.
pub struct RemoteEmbedder {
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    client: Client,
}

impl RemoteEmbedder {
    /// Create a new remote embedder
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            client,
        })
    }

    fn embed_url(&self) -> String {
        format!(
            "{}/embed?model={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.model)
        )
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Embedding, EmbedError> {
        let url = self.embed_url();
        tracing::debug!("Requesting embedding from: {}", url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                    EmbedError::UnreadableImage(detail)
                }
                _ => EmbedError::ApiError(format!("{}: {}", status, detail)),
            });
        }
        if !status.is_success() {
            return Err(EmbedError::ApiError(format!(
                "Failed to embed image: {}",
                status
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidOutput(format!("Failed to parse embedding: {}", e)))?;

        if let Some(model) = &body.model {
            if model != &self.model {
                tracing::warn!("Embedding service answered with model {} (expected {})", model, self.model);
            }
        }

        if let Some(expected) = self.dimensions {
            if body.embedding.len() != expected {
                return Err(EmbedError::InvalidOutput(format!(
                    "expected {} dimensions, got {}",
                    expected,
                    body.embedding.len()
                )));
            }
        }

        Ok(Embedding::new(body.embedding))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

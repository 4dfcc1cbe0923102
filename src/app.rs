use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use validator::Validate;

use crate::config::{EmbedderKind, Settings, StoreBackend};
use crate::core::{CompareService, MatchBackend, MatchingEngine, Submission};
use crate::error::MatchError;
use crate::models::{CompareRequest, CompareResponse, MatchResult, SubmitSelfieRequest, SubmitSelfieResponse};
use crate::services::{
    spawn_cleanup, BoundedEmbedder, CacheError, EmbedError, Embedder, InMemoryCandidateStore,
    PostgresCandidateStore, RemoteEmbedder, ResultCache, StoreError, ThumbnailEmbedder,
};

/// Errors that can occur while wiring the service from settings
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedder error: {0}")]
    Embed(#[from] EmbedError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Entry point for the two caller-facing operations
///
/// Owns one embedder for the whole process and shares it between the
/// matching engine path and the compare path.
#[derive(Clone)]
pub struct VibeService {
    embedder: Arc<dyn Embedder>,
    engine: MatchingEngine,
    compare: CompareService,
    cache: Option<Arc<ResultCache>>,
}

impl VibeService {
    pub fn new(embedder: Arc<dyn Embedder>, engine: MatchingEngine) -> Self {
        let compare = CompareService::new(embedder.clone()).with_scorer(engine.scorer());
        Self {
            embedder,
            engine,
            compare,
            cache: None,
        }
    }

    /// Replay finished submissions that carry an idempotency key
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the store, embedder and cache described by `settings`
    pub async fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let backend = match settings.store.backend {
            StoreBackend::None => {
                tracing::info!("Running without a candidate store (stateless mode)");
                MatchBackend::NoStore
            }
            StoreBackend::Memory => {
                tracing::info!("Using in-memory candidate store");
                MatchBackend::Store(Arc::new(InMemoryCandidateStore::new()))
            }
            StoreBackend::Postgres => {
                let url = settings
                    .store
                    .url
                    .as_deref()
                    .ok_or(StartupError::MissingSetting("store.url"))?;
                let store = PostgresCandidateStore::from_settings(
                    url,
                    settings.store.max_connections,
                    settings.store.min_connections,
                    settings.store.acquire_timeout_secs,
                    settings.store.idle_timeout_secs,
                )
                .await?;
                tracing::info!("PostgreSQL candidate store initialized");
                MatchBackend::Store(Arc::new(store))
            }
        };

        let embedder = build_embedder(settings)?;
        tracing::info!("Embedder initialized: {}", embedder.model_name());

        let mut config = settings.matching.to_config();
        if config.expected_dimensions.is_none() {
            config.expected_dimensions = embedder.dimensions();
        }
        let engine = MatchingEngine::new(backend, config);

        let cache = match &settings.cache.redis_url {
            Some(url) => ResultCache::with_redis(url, settings.cache.l1_cache_size, settings.cache.ttl_secs).await?,
            None => ResultCache::local(settings.cache.l1_cache_size, settings.cache.ttl_secs),
        };
        tracing::info!(
            "Replay cache initialized (L1: {} entries, TTL: {}s, shared: {})",
            settings.cache.l1_cache_size,
            settings.cache.ttl_secs,
            cache.has_shared_tier()
        );

        Ok(Self::new(embedder, engine).with_cache(Arc::new(cache)))
    }

    /// Start the background expiry sweep if a store is configured and cleanup is enabled
    pub fn start_cleanup(&self, settings: &Settings) -> Option<JoinHandle<()>> {
        if !settings.cleanup.enabled {
            return None;
        }
        let store = self.engine.store()?.clone();
        Some(spawn_cleanup(store, settings.cleanup.to_policy(&settings.matching)))
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    /// Embed a selfie and run it through the matching engine
    pub async fn submit_selfie(
        &self,
        request: &SubmitSelfieRequest,
        image: &[u8],
    ) -> Result<SubmitSelfieResponse, MatchError> {
        self.submit_selfie_at(request, image, Utc::now()).await
    }

    pub async fn submit_selfie_at(
        &self,
        request: &SubmitSelfieRequest,
        image: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SubmitSelfieResponse, MatchError> {
        request.validate()?;

        if let Some(result) = self.cached_result(request).await {
            tracing::info!("Replaying cached result for user {}", request.user_id);
            return Ok(SubmitSelfieResponse::from(&result));
        }

        let embedding = self.embedder.embed(image).await?;

        let mut submission = Submission::new(embedding, request.user_id.clone(), now);
        submission.threshold = request.threshold;
        submission.idempotency_key = request.idempotency_key.clone();

        let result = self.engine.submit_with(submission).await?;

        if let (Some(cache), Some(key)) = (&self.cache, &request.idempotency_key) {
            if let Err(e) = cache.put_result(&request.user_id, key, &result).await {
                tracing::warn!("Failed to cache result for key {}: {}", key, e);
            }
        }

        Ok(SubmitSelfieResponse::from(&result))
    }

    async fn cached_result(&self, request: &SubmitSelfieRequest) -> Option<MatchResult> {
        let cache = self.cache.as_ref()?;
        let key = request.idempotency_key.as_deref()?;
        match cache.get_result(&request.user_id, key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Replay cache lookup failed for key {}: {}", key, e);
                None
            }
        }
    }

    /// Compare two images without touching the pool
    pub async fn compare(
        &self,
        request: &CompareRequest,
        image_a: &[u8],
        image_b: &[u8],
    ) -> Result<CompareResponse, MatchError> {
        request.validate()?;
        let comparison = self.compare.compare(image_a, image_b, request.threshold).await?;
        Ok(CompareResponse {
            similarity_score: comparison.score,
            is_match: comparison.is_match,
            threshold: comparison.threshold,
        })
    }
}

fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>, StartupError> {
    let cfg = &settings.embedder;
    let embedder: Arc<dyn Embedder> = match (cfg.kind, cfg.max_concurrency) {
        (EmbedderKind::Thumbnail, None) => Arc::new(ThumbnailEmbedder::new(cfg.thumbnail_side)),
        (EmbedderKind::Thumbnail, Some(n)) => {
            Arc::new(BoundedEmbedder::new(ThumbnailEmbedder::new(cfg.thumbnail_side), n))
        }
        (EmbedderKind::Remote, limit) => {
            let endpoint = cfg
                .endpoint
                .as_deref()
                .ok_or(StartupError::MissingSetting("embedder.endpoint"))?;
            let remote = RemoteEmbedder::new(
                endpoint,
                cfg.model.clone(),
                cfg.dimensions,
                Duration::from_secs(cfg.timeout_secs),
            )?;
            match limit {
                Some(n) => Arc::new(BoundedEmbedder::new(remote, n)),
                None => Arc::new(remote),
            }
        }
    };
    Ok(embedder)
}

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

use crate::core::filters::window_cutoff;
use crate::core::similarity::{validate_embedding, CosineScorer, SimilarityScorer};
use crate::error::MatchError;
use crate::models::{
    Candidate, CandidateId, CandidateStatus, ClaimOutcome, Embedding, MatchResult, NewCandidate,
    Resolution,
};
use crate::services::store::{CandidateStore, StoreError};

pub const DEFAULT_WINDOW_SECS: u64 = 300;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.90;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// Tunables for the matching engine
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    /// How far back a pending candidate stays in the active pool
    pub window: Duration,
    /// A match needs a score strictly above this
    pub threshold: f64,
    pub resolution: Resolution,
    /// Deadline applied to every individual store call
    pub store_timeout: std::time::Duration,
    /// Reject new embeddings of any other length
    pub expected_dimensions: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            window: Duration::seconds(DEFAULT_WINDOW_SECS as i64),
            threshold: DEFAULT_MATCH_THRESHOLD,
            resolution: Resolution::default(),
            store_timeout: std::time::Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            expected_dimensions: None,
        }
    }
}

/// Where pool state lives
///
/// `NoStore` runs the engine in stateless mode: submissions are validated
/// and then always answered with no match.
#[derive(Clone)]
pub enum MatchBackend {
    NoStore,
    Store(Arc<dyn CandidateStore>),
}

/// One incoming selfie, already embedded
#[derive(Debug, Clone)]
pub struct Submission {
    pub embedding: Embedding,
    pub user_id: String,
    pub now: DateTime<Utc>,
    /// Per-call override of the configured threshold
    pub threshold: Option<f64>,
    pub idempotency_key: Option<String>,
}

impl Submission {
    pub fn new(embedding: Embedding, user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            embedding,
            user_id: user_id.into(),
            now,
            threshold: None,
            idempotency_key: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// A pool candidate with its score against the incoming embedding
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

impl ScoredCandidate {
    fn into_result(self) -> MatchResult {
        MatchResult::Matched {
            matched_candidate_id: self.candidate.id,
            matched_user_id: self.candidate.user_id,
            score: self.score,
        }
    }
}

/// Best-first ordering: higher score, then earlier `created_at`, then lower id
fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.candidate.created_at.cmp(&b.candidate.created_at))
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
}

/// Score a pool against an embedding and sort it best-first
///
/// Comparisons that fail (dimension mismatch, degenerate stored vector) are
/// skipped and logged; they never abort the ranking. Returns the ranked list
/// and the number of skipped candidates.
pub fn rank_candidates(
    scorer: &dyn SimilarityScorer,
    embedding: &Embedding,
    pool: Vec<Candidate>,
) -> (Vec<ScoredCandidate>, usize) {
    let mut skipped = 0;
    let mut ranked: Vec<ScoredCandidate> = pool
        .into_iter()
        .filter_map(|candidate| match scorer.score(embedding, &candidate.embedding) {
            Ok(score) => Some(ScoredCandidate { candidate, score }),
            Err(e) => {
                skipped += 1;
                tracing::warn!(
                    candidate_id = %candidate.id,
                    user_id = %candidate.user_id,
                    "Skipping candidate with invalid embedding: {}",
                    e
                );
                None
            }
        })
        .collect();

    ranked.sort_by(rank_order);
    (ranked, skipped)
}

/// Candidate-pool matching engine
///
/// Holds no mutable state of its own; every submission is an
/// insert → query → score → claim sequence against the backend. Claims go
/// through the store's atomic operations, so two submissions racing for the
/// same candidate cannot both win it: the loser moves on to its next-best
/// candidate from the pool it already fetched.
///
/// # Cancellation
/// Each claim is a single store call. Dropping a submission mid-flight leaves
/// either an inserted pending row or a fully resolved pair, which a retry
/// with the same idempotency key reports.
#[derive(Clone)]
pub struct MatchingEngine {
    backend: MatchBackend,
    scorer: Arc<dyn SimilarityScorer>,
    config: MatchingConfig,
}

impl MatchingEngine {
    pub fn new(backend: MatchBackend, config: MatchingConfig) -> Self {
        Self {
            backend,
            scorer: Arc::new(CosineScorer),
            config,
        }
    }

    pub fn with_store(store: Arc<dyn CandidateStore>, config: MatchingConfig) -> Self {
        Self::new(MatchBackend::Store(store), config)
    }

    pub fn stateless(config: MatchingConfig) -> Self {
        Self::new(MatchBackend::NoStore, config)
    }

    /// Swap the scoring function
    pub fn with_scorer(mut self, scorer: Arc<dyn SimilarityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn scorer(&self) -> Arc<dyn SimilarityScorer> {
        self.scorer.clone()
    }

    pub fn store(&self) -> Option<&Arc<dyn CandidateStore>> {
        match &self.backend {
            MatchBackend::NoStore => None,
            MatchBackend::Store(store) => Some(store),
        }
    }

    /// Submit with the configured threshold and no idempotency key
    pub async fn submit(
        &self,
        embedding: Embedding,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchResult, MatchError> {
        self.submit_with(Submission::new(embedding, user_id, now)).await
    }

    /// Insert the submission, search the active pool, and resolve the best match
    pub async fn submit_with(&self, submission: Submission) -> Result<MatchResult, MatchError> {
        let Submission {
            embedding,
            user_id,
            now,
            threshold,
            idempotency_key,
        } = submission;

        validate_embedding(&embedding, self.config.expected_dimensions)?;
        let threshold = threshold.unwrap_or(self.config.threshold);

        let store = match &self.backend {
            MatchBackend::NoStore => {
                tracing::debug!("No candidate store configured; {} gets no match", user_id);
                return Ok(MatchResult::NoMatch);
            }
            MatchBackend::Store(store) => store,
        };

        let new_candidate = NewCandidate::new(user_id.clone(), embedding.clone(), now)
            .with_idempotency_key(idempotency_key);
        let fresh_id = new_candidate.id;
        let own_id = self.call("insert", store.insert(new_candidate)).await?;

        if own_id != fresh_id {
            tracing::info!("Resuming earlier submission {} for user {}", own_id, user_id);
            if let Some(existing) = self.call("get", store.get(own_id)).await? {
                // A recorded partner means the earlier attempt already resolved
                if existing.status == CandidateStatus::Matched || existing.matched_with.is_some() {
                    return self.resolve_existing(store, own_id, &embedding).await;
                }
            }
        }

        let cutoff = window_cutoff(now, self.config.window);
        let pool: Vec<Candidate> = self
            .call("query", store.query(&user_id, CandidateStatus::Pending, cutoff))
            .await?
            .into_iter()
            .filter(|c| c.id != own_id)
            .collect();

        if pool.is_empty() {
            tracing::debug!("Active pool empty for user {}", user_id);
            return Ok(MatchResult::NoMatch);
        }

        let pool_size = pool.len();
        let (ranked, skipped) = rank_candidates(self.scorer.as_ref(), &embedding, pool);
        tracing::debug!(
            "Scored {} of {} pool candidates for user {} ({} skipped)",
            ranked.len(),
            pool_size,
            user_id,
            skipped
        );

        for entry in ranked.into_iter().take_while(|e| e.score > threshold) {
            let target = entry.candidate.id;
            match self.config.resolution {
                Resolution::BothSides => {
                    match self.call("claim_pair", store.claim_pair(own_id, target)).await? {
                        ClaimOutcome::Claimed => {
                            tracing::info!(
                                "Matched user {} with user {} (score {:.4})",
                                user_id,
                                entry.candidate.user_id,
                                entry.score
                            );
                            return Ok(entry.into_result());
                        }
                        ClaimOutcome::TargetTaken => {
                            tracing::warn!("Lost race for candidate {}; trying next best", target);
                        }
                        ClaimOutcome::OwnTaken => {
                            return self.resolve_existing(store, own_id, &embedding).await;
                        }
                    }
                }
                Resolution::TargetOnly => {
                    let won = self
                        .call("claim_target", store.claim_target(own_id, target))
                        .await?;
                    if won {
                        tracing::info!(
                            "Matched user {} with user {} (score {:.4})",
                            user_id,
                            entry.candidate.user_id,
                            entry.score
                        );
                        return Ok(entry.into_result());
                    }
                    tracing::warn!("Lost race for candidate {}; trying next best", target);
                }
            }
        }

        Ok(MatchResult::NoMatch)
    }

    /// Report the pair an already-resolved submission belongs to
    async fn resolve_existing(
        &self,
        store: &Arc<dyn CandidateStore>,
        own_id: CandidateId,
        embedding: &Embedding,
    ) -> Result<MatchResult, MatchError> {
        let own = self
            .call("get", store.get(own_id))
            .await?
            .ok_or(StoreError::NotFound(own_id))?;

        let Some(partner_id) = own.matched_with else {
            tracing::info!("Candidate {} was matched without a recorded partner", own_id);
            return Ok(MatchResult::NoMatch);
        };

        let partner = self
            .call("get", store.get(partner_id))
            .await?
            .ok_or(StoreError::NotFound(partner_id))?;

        let score = self.scorer.score(embedding, &partner.embedding)?;
        tracing::info!(
            "Candidate {} already paired with user {} by a concurrent submission",
            own_id,
            partner.user_id
        );

        Ok(MatchResult::Matched {
            matched_candidate_id: partner.id,
            matched_user_id: partner.user_id,
            score,
        })
    }

    /// Run one store call under the configured deadline
    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, MatchError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!("Candidate store {} failed: {}", op, e);
                Err(e.into())
            }
            Err(_) => {
                let ms = self.config.store_timeout.as_millis() as u64;
                tracing::error!("Candidate store {} timed out after {}ms", op, ms);
                Err(StoreError::Timeout(ms).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::similarity::SimilarityError;
    use crate::services::memory::InMemoryCandidateStore;

    fn unit_at(score: f32) -> Embedding {
        Embedding::new(vec![score, (1.0 - score * score).sqrt()])
    }

    fn pending(user: &str, embedding: Embedding, created_at: DateTime<Utc>) -> Candidate {
        NewCandidate::new(user, embedding, created_at).into_candidate()
    }

    #[test]
    fn test_rank_prefers_higher_score() {
        let now = Utc::now();
        let query = Embedding::new(vec![1.0, 0.0]);
        let pool = vec![
            pending("low", unit_at(0.92), now - Duration::seconds(30)),
            pending("high", unit_at(0.95), now - Duration::seconds(10)),
        ];

        let (ranked, skipped) = rank_candidates(&CosineScorer, &query, pool);
        assert_eq!(skipped, 0);
        assert_eq!(ranked[0].candidate.user_id, "high");
        assert!((ranked[0].score - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_rank_ties_go_to_earliest() {
        let now = Utc::now();
        let query = Embedding::new(vec![1.0, 0.0]);
        let pool = vec![
            pending("later", unit_at(0.95), now - Duration::seconds(5)),
            pending("earlier", unit_at(0.95), now - Duration::seconds(50)),
            pending("middle", unit_at(0.95), now - Duration::seconds(20)),
        ];

        let (ranked, _) = rank_candidates(&CosineScorer, &query, pool);
        let order: Vec<_> = ranked.iter().map(|s| s.candidate.user_id.as_str()).collect();
        assert_eq!(order, vec!["earlier", "middle", "later"]);
    }

    #[test]
    fn test_rank_skips_corrupt_rows() {
        let now = Utc::now();
        let query = Embedding::new(vec![1.0, 0.0]);
        let pool = vec![
            pending("wrong-dims", Embedding::new(vec![1.0, 0.0, 0.0]), now),
            pending("zero", Embedding::new(vec![0.0, 0.0]), now),
            pending("ok", unit_at(0.5), now),
        ];

        let (ranked, skipped) = rank_candidates(&CosineScorer, &query, pool);
        assert_eq!(skipped, 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.user_id, "ok");
    }

    #[tokio::test]
    async fn test_invalid_new_embedding_fails_submission() {
        let store = Arc::new(InMemoryCandidateStore::new());
        let engine = MatchingEngine::with_store(store.clone(), MatchingConfig::default());

        let err = engine
            .submit(Embedding::new(vec![0.0, 0.0]), "alice", Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, MatchError::InvalidEmbedding(SimilarityError::ZeroMagnitude)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expected_dimensions_enforced() {
        let config = MatchingConfig {
            expected_dimensions: Some(3),
            ..MatchingConfig::default()
        };
        let engine = MatchingEngine::stateless(config);

        let err = engine
            .submit(Embedding::new(vec![1.0, 0.0]), "alice", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::InvalidEmbedding(SimilarityError::UnexpectedDimensions { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_threshold_override_per_call() {
        let store = Arc::new(InMemoryCandidateStore::new());
        let engine = MatchingEngine::with_store(store.clone(), MatchingConfig::default());
        let now = Utc::now();

        engine.submit(unit_at(1.0), "alice", now).await.unwrap();

        // bob and carol both sit at 0.8 from alice but far from each other
        let strict = engine
            .submit(Embedding::new(vec![0.8, -0.6]), "bob", now)
            .await
            .unwrap();
        assert_eq!(strict, MatchResult::NoMatch);

        let relaxed = engine
            .submit_with(Submission::new(Embedding::new(vec![0.8, 0.6]), "carol", now).with_threshold(0.5))
            .await
            .unwrap();
        assert_eq!(relaxed.matched_user_id(), Some("alice"));
    }
}

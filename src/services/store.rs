use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Candidate, CandidateId, CandidateStatus, ClaimOutcome, NewCandidate};

/// Errors that can occur when talking to a candidate store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Store call exceeded {0}ms deadline")]
    Timeout(u64),

    #[error("Not found: {0}")]
    NotFound(CandidateId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Pending-candidate storage shared by all submissions
///
/// All mutable matching state lives behind this trait. Implementations must
/// make `compare_and_set_status` and `claim_pair` atomic with respect to each
/// other: a candidate can leave `pending` at most once.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Insert a pending candidate and return its id.
    ///
    /// When the same user already stored a row under `idempotency_key`, that
    /// row's id is returned and nothing is inserted. Keys never cross users.
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateId, StoreError>;

    /// Candidates from other users with the given status created strictly after `created_after`.
    async fn query(
        &self,
        excluding_user_id: &str,
        status: CandidateStatus,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, StoreError>;

    async fn get(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError>;

    /// Flip `id` from `expected` to `new`; `false` means another writer got there first.
    async fn compare_and_set_status(
        &self,
        id: CandidateId,
        expected: CandidateStatus,
        new: CandidateStatus,
    ) -> Result<bool, StoreError>;

    /// Resolve `own` and `target` as a matched pair, only if both are still pending.
    async fn claim_pair(
        &self,
        own: CandidateId,
        target: CandidateId,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Flip `target` to `matched` if it is still pending, leaving `own` pending.
    ///
    /// Both rows record the other in `matched_with` unless they already name a
    /// partner, so a retry of `own` can report the candidate it claimed.
    async fn claim_target(&self, own: CandidateId, target: CandidateId) -> Result<bool, StoreError>;

    /// Persist lazy expiry: pending rows created at or before `cutoff` become expired.
    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Delete rows of any status created at or before `cutoff`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

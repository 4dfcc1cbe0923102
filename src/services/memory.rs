use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::core::filters::{is_stale, matches_pool_query};
use crate::models::{Candidate, CandidateId, CandidateStatus, ClaimOutcome, NewCandidate};
use crate::services::store::{CandidateStore, StoreError};

#[derive(Default)]
struct Inner {
    rows: HashMap<CandidateId, Candidate>,
    /// Idempotency keys are scoped to the submitting user
    by_key: HashMap<(String, String), CandidateId>,
}

/// In-process candidate store
///
/// Every mutation takes the write lock, so status transitions are
/// serialized and `claim_pair` sees both rows in one consistent state.
#[derive(Default)]
pub struct InMemoryCandidateStore {
    inner: RwLock<Inner>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a fully formed row, bypassing idempotency checks
    ///
    /// Meant for seeding fixtures, including rows a live engine would never write.
    pub async fn seed(&self, candidate: Candidate) {
        let mut inner = self.inner.write().await;
        if let Some(key) = &candidate.idempotency_key {
            inner
                .by_key
                .insert((candidate.user_id.clone(), key.clone()), candidate.id);
        }
        inner.rows.insert(candidate.id, candidate);
    }
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateId, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(key) = &candidate.idempotency_key {
            let scoped = (candidate.user_id.clone(), key.clone());
            if let Some(existing) = inner.by_key.get(&scoped) {
                tracing::debug!("Idempotency key {} already stored as {}", key, existing);
                return Ok(*existing);
            }
            inner.by_key.insert(scoped, candidate.id);
        }

        let id = candidate.id;
        inner.rows.insert(id, candidate.into_candidate());
        Ok(id)
    }

    async fn query(
        &self,
        excluding_user_id: &str,
        status: CandidateStatus,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|c| matches_pool_query(c, excluding_user_id, status, created_after))
            .cloned()
            .collect())
    }

    async fn get(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: CandidateId,
        expected: CandidateStatus,
        new: CandidateStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.rows.get_mut(&id) {
            Some(row) if row.status == expected => {
                row.status = new;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn claim_pair(
        &self,
        own: CandidateId,
        target: CandidateId,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.write().await;

        let own_status = inner.rows.get(&own).map(|c| c.status).ok_or(StoreError::NotFound(own))?;
        let target_status = inner
            .rows
            .get(&target)
            .map(|c| c.status)
            .ok_or(StoreError::NotFound(target))?;

        if own_status != CandidateStatus::Pending {
            return Ok(ClaimOutcome::OwnTaken);
        }
        if target_status != CandidateStatus::Pending {
            return Ok(ClaimOutcome::TargetTaken);
        }

        for (id, partner) in [(own, target), (target, own)] {
            if let Some(row) = inner.rows.get_mut(&id) {
                row.status = CandidateStatus::Matched;
                row.matched_with = Some(partner);
            }
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn claim_target(&self, own: CandidateId, target: CandidateId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;

        if !inner.rows.contains_key(&own) {
            return Err(StoreError::NotFound(own));
        }
        let row = inner.rows.get_mut(&target).ok_or(StoreError::NotFound(target))?;
        if row.status != CandidateStatus::Pending {
            return Ok(false);
        }
        row.status = CandidateStatus::Matched;
        row.matched_with.get_or_insert(own);

        if let Some(own_row) = inner.rows.get_mut(&own) {
            own_row.matched_with.get_or_insert(target);
        }
        Ok(true)
    }

    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let mut expired = 0;
        for row in inner.rows.values_mut().filter(|c| is_stale(c, cutoff)) {
            row.status = CandidateStatus::Expired;
            expired += 1;
        }
        Ok(expired)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.rows.len();
        inner.rows.retain(|_, c| c.created_at > cutoff);
        let Inner { rows, by_key } = &mut *inner;
        by_key.retain(|_, id| rows.contains_key(id));
        Ok((before - rows.len()) as u64)
    }
}

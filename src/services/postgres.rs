use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Candidate, CandidateId, CandidateStatus, ClaimOutcome, Embedding, NewCandidate};
use crate::services::store::{CandidateStore, StoreError};

/// Column type for candidate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "candidate_status", rename_all = "lowercase")]
pub enum StatusColumn {
    Pending,
    Matched,
    Expired,
}

impl From<CandidateStatus> for StatusColumn {
    fn from(value: CandidateStatus) -> Self {
        match value {
            CandidateStatus::Pending => StatusColumn::Pending,
            CandidateStatus::Matched => StatusColumn::Matched,
            CandidateStatus::Expired => StatusColumn::Expired,
        }
    }
}

impl From<StatusColumn> for CandidateStatus {
    fn from(value: StatusColumn) -> Self {
        match value {
            StatusColumn::Pending => CandidateStatus::Pending,
            StatusColumn::Matched => CandidateStatus::Matched,
            StatusColumn::Expired => CandidateStatus::Expired,
        }
    }
}

const CANDIDATE_COLUMNS: &str =
    "id, user_id, embedding, status, created_at, matched_with, idempotency_key";

/// PostgreSQL-backed candidate store
///
/// Pool queries hit `idx_selfie_candidates_pool`; pair resolution locks both
/// rows with `SELECT ... FOR UPDATE` in id order so concurrent claims cannot
/// deadlock or double-resolve a row.
pub struct PostgresCandidateStore {
    pool: PgPool,
}

impl PostgresCandidateStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!(
            "Connecting to PostgreSQL (max {} connections)",
            max_connections.unwrap_or(10)
        );

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Wrap an existing pool; migrations are the caller's concern
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn candidate_from_row(row: &PgRow) -> Result<Candidate, StoreError> {
    let status: StatusColumn = row.try_get("status")?;
    let embedding: Vec<f32> = row.try_get("embedding")?;
    let matched_with: Option<Uuid> = row.try_get("matched_with")?;

    Ok(Candidate {
        id: CandidateId(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        embedding: Embedding::new(embedding),
        status: status.into(),
        created_at: row.try_get("created_at")?,
        matched_with: matched_with.map(CandidateId),
        idempotency_key: row.try_get("idempotency_key")?,
    })
}

#[async_trait]
impl CandidateStore for PostgresCandidateStore {
    /// Uses INSERT ... ON CONFLICT so a user repeating an idempotency key gets
    /// the original row back instead of a duplicate.
    async fn insert(&self, candidate: NewCandidate) -> Result<CandidateId, StoreError> {
        let query = r#"
            INSERT INTO selfie_candidates (id, user_id, embedding, status, created_at, idempotency_key)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT (user_id, idempotency_key)
            DO UPDATE SET idempotency_key = EXCLUDED.idempotency_key
            RETURNING id
        "#;

        let row = sqlx::query(query)
            .bind(candidate.id.0)
            .bind(&candidate.user_id)
            .bind(candidate.embedding.as_slice())
            .bind(candidate.created_at)
            .bind(&candidate.idempotency_key)
            .fetch_one(&self.pool)
            .await?;

        let id = CandidateId(row.try_get("id")?);
        if id != candidate.id {
            tracing::debug!(
                "Idempotency key {:?} already stored as {}",
                candidate.idempotency_key,
                id
            );
        }
        Ok(id)
    }

    async fn query(
        &self,
        excluding_user_id: &str,
        status: CandidateStatus,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, StoreError> {
        let query = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}
            FROM selfie_candidates
            WHERE user_id <> $1 AND status = $2 AND created_at > $3
            ORDER BY created_at ASC
            "#
        );

        let rows = sqlx::query(&query)
            .bind(excluding_user_id)
            .bind(StatusColumn::from(status))
            .bind(created_after)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn get(&self, id: CandidateId) -> Result<Option<Candidate>, StoreError> {
        let query = format!("SELECT {CANDIDATE_COLUMNS} FROM selfie_candidates WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn compare_and_set_status(
        &self,
        id: CandidateId,
        expected: CandidateStatus,
        new: CandidateStatus,
    ) -> Result<bool, StoreError> {
        let query = r#"
            UPDATE selfie_candidates
            SET status = $3
            WHERE id = $1 AND status = $2
        "#;

        let result = sqlx::query(query)
            .bind(id.0)
            .bind(StatusColumn::from(expected))
            .bind(StatusColumn::from(new))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_pair(
        &self,
        own: CandidateId,
        target: CandidateId,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, status
            FROM selfie_candidates
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(vec![own.0, target.0])
        .fetch_all(&mut *tx)
        .await?;

        let mut own_status = None;
        let mut target_status = None;
        for row in &rows {
            let id: Uuid = row.try_get("id")?;
            let status: StatusColumn = row.try_get("status")?;
            if id == own.0 {
                own_status = Some(status);
            } else if id == target.0 {
                target_status = Some(status);
            }
        }

        let outcome = match (own_status, target_status) {
            (None, _) => return Err(StoreError::NotFound(own)),
            (_, None) => return Err(StoreError::NotFound(target)),
            (Some(s), _) if s != StatusColumn::Pending => ClaimOutcome::OwnTaken,
            (_, Some(s)) if s != StatusColumn::Pending => ClaimOutcome::TargetTaken,
            _ => ClaimOutcome::Claimed,
        };

        if outcome != ClaimOutcome::Claimed {
            tx.rollback().await?;
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            UPDATE selfie_candidates
            SET status = 'matched',
                matched_with = CASE WHEN id = $1 THEN $2 ELSE $1 END
            WHERE id IN ($1, $2)
            "#,
        )
        .bind(own.0)
        .bind(target.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Resolved pair {} <-> {}", own, target);
        Ok(ClaimOutcome::Claimed)
    }

    async fn claim_target(&self, own: CandidateId, target: CandidateId) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE selfie_candidates
            SET status = 'matched',
                matched_with = COALESCE(matched_with, $1)
            WHERE id = $2 AND status = 'pending'
            "#,
        )
        .bind(own.0)
        .bind(target.0)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let recorded = sqlx::query(
            r#"
            UPDATE selfie_candidates
            SET matched_with = COALESCE(matched_with, $2)
            WHERE id = $1
            "#,
        )
        .bind(own.0)
        .bind(target.0)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(own));
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE selfie_candidates
            SET status = 'expired'
            WHERE status = 'pending' AND created_at <= $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM selfie_candidates WHERE created_at <= $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

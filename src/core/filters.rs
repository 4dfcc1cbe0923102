use chrono::{DateTime, Duration, Utc};

use crate::models::{Candidate, CandidateStatus};

/// Oldest `created_at` (exclusive) still inside the recency window
#[inline]
pub fn window_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - window
}

/// Check if a candidate belongs to the pool described by a store query
///
/// Self-exclusion is structural: rows from `excluding_user_id` never pass,
/// whatever their status or age.
#[inline]
pub fn matches_pool_query(
    candidate: &Candidate,
    excluding_user_id: &str,
    status: CandidateStatus,
    created_after: DateTime<Utc>,
) -> bool {
    candidate.user_id != excluding_user_id
        && candidate.status == status
        && candidate.created_at > created_after
}

/// A pending candidate that has fallen out of the window
///
/// Expiry is lazy; this is what the cleanup sweep persists.
#[inline]
pub fn is_stale(candidate: &Candidate, cutoff: DateTime<Utc>) -> bool {
    candidate.status == CandidateStatus::Pending && candidate.created_at <= cutoff
}

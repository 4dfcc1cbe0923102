use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a stored candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub Uuid);

impl CandidateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fixed-length semantic vector for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Lifecycle state of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Pending,
    Matched,
    Expired,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Matched => "matched",
            CandidateStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selfie submission waiting in (or resolved out of) the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub user_id: String,
    pub embedding: Embedding,
    pub status: CandidateStatus,
    pub created_at: DateTime<Utc>,
    /// Partner row once the candidate is resolved as half of a pair
    #[serde(default)]
    pub matched_with: Option<CandidateId>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Insert payload; the store assigns nothing but may reuse an existing row
/// when the idempotency key was seen before.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub id: CandidateId,
    pub user_id: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl NewCandidate {
    pub fn new(user_id: impl Into<String>, embedding: Embedding, created_at: DateTime<Utc>) -> Self {
        Self {
            id: CandidateId::new(),
            user_id: user_id.into(),
            embedding,
            created_at,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    pub fn into_candidate(self) -> Candidate {
        Candidate {
            id: self.id,
            user_id: self.user_id,
            embedding: self.embedding,
            status: CandidateStatus::Pending,
            created_at: self.created_at,
            matched_with: None,
            idempotency_key: self.idempotency_key,
        }
    }
}

/// Outcome of a single submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "MatchResultRepr", try_from = "MatchResultRepr")]
pub enum MatchResult {
    Matched {
        matched_candidate_id: CandidateId,
        matched_user_id: String,
        score: f64,
    },
    NoMatch,
}

/// Flat wire shape: `{"matched": true, ...}` or `{"matched": false}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatchResultRepr {
    matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matched_candidate_id: Option<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matched_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

impl From<MatchResult> for MatchResultRepr {
    fn from(value: MatchResult) -> Self {
        match value {
            MatchResult::Matched { matched_candidate_id, matched_user_id, score } => Self {
                matched: true,
                matched_candidate_id: Some(matched_candidate_id),
                matched_user_id: Some(matched_user_id),
                score: Some(score),
            },
            MatchResult::NoMatch => Self {
                matched: false,
                matched_candidate_id: None,
                matched_user_id: None,
                score: None,
            },
        }
    }
}

impl TryFrom<MatchResultRepr> for MatchResult {
    type Error = String;

    fn try_from(repr: MatchResultRepr) -> Result<Self, Self::Error> {
        if !repr.matched {
            return Ok(MatchResult::NoMatch);
        }
        match (repr.matched_candidate_id, repr.matched_user_id, repr.score) {
            (Some(matched_candidate_id), Some(matched_user_id), Some(score)) => Ok(MatchResult::Matched {
                matched_candidate_id,
                matched_user_id,
                score,
            }),
            _ => Err("matched result is missing candidate id, user id or score".to_string()),
        }
    }
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn matched_user_id(&self) -> Option<&str> {
        match self {
            MatchResult::Matched { matched_user_id, .. } => Some(matched_user_id),
            MatchResult::NoMatch => None,
        }
    }

    pub fn matched_candidate_id(&self) -> Option<CandidateId> {
        match self {
            MatchResult::Matched { matched_candidate_id, .. } => Some(*matched_candidate_id),
            MatchResult::NoMatch => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            MatchResult::Matched { score, .. } => Some(*score),
            MatchResult::NoMatch => None,
        }
    }
}

/// Result of trying to resolve a pair of candidates in one atomic step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Both rows flipped to matched and linked
    Claimed,
    /// The target was taken by someone else; the submitter's row is untouched
    TargetTaken,
    /// The submitter's own row is no longer pending, usually because a
    /// concurrent arrival already paired with it
    OwnTaken,
}

/// How many sides of a pair get flipped when a match is found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Mark the winner and the submitter matched together
    #[default]
    BothSides,
    /// Mark only the winner; the submitter stays pending
    TargetOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_result_serializes_with_flag() {
        let id = CandidateId::new();
        let matched = MatchResult::Matched {
            matched_candidate_id: id,
            matched_user_id: "bob".to_string(),
            score: 0.93,
        };
        let json = serde_json::to_value(&matched).unwrap();
        assert_eq!(json["matched"], true);
        assert_eq!(json["matched_user_id"], "bob");

        let back: MatchResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, matched);

        let none = serde_json::to_value(MatchResult::NoMatch).unwrap();
        assert_eq!(none, serde_json::json!({ "matched": false }));
    }

    #[test]
    fn test_match_result_rejects_incomplete_match() {
        let json = serde_json::json!({ "matched": true, "matched_user_id": "bob" });
        assert!(serde_json::from_value::<MatchResult>(json).is_err());
    }

    #[test]
    fn test_new_candidate_starts_pending() {
        let candidate = NewCandidate::new("alice", Embedding::new(vec![1.0, 0.0]), Utc::now())
            .with_idempotency_key(Some("k1".to_string()))
            .into_candidate();

        assert_eq!(candidate.status, CandidateStatus::Pending);
        assert_eq!(candidate.matched_with, None);
        assert_eq!(candidate.idempotency_key.as_deref(), Some("k1"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(CandidateStatus::Pending.to_string(), "pending");
        assert_eq!(CandidateStatus::Matched.as_str(), "matched");
        assert_eq!(CandidateStatus::Expired.as_str(), "expired");
    }
}

// Core algorithm exports
pub mod compare;
pub mod filters;
pub mod matcher;
pub mod similarity;

pub use compare::{CompareService, Comparison};
pub use filters::{is_stale, matches_pool_query, window_cutoff};
pub use matcher::{
    rank_candidates, MatchBackend, MatchingConfig, MatchingEngine, ScoredCandidate, Submission,
    DEFAULT_MATCH_THRESHOLD, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_WINDOW_SECS,
};
pub use similarity::{cosine_similarity, validate_embedding, CosineScorer, SimilarityError, SimilarityScorer};

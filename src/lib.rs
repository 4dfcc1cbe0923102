//! Vibe Match - real-time selfie matching engine
//!
//! Incoming selfies are embedded, scored against a short-lived pool of
//! pending candidates by cosine similarity, and paired with the best match
//! above a threshold. Pairing is atomic in the candidate store so concurrent
//! submissions never share a partner.

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use app::{StartupError, VibeService};
pub use config::Settings;
pub use core::{cosine_similarity, CompareService, MatchingConfig, MatchingEngine, Submission};
pub use error::MatchError;
pub use models::{Candidate, CandidateId, CandidateStatus, Embedding, MatchResult, Resolution};
pub use services::{CandidateStore, Embedder, InMemoryCandidateStore};

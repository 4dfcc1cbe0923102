// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Candidate, CandidateId, CandidateStatus, ClaimOutcome, Embedding, MatchResult, NewCandidate, Resolution};
pub use requests::{CompareRequest, SubmitSelfieRequest};
pub use responses::{CompareResponse, ErrorResponse, SubmitSelfieResponse};

// Service exports
pub mod cache;
pub mod cleanup;
pub mod embedder;
pub mod memory;
pub mod postgres;
pub mod remote;
pub mod store;

pub use cache::{CacheError, CacheKey, ResultCache};
pub use cleanup::{spawn_cleanup, sweep, CleanupPolicy, SweepReport};
pub use embedder::{BoundedEmbedder, EmbedError, Embedder, ThumbnailEmbedder};
pub use memory::InMemoryCandidateStore;
pub use postgres::PostgresCandidateStore;
pub use remote::RemoteEmbedder;
pub use store::{CandidateStore, StoreError};

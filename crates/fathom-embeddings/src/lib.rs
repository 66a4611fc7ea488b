//! # fathom-embeddings
//!
//! Implementations of the `EmbeddingProvider` capability interface plus
//! the wrappers the store composes around one: a bounded-retry policy
//! and a content-hash cache. Provider selection happens in exactly one
//! place (`providers::create_provider`).

pub mod cache;
pub mod providers;
pub mod retry;

pub use cache::CachedProvider;
pub use providers::{create_provider, HashEmbeddingProvider, HttpEmbeddingProvider};
pub use retry::RetryingProvider;

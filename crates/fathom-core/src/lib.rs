//! # fathom-core
//!
//! Foundation crate for the Fathom hybrid retrieval engine.
//! Defines the shared types, provider traits, errors, and config.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod errors;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use config::FathomConfig;
pub use errors::{FathomError, FathomResult};
pub use traits::{EmbeddingProvider, RerankProvider};
pub use types::{Document, DocumentRecord, RelevanceExample, SearchResult};

//! # fathom-vector
//!
//! Graph-based approximate-nearest-neighbor search (HNSW topology) over
//! dense embeddings, with a doc-id mapping and soft deletes. Chosen over
//! brute force to keep query latency sub-linear at scale; graph degree
//! and beam widths are configuration, not constants.

pub mod hnsw;
pub mod metric;

pub use hnsw::HnswIndex;

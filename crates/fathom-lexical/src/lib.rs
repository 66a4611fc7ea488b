//! # fathom-lexical
//!
//! Inverted-index BM25 keyword search. The index rebuilds its statistics
//! from the tokenized corpus on every mutation — simple, correct, and
//! score-identical after a persistence round-trip.

pub mod index;
pub mod tokenizer;

pub use index::Bm25Index;
pub use tokenizer::tokenize;

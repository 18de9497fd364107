//! Dossier Index crate - hybrid lexical + vector retrieval.
//!
//! Maintains the in-memory hybrid index over chunks and answers search
//! requests with BM25, cosine similarity, or a reciprocal-rank fusion of
//! both, hydrating results from the document store.

pub mod embedding;
pub mod index;
pub mod search;

pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding};
pub use index::{HybridIndex, RankedHit};
pub use search::{SearchEngine, SearchRequest, SearchResult};

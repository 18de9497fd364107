//! Query engine: lexical, vector, and hybrid retrieval over the index.
//!
//! Hybrid mode fuses both ranking legs with reciprocal rank fusion. Ranks
//! are 1-based; a chunk absent from one leg simply contributes nothing for
//! that leg. Results are hydrated from the document store, so a hit whose
//! chunk vanished mid-query is dropped rather than surfaced half-empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use dossier_core::config::SearchConfig;
use dossier_core::error::{DossierError, Result};
use dossier_core::types::{Chunk, SearchMode, EMBEDDING_DIM};
use dossier_storage::ChunkRepository;

use crate::embedding::DynEmbeddingService;
use crate::index::{HybridIndex, RankedHit};

/// A search request after gate checks.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub text: String,
    /// Restricts candidates to one applicant before any ranking happens.
    pub applicant: Option<String>,
    pub top_k: usize,
    pub mode: SearchMode,
}

/// A scored chunk returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Query engine over the hybrid index.
pub struct SearchEngine {
    index: HybridIndex,
    chunks: Arc<ChunkRepository>,
    embedder: Box<dyn DynEmbeddingService>,
    config: SearchConfig,
    embed_timeout: Duration,
}

impl SearchEngine {
    pub fn new(
        index: HybridIndex,
        chunks: Arc<ChunkRepository>,
        embedder: Box<dyn DynEmbeddingService>,
        config: SearchConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            index,
            chunks,
            embedder,
            config,
            embed_timeout,
        }
    }

    /// Run a search and return at most `top_k` hydrated results.
    ///
    /// Vector and hybrid modes need a query embedding; when that call fails,
    /// times out, or yields a vector of the wrong length the search fails
    /// with `EmbeddingUnavailable`, and the caller may retry in lexical mode.
    /// An empty result set is success.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        if request.text.trim().is_empty() {
            return Err(DossierError::Validation("query text is empty".to_string()));
        }
        if request.top_k == 0 {
            return Err(DossierError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }

        let applicant = request.applicant.as_deref();
        // Over-fetch each leg so fusion and hydration drops still leave
        // enough candidates to fill top_k.
        let fetch = request.top_k * self.config.candidate_multiplier.max(1);

        let ranked = match request.mode {
            SearchMode::Lexical => self.index.lexical_search(&request.text, applicant, fetch)?,
            SearchMode::Vector => {
                let query_vec = self.embed_query(&request.text).await?;
                self.index.vector_search(&query_vec, applicant, fetch)?
            }
            SearchMode::Hybrid => {
                let lexical = self.index.lexical_search(&request.text, applicant, fetch)?;
                let query_vec = self.embed_query(&request.text).await?;
                let vector = self.index.vector_search(&query_vec, applicant, fetch)?;
                fuse_rankings(&lexical, &vector, self.config.rrf_k)
            }
        };

        debug!(
            mode = %request.mode,
            candidates = ranked.len(),
            top_k = request.top_k,
            "Ranked search candidates"
        );

        let mut results = Vec::with_capacity(request.top_k);
        for hit in ranked {
            if results.len() == request.top_k {
                break;
            }
            match self.chunks.find_by_id(hit.chunk_id)? {
                Some(chunk) => results.push(SearchResult {
                    chunk,
                    score: hit.score,
                }),
                None => {
                    debug!(chunk_id = hit.chunk_id, "Dropping hit with no stored chunk");
                }
            }
        }
        Ok(results)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match timeout(self.embed_timeout, self.embedder.embed_boxed(text)).await {
            Ok(Ok(vector)) if vector.len() == EMBEDDING_DIM => Ok(vector),
            Ok(Ok(vector)) => {
                warn!(
                    dimensions = vector.len(),
                    "Embedder returned a wrong-sized query vector"
                );
                Err(DossierError::EmbeddingUnavailable(format!(
                    "query embedding has {} dimensions, expected {}",
                    vector.len(),
                    EMBEDDING_DIM
                )))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Query embedding failed");
                Err(DossierError::EmbeddingUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.embed_timeout.as_millis() as u64,
                    "Query embedding timed out"
                );
                Err(DossierError::EmbeddingUnavailable(
                    "query embedding timed out".to_string(),
                ))
            }
        }
    }
}

/// Reciprocal rank fusion of the two ranking legs.
///
/// score = 1/(k + rank_lexical) + 1/(k + rank_vector) with 1-based ranks;
/// a chunk missing from a leg gets no contribution from it. Ties break by
/// ascending chunk id.
fn fuse_rankings(lexical: &[RankedHit], vector: &[RankedHit], k: u32) -> Vec<RankedHit> {
    let mut fused: HashMap<i64, f32> = HashMap::new();
    for (rank, hit) in lexical.iter().enumerate() {
        *fused.entry(hit.chunk_id).or_default() += 1.0 / (k as f32 + (rank + 1) as f32);
    }
    for (rank, hit) in vector.iter().enumerate() {
        *fused.entry(hit.chunk_id).or_default() += 1.0 / (k as f32 + (rank + 1) as f32);
    }

    let mut hits: Vec<RankedHit> = fused
        .into_iter()
        .map(|(chunk_id, score)| RankedHit { chunk_id, score })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits
}

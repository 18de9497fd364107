//! Hybrid in-memory retrieval index.
//!
//! Keeps a lexical posting table and a vector table side by side so a single
//! upsert or remove keeps both in step. Lexical ranking is BM25 over
//! whole-corpus statistics; vector ranking is brute-force cosine similarity,
//! which is O(n) per query and fine for moderate corpus sizes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use dossier_core::error::DossierError;
use dossier_core::types::{Chunk, EMBEDDING_DIM};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// A scored hit from one ranking leg of the index.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub chunk_id: i64,
    pub score: f32,
}

/// Per-chunk state held by the index.
#[derive(Debug, Clone)]
struct IndexedChunk {
    file_id: i64,
    applicant: String,
    term_freqs: HashMap<String, u32>,
    token_total: u32,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default)]
struct IndexInner {
    chunks: HashMap<i64, IndexedChunk>,
    /// Number of chunks each term occurs in, maintained across upserts.
    doc_freqs: HashMap<String, usize>,
    /// Chunk membership per file, for whole-file removal.
    files: HashMap<i64, HashSet<i64>>,
    /// Sum of lexical token counts across all chunks.
    token_sum: u64,
}

impl IndexInner {
    /// Remove one chunk and roll its contribution out of the corpus
    /// statistics. No-op when the chunk is not indexed.
    fn evict(&mut self, chunk_id: i64) {
        let Some(existing) = self.chunks.remove(&chunk_id) else {
            return;
        };

        for term in existing.term_freqs.keys() {
            if let Some(df) = self.doc_freqs.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freqs.remove(term);
                }
            }
        }
        self.token_sum = self.token_sum.saturating_sub(existing.token_total as u64);

        if let Some(members) = self.files.get_mut(&existing.file_id) {
            members.remove(&chunk_id);
            if members.is_empty() {
                self.files.remove(&existing.file_id);
            }
        }
    }
}

/// Hybrid lexical + vector index over chunks.
///
/// Thread-safe via an interior RwLock; mutations take the write lock for
/// their whole batch, so readers observe every upsert and removal either
/// fully applied or not at all.
#[derive(Debug, Clone)]
pub struct HybridIndex {
    inner: Arc<RwLock<IndexInner>>,
}

impl HybridIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexInner::default())),
        }
    }

    /// Insert or replace a chunk's index entry.
    ///
    /// The chunk is always indexed lexically; the vector side is populated
    /// only when an embedding is present. Upserting the same chunk again
    /// replaces the previous entry, so re-indexing after embedding
    /// attachment is idempotent.
    pub fn upsert(&self, chunk: &Chunk, applicant: &str) -> Result<(), DossierError> {
        if let Some(embedding) = &chunk.embedding {
            if embedding.len() != EMBEDDING_DIM {
                return Err(DossierError::Validation(format!(
                    "embedding has {} dimensions, expected {}",
                    embedding.len(),
                    EMBEDDING_DIM
                )));
            }
        }

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokenize(&chunk.content) {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        let token_total: u32 = term_freqs.values().sum();

        let mut inner = self
            .inner
            .write()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;

        inner.evict(chunk.chunk_id);

        for term in term_freqs.keys() {
            *inner.doc_freqs.entry(term.clone()).or_insert(0) += 1;
        }
        inner.token_sum += token_total as u64;
        inner
            .files
            .entry(chunk.file_id)
            .or_default()
            .insert(chunk.chunk_id);
        inner.chunks.insert(
            chunk.chunk_id,
            IndexedChunk {
                file_id: chunk.file_id,
                applicant: applicant.to_string(),
                term_freqs,
                token_total,
                embedding: chunk.embedding.clone(),
            },
        );

        Ok(())
    }

    /// Remove one chunk from both ranking legs.
    ///
    /// Returns Ok(()) regardless of whether the chunk was indexed.
    pub fn remove(&self, chunk_id: i64) -> Result<(), DossierError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;
        inner.evict(chunk_id);
        Ok(())
    }

    /// Remove every chunk of a file in one write-locked batch, so a
    /// concurrent reader sees the file fully indexed or fully gone.
    ///
    /// Returns the number of chunks removed.
    pub fn remove_file(&self, file_id: i64) -> Result<usize, DossierError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;

        let members: Vec<i64> = inner
            .files
            .get(&file_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for chunk_id in &members {
            inner.evict(*chunk_id);
        }
        Ok(members.len())
    }

    /// Rank chunks lexically with BM25.
    ///
    /// A chunk is ranked when it contains at least one query token, even if
    /// its BM25 score rounds to zero (common terms in small corpora), so the
    /// lexical leg always reports a rank for a genuine keyword match. The
    /// applicant filter restricts candidates before ranking.
    pub fn lexical_search(
        &self,
        query: &str,
        applicant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RankedHit>, DossierError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || inner.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let total_docs = inner.chunks.len() as f32;
        let avg_len = inner.token_sum as f32 / total_docs;

        let mut hits = Vec::new();
        for (chunk_id, chunk) in &inner.chunks {
            if let Some(filter) = applicant {
                if chunk.applicant != filter {
                    continue;
                }
            }

            let mut score = 0.0f32;
            let mut matched = false;
            for token in &query_tokens {
                if let Some(freq) = chunk.term_freqs.get(token) {
                    matched = true;
                    let df = inner.doc_freqs.get(token).copied().unwrap_or(1) as f32;
                    let idf = ((total_docs - df + 0.5) / (df + 0.5)).ln().max(0.0);
                    let freq = *freq as f32;
                    let numerator = freq * (BM25_K1 + 1.0);
                    let denominator = freq
                        + BM25_K1
                            * (1.0 - BM25_B
                                + BM25_B * (chunk.token_total as f32 / avg_len.max(1e-3)));
                    score += idf * (numerator / denominator.max(1e-6));
                }
            }

            if matched {
                hits.push(RankedHit {
                    chunk_id: *chunk_id,
                    score,
                });
            }
        }

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Rank chunks by cosine similarity against a query vector.
    ///
    /// Only chunks with an attached embedding participate. The applicant
    /// filter restricts candidates before ranking.
    pub fn vector_search(
        &self,
        query: &[f32],
        applicant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RankedHit>, DossierError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;

        let mut hits = Vec::new();
        for (chunk_id, chunk) in &inner.chunks {
            if let Some(filter) = applicant {
                if chunk.applicant != filter {
                    continue;
                }
            }
            let Some(embedding) = &chunk.embedding else {
                continue;
            };
            hits.push(RankedHit {
                chunk_id: *chunk_id,
                score: cosine_similarity(query, embedding) as f32,
            });
        }

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Number of chunks currently indexed.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.chunks.len()).unwrap_or(0)
    }

    /// True when the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the chunk has an index entry.
    pub fn contains(&self, chunk_id: i64) -> bool {
        self.inner
            .read()
            .map(|inner| inner.chunks.contains_key(&chunk_id))
            .unwrap_or(false)
    }

    /// Drop every entry, for rebuilds from the document store.
    pub fn clear(&self) -> Result<(), DossierError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;
        *inner = IndexInner::default();
        Ok(())
    }
}

impl Default for HybridIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Descending score, ties broken by ascending chunk id for determinism.
fn sort_hits(hits: &mut [RankedHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Split on non-alphanumeric boundaries and lowercase.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

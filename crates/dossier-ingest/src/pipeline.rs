//! Ingestion pipeline driving files from registration to a queryable state.
//!
//! Registration stores the file and its ordered chunks. Attachment embeds
//! each waiting chunk, records the outcome, and only then admits the chunk
//! to the retrieval index. Work on the same file is serialized through
//! [`FileLocks`]; different files proceed in parallel.

use std::sync::Arc;
use std::time::Duration;

use dossier_core::config::ChunkingConfig;
use dossier_core::ctx::Ctx;
use dossier_core::error::{DossierError, Result};
use dossier_core::types::{EmbeddingState, FileRecord, EMBEDDING_DIM};
use dossier_index::{DynEmbeddingService, HybridIndex};
use dossier_storage::{ChunkRepository, FileRepository, NewChunk};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::chunker;
use crate::locks::FileLocks;

/// Outcome of one embedding attachment pass over a single file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub embedded: usize,
    pub failed: usize,
}

/// Outcome of one scan over all unprocessed files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub files: usize,
    pub embedded: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Coordinates the document store, chunker, embedder, and retrieval index.
pub struct IngestPipeline {
    files: Arc<FileRepository>,
    chunks: Arc<ChunkRepository>,
    index: HybridIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    locks: FileLocks,
    chunking: ChunkingConfig,
    embed_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        files: Arc<FileRepository>,
        chunks: Arc<ChunkRepository>,
        index: HybridIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        chunking: ChunkingConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            files,
            chunks,
            index,
            embedder,
            locks: FileLocks::new(),
            chunking,
            embed_timeout,
        }
    }

    /// The retrieval index this pipeline maintains.
    pub fn index(&self) -> &HybridIndex {
        &self.index
    }

    /// Register a document and store its ordered chunks, all still pending.
    ///
    /// Returns the file record and the number of chunks created. Content that
    /// chunks to nothing (whitespace only) produces a file with zero chunks,
    /// marked processed immediately. Chunks enter the retrieval index later,
    /// once their embedding attempt has run.
    pub async fn register(
        &self,
        ctx: &Ctx,
        filename: &str,
        applicant: &str,
        content: &str,
    ) -> Result<(FileRecord, usize)> {
        if filename.is_empty() {
            return Err(DossierError::Validation("filename is empty".to_string()));
        }
        if applicant.is_empty() {
            return Err(DossierError::Validation("applicant is empty".to_string()));
        }
        if content.is_empty() {
            return Err(DossierError::Validation("content is empty".to_string()));
        }

        let segments = chunker::chunk(content, self.chunking.max_tokens_per_chunk)?;

        let file = self.files.create(filename, applicant)?;
        let lock = self.locks.for_file(file.file_id)?;
        let _guard = lock.lock().await;

        if segments.is_empty() {
            self.files.mark_processed(file.file_id)?;
            info!(
                user_id = ctx.user_id(),
                file_id = file.file_id,
                "Registered file with no chunkable content"
            );
            let file = FileRecord {
                processed: true,
                ..file
            };
            return Ok((file, 0));
        }

        let drafts: Vec<NewChunk> = segments
            .into_iter()
            .map(|segment| NewChunk {
                content: segment.content,
                token_count: segment.token_count,
            })
            .collect();
        let created = self.chunks.insert_many(file.file_id, &drafts)?;

        info!(
            user_id = ctx.user_id(),
            file_id = file.file_id,
            applicant = %file.applicant,
            chunks = created.len(),
            "Registered file"
        );
        Ok((file, created.len()))
    }

    /// Run the embedding attempt for every waiting chunk of a file.
    ///
    /// Chunks embed concurrently, each under the configured timeout. Every
    /// outcome is recorded per chunk: success stores the vector, failure or
    /// timeout marks the chunk failed. Either way the chunk then enters the
    /// index, so failed chunks stay reachable lexically. With `retry_failed`
    /// the pass also re-attempts chunks whose last attempt failed. The file
    /// is marked processed once all of its chunks are terminal.
    pub async fn attach_embeddings(
        &self,
        ctx: &Ctx,
        file_id: i64,
        retry_failed: bool,
    ) -> Result<AttachmentSummary> {
        let lock = self.locks.for_file(file_id)?;
        let _guard = lock.lock().await;

        let file = self
            .files
            .find_by_id(file_id)?
            .ok_or_else(|| DossierError::NotFound(format!("file {}", file_id)))?;

        let waiting = self.chunks.list_unembedded(file_id, retry_failed)?;
        if waiting.is_empty() {
            // A file with no chunk rows at all is either empty (marked
            // processed at registration) or still mid-registration; only a
            // file whose chunks are all terminal gets stamped here.
            if !self.chunks.list_by_file(file_id)?.is_empty() {
                self.files.mark_processed(file_id)?;
            }
            debug!(file_id, "No chunks waiting for attachment");
            return Ok(AttachmentSummary::default());
        }

        let mut tasks = JoinSet::new();
        for chunk in waiting {
            let embedder = Arc::clone(&self.embedder);
            let deadline = self.embed_timeout;
            tasks.spawn(async move {
                let outcome = match timeout(deadline, embedder.embed_boxed(&chunk.content)).await {
                    Ok(Ok(vector)) => Ok(vector),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(DossierError::EmbeddingUnavailable(format!(
                        "embedding timed out after {:?}",
                        deadline
                    ))),
                };
                (chunk.chunk_id, outcome)
            });
        }

        let mut summary = AttachmentSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (chunk_id, outcome) = joined
                .map_err(|e| DossierError::Storage(format!("Embedding task panicked: {}", e)))?;

            match outcome {
                Ok(vector) if vector.len() == EMBEDDING_DIM => {
                    self.chunks.set_embedded(chunk_id, &vector)?;
                    summary.embedded += 1;
                }
                Ok(vector) => {
                    warn!(
                        chunk_id,
                        dimensions = vector.len(),
                        "Embedder returned a wrong-sized vector; marking chunk failed"
                    );
                    self.chunks.set_failed(chunk_id)?;
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(chunk_id, error = %e, "Embedding attachment failed");
                    self.chunks.set_failed(chunk_id)?;
                    summary.failed += 1;
                }
            }

            let indexed = self
                .chunks
                .find_by_id(chunk_id)?
                .ok_or_else(|| DossierError::NotFound(format!("chunk {}", chunk_id)))?;
            self.index.upsert(&indexed, &file.applicant)?;
        }

        self.files.mark_processed(file_id)?;
        info!(
            user_id = ctx.user_id(),
            file_id,
            embedded = summary.embedded,
            failed = summary.failed,
            "Attachment pass complete"
        );
        Ok(summary)
    }

    /// Scan for unprocessed files and run an attachment pass on each.
    ///
    /// Files are processed in parallel tasks. A file that fails its pass is
    /// logged and counted, not fatal to the scan; a file deleted between the
    /// listing and its pass is skipped.
    pub async fn process_pending(
        self: &Arc<Self>,
        ctx: &Ctx,
        retry_failed: bool,
    ) -> Result<ProcessSummary> {
        let pending = self.files.list_unprocessed()?;
        let scanned = pending.len();

        let mut tasks = JoinSet::new();
        for file in pending {
            let pipeline = Arc::clone(self);
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let outcome = pipeline
                    .attach_embeddings(&ctx, file.file_id, retry_failed)
                    .await;
                (file.file_id, outcome)
            });
        }

        let mut summary = ProcessSummary::default();
        while let Some(joined) = tasks.join_next().await {
            let (file_id, outcome) = joined
                .map_err(|e| DossierError::Storage(format!("Attachment task panicked: {}", e)))?;

            match outcome {
                Ok(attached) => {
                    summary.files += 1;
                    summary.embedded += attached.embedded;
                    summary.failed += attached.failed;
                }
                Err(DossierError::NotFound(_)) => {
                    debug!(file_id, "File deleted mid-scan, skipping");
                }
                Err(e) => {
                    warn!(file_id, error = %e, "Attachment pass failed");
                    summary.errors += 1;
                }
            }
        }

        if scanned > 0 {
            info!(
                files = summary.files,
                embedded = summary.embedded,
                failed = summary.failed,
                errors = summary.errors,
                "Processed pending files"
            );
        }
        Ok(summary)
    }

    /// Delete a file, its chunks, and every index entry for them.
    ///
    /// The store delete runs first so an unknown file fails before the index
    /// is touched. Holding the file lock means no attachment pass can re-add
    /// index entries after the removal completes.
    pub async fn delete_file(&self, ctx: &Ctx, file_id: i64) -> Result<()> {
        let lock = self.locks.for_file(file_id)?;
        let _guard = lock.lock().await;

        self.files.delete_with_chunks(file_id)?;
        let removed = self.index.remove_file(file_id)?;
        self.locks.discard(file_id)?;

        info!(
            user_id = ctx.user_id(),
            file_id,
            index_entries = removed,
            "Deleted file"
        );
        Ok(())
    }

    /// Rebuild the in-memory index from the document store.
    ///
    /// Called at startup. Only chunks whose embedding attempt has run are
    /// admitted; pending chunks enter the index through their attachment
    /// pass.
    pub fn rebuild_index(&self) -> Result<usize> {
        self.index.clear()?;

        let mut indexed = 0;
        for (chunk, applicant) in self.chunks.list_all_with_applicant()? {
            if chunk.state == EmbeddingState::Pending {
                continue;
            }
            self.index.upsert(&chunk, &applicant)?;
            indexed += 1;
        }

        info!(chunks = indexed, "Rebuilt index from document store");
        Ok(indexed)
    }
}

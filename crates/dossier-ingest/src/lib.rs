//! Dossier Ingest crate - chunking and embedding attachment pipeline.

pub mod chunker;
pub mod locks;
pub mod pipeline;

pub use chunker::{chunk, estimate_tokens, Segment};
pub use locks::FileLocks;
pub use pipeline::{AttachmentSummary, IngestPipeline, ProcessSummary};

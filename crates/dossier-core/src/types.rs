use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dimension of every stored embedding vector. Vectors of any other length
/// are rejected at attachment time, never truncated or padded.
pub const EMBEDDING_DIM: usize = 768;

// =============================================================================
// Enums
// =============================================================================

/// Access role of a user. Closed set; `level()` defines the ordering used by
/// the access gate (inactive < viewer < admin).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May mutate files and query.
    Admin,
    /// May query only (default for new users).
    #[default]
    Viewer,
    /// Provisioned but locked out of every operation.
    Inactive,
}

impl Role {
    /// Numeric privilege level. Higher grants more.
    pub fn level(&self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::Viewer => 1,
            Role::Inactive => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
            Role::Inactive => "inactive",
        }
    }

    /// Parse a stored role string. Returns `None` for anything outside the
    /// closed set so callers surface the corruption instead of defaulting.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "viewer" => Some(Role::Viewer),
            "inactive" => Some(Role::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding lifecycle state of a chunk.
///
/// `Pending` is the only non-terminal state; a chunk never transitions out of
/// `Embedded` or `Failed` on its own. Re-attempting a `Failed` chunk is an
/// explicit caller decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingState {
    /// Created, attachment not yet attempted.
    #[default]
    Pending,
    /// Vector recorded.
    Embedded,
    /// Attachment attempted and failed (model error, timeout, bad dimension).
    Failed,
}

impl EmbeddingState {
    /// A file is processed once all of its chunks are terminal.
    pub fn is_terminal(&self) -> bool {
        match self {
            EmbeddingState::Pending => false,
            EmbeddingState::Embedded | EmbeddingState::Failed => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingState::Pending => "pending",
            EmbeddingState::Embedded => "embedded",
            EmbeddingState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<EmbeddingState> {
        match s {
            "pending" => Some(EmbeddingState::Pending),
            "embedded" => Some(EmbeddingState::Embedded),
            "failed" => Some(EmbeddingState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmbeddingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranking strategy for a search request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Keyword relevance only.
    Lexical,
    /// Cosine similarity over embedded chunks only.
    Vector,
    /// Both rankings fused by reciprocal rank (default).
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<SearchMode> {
        match s {
            "lexical" => Some(SearchMode::Lexical),
            "vector" => Some(SearchMode::Vector),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entity Structs (defined in dossier-core for shared use)
// =============================================================================

/// A provisioned user. `role` is the only field mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    /// Opaque credential looked up verbatim by the access gate.
    pub api_key: Option<String>,
    /// Per-user salt consumed by credential derivation.
    pub salt: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One uploaded document owned by the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: i64,
    pub filename: String,
    /// Grouping key; all of an applicant's documents are queried together.
    pub applicant: String,
    pub created_at: DateTime<Utc>,
    /// True once every chunk has been produced and attachment attempted.
    pub processed: bool,
}

/// An ordered slice of a file's text, the unit of indexing and retrieval.
///
/// For a given file the `chunk_index` values form the contiguous range
/// `0..N` in content order. `embedding` is `Some` exactly when `state` is
/// `Embedded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: i64,
    pub file_id: i64,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub state: EmbeddingState,
    pub token_count: u32,
}

// =============================================================================
// Tests
// =============================================================================

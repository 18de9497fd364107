//! Repository implementations for SQLite-backed persistence.
//!
//! Provides UserRepository, FileRepository, and ChunkRepository that operate
//! on the Database struct using raw SQL.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::error;
use uuid::Uuid;

use dossier_core::error::DossierError;
use dossier_core::types::{Chunk, EmbeddingState, FileRecord, Role, User};

use crate::db::Database;

/// Content and token estimate for a chunk about to be created.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub token_count: u32,
}

/// Repository for the identity directory.
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Provision a new user with the default role.
    ///
    /// The salt and api_key are generated by the caller (the auth crate owns
    /// credential derivation); this only persists them.
    pub fn create(&self, email: &str, salt: Uuid, api_key: &str) -> Result<User, DossierError> {
        if email.trim().is_empty() {
            return Err(DossierError::Validation("email is empty".to_string()));
        }

        self.db.with_conn(|conn| {
            let now = Utc::now().timestamp();
            conn.execute(
                "INSERT INTO users (email, role, api_key, salt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    email,
                    Role::default().as_str(),
                    api_key,
                    salt.to_string(),
                    now,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    DossierError::Validation(format!("email {} is already registered", email))
                } else {
                    DossierError::Storage(format!("Failed to create user: {}", e))
                }
            })?;

            Ok(User {
                user_id: conn.last_insert_rowid(),
                email: email.to_string(),
                role: Role::default(),
                api_key: Some(api_key.to_string()),
                salt,
                created_at: Utc.timestamp_opt(now, 0).single().unwrap_or_default(),
            })
        })
    }

    /// Find a user by ID.
    pub fn find_by_id(&self, user_id: i64) -> Result<Option<User>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, email, role, api_key, salt, created_at
                     FROM users WHERE user_id = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![user_id], |row| Ok(row_to_user(row)))
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            match result {
                Some(user) => Ok(Some(user?)),
                None => Ok(None),
            }
        })
    }

    /// Find a user by email.
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, email, role, api_key, salt, created_at
                     FROM users WHERE email = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![email], |row| Ok(row_to_user(row)))
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            match result {
                Some(user) => Ok(Some(user?)),
                None => Ok(None),
            }
        })
    }

    /// Find a user by API key. This is the access gate's lookup path.
    pub fn find_by_api_key(&self, api_key: &str) -> Result<Option<User>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, email, role, api_key, salt, created_at
                     FROM users WHERE api_key = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![api_key], |row| Ok(row_to_user(row)))
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            match result {
                Some(user) => Ok(Some(user?)),
                None => Ok(None),
            }
        })
    }

    /// Change a user's role. Role is the only mutable user field.
    pub fn set_role(&self, user_id: i64, role: Role) -> Result<(), DossierError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET role = ?2 WHERE user_id = ?1",
                    rusqlite::params![user_id, role.as_str()],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to update role: {}", e)))?;

            if changed == 0 {
                return Err(DossierError::NotFound(format!("user {}", user_id)));
            }
            Ok(())
        })
    }

    /// List every provisioned user.
    pub fn list_all(&self) -> Result<Vec<User>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, email, role, api_key, salt, created_at
                     FROM users ORDER BY user_id ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_user(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut users = Vec::new();
            for row in rows {
                let user = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                users.push(user);
            }
            Ok(users)
        })
    }
}

/// Repository for file records. Owns the File lifecycle.
pub struct FileRepository {
    db: Arc<Database>,
}

impl FileRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a new file with `processed = false`.
    pub fn create(&self, filename: &str, applicant: &str) -> Result<FileRecord, DossierError> {
        self.db.with_conn(|conn| {
            let now = Utc::now().timestamp();
            conn.execute(
                "INSERT INTO files (filename, applicant, processed, created_at)
                 VALUES (?1, ?2, 0, ?3)",
                rusqlite::params![filename, applicant, now],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to create file: {}", e)))?;

            Ok(FileRecord {
                file_id: conn.last_insert_rowid(),
                filename: filename.to_string(),
                applicant: applicant.to_string(),
                created_at: Utc.timestamp_opt(now, 0).single().unwrap_or_default(),
                processed: false,
            })
        })
    }

    /// Find a file by ID.
    pub fn find_by_id(&self, file_id: i64) -> Result<Option<FileRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT file_id, filename, applicant, processed, created_at
                     FROM files WHERE file_id = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![file_id], |row| Ok(row_to_file(row)))
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            match result {
                Some(file) => Ok(Some(file?)),
                None => Ok(None),
            }
        })
    }

    /// List all files belonging to one applicant.
    pub fn list_by_applicant(&self, applicant: &str) -> Result<Vec<FileRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT file_id, filename, applicant, processed, created_at
                     FROM files WHERE applicant = ?1 ORDER BY file_id ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![applicant], |row| Ok(row_to_file(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut files = Vec::new();
            for row in rows {
                let file = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                files.push(file);
            }
            Ok(files)
        })
    }

    /// List every file.
    pub fn list_all(&self) -> Result<Vec<FileRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT file_id, filename, applicant, processed, created_at
                     FROM files ORDER BY file_id ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_file(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut files = Vec::new();
            for row in rows {
                let file = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                files.push(file);
            }
            Ok(files)
        })
    }

    /// List files whose embedding attachment has not completed yet.
    pub fn list_unprocessed(&self) -> Result<Vec<FileRecord>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT file_id, filename, applicant, processed, created_at
                     FROM files WHERE processed = 0 ORDER BY file_id ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_file(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut files = Vec::new();
            for row in rows {
                let file = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                files.push(file);
            }
            Ok(files)
        })
    }

    /// Mark a file processed. Idempotent; marking twice is a no-op.
    pub fn mark_processed(&self, file_id: i64) -> Result<(), DossierError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE files SET processed = 1 WHERE file_id = ?1",
                    rusqlite::params![file_id],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to mark processed: {}", e)))?;

            if changed == 0 {
                return Err(DossierError::NotFound(format!("file {}", file_id)));
            }
            Ok(())
        })
    }

    /// Delete a file and all of its chunks in one transaction.
    ///
    /// The chunk deletes are explicit rather than left to the FK cascade so
    /// the whole removal is a single visible boundary.
    pub fn delete_with_chunks(&self, file_id: i64) -> Result<(), DossierError> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DossierError::Storage(format!("Failed to begin delete: {}", e)))?;

            tx.execute(
                "DELETE FROM chunks WHERE file_id = ?1",
                rusqlite::params![file_id],
            )
            .map_err(|e| DossierError::Storage(format!("Failed to delete chunks: {}", e)))?;

            let removed = tx
                .execute(
                    "DELETE FROM files WHERE file_id = ?1",
                    rusqlite::params![file_id],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to delete file: {}", e)))?;

            if removed == 0 {
                // Dropping the transaction rolls it back.
                return Err(DossierError::NotFound(format!("file {}", file_id)));
            }

            tx.commit()
                .map_err(|e| DossierError::Storage(format!("Failed to commit delete: {}", e)))?;
            Ok(())
        })
    }
}

/// Repository for chunk records.
pub struct ChunkRepository {
    db: Arc<Database>,
}

impl ChunkRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a file's chunks in content order, assigning chunk_index 0..N.
    ///
    /// All inserts run in one transaction; a file either gets its full chunk
    /// sequence or none of it.
    pub fn insert_many(
        &self,
        file_id: i64,
        chunks: &[NewChunk],
    ) -> Result<Vec<Chunk>, DossierError> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DossierError::Storage(format!("Failed to begin insert: {}", e)))?;

            let file_exists = tx
                .query_row(
                    "SELECT 1 FROM files WHERE file_id = ?1",
                    rusqlite::params![file_id],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?
                .is_some();
            if !file_exists {
                return Err(DossierError::NotFound(format!("file {}", file_id)));
            }

            let mut created = Vec::with_capacity(chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                tx.execute(
                    "INSERT INTO chunks (file_id, chunk_index, content, state, token_count)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        file_id,
                        index as i64,
                        chunk.content,
                        EmbeddingState::Pending.as_str(),
                        chunk.token_count,
                    ],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        error!(file_id, chunk_index = index, "Duplicate chunk position");
                        DossierError::IndexInconsistency(format!(
                            "duplicate chunk_index {} for file {}",
                            index, file_id
                        ))
                    } else {
                        DossierError::Storage(format!("Failed to insert chunk: {}", e))
                    }
                })?;

                created.push(Chunk {
                    chunk_id: tx.last_insert_rowid(),
                    file_id,
                    chunk_index: index as u32,
                    content: chunk.content.clone(),
                    embedding: None,
                    state: EmbeddingState::Pending,
                    token_count: chunk.token_count,
                });
            }

            tx.commit()
                .map_err(|e| DossierError::Storage(format!("Failed to commit insert: {}", e)))?;
            Ok(created)
        })
    }

    /// Find a chunk by ID.
    pub fn find_by_id(&self, chunk_id: i64) -> Result<Option<Chunk>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT chunk_id, file_id, chunk_index, content, embedding, state, token_count
                     FROM chunks WHERE chunk_id = ?1",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![chunk_id], |row| Ok(row_to_chunk(row)))
                .optional()
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            match result {
                Some(chunk) => Ok(Some(chunk?)),
                None => Ok(None),
            }
        })
    }

    /// Fetch a file's chunks in content order.
    ///
    /// Validates the ordering invariant: positions must be exactly 0..N.
    pub fn list_by_file(&self, file_id: i64) -> Result<Vec<Chunk>, DossierError> {
        let chunks = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT chunk_id, file_id, chunk_index, content, embedding, state, token_count
                     FROM chunks WHERE file_id = ?1 ORDER BY chunk_index ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![file_id], |row| Ok(row_to_chunk(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut chunks = Vec::new();
            for row in rows {
                let chunk = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                chunks.push(chunk);
            }
            Ok(chunks)
        })?;

        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.chunk_index as usize != position {
                error!(
                    file_id,
                    expected = position,
                    found = chunk.chunk_index,
                    "Chunk ordering invariant violated"
                );
                return Err(DossierError::IndexInconsistency(format!(
                    "file {} chunk positions are not contiguous at {}",
                    file_id, position
                )));
            }
        }

        Ok(chunks)
    }

    /// Chunks of a file still waiting on embedding attachment.
    pub fn list_unembedded(
        &self,
        file_id: i64,
        include_failed: bool,
    ) -> Result<Vec<Chunk>, DossierError> {
        let sql = if include_failed {
            "SELECT chunk_id, file_id, chunk_index, content, embedding, state, token_count
             FROM chunks WHERE file_id = ?1 AND state IN ('pending', 'failed')
             ORDER BY chunk_index ASC"
        } else {
            "SELECT chunk_id, file_id, chunk_index, content, embedding, state, token_count
             FROM chunks WHERE file_id = ?1 AND state = 'pending'
             ORDER BY chunk_index ASC"
        };

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![file_id], |row| Ok(row_to_chunk(row)))
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut chunks = Vec::new();
            for row in rows {
                let chunk = row.map_err(|e| DossierError::Storage(e.to_string()))??;
                chunks.push(chunk);
            }
            Ok(chunks)
        })
    }

    /// Record a successful embedding. The absent-to-present transition may
    /// happen at most once; a second attach is an invariant violation.
    pub fn set_embedded(&self, chunk_id: i64, embedding: &[f32]) -> Result<(), DossierError> {
        let encoded = serde_json::to_string(embedding)?;

        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE chunks SET embedding = ?2, state = 'embedded'
                     WHERE chunk_id = ?1 AND embedding IS NULL",
                    rusqlite::params![chunk_id, encoded],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to store embedding: {}", e)))?;

            if changed == 1 {
                return Ok(());
            }

            if chunk_exists(conn, chunk_id)? {
                error!(chunk_id, "Embedding already attached; refusing to overwrite");
                Err(DossierError::IndexInconsistency(format!(
                    "embedding already attached to chunk {}",
                    chunk_id
                )))
            } else {
                Err(DossierError::NotFound(format!("chunk {}", chunk_id)))
            }
        })
    }

    /// Record a failed attachment attempt. Idempotent for already-failed
    /// chunks; an embedded chunk can never regress to failed.
    pub fn set_failed(&self, chunk_id: i64) -> Result<(), DossierError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE chunks SET state = 'failed'
                     WHERE chunk_id = ?1 AND state != 'embedded'",
                    rusqlite::params![chunk_id],
                )
                .map_err(|e| DossierError::Storage(format!("Failed to mark failed: {}", e)))?;

            if changed == 1 {
                return Ok(());
            }

            if chunk_exists(conn, chunk_id)? {
                error!(chunk_id, "Embedded chunk cannot transition to failed");
                Err(DossierError::IndexInconsistency(format!(
                    "chunk {} is already embedded",
                    chunk_id
                )))
            } else {
                Err(DossierError::NotFound(format!("chunk {}", chunk_id)))
            }
        })
    }

    /// Every chunk joined with its owning file's applicant, for index
    /// rebuilds at startup.
    pub fn list_all_with_applicant(&self) -> Result<Vec<(Chunk, String)>, DossierError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.chunk_id, c.file_id, c.chunk_index, c.content, c.embedding,
                            c.state, c.token_count, f.applicant
                     FROM chunks c
                     JOIN files f ON f.file_id = c.file_id
                     ORDER BY c.chunk_id ASC",
                )
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let applicant: String = row.get(7)?;
                    Ok((row_to_chunk(row), applicant))
                })
                .map_err(|e| DossierError::Storage(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                let (chunk, applicant) = row.map_err(|e| DossierError::Storage(e.to_string()))?;
                entries.push((chunk?, applicant));
            }
            Ok(entries)
        })
    }
}

// ============================================================================
// Helper functions for row-to-entity conversion.
// ============================================================================

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, DossierError> {
    let user_id: i64 = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let email: String = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let role_str: String = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let api_key: Option<String> = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    let salt_str: String = row.get(4).map_err(|e| DossierError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(5).map_err(|e| DossierError::Storage(e.to_string()))?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| DossierError::Storage(format!("Unknown role value: {}", role_str)))?;

    Ok(User {
        user_id,
        email,
        role,
        api_key,
        salt: Uuid::parse_str(&salt_str)
            .map_err(|e| DossierError::Storage(format!("Invalid salt: {}", e)))?,
        created_at: Utc.timestamp_opt(created_at, 0).single().unwrap_or_default(),
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> Result<FileRecord, DossierError> {
    let file_id: i64 = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let filename: String = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let applicant: String = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let processed: i64 = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(4).map_err(|e| DossierError::Storage(e.to_string()))?;

    Ok(FileRecord {
        file_id,
        filename,
        applicant,
        created_at: Utc.timestamp_opt(created_at, 0).single().unwrap_or_default(),
        processed: processed != 0,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> Result<Chunk, DossierError> {
    let chunk_id: i64 = row.get(0).map_err(|e| DossierError::Storage(e.to_string()))?;
    let file_id: i64 = row.get(1).map_err(|e| DossierError::Storage(e.to_string()))?;
    let chunk_index: i64 = row.get(2).map_err(|e| DossierError::Storage(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| DossierError::Storage(e.to_string()))?;
    let embedding_json: Option<String> =
        row.get(4).map_err(|e| DossierError::Storage(e.to_string()))?;
    let state_str: String = row.get(5).map_err(|e| DossierError::Storage(e.to_string()))?;
    let token_count: i64 = row.get(6).map_err(|e| DossierError::Storage(e.to_string()))?;

    let state = EmbeddingState::parse(&state_str)
        .ok_or_else(|| DossierError::Storage(format!("Unknown embedding state: {}", state_str)))?;

    let embedding = match embedding_json {
        Some(json) => Some(
            serde_json::from_str::<Vec<f32>>(&json)
                .map_err(|e| DossierError::Storage(format!("Corrupt embedding payload: {}", e)))?,
        ),
        None => None,
    };

    Ok(Chunk {
        chunk_id,
        file_id,
        chunk_index: chunk_index as u32,
        content,
        embedding,
        state,
        token_count: token_count as u32,
    })
}

fn chunk_exists(conn: &rusqlite::Connection, chunk_id: i64) -> Result<bool, DossierError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM chunks WHERE chunk_id = ?1",
            rusqlite::params![chunk_id],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| DossierError::Storage(e.to_string()))?
        .is_some())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use dossier_core::types::EMBEDDING_DIM;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn make_chunks(texts: &[&str]) -> Vec<NewChunk> {
        texts
            .iter()
            .map(|t| NewChunk {
                content: t.to_string(),
                token_count: (t.len() as u32).div_ceil(4),
            })
            .collect()
    }

    // ========================================================================
    // UserRepository tests
    // ========================================================================

    #[test]
    fn test_user_create_and_find() {
        let db = make_db();
        let repo = UserRepository::new(db);

        let salt = Uuid::new_v4();
        let user = repo.create("recruiter@example.com", salt, "key-abc").unwrap();
        assert!(user.user_id > 0);
        assert_eq!(user.role, Role::Viewer);
        assert_eq!(user.salt, salt);

        let by_key = repo.find_by_api_key("key-abc").unwrap().unwrap();
        assert_eq!(by_key.user_id, user.user_id);
        assert_eq!(by_key.email, "recruiter@example.com");

        let by_email = repo.find_by_email("recruiter@example.com").unwrap().unwrap();
        assert_eq!(by_email.user_id, user.user_id);

        assert!(repo.find_by_api_key("other-key").unwrap().is_none());
    }

    #[test]
    fn test_user_create_empty_email_rejected() {
        let db = make_db();
        let repo = UserRepository::new(db);

        let result = repo.create("  ", Uuid::new_v4(), "key");
        assert!(matches!(result, Err(DossierError::Validation(_))));
    }

    #[test]
    fn test_user_duplicate_email_rejected() {
        let db = make_db();
        let repo = UserRepository::new(db);

        repo.create("dup@example.com", Uuid::new_v4(), "key-1")
            .unwrap();
        let result = repo.create("dup@example.com", Uuid::new_v4(), "key-2");
        assert!(matches!(result, Err(DossierError::Validation(_))));
    }

    #[test]
    fn test_user_set_role() {
        let db = make_db();
        let repo = UserRepository::new(db);

        let user = repo.create("u@example.com", Uuid::new_v4(), "k").unwrap();
        repo.set_role(user.user_id, Role::Admin).unwrap();

        let reloaded = repo.find_by_id(user.user_id).unwrap().unwrap();
        assert_eq!(reloaded.role, Role::Admin);
    }

    #[test]
    fn test_user_set_role_unknown_user() {
        let db = make_db();
        let repo = UserRepository::new(db);

        let result = repo.set_role(999, Role::Inactive);
        assert!(matches!(result, Err(DossierError::NotFound(_))));
    }

    #[test]
    fn test_user_list_all() {
        let db = make_db();
        let repo = UserRepository::new(db);

        repo.create("a@example.com", Uuid::new_v4(), "ka").unwrap();
        repo.create("b@example.com", Uuid::new_v4(), "kb").unwrap();

        let users = repo.list_all().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users[0].user_id < users[1].user_id);
    }

    // ========================================================================
    // FileRepository tests
    // ========================================================================

    #[test]
    fn test_file_ids_are_monotonic() {
        let db = make_db();
        let repo = FileRepository::new(db);

        let f1 = repo.create("a.pdf", "alice").unwrap();
        let f2 = repo.create("b.pdf", "alice").unwrap();
        let f3 = repo.create("c.pdf", "bob").unwrap();

        assert!(f1.file_id < f2.file_id);
        assert!(f2.file_id < f3.file_id);
        assert!(!f1.processed);
    }

    #[test]
    fn test_file_list_by_applicant() {
        let db = make_db();
        let repo = FileRepository::new(db);

        repo.create("cv.pdf", "alice").unwrap();
        repo.create("cover.pdf", "alice").unwrap();
        repo.create("cv.pdf", "bob").unwrap();

        let alice = repo.list_by_applicant("alice").unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|f| f.applicant == "alice"));

        assert!(repo.list_by_applicant("carol").unwrap().is_empty());
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_file_mark_processed_idempotent() {
        let db = make_db();
        let repo = FileRepository::new(db);

        let file = repo.create("cv.pdf", "alice").unwrap();
        repo.mark_processed(file.file_id).unwrap();
        repo.mark_processed(file.file_id).unwrap();

        let reloaded = repo.find_by_id(file.file_id).unwrap().unwrap();
        assert!(reloaded.processed);
    }

    #[test]
    fn test_file_mark_processed_unknown() {
        let db = make_db();
        let repo = FileRepository::new(db);

        let result = repo.mark_processed(42);
        assert!(matches!(result, Err(DossierError::NotFound(_))));
    }

    #[test]
    fn test_file_list_unprocessed() {
        let db = make_db();
        let repo = FileRepository::new(db);

        let f1 = repo.create("a.pdf", "alice").unwrap();
        let f2 = repo.create("b.pdf", "alice").unwrap();
        repo.mark_processed(f1.file_id).unwrap();

        let pending = repo.list_unprocessed().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_id, f2.file_id);
    }

    #[test]
    fn test_file_delete_cascades_to_chunks() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        chunks
            .insert_many(file.file_id, &make_chunks(&["first", "second"]))
            .unwrap();

        files.delete_with_chunks(file.file_id).unwrap();

        assert!(files.find_by_id(file.file_id).unwrap().is_none());
        assert!(chunks.list_by_file(file.file_id).unwrap().is_empty());
    }

    #[test]
    fn test_file_delete_unknown() {
        let db = make_db();
        let repo = FileRepository::new(db);

        let result = repo.delete_with_chunks(42);
        assert!(matches!(result, Err(DossierError::NotFound(_))));
    }

    // ========================================================================
    // ChunkRepository tests
    // ========================================================================

    #[test]
    fn test_chunk_insert_many_assigns_contiguous_indices() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["one", "two", "three"]))
            .unwrap();

        assert_eq!(created.len(), 3);
        for (i, chunk) in created.iter().enumerate() {
            assert_eq!(chunk.chunk_index as usize, i);
            assert_eq!(chunk.state, EmbeddingState::Pending);
            assert!(chunk.embedding.is_none());
        }

        let listed = chunks.list_by_file(file.file_id).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].content, "one");
        assert_eq!(listed[2].content, "three");
    }

    #[test]
    fn test_chunk_insert_many_unknown_file() {
        let db = make_db();
        let chunks = ChunkRepository::new(db);

        let result = chunks.insert_many(42, &make_chunks(&["x"]));
        assert!(matches!(result, Err(DossierError::NotFound(_))));
    }

    #[test]
    fn test_chunk_reinsert_detects_duplicate_position() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        chunks
            .insert_many(file.file_id, &make_chunks(&["one"]))
            .unwrap();

        let result = chunks.insert_many(file.file_id, &make_chunks(&["one again"]));
        assert!(matches!(result, Err(DossierError::IndexInconsistency(_))));
    }

    #[test]
    fn test_chunk_list_by_file_detects_gap() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        chunks
            .insert_many(file.file_id, &make_chunks(&["one", "two", "three"]))
            .unwrap();

        // Punch a hole in the sequence behind the repository's back.
        db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chunks WHERE file_id = ?1 AND chunk_index = 1",
                rusqlite::params![file.file_id],
            )
            .map_err(|e| DossierError::Storage(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let result = chunks.list_by_file(file.file_id);
        assert!(matches!(result, Err(DossierError::IndexInconsistency(_))));
    }

    #[test]
    fn test_chunk_set_embedded() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["text"]))
            .unwrap();

        let vector = vec![0.25_f32; EMBEDDING_DIM];
        chunks.set_embedded(created[0].chunk_id, &vector).unwrap();

        let reloaded = chunks.find_by_id(created[0].chunk_id).unwrap().unwrap();
        assert_eq!(reloaded.state, EmbeddingState::Embedded);
        assert_eq!(reloaded.embedding.unwrap().len(), EMBEDDING_DIM);
    }

    #[test]
    fn test_chunk_set_embedded_twice_is_inconsistency() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["text"]))
            .unwrap();

        let vector = vec![0.25_f32; EMBEDDING_DIM];
        chunks.set_embedded(created[0].chunk_id, &vector).unwrap();
        let result = chunks.set_embedded(created[0].chunk_id, &vector);
        assert!(matches!(result, Err(DossierError::IndexInconsistency(_))));
    }

    #[test]
    fn test_chunk_set_embedded_unknown() {
        let db = make_db();
        let chunks = ChunkRepository::new(db);

        let result = chunks.set_embedded(42, &[0.0; EMBEDDING_DIM]);
        assert!(matches!(result, Err(DossierError::NotFound(_))));
    }

    #[test]
    fn test_chunk_set_failed_then_retry_succeeds() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["text"]))
            .unwrap();
        let id = created[0].chunk_id;

        chunks.set_failed(id).unwrap();
        // Failed is terminal for the engine, but a caller-driven retry may
        // still attach later.
        chunks.set_failed(id).unwrap();
        assert_eq!(
            chunks.find_by_id(id).unwrap().unwrap().state,
            EmbeddingState::Failed
        );

        chunks.set_embedded(id, &vec![0.5; EMBEDDING_DIM]).unwrap();
        assert_eq!(
            chunks.find_by_id(id).unwrap().unwrap().state,
            EmbeddingState::Embedded
        );
    }

    #[test]
    fn test_chunk_embedded_cannot_become_failed() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["text"]))
            .unwrap();

        chunks
            .set_embedded(created[0].chunk_id, &vec![0.5; EMBEDDING_DIM])
            .unwrap();
        let result = chunks.set_failed(created[0].chunk_id);
        assert!(matches!(result, Err(DossierError::IndexInconsistency(_))));
    }

    #[test]
    fn test_chunk_list_unembedded() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let file = files.create("cv.pdf", "alice").unwrap();
        let created = chunks
            .insert_many(file.file_id, &make_chunks(&["a", "b", "c"]))
            .unwrap();

        chunks
            .set_embedded(created[0].chunk_id, &vec![0.1; EMBEDDING_DIM])
            .unwrap();
        chunks.set_failed(created[1].chunk_id).unwrap();

        let pending_only = chunks.list_unembedded(file.file_id, false).unwrap();
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].chunk_id, created[2].chunk_id);

        let with_failed = chunks.list_unembedded(file.file_id, true).unwrap();
        assert_eq!(with_failed.len(), 2);
    }

    #[test]
    fn test_chunk_list_all_with_applicant() {
        let db = make_db();
        let files = FileRepository::new(Arc::clone(&db));
        let chunks = ChunkRepository::new(Arc::clone(&db));

        let f1 = files.create("cv.pdf", "alice").unwrap();
        let f2 = files.create("cv.pdf", "bob").unwrap();
        chunks.insert_many(f1.file_id, &make_chunks(&["a"])).unwrap();
        chunks
            .insert_many(f2.file_id, &make_chunks(&["b", "c"]))
            .unwrap();

        let all = chunks.list_all_with_applicant().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].1, "alice");
        assert_eq!(all[1].1, "bob");
    }
}

//! Database schema migrations.
//!
//! Applies the initial schema: the users, files, and chunks tables plus the
//! schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use dossier_core::error::DossierError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), DossierError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DossierError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DossierError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), DossierError> {
    conn.execute_batch(
        "
        -- Identity directory.
        CREATE TABLE IF NOT EXISTS users (
            user_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'viewer'
                        CHECK (role IN ('admin', 'viewer', 'inactive')),
            api_key     TEXT,
            salt        TEXT NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email
            ON users (email);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_api_key
            ON users (api_key)
            WHERE api_key IS NOT NULL;

        -- Uploaded documents.
        CREATE TABLE IF NOT EXISTS files (
            file_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            filename    TEXT NOT NULL,
            applicant   TEXT NOT NULL,
            processed   INTEGER NOT NULL DEFAULT 0,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_files_applicant
            ON files (applicant);

        CREATE INDEX IF NOT EXISTS idx_files_filename
            ON files (filename);

        CREATE INDEX IF NOT EXISTS idx_files_unprocessed
            ON files (file_id)
            WHERE processed = 0;

        -- Ordered chunks. Embeddings are JSON float arrays, NULL until
        -- attachment succeeds.
        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id     INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            content     TEXT NOT NULL,
            embedding   TEXT,
            state       TEXT NOT NULL DEFAULT 'pending'
                        CHECK (state IN ('pending', 'embedded', 'failed')),
            token_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (file_id) REFERENCES files(file_id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_file_position
            ON chunks (file_id, chunk_index);

        CREATE INDEX IF NOT EXISTS idx_chunks_state
            ON chunks (state)
            WHERE state != 'embedded';

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| DossierError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

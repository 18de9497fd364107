//! Dossier Storage crate - SQLite persistence for users, files, and chunks.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for the identity directory, file records, and their
//! ordered chunk sequences.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ChunkRepository, FileRepository, NewChunk, UserRepository};

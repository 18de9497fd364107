//! CLI argument definitions for the Dossier application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dossier_core::error::{DossierError, Result};

/// Dossier - hybrid retrieval storage for applicant documents.
#[derive(Parser, Debug)]
#[command(name = "dossier", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the ingestion driver loop, scanning for unprocessed files.
    Run(RunArgs),
    /// Register a document and attach embeddings to its chunks.
    Ingest(IngestArgs),
    /// Search indexed chunks.
    Search(SearchArgs),
    /// List registered files.
    Files(FilesArgs),
    /// Delete a file, its chunks, and its index entries.
    Delete(DeleteArgs),
    /// Manage users and API keys (local administrative operation).
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Also re-attempt chunks whose last embedding attempt failed.
    #[arg(long = "retry-failed")]
    pub retry_failed: bool,
}

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Path of the document to ingest.
    pub path: PathBuf,

    /// Applicant the document belongs to.
    #[arg(short = 'a', long)]
    pub applicant: String,

    /// Stored filename (defaults to the file name of PATH).
    #[arg(long)]
    pub filename: Option<String>,

    /// API key (falls back to DOSSIER_API_KEY).
    #[arg(long = "api-key")]
    pub api_key: Option<String>,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query.
    pub query: String,

    /// Restrict results to one applicant.
    #[arg(short = 'a', long)]
    pub applicant: Option<String>,

    /// Number of results to return (defaults to the configured top-k).
    #[arg(short = 'n', long = "top-k")]
    pub top_k: Option<usize>,

    /// Ranking mode: lexical, vector, or hybrid.
    #[arg(short = 'm', long, default_value = "hybrid")]
    pub mode: String,

    /// Output results as JSON.
    #[arg(long)]
    pub json: bool,

    /// API key (falls back to DOSSIER_API_KEY).
    #[arg(long = "api-key")]
    pub api_key: Option<String>,
}

#[derive(Debug, Parser)]
pub struct FilesArgs {
    /// List files for one applicant only.
    #[arg(short = 'a', long)]
    pub applicant: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,

    /// API key (falls back to DOSSIER_API_KEY).
    #[arg(long = "api-key")]
    pub api_key: Option<String>,
}

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Id of the file to delete.
    pub file_id: i64,

    /// API key (falls back to DOSSIER_API_KEY).
    #[arg(long = "api-key")]
    pub api_key: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Provision a user and print their API key once.
    Add {
        /// Email address, unique per user.
        email: String,
        /// Role: admin or viewer.
        #[arg(long, default_value = "viewer")]
        role: String,
    },
    /// List provisioned users.
    List {
        /// Output as JSON (keys redacted).
        #[arg(long)]
        json: bool,
    },
    /// Change a user's role (admin, viewer, or inactive).
    SetRole {
        /// Id of the user.
        user_id: i64,
        /// New role.
        role: String,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > DOSSIER_CONFIG env var > ~/.dossier/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("DOSSIER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, configured: &str) -> String {
        match &self.data_dir {
            Some(p) => p.to_string_lossy().to_string(),
            None => configured.to_string(),
        }
    }
}

/// Resolve the API key for a gated command.
///
/// Priority: --api-key flag > DOSSIER_API_KEY env var. A missing key is an
/// authorization failure, not a parse error.
pub fn resolve_api_key(flag: &Option<String>) -> Result<String> {
    if let Some(key) = flag {
        return Ok(key.clone());
    }
    if let Ok(key) = std::env::var("DOSSIER_API_KEY") {
        return Ok(key);
    }
    Err(DossierError::Unauthorized(
        "no API key provided (use --api-key or DOSSIER_API_KEY)".to_string(),
    ))
}

/// Default config file path (~/.dossier/config.toml).
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".dossier").join("config.toml");
    }
    PathBuf::from("config.toml")
}

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Dossier engine.
///
/// Loaded from `~/.dossier/config.toml` by default. Each section corresponds
/// to one subsystem; every field has a default so a missing or partial file
/// still yields a working configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DossierConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for DossierConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl DossierConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DossierConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.dossier/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Chunking pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on the estimated token count of a single chunk.
    pub max_tokens_per_chunk: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 512,
        }
    }
}

/// Embedding attachment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Deadline for a single embedding call, in seconds. A call that runs
    /// past it marks the chunk failed rather than leaving it pending.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Query engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result count when the caller does not specify one.
    pub default_top_k: usize,
    /// Reciprocal-rank-fusion constant.
    pub rrf_k: u32,
    /// Each ranking leg fetches top_k times this before fusing.
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            rrf_k: 60,
            candidate_multiplier: 3,
        }
    }
}

/// Ingestion driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Seconds between scans for unprocessed files in `run` mode.
    pub poll_interval_secs: u64,
    /// Whether a scan re-attempts chunks whose last attachment failed.
    pub retry_failed: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            retry_failed: false,
        }
    }
}

/// Identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application-level HMAC key for API-key derivation. Override in any
    /// deployment that leaves the local machine.
    pub hmac_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            hmac_key: "dossier-insecure-local-key".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = DossierConfig::default();

        assert_eq!(config.general.data_dir, "~/.dossier/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.chunking.max_tokens_per_chunk, 512);
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.search.default_top_k, 10);
        assert_eq!(config.search.rrf_k, 60);
        assert_eq!(config.search.candidate_multiplier, 3);
        assert_eq!(config.ingest.poll_interval_secs, 30);
        assert!(!config.ingest.retry_failed);
        assert_eq!(config.auth.hmac_key, "dossier-insecure-local-key");
    }

    #[test]
    fn test_config_load_partial_file() {
        let content = r#"
[chunking]
max_tokens_per_chunk = 64

[search]
rrf_k = 10
"#;
        let file = create_temp_config(content);
        let config = DossierConfig::load(file.path()).unwrap();

        // Overridden values.
        assert_eq!(config.chunking.max_tokens_per_chunk, 64);
        assert_eq!(config.search.rrf_k, 10);

        // Everything else falls back to defaults.
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.search.default_top_k, 10);
        assert_eq!(config.embedding.timeout_secs, 30);
    }

    #[test]
    fn test_config_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = DossierConfig::load(file.path()).unwrap();

        assert_eq!(config.general.data_dir, "~/.dossier/data");
        assert_eq!(config.chunking.max_tokens_per_chunk, 512);
        assert_eq!(config.ingest.poll_interval_secs, 30);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        let result = DossierConfig::load(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_or_default_on_missing_file() {
        let config = DossierConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.search.default_top_k, 10);
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let mut config = DossierConfig::default();
        config.chunking.max_tokens_per_chunk = 128;
        config.ingest.retry_failed = true;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: DossierConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(deserialized.chunking.max_tokens_per_chunk, 128);
        assert!(deserialized.ingest.retry_failed);
        assert_eq!(deserialized.general.data_dir, config.general.data_dir);
        assert_eq!(deserialized.search.rrf_k, config.search.rrf_k);
    }

    #[test]
    fn test_config_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("dir").join("config.toml");

        let config = DossierConfig::default();
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = DossierConfig::load(&path).unwrap();
        assert_eq!(reloaded.general.log_level, "info");
    }
}

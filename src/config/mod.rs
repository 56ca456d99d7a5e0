//! Configuration management for Hindsight
//!
//! Every tunable the recall pipeline consumes lives here and is injected into
//! the adapters at construction time; no component reads configuration on its
//! own.

use crate::error::{HindsightError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub stores: StoresConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub tags: TagsConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Paths to the two backing stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// SQLite archive holding messages and their full-text index
    pub archive_db: PathBuf,
    /// SQLite store holding embedding vectors and document sidecars
    pub semantic_db: PathBuf,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the Ollama-style embedding endpoint
    pub endpoint: String,
    /// Model name passed with every embed request
    pub model: String,
    /// Upper bound on one embedding call; providers can be slow under load
    pub timeout_secs: u64,
}

/// Query pipeline defaults; each is overridable per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Candidate cap for the lexical index query
    pub lexical_limit: usize,
    /// Candidate cap for the semantic scan
    pub semantic_limit: usize,
    /// Flat result cap after fusion
    pub top: usize,
    /// Semantic candidates with fewer characters than this are skipped
    pub min_text_length: usize,
    /// Semantic preview text is truncated to this many characters
    pub preview_max_chars: usize,
    /// Conversation cap when grouping
    pub max_conversations: usize,
    /// Per-conversation hit cap when grouping
    pub hits_per_conversation: usize,
    pub snippet: SnippetConfig,
}

/// Highlighting style for lexical snippets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetConfig {
    pub start: String,
    pub end: String,
    pub ellipsis: String,
    /// Context window in tokens; FTS5 caps this at 64
    pub tokens: u32,
}

/// Project tag classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsConfig {
    /// JSON rule file; a missing or malformed file degrades to no tagging
    pub rules_file: PathBuf,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HindsightError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HindsightError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| HindsightError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: HINDSIGHT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("HINDSIGHT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORES__ARCHIVE_DB" => {
                self.stores.archive_db = PathBuf::from(value);
            }
            "STORES__SEMANTIC_DB" => {
                self.stores.semantic_db = PathBuf::from(value);
            }
            "EMBEDDING__ENDPOINT" => {
                self.embedding.endpoint = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__TIMEOUT_SECS" => {
                self.embedding.timeout_secs =
                    value
                        .parse()
                        .map_err(|_| HindsightError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Cannot parse '{}' as seconds", value),
                        })?;
            }
            "TAGS__RULES_FILE" => {
                self.tags.rules_file = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            HindsightError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("hindsight").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| HindsightError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".hindsight"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.hindsight");
        let config_dir = PathBuf::from("~/.config/hindsight");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            stores: StoresConfig {
                archive_db: data_dir.join("archive.sqlite"),
                semantic_db: data_dir.join("semantic.sqlite"),
            },
            embedding: EmbeddingConfig {
                endpoint: "http://127.0.0.1:11434".to_string(),
                model: "nomic-embed-text:latest".to_string(),
                timeout_secs: 600,
            },
            search: SearchConfig::default(),
            tags: TagsConfig {
                rules_file: config_dir.join("project_tags.json"),
            },
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_limit: 25,
            semantic_limit: 25,
            top: 15,
            min_text_length: 120,
            preview_max_chars: 700,
            max_conversations: 10,
            hits_per_conversation: 5,
            snippet: SnippetConfig::default(),
        }
    }
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            start: "[".to_string(),
            end: "]".to_string(),
            ellipsis: "…".to_string(),
            tokens: 18,
        }
    }
}

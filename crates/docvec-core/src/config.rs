//! docvec Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for local use.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Fragment store location
    pub storage: StorageConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Chunking and retrieval configuration
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_overlap".to_string(),
                value: format!(
                    "{} (must be smaller than chunk_size {})",
                    self.rag.chunk_overlap, self.rag.chunk_size
                ),
            });
        }
        if !(-1.0..=1.0).contains(&self.rag.min_similarity) {
            return Err(ConfigError::InvalidValue {
                key: "rag.min_similarity".to_string(),
                value: self.rag.min_similarity.to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Storage
        if let Ok(path) = std::env::var("DOCVEC_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Ok(secs) = std::env::var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", secs)?;
        }

        // Chunking and retrieval
        if let Ok(size) = std::env::var("CHUNK_SIZE") {
            self.rag.chunk_size = parse_env("CHUNK_SIZE", size)?;
        }
        if let Ok(overlap) = std::env::var("CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_env("CHUNK_OVERLAP", overlap)?;
        }
        if let Ok(top_k) = std::env::var("RAG_TOP_K") {
            self.rag.top_k = parse_env("RAG_TOP_K", top_k)?;
        }
        if let Ok(min) = std::env::var("RAG_MIN_SIMILARITY") {
            self.rag.min_similarity = parse_env("RAG_MIN_SIMILARITY", min)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Fragment store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; parent directories are created on open
    pub db_path: PathBuf,

    /// Connection pool size
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/documents.db"),
            pool_size: 5,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key (optional for local OpenAI-compatible servers)
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for local or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name; empty means ask the server for its first model
    pub model: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Cached query embeddings (0 disables the cache)
    pub embedding_cache_capacity: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            timeout_secs: 15,
            embedding_cache_capacity: 1_000,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Chunking and retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Fragment length in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive fragments
    pub chunk_overlap: usize,

    /// Fragments handed to the completion provider
    pub top_k: usize,

    /// Similarity floor for retrieval
    pub min_similarity: f32,

    /// Maximum context length (characters)
    pub max_context_length: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 3,
            min_similarity: 0.65,
            max_context_length: 8000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.rag.chunk_overlap, 200);
        assert_eq!(config.storage.db_path, PathBuf::from("data/documents.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let mut config = AppConfig::default();
        config.rag.chunk_overlap = config.rag.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_similarity_out_of_range() {
        let mut config = AppConfig::default();
        config.rag.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
db_path = "/tmp/docvec-test/documents.db"

[rag]
chunk_size = 300
chunk_overlap = 50
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(
            config.storage.db_path,
            PathBuf::from("/tmp/docvec-test/documents.db")
        );
        assert_eq!(config.rag.chunk_size, 300);
        assert_eq!(config.rag.chunk_overlap, 50);
        // untouched sections keep their defaults
        assert_eq!(config.rag.top_k, 3);
        assert_eq!(config.llm.provider, LlmProvider::OpenAI);
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/docvec.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}

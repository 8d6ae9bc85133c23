//! docvec Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout docvec:
//! - Fragment and document models persisted by the vector store
//! - Common error types
//! - Provider traits for embeddings and chat completion
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, RagConfig, StorageConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for docvec operations
#[derive(Error, Debug)]
pub enum DocvecError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocvecError {
    /// Short stable tag for rendering the error kind to users
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidVector(_) => "invalid_vector",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
            Self::Provider(_) => "provider",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

impl From<sqlx::Error> for DocvecError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<ConfigError> for DocvecError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocvecError>;

// ============================================================================
// Stored Models
// ============================================================================

/// One stored chunk of a document together with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Surrogate row id, assigned by the store
    pub id: i64,

    /// Caller-supplied identifier grouping the fragments of one document
    pub document_id: String,

    /// Original file name, used as the lifecycle key
    pub file_name: Option<String>,

    /// Zero-based position within the document
    pub chunk_index: u32,

    /// Raw fragment text
    pub chunk_text: String,

    /// Embedding vector
    pub embedding: Vec<f32>,

    /// Insertion (or last replacement) time
    pub created_at: DateTime<Utc>,
}

impl Fragment {
    /// Number of embedding components
    pub fn embedding_dim(&self) -> usize {
        self.embedding.len()
    }
}

/// One row of the document listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub file_name: Option<String>,
    pub chunk_count: u64,
    pub last_update: DateTime<Utc>,
}

/// Aggregate statistics over the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Distinct document ids
    pub total_documents: u64,

    /// Stored fragments
    pub total_chunks: u64,

    /// Size of the database file on disk (0 if it does not exist yet)
    pub storage_size_bytes: u64,

    /// Most recent insertion, `None` when the store is empty
    pub last_update: Option<DateTime<Utc>>,
}

// ============================================================================
// Search and RAG Types
// ============================================================================

/// A fragment ranked against a query vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarFragment {
    pub id: i64,
    pub document_id: String,
    pub file_name: Option<String>,
    pub chunk_index: u32,
    pub chunk_text: String,

    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
}

/// Result of ingesting one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub file_name: String,
    pub chunk_count: usize,
}

/// Generated answer with the fragments it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text
    pub text: String,

    /// Fragments passed to the completion provider, best first
    pub fragments: Vec<SimilarFragment>,

    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for embedding generation
#[async_trait::async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

/// Trait for chat-completion clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response for a system instruction and a user message
    async fn generate(&self, system: &str, user: &str) -> Result<String>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

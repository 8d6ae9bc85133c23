//! Embedding clients for generating vector representations
//!
//! Supports OpenAI-compatible and Ollama embedding APIs.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docvec_core::{DocvecError, EmbeddingClient, LlmConfig, LlmProvider, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{build_http_client, DEFAULT_OPENAI_BASE_URL};

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI-compatible embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = openai_dimension(&model);

        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.openai_api_key.is_none() && config.openai_base_url.is_none() {
            return Err(DocvecError::Config(
                "OpenAI API key required".to_string(),
            ));
        }

        Ok(Self {
            client: build_http_client(config)?,
            api_key: config.openai_api_key.clone(),
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: config.embedding_model.clone(),
            dimension: openai_dimension(&config.embedding_model),
        })
    }

    /// Set custom base URL (for local or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536, // Default
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| DocvecError::Provider("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DocvecError::Provider(format!("Embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocvecError::Provider(format!(
                "OpenAI embedding error ({status}): {error_text}"
            )));
        }

        let result: OpenAiEmbeddingResponse = response.json().await.map_err(|e| {
            DocvecError::Provider(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(sorted_embeddings(result))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Order embeddings by their request index
fn sorted_embeddings(response: OpenAiEmbeddingResponse) -> Vec<Vec<f32>> {
    let mut embeddings = response.data;
    embeddings.sort_by_key(|e| e.index);
    embeddings.into_iter().map(|e| e.embedding).collect()
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = ollama_dimension(&model);

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.ollama_url.clone(),
            model: config.embedding_model.clone(),
            dimension: ollama_dimension(&config.embedding_model),
        })
    }
}

fn ollama_dimension(model: &str) -> usize {
    match model {
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        "paraphrase-multilingual" => 768,
        _ => 768, // Default for most models
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                DocvecError::Provider(format!("Ollama embedding request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocvecError::Provider(format!(
                "Ollama embedding error: {error_text}"
            )));
        }

        let result: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            DocvecError::Provider(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(result.embedding)
    }

    // Ollama has no batch endpoint here; the trait default embeds one by one

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiEmbedding::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);
        assert_eq!(client.model_name(), "text-embedding-3-large");
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434", "all-minilm");
        assert_eq!(client.dimension(), 384);
    }

    #[test]
    fn test_openai_requires_key_or_base_url() {
        let config = LlmConfig::default();
        assert!(OpenAiEmbedding::from_config(&config).is_err());

        let config = LlmConfig {
            openai_base_url: Some("http://127.0.0.1:1234/v1".to_string()),
            ..Default::default()
        };
        let client = OpenAiEmbedding::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:1234/v1");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_response_sorted_by_index() {
        let response: OpenAiEmbeddingResponse = serde_json::from_str(
            r#"{"data":[
                {"embedding":[0.2,0.2],"index":1},
                {"embedding":[0.1,0.1],"index":0}
            ]}"#,
        )
        .unwrap();
        let embeddings = sorted_embeddings(response);
        assert_eq!(embeddings, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }

    #[test]
    fn test_factory_selects_provider() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            embedding_model: "mxbai-embed-large".to_string(),
            ..Default::default()
        };
        let client = create_embedding_client(&config).unwrap();
        assert_eq!(client.dimension(), 1024);
    }
}

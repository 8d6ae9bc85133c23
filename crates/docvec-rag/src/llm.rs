//! LLM Client implementations
//!
//! Provides chat-completion clients for OpenAI-compatible servers and Ollama.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docvec_core::{DocvecError, LlmClient, LlmConfig, LlmProvider, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub(crate) const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client carrying the configured request timeout
pub(crate) fn build_http_client(config: &LlmConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| DocvecError::Provider(format!("Failed to build HTTP client: {e}")))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI-compatible chat completion client
///
/// With an empty model name the first model advertised by `{base_url}/models`
/// is used, which suits local servers that host a single model.
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    discovered_model: OnceCell<String>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.into()),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.into(),
            discovered_model: OnceCell::new(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    ///
    /// A key is required only for the public endpoint; a custom base URL may
    /// point at an unauthenticated local server.
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
            model: config.model.clone(),
            discovered_model: OnceCell::new(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Model to send with a request, discovering one if none is configured
    async fn resolve_model(&self) -> Result<&str> {
        if !self.model.is_empty() {
            return Ok(&self.model);
        }

        let model = self
            .discovered_model
            .get_or_try_init(|| self.discover_model())
            .await?;
        Ok(model.as_str())
    }

    async fn discover_model(&self) -> Result<String> {
        let response = self
            .authorize(self.client.get(format!("{}/models", self.base_url)))
            .send()
            .await
            .map_err(|e| DocvecError::Provider(format!("Model discovery failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocvecError::Provider(format!(
                "Model discovery error: {error_text}"
            )));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| DocvecError::Provider(format!("Failed to parse model list: {e}")))?;

        let model = first_model(list)?;
        info!(model = %model, base_url = %self.base_url, "Discovered completion model");
        Ok(model)
    }
}

fn first_model(list: ModelList) -> Result<String> {
    list.data
        .into_iter()
        .next()
        .map(|m| m.id)
        .ok_or_else(|| DocvecError::Provider("Server advertises no models".to_string()))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let model = self.resolve_model().await?;
        let request = OpenAiRequest {
            model,
            messages: vec![Message::system(system), Message::user(user)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model, prompt_chars = user.chars().count(), "Sending chat completion");

        let response = self
            .authorize(
                self.client
                    .post(format!("{}/chat/completions", self.base_url)),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| DocvecError::Provider(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocvecError::Provider(format!(
                "OpenAI error ({status}): {error_text}"
            )));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| DocvecError::Provider(format!("Failed to parse response: {e}")))?;

        first_choice(result)
    }

    fn model_name(&self) -> &str {
        match self.discovered_model.get() {
            Some(model) => model.as_str(),
            None if self.model.is_empty() => "auto",
            None => self.model.as_str(),
        }
    }
}

fn first_choice(response: OpenAiResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| DocvecError::Provider("No response generated".to_string()))
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama chat API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: Message,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.ollama_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            messages: vec![Message::system(system), Message::user(user)],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DocvecError::Provider(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocvecError::Provider(format!("Ollama error: {error_text}")));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            DocvecError::Provider(format!("Failed to parse Ollama response: {e}"))
        })?;

        Ok(result.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiClient::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config)?)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4o-mini", 2048, 0.1);
        assert_eq!(client.model_name(), "gpt-4o-mini");
        assert_eq!(client.base_url, DEFAULT_OPENAI_BASE_URL);
    }

    #[test]
    fn test_openai_empty_model_reports_auto() {
        let config = LlmConfig {
            openai_base_url: Some("http://localhost:1234/v1".to_string()),
            model: String::new(),
            ..Default::default()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.model_name(), "auto");
    }

    #[test]
    fn test_openai_requires_key_or_base_url() {
        let config = LlmConfig::default();
        let err = OpenAiClient::from_config(&config).err().unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_ollama_client_creation() {
        let client = OllamaClient::new("http://localhost:11434", "llama2");
        assert_eq!(client.model_name(), "llama2");
    }

    #[test]
    fn test_request_carries_system_and_user_messages() {
        let request = OpenAiRequest {
            model: "m",
            messages: vec![Message::system("rules"), Message::user("question")],
            max_tokens: 10,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "rules");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_parse_first_choice() {
        let response: OpenAiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "hello");

        let empty: OpenAiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice(empty).is_err());
    }

    #[test]
    fn test_parse_model_list() {
        let list: ModelList =
            serde_json::from_str(r#"{"object":"list","data":[{"id":"qwen2.5-7b"},{"id":"other"}]}"#)
                .unwrap();
        assert_eq!(first_model(list).unwrap(), "qwen2.5-7b");

        let empty: ModelList = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_eq!(first_model(empty).unwrap_err().kind(), "provider");
    }

    #[test]
    fn test_parse_ollama_chat_response() {
        let response: OllamaResponse = serde_json::from_str(
            r#"{"model":"llama3","message":{"role":"assistant","content":"hi"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(response.message.content, "hi");
    }
}

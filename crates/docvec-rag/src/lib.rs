//! docvec RAG - Ingestion and grounded question answering
//!
//! This crate wires the parser, the fragment store and the provider clients
//! together:
//! - Ingestion: bytes -> text -> fragments -> embeddings -> store
//! - Retrieval: question -> embedding -> ranked fragments
//! - Answering: ranked fragments -> strict grounded prompt -> completion
//!
//! Author: hephaex@gmail.com

use docvec_core::{
    Answer, DocvecError, EmbeddingClient, IngestReport, LlmClient, RagConfig, Result,
    SimilarFragment,
};
use docvec_parser::{ChunkConfig, ParserError, ParserRegistry};
use docvec_store::VectorStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub mod cache;
pub mod embedding;
pub mod llm;

pub use cache::{CacheStats, CacheStatsReport, CachedEmbedding};
pub use embedding::{create_embedding_client, OllamaEmbedding, OpenAiEmbedding};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};

/// Answer returned when retrieval finds nothing; the LLM is not consulted
pub const NO_CONTEXT_ANSWER: &str = "No relevant documents found.";

/// Answer the model is told to give when the context does not cover the question
pub const NOT_IN_CONTEXT_ANSWER: &str =
    "There is no information on this question in the documents.";

/// Fragments sent to the embedding provider per request
const EMBED_BATCH_SIZE: usize = 32;

/// New document identifier, `doc_<uuid>`
pub fn new_document_id() -> String {
    format!("doc_{}", uuid::Uuid::new_v4().simple())
}

fn parser_error(err: ParserError) -> DocvecError {
    if err.is_invalid_input() {
        DocvecError::InvalidInput(err.to_string())
    } else {
        DocvecError::Parse(err.to_string())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ingestion and question-answering pipeline
///
/// Provider handles are built once by the caller and shared; the pipeline
/// itself is cheap to clone.
#[derive(Clone)]
pub struct RagPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    parsers: Arc<ParserRegistry>,
    config: RagConfig,
}

impl RagPipeline {
    /// Create a new pipeline
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            parsers: Arc::new(ParserRegistry::with_defaults()),
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Ingest an uploaded file under a freshly generated document id
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        mime_type: &str,
    ) -> Result<IngestReport> {
        self.ingest_with_id(bytes, &new_document_id(), file_name, mime_type)
            .await
    }

    /// Ingest an uploaded file under a caller-chosen document id
    ///
    /// Re-using an id overwrites fragments index by index.
    pub async fn ingest_with_id(
        &self,
        bytes: Vec<u8>,
        document_id: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<IngestReport> {
        let parsers = Arc::clone(&self.parsers);
        let name = file_name.to_string();
        let mime = mime_type.to_string();

        // PDF extraction is CPU bound
        let parsed = tokio::task::spawn_blocking(move || parsers.parse_upload(&bytes, &name, &mime))
            .await
            .map_err(|e| DocvecError::Other(anyhow::anyhow!("Parser task failed: {e}")))?
            .map_err(parser_error)?;

        debug!(
            file_name,
            file_type = %parsed.file_type,
            chars = parsed.char_count(),
            "Extracted text"
        );

        if parsed.is_blank() {
            warn!(file_name, file_type = %parsed.file_type, "No extractable text");
            return Err(DocvecError::InvalidInput(format!(
                "{file_name} contains no extractable text"
            )));
        }

        self.ingest_text(document_id, file_name, &parsed.content)
            .await
    }

    /// Chunk, embed and store already extracted text
    pub async fn ingest_text(
        &self,
        document_id: &str,
        file_name: &str,
        text: &str,
    ) -> Result<IngestReport> {
        let chunk_config = ChunkConfig::new(self.config.chunk_size, self.config.chunk_overlap);
        let chunks = docvec_parser::chunk_text(text, &chunk_config).map_err(parser_error)?;

        if chunks.is_empty() {
            return Err(DocvecError::InvalidInput(
                "document produced no chunks".to_string(),
            ));
        }

        info!(
            document_id,
            file_name,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "Ingesting document"
        );

        let mut index: u32 = 0;
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let embeddings = self.embedder.embed_batch(batch).await?;
            if embeddings.len() != batch.len() {
                return Err(DocvecError::Provider(format!(
                    "Expected {} embeddings, provider returned {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            for (chunk, embedding) in batch.iter().zip(&embeddings) {
                self.store
                    .save_chunk(document_id, index, chunk, embedding, Some(file_name))
                    .await?;
                index += 1;
            }
        }

        info!(document_id, file_name, chunks = chunks.len(), "Document ingested");

        Ok(IngestReport {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            chunk_count: chunks.len(),
        })
    }

    /// Fragments most similar to `question`, best first
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SimilarFragment>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocvecError::InvalidInput("empty query".to_string()));
        }

        let query_embedding = self.embedder.embed(question).await?;
        let fragments = self
            .store
            .find_similar(&query_embedding, top_k, min_similarity)
            .await?;

        debug!(
            top_k,
            min_similarity,
            found = fragments.len(),
            "Retrieved fragments"
        );
        Ok(fragments)
    }

    /// Generate an answer grounded in `fragments`
    ///
    /// Returns [`NO_CONTEXT_ANSWER`] without calling the LLM when `fragments`
    /// is empty.
    pub async fn answer(&self, question: &str, fragments: &[SimilarFragment]) -> Result<String> {
        Ok(self.generate(question, fragments).await?.0)
    }

    /// Retrieve with the configured `top_k` and floor, then answer
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with(question, self.config.top_k, self.config.min_similarity)
            .await
    }

    /// Retrieve with explicit parameters, then answer
    pub async fn ask_with(
        &self,
        question: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Answer> {
        let start_time = Instant::now();

        let mut fragments = self.retrieve(question, top_k, min_similarity).await?;
        let (text, used) = self.generate(question, &fragments).await?;
        fragments.truncate(used);

        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            fragments = fragments.len(),
            processing_time_ms,
            "Answer generated"
        );

        Ok(Answer {
            text,
            fragments,
            processing_time_ms,
        })
    }

    /// Answer text and the number of fragments that made it into the prompt
    async fn generate(
        &self,
        question: &str,
        fragments: &[SimilarFragment],
    ) -> Result<(String, usize)> {
        if fragments.is_empty() {
            return Ok((NO_CONTEXT_ANSWER.to_string(), 0));
        }

        let prompt = fragments
            .iter()
            .fold(
                PromptBuilder::new().max_context_length(self.config.max_context_length),
                |builder, f| builder.add_fragment(&f.chunk_text),
            )
            .question(question)
            .build();

        debug!(
            model = self.llm.model_name(),
            fragments = prompt.fragments_used,
            prompt_chars = prompt.user.chars().count(),
            "Calling LLM"
        );
        let answer = self.llm.generate(&prompt.system, &prompt.user).await?;
        debug!(answer_chars = answer.chars().count(), "LLM response received");

        Ok((answer, prompt.fragments_used))
    }
}

// ============================================================================
// Prompt Builder
// ============================================================================

/// System and user messages for one completion request
#[derive(Debug, Clone)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,

    /// Leading fragments that fit the context budget
    pub fragments_used: usize,
}

/// Builder for strict, context-only prompts
///
/// Fragments are numbered `[Fragment N]` in the order added. Their combined
/// length is capped by `max_context_length` characters, except that the first
/// fragment is always kept.
pub struct PromptBuilder {
    rules: Vec<String>,
    fragments: Vec<String>,
    question: String,
    max_context_length: usize,
}

impl PromptBuilder {
    /// Create a builder with the default rule list
    pub fn new() -> Self {
        Self {
            rules: vec![
                "Use ONLY information from the context below".to_string(),
                format!("If there is no answer in the context, say \"{NOT_IN_CONTEXT_ANSWER}\""),
                "DO NOT make up facts and DO NOT use general knowledge".to_string(),
                "Answer briefly and to the point".to_string(),
            ],
            fragments: Vec::new(),
            question: String::new(),
            max_context_length: usize::MAX,
        }
    }

    /// Cap on the combined fragment length, in characters
    pub fn max_context_length(mut self, max: usize) -> Self {
        self.max_context_length = max;
        self
    }

    /// Add a context fragment
    pub fn add_fragment(mut self, text: impl Into<String>) -> Self {
        self.fragments.push(text.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add a rule
    pub fn add_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> GroundedPrompt {
        let mut system =
            String::from("You are an assistant that answers STRICTLY based on the provided context.\n\nRULES:\n");
        for (i, rule) in self.rules.iter().enumerate() {
            system.push_str(&format!("{}. {}\n", i + 1, rule));
        }

        let mut context = String::new();
        let mut total_length = 0;
        let mut fragments_used = 0;
        for fragment in &self.fragments {
            let length = fragment.chars().count();
            if fragments_used > 0 && total_length + length > self.max_context_length {
                break;
            }

            fragments_used += 1;
            context.push_str(&format!("[Fragment {fragments_used}]\n{fragment}\n\n"));
            total_length += length;
        }

        let user = format!("CONTEXT:\n{}\nQUESTION: {}\n", context, self.question);

        GroundedPrompt {
            system,
            user,
            fragments_used,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

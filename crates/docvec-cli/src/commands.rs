//! Command handlers
//!
//! Each command maps onto one pipeline or lifecycle call. Destructive
//! commands ask for a typed `yes` unless `--yes` is given.

use anyhow::Context as _;
use docvec_core::{AppConfig, DocvecError, EmbeddingClient, LlmClient, SimilarFragment};
use docvec_parser::FileType;
use docvec_rag::{create_embedding_client, create_llm_client, CachedEmbedding, RagPipeline};
use docvec_store::{DocumentManager, SqliteStore};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::Commands;

const PREVIEW_CHARS: usize = 120;

pub(crate) struct Context {
    pub config: AppConfig,
    pub store: Arc<SqliteStore>,
    pub json: bool,
}

/// Pipeline plus a handle on the embedding cache, when one is configured
struct Session {
    pipeline: RagPipeline,
    cache: Option<CachedEmbedding>,
}

impl Session {
    fn log_cache_stats(&self) {
        if let Some(cache) = &self.cache {
            let report = cache.stats().report();
            tracing::debug!(
                hits = report.hits,
                misses = report.misses,
                writes = report.writes,
                hit_rate = report.hit_rate,
                entries = cache.entry_count(),
                "Embedding cache"
            );
        }
    }
}

impl Context {
    /// Build provider clients and the pipeline; only commands that embed need this
    fn session(&self) -> anyhow::Result<Session> {
        let llm_config = &self.config.llm;

        let provider: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(llm_config)?);
        let cache = (llm_config.embedding_cache_capacity > 0)
            .then(|| CachedEmbedding::new(provider.clone(), llm_config.embedding_cache_capacity));
        let embedder: Arc<dyn EmbeddingClient> = match &cache {
            Some(cache) => Arc::new(cache.clone()),
            None => provider,
        };
        let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(llm_config)?);

        tracing::debug!(
            provider = ?llm_config.provider,
            embedding_model = embedder.model_name(),
            model = llm.model_name(),
            "Providers ready"
        );

        let pipeline = RagPipeline::new(
            self.store.clone(),
            embedder,
            llm,
            self.config.rag.clone(),
        );
        Ok(Session { pipeline, cache })
    }

    fn manager(&self) -> DocumentManager {
        DocumentManager::new(Arc::clone(&self.store))
    }

    /// Print `value` as JSON in `--json` mode, otherwise run `human`
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human(value);
        }
        Ok(())
    }
}

pub(crate) async fn execute(ctx: &Context, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest {
            path,
            mime,
            document_id,
        } => ingest(ctx, &path, mime, document_id).await,
        Commands::Ask {
            question,
            top_k,
            min_similarity,
        } => {
            let session = ctx.session()?;
            let top_k = top_k.unwrap_or(ctx.config.rag.top_k);
            let min_similarity = min_similarity.unwrap_or(ctx.config.rag.min_similarity);
            let answer = session
                .pipeline
                .ask_with(&question, top_k, min_similarity)
                .await?;
            session.log_cache_stats();

            ctx.emit(&answer, |answer| {
                println!("{}", answer.text);
                if !answer.fragments.is_empty() {
                    println!();
                    println!("Sources:");
                    for (i, fragment) in answer.fragments.iter().enumerate() {
                        println!(
                            "  [{}] {} #{} ({:.3})",
                            i + 1,
                            display_name(fragment),
                            fragment.chunk_index,
                            fragment.similarity
                        );
                    }
                }
            })
        }
        Commands::Search {
            query,
            top_k,
            min_similarity,
        } => {
            let session = ctx.session()?;
            let top_k = top_k.unwrap_or(ctx.config.rag.top_k);
            let min_similarity = min_similarity.unwrap_or(ctx.config.rag.min_similarity);
            let fragments = session
                .pipeline
                .retrieve(&query, top_k, min_similarity)
                .await?;
            session.log_cache_stats();

            ctx.emit(&fragments, |fragments| {
                if fragments.is_empty() {
                    println!("No fragments above similarity {min_similarity}.");
                }
                for fragment in fragments {
                    println!(
                        "{:.3}  {} #{}  {}",
                        fragment.similarity,
                        display_name(fragment),
                        fragment.chunk_index,
                        preview(&fragment.chunk_text)
                    );
                }
            })
        }
        Commands::List => {
            let documents = ctx.manager().list_documents().await?;
            ctx.emit(&documents, |documents| {
                if documents.is_empty() {
                    println!("No documents stored.");
                }
                for doc in documents {
                    println!(
                        "{}  {}  {} fragments  {}",
                        doc.document_id,
                        doc.file_name.as_deref().unwrap_or("-"),
                        doc.chunk_count,
                        doc.last_update.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            })
        }
        Commands::Show { document_id } => {
            let fragments = ctx.store.get_document_chunks(&document_id).await?;
            if fragments.is_empty() {
                return Err(DocvecError::NotFound(format!("document {document_id}")).into());
            }

            ctx.emit(&fragments, |fragments| {
                for fragment in fragments {
                    println!(
                        "--- #{} (id {}, {} dims)",
                        fragment.chunk_index,
                        fragment.id,
                        fragment.embedding_dim()
                    );
                    println!("{}", fragment.chunk_text);
                }
            })
        }
        Commands::Delete { file_name, yes } => delete(ctx, &file_name, yes).await,
        Commands::Clear { yes } => clear(ctx, yes).await,
        Commands::Stats => {
            let stats = ctx.manager().get_stats().await?;
            ctx.emit(&stats, |stats| {
                println!("Documents:    {}", stats.total_documents);
                println!("Fragments:    {}", stats.total_chunks);
                println!("Storage size: {} bytes", stats.storage_size_bytes);
                match stats.last_update {
                    Some(at) => println!("Last update:  {}", at.format("%Y-%m-%d %H:%M:%S")),
                    None => println!("Last update:  never"),
                }
            })
        }
    }
}

async fn ingest(
    ctx: &Context,
    path: &Path,
    mime: Option<String>,
    document_id: Option<String>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime.unwrap_or_else(|| guess_mime(path).to_string());

    let session = ctx.session()?;
    let report = match document_id {
        Some(id) => {
            session
                .pipeline
                .ingest_with_id(bytes, &id, &file_name, &mime)
                .await?
        }
        None => session.pipeline.ingest(bytes, &file_name, &mime).await?,
    };
    session.log_cache_stats();

    ctx.emit(&report, |report| {
        println!(
            "Document is processed! Saved {} fragments as {}.",
            report.chunk_count, report.document_id
        );
    })
}

async fn delete(ctx: &Context, file_name: &str, yes: bool) -> anyhow::Result<()> {
    let manager = ctx.manager();

    let matched = manager.count_fragments(file_name).await?;
    if matched == 0 {
        return ctx.emit(&serde_json::json!({ "deleted": 0 }), |_| {
            println!("No fragments found for '{file_name}'.");
        });
    }

    if !yes
        && !confirm(&format!(
            "Delete {matched} fragments of '{file_name}'? This cannot be undone."
        ))
        .await?
    {
        return cancelled(ctx);
    }

    let deleted = manager.delete_document(file_name).await?;
    ctx.emit(&serde_json::json!({ "deleted": deleted }), |_| {
        println!("Deleted {deleted} fragments of '{file_name}'.");
    })
}

async fn clear(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    let manager = ctx.manager();

    let stats = manager.get_stats().await?;
    if stats.total_chunks == 0 {
        return ctx.emit(&serde_json::json!({ "deleted": 0 }), |_| {
            println!("Store is already empty.");
        });
    }

    if !yes
        && !confirm(&format!(
            "Delete all {} fragments of {} documents? This cannot be undone.",
            stats.total_chunks, stats.total_documents
        ))
        .await?
    {
        return cancelled(ctx);
    }

    let deleted = manager.clear_all_documents().await?;
    ctx.emit(&serde_json::json!({ "deleted": deleted }), |_| {
        println!("Deleted {deleted} fragments.");
    })
}

/// Outcome of a declined confirmation
#[derive(Debug, Serialize)]
struct Cancelled {
    deleted: u64,
    cancelled: bool,
}

fn cancelled(ctx: &Context) -> anyhow::Result<()> {
    ctx.emit(
        &Cancelled {
            deleted: 0,
            cancelled: true,
        },
        |_| println!("Cancelled."),
    )
}

/// Ask on stderr, read one line from stdin
async fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(format!("{question}\nType 'yes' to confirm: ").as_bytes())
        .await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(is_confirmation(&line))
}

fn is_confirmation(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("yes")
}

fn guess_mime(path: &Path) -> &'static str {
    FileType::from_path(path).mime_type()
}

fn display_name(fragment: &SimilarFragment) -> &str {
    fragment
        .file_name
        .as_deref()
        .unwrap_or(&fragment.document_id)
}

/// First line-folded characters of a fragment
fn preview(text: &str) -> String {
    let folded: String = text
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{folded}...")
    } else {
        folded
    }
}

//! docvec CLI - Command-line interface
//!
//! Usage:
//!   docvec ingest <path>
//!   docvec ask <question>
//!   docvec search <query>
//!   docvec list | show <document-id> | stats
//!   docvec delete <file-name> [--yes]
//!   docvec clear [--yes]

mod commands;

use clap::{Parser, Subcommand};
use docvec_core::{AppConfig, DocvecError, LoggingConfig};
use docvec_store::SqliteStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "docvec")]
#[command(about = "Document vector store with grounded question answering")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Ingest a PDF or text file
    Ingest {
        /// Path to the file
        path: PathBuf,

        /// Content type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,

        /// Document id to store under; generated when omitted
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Answer a question from the stored documents
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, allow_negative_numbers = true)]
        min_similarity: Option<f32>,
    },
    /// Show the fragments most similar to a query
    Search {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long, allow_negative_numbers = true)]
        min_similarity: Option<f32>,
    },
    /// List stored documents
    List,
    /// Print every fragment of a document
    Show { document_id: String },
    /// Delete every fragment with this file name
    Delete {
        file_name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Delete every fragment
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show store statistics
    Stats,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    // stdout carries command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let store = Arc::new(SqliteStore::open(&config.storage).await?);
    tracing::debug!(path = %store.path().display(), "Store opened");

    let ctx = commands::Context {
        config,
        store: Arc::clone(&store),
        json: cli.json,
    };
    let result = commands::execute(&ctx, cli.command).await;

    store.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<DocvecError>() {
                Some(e) => eprintln!("error [{}]: {e}", e.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from(["docvec", "ingest", "a.pdf", "--document-id", "doc_x"])
            .unwrap();
        match cli.command {
            Commands::Ingest {
                path,
                mime,
                document_id,
            } => {
                assert_eq!(path, PathBuf::from("a.pdf"));
                assert!(mime.is_none());
                assert_eq!(document_id.as_deref(), Some("doc_x"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ask_with_negative_floor() {
        let cli = Cli::try_parse_from([
            "docvec",
            "ask",
            "what?",
            "--top-k",
            "5",
            "--min-similarity",
            "-0.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask {
                top_k,
                min_similarity,
                ..
            } => {
                assert_eq!(top_k, Some(5));
                assert_eq!(min_similarity, Some(-0.5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["docvec", "stats", "--json", "--config", "docvec.toml"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("docvec.toml")));
    }

    #[test]
    fn test_delete_requires_file_name() {
        assert!(Cli::try_parse_from(["docvec", "delete"]).is_err());

        let cli = Cli::try_parse_from(["docvec", "delete", "a.pdf", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Delete { yes: true, .. }));
    }
}

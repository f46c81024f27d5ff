//! # ragdesk CLI
//!
//! The `ragdesk` binary is the primary interface for the service. It provides
//! commands for database initialization, document ingestion, question
//! answering with either persona, index management, and starting the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! ragdesk --config ./config/ragdesk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk init` | Create the SQLite database and run schema migrations |
//! | `ragdesk ingest <file>...` | Load, chunk, embed, and index files |
//! | `ragdesk ask "<question>"` | Ask the general persona |
//! | `ragdesk delia "<question>"` | Ask the EDSL assistant |
//! | `ragdesk stats` | Show index statistics |
//! | `ragdesk list` | List indexed source files |
//! | `ragdesk clear` | Remove all indexed content |
//! | `ragdesk token` | Print the API bearer token |
//! | `ragdesk serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragdesk::models::UserLevel;
use ragdesk::state::AppState;
use ragdesk::{chain, config, ingest, migrate, server};

/// ragdesk CLI — retrieval-augmented question answering over local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragdesk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragdesk",
    about = "ragdesk — retrieval-augmented question answering over local documents",
    version,
    long_about = "ragdesk ingests local documents (text, Markdown, PDF, JSON, XLSX), chunks and \
    embeds them into a SQLite-backed vector index, and answers questions grounded in the \
    retrieved content, via a CLI and a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragdesk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Ingest one or more files into the vector index.
    ///
    /// Each file is loaded, split into overlapping chunks, embedded with the
    /// configured provider, and stored. Supported formats: .txt, .md, .pdf,
    /// .json, .xlsx.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask the general persona a question.
    ///
    /// Retrieves the most similar chunks, assembles them into the prompt,
    /// and prints the model's answer.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Ask Delia, the EDSL scripting assistant.
    ///
    /// Fenced code blocks in the generated answer are validated and the
    /// findings printed alongside it. Failures are reported in the answer
    /// rather than aborting the command.
    Delia {
        /// The question to answer.
        question: String,

        /// Experience level: basic, intermediate, or advanced.
        #[arg(long, default_value = "intermediate")]
        level: UserLevel,
    },

    /// Show index statistics (documents, chunks, embedding dimension).
    Stats,

    /// List indexed source file names.
    List,

    /// Remove all indexed content. The schema is kept.
    Clear,

    /// Print the API bearer token derived from `[server].secret_key`.
    Token,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// JSON API endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { files } => {
            let state = AppState::new(cfg);
            let mut total = 0u64;
            for file in &files {
                total += ingest::run_ingest(&state, file).await?;
            }
            println!("Done: {} chunk(s) across {} file(s).", total, files.len());
        }
        Commands::Ask { question } => {
            let state = AppState::new(cfg);
            let chain = state.chain(chain::Persona::General).await?;
            let answer = chain.ask_general(&question).await?;
            println!("{}", answer);
        }
        Commands::Delia { question, level } => {
            let state = AppState::new(cfg);
            let answer = match state.chain(chain::Persona::Specialized).await {
                Ok(chain) => chain.ask_delia(&question, level).await,
                Err(e) => chain::delia_failure(level, e.to_string()),
            };

            println!("{}", answer.response);
            for (i, result) in answer.validation_results.iter().enumerate() {
                if result.warnings.is_empty() && result.suggestions.is_empty() {
                    continue;
                }
                println!("\nCode block {}:", i + 1);
                for w in &result.warnings {
                    println!("  warning: {}", w);
                }
                for s in &result.suggestions {
                    println!("  suggestion: {}", s);
                }
            }
            if let Some(err) = &answer.error {
                eprintln!("\nError: {}", err);
            }
        }
        Commands::Stats => {
            let state = AppState::new(cfg);
            let index = state.index().await?;
            let stats = index.stats().await?;
            println!("Documents:           {}", stats.total_documents);
            println!("Chunks:              {}", stats.total_chunks);
            println!("Embedding dimension: {}", stats.embedding_dimension);
        }
        Commands::List => {
            let state = AppState::new(cfg);
            let index = state.index().await?;
            let sources = index.list_sources().await?;
            if sources.is_empty() {
                println!("No documents indexed.");
            } else {
                for source in sources {
                    println!("{}", source);
                }
            }
        }
        Commands::Clear => {
            let state = AppState::new(cfg);
            let index = state.index().await?;
            index.clear().await?;
            println!("Index cleared.");
        }
        Commands::Token => match cfg.server.secret_key.as_deref() {
            Some(secret_key) if !secret_key.is_empty() => {
                println!("{}", server::derive_token(secret_key));
            }
            _ => {
                anyhow::bail!("[server].secret_key is not set in the configuration file");
            }
        },
        Commands::Serve => {
            server::run_server(Arc::new(AppState::new(cfg))).await?;
        }
    }

    Ok(())
}

//! # Zhora CLI (`zhora`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `zhora init` | Create the storage directories and database schema |
//! | `zhora serve` | Start the HTTP server and background sync |
//! | `zhora ingest <path>` | Ingest a local file and wait for it to be stored |
//! | `zhora ask "<question>"` | Answer a question from project memory |
//! | `zhora documents` | List stored documents |
//! | `zhora reconcile` | Repair the vector index against the documents table |
//!
//! ## Examples
//!
//! ```bash
//! zhora init --config ./config/zhora.toml
//! zhora ingest ./site-walk.mp4
//! zhora ask "when is the crane inspection?"
//! zhora serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zhora::config::{self, Config};
use zhora::ingest::{process_file, save_upload, stored_name};
use zhora::providers::Providers;
use zhora::settings::ApiKeyStore;
use zhora::store::DocumentStore;
use zhora::{ask, migrate, server};

/// Zhora: project memory built from uploaded files.
#[derive(Parser)]
#[command(name = "zhora", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/zhora.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/zhora.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage directories and database schema. Idempotent.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Copy a local file into raw storage and run the ingestion pipeline on it.
    Ingest {
        /// File to ingest.
        path: PathBuf,
    },

    /// Ask a question against stored documents.
    Ask {
        query: String,
    },

    /// List stored documents, oldest first.
    Documents,

    /// Rebuild missing vector entries and drop orphaned ones.
    Reconcile,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "zhora=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            for dir in [&cfg.storage.raw_dir, &cfg.storage.context_dir] {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let status = migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            if !status.vector_search {
                println!("Vector search is disabled; questions will find no documents.");
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { path } => {
            ingest_local(&cfg, &path).await?;
        }
        Commands::Ask { query } => {
            let providers = providers(&cfg)?;
            let response = ask::ask(&cfg, &providers, &query).await?;
            println!("{}", response.answer);
            if let Some(sources) = &response.sources {
                println!();
                println!("Sources:");
                for s in sources {
                    println!("  - {}", s);
                }
            }
            if !response.outcome.is_success() {
                eprintln!("note: answer is a placeholder ({:?})", response.outcome);
            }
        }
        Commands::Documents => {
            let store = DocumentStore::open(&cfg).await?;
            let docs = store.list().await;
            store.close().await;
            let docs = docs?;

            if docs.is_empty() {
                println!("No documents stored.");
            }
            for doc in docs {
                println!("{:>5}  {}", doc.id, doc.filename);
                let context = doc.context_text();
                let preview: String = context.chars().take(100).collect();
                println!("       {}", preview.replace('\n', " "));
            }
        }
        Commands::Reconcile => {
            let store = DocumentStore::open(&cfg).await?;
            let report = store.reconcile().await;
            store.close().await;
            let report = report?;
            println!(
                "Reconciled vector index: {} restored, {} pruned.",
                report.restored, report.pruned
            );
        }
    }

    Ok(())
}

fn providers(cfg: &Config) -> anyhow::Result<Providers> {
    Providers::openai(cfg, ApiKeyStore::from_config(&cfg.openai))
}

async fn ingest_local(cfg: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(stored_name)
        .with_context(|| format!("not a file name: {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    save_upload(cfg, &name, &bytes).await?;
    let report = process_file(cfg, &providers(cfg)?, &name).await?;

    println!("Stored {} as document {} ({}).", report.filename, report.id, report.kind.as_str());
    println!("  analysis:  {:?}", report.analysis);
    println!("  embedding: {:?}", report.embedding);
    println!("  snapshot:  {}", report.snapshot_path.display());
    Ok(())
}

//! Thin CLI surface over the core library. The MCP tool-registration/
//! transport layer is out of scope (spec §1); this binary exists so the
//! core is independently operable from a terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use obsidianrag_core::config::{self, resolve_vault_root};
use obsidianrag_core::connections::{suggest_connections, ConnectionOptions};
use obsidianrag_core::embeddings::{EmbeddingBackend, Model2VecBackend};
use obsidianrag_core::vault::VaultContext;
use obsidianrag_core::write_path::{self, CreateArgs};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "obsidianrag-core")]
#[command(version)]
#[command(about = "Hybrid-retrieval core over a Markdown vault")]
struct Cli {
    /// Vault root; overrides OBSIDIAN_VAULT_PATH when given.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build or refresh the index (full or incremental as needed).
    Index {
        #[arg(long)]
        force: bool,
    },
    /// Run a hybrid query and print the top results.
    Query {
        question: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Suggest unlinked connections between notes.
    Connections {
        #[arg(long, default_value_t = 0.70)]
        threshold: f32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Suggest a folder for new content.
    SuggestFolder { content: String },
    /// Create a new note.
    Create {
        title: String,
        body: String,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// List configured skills.
    Skills,
}

fn open_vault(cli: &Cli) -> Result<VaultContext> {
    let root = match &cli.vault {
        Some(p) => std::fs::canonicalize(p).context("vault path does not exist")?,
        None => resolve_vault_root().map_err(|e| anyhow::anyhow!(e.to_string()))?,
    };
    let embedder: Arc<dyn EmbeddingBackend> =
        Arc::new(Model2VecBackend::from_pretrained(Model2VecBackend::DEFAULT_MODEL).map_err(|e| anyhow::anyhow!(e.to_string()))?);
    VaultContext::open(&root, embedder).map_err(|e| anyhow::anyhow!(e.to_string()))
}

fn main() -> Result<()> {
    let _log_level = config::LogLevel::from_env();
    let cli = Cli::parse();

    match &cli.cmd {
        Command::Index { force } => {
            let ctx = open_vault(&cli)?;
            let stats = ctx.indexer.ensure_index(*force);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "docs_processed": stats.docs_processed,
                "docs_new": stats.docs_new,
                "docs_modified": stats.docs_modified,
                "docs_deleted": stats.docs_deleted,
                "is_incremental": stats.is_incremental,
                "time_seconds": stats.time_seconds,
                "success": stats.success,
            }))?);
        }
        Command::Query { question, limit } => {
            let ctx = open_vault(&cli)?;
            ctx.indexer.ensure_index(false);
            let hits = ctx.retriever.retrieve(question, None).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            for hit in hits.into_iter().take(*limit) {
                println!("{:.3}\t{}", hit.score, hit.chunk.source);
            }
        }
        Command::Connections { threshold, limit } => {
            let ctx = open_vault(&cli)?;
            ctx.indexer.ensure_index(false);
            let opts = ConnectionOptions { threshold: *threshold, limit: *limit, ..Default::default() };
            for s in suggest_connections(ctx.store.as_ref(), &opts) {
                println!("{} <-> {} ({:.2}): {}", s.note_a, s.note_b, s.similarity, s.reason);
            }
        }
        Command::SuggestFolder { content } => {
            let ctx = open_vault(&cli)?;
            ctx.indexer.ensure_index(false);
            let candidates = obsidianrag_core::suggest::suggest_folder(&ctx.retriever, content, 10, 3);
            for c in candidates {
                println!("{} (confidence {:.2}, votes {})", c.folder, c.confidence, c.votes);
            }
        }
        Command::Create { title, body, folder, tags } => {
            let ctx = open_vault(&cli)?;
            let templates_folder = ctx.templates_folder();
            let path = write_path::create(
                &ctx.root,
                &ctx.forbidden,
                Some(ctx.retriever.as_ref()),
                templates_folder.as_deref(),
                CreateArgs { title, body, folder: folder.as_deref(), tags_csv: tags, template_name: None, agent: None },
            )
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("created {}", path.display());
        }
        Command::Skills => {
            let ctx = open_vault(&cli)?;
            for skill in ctx.skills() {
                println!("{}: {}", skill.name, skill.description);
            }
        }
    }

    Ok(())
}

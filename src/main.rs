//! Repo-QA command line
//!
//! `serve` (the default) runs the HTTP API; the other subcommands drive the
//! same [`Assistant`] from the terminal.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use repo_qa::api::{create_app, ApiState};
use repo_qa::config::{defaults, AppConfig};
use repo_qa::{Assistant, Providers};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "repo-qa")]
#[command(about = "Answer questions about a markdown corpus with retrieval-augmented generation")]
#[command(version)]
struct CliArgs {
    /// Config file (default: $REPO_QA_CONFIG, then ./repo_qa.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use the built-in hashing embedder and extractive generator instead
    /// of a model server
    #[arg(long, global = true)]
    offline: bool,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the HTTP API
    Serve {
        /// Override the server address (default: server.addr)
        #[arg(short, long, value_name = "HOST:PORT")]
        addr: Option<String>,
    },
    /// Answer one question and exit
    Ask {
        question: String,
        /// Also print the retrieved chunks
        #[arg(long)]
        sources: bool,
    },
    /// Interactive session on stdin
    Chat,
    /// Discard the persisted knowledge base and rebuild it now
    Rebuild,
    /// Discard the persisted knowledge base; it is rebuilt on next use
    Reinit,
    /// Print knowledge base status as JSON
    Status,
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let config = match &args.config {
        Some(path) => {
            let mut config = AppConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => AppConfig::load(),
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn build_assistant(config: &AppConfig, offline: bool) -> Result<Assistant> {
    let providers = if offline {
        Providers::offline(defaults::OFFLINE_DIMENSION)
    } else {
        Providers::connect(&config.provider)
            .await
            .context("No model server available (start one, or pass --offline)")?
    };
    Ok(Assistant::new(config, providers)?)
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_serve(config: &AppConfig, assistant: Assistant, addr: Option<String>) -> Result<()> {
    let addr = addr.unwrap_or_else(|| config.server.addr.clone());

    if let Err(e) = assistant.initialize().await {
        // Status and the reinitialize/update endpoints stay available
        warn!(error = %e, "Knowledge base not ready at startup");
    }

    let app = create_app(ApiState::new(Arc::new(assistant)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(addr = %addr, "HTTP API listening");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
        })
        .await
        .context("HTTP server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn run_ask(assistant: &Assistant, question: &str, sources: bool) -> Result<()> {
    let reply = assistant.ask(question).await;
    println!("{}", reply.answer);

    if sources {
        for hit in &reply.sources {
            println!("\n--- {} (score {:.4})\n{}", hit.chunk_id, hit.score, hit.chunk_text);
        }
    }
    if reply.is_error {
        bail!("question could not be answered");
    }
    Ok(())
}

const CHAT_HELP: &str = "Commands: /new  /clear  /export [DIR]  /status  /reinit  /update  /quit";

async fn run_chat(assistant: &Assistant) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{CHAT_HELP}");
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "" => {}
            "/quit" | "/exit" => break,
            "/help" => println!("{CHAT_HELP}"),
            "/new" => println!("Conversation {}", assistant.new_conversation().await),
            "/clear" => {
                assistant.clear_conversation().await;
                println!("Conversation cleared");
            }
            "/export" => {
                let dir = if rest.trim().is_empty() { "." } else { rest.trim() };
                let path = assistant
                    .export_conversation()
                    .await
                    .write_to(std::path::Path::new(dir))
                    .context("Failed to write transcript")?;
                println!("Saved {}", path.display());
            }
            "/status" => println!("{}", serde_json::to_string_pretty(&assistant.status().await)?),
            "/reinit" => match assistant.reinitialize().await {
                Ok(()) => println!("Knowledge base cleared; it will be rebuilt on the next question"),
                Err(e) => println!("Error: {e}"),
            },
            "/update" => match assistant.update_knowledge_base().await {
                Ok(summary) => println!(
                    "Knowledge base rebuilt: {} documents, {} chunks",
                    summary.documents, summary.embedded
                ),
                Err(e) => println!("Error: {e}"),
            },
            _ => println!("{}", assistant.submit(line).await),
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_tracing(args.log_json || config.logging.json);

    info!(
        corpus = %config.corpus.root.display(),
        index = %config.index.path.display(),
        offline = args.offline,
        "Repo-QA starting"
    );

    let assistant = build_assistant(&config, args.offline).await?;

    match args.command.unwrap_or(SubCommand::Serve { addr: None }) {
        SubCommand::Serve { addr } => run_serve(&config, assistant, addr).await,
        SubCommand::Ask { question, sources } => run_ask(&assistant, &question, sources).await,
        SubCommand::Chat => run_chat(&assistant).await,
        SubCommand::Rebuild => {
            let summary = assistant.update_knowledge_base().await?;
            println!("{}", serde_json::to_string_pretty(summary.as_ref())?);
            Ok(())
        }
        SubCommand::Reinit => {
            assistant.reinitialize().await?;
            println!("Knowledge base cleared");
            Ok(())
        }
        SubCommand::Status => {
            if let Err(e) = assistant.initialize().await {
                error!(error = %e, "Knowledge base unavailable");
            }
            println!("{}", serde_json::to_string_pretty(&assistant.status().await)?);
            Ok(())
        }
    }
}

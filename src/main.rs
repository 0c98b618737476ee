//! Main module for the docchat CLI application.
//!
//! Installs logging, parses the command line, loads configuration and the API key,
//! and hands over to the chat or document session.
//!
//! # Examples
//!
//! ```sh
//! docchat init
//! docchat ask "What is the meaning of life?"
//! docchat chat
//! docchat ingest paper.pdf --query "What is the main result?"
//! docchat docs notes.md paper.pdf
//! ```
//!
//! Set `RUST_LOG=docchat=debug` to see what is going on underneath.

use clap::Parser;
use once_cell::sync::OnceCell;
use std::{error::Error, fs, path::Path, process::ExitCode};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use docchat::{
    chat::ChatSession,
    commands::{Cli, Commands},
    config::{DocChatConfig, PLACEHOLDER_API_KEY, Secrets, load_config, resolve_api_key},
    config_dir,
    ingest::{ChunkParams, DocumentSession, IngestionPipeline, StandardExtractor, create_embedder},
    interactive::{chat_loop, docs_loop, search_and_show, stage_files},
    responder::OpenAiResponder,
    surface::{Surface, TerminalSurface},
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> ExitCode {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    });

    let cli = Cli::parse();
    let mut surface = TerminalSurface::new();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            surface.error(&format!("cannot start the async runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, &mut surface)) {
        Ok(code) => code,
        Err(e) => {
            surface.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

/// Dispatch one subcommand.
///
/// # Errors
/// Configuration or secret problems, and anything that stops a command before it
/// can report on the surface by itself.
async fn run(cli: Cli, surface: &mut TerminalSurface) -> Result<ExitCode, Box<dyn Error>> {
    let config_dir = config_dir()?;

    if let Commands::Init = cli.command {
        init(&config_dir)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.yaml"));
    let config = if config_path.exists() {
        load_config(&config_path)?
    } else if cli.config.is_some() {
        return Err(format!("config file {} does not exist", config_path.display()).into());
    } else {
        warn!("No config at {}, using defaults", config_path.display());
        DocChatConfig::default()
    };
    debug!("Config loaded: {:?}", config);

    let api_key = resolve_api_key(cli.api_key.as_deref(), config_dir.join("secrets.yaml"))?;

    match cli.command {
        Commands::Init => Ok(ExitCode::SUCCESS),
        Commands::Ask { question } => {
            let mut chat = chat_session(&config, &api_key);
            let reply = chat.send(&question, surface).await?;
            Ok(if reply.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Chat => {
            let mut chat = chat_session(&config, &api_key);
            chat_loop(&mut chat, std::io::stdin().lock(), surface).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Docs { files } => {
            let mut docs = document_session(&config, &api_key)?;
            stage_files(&mut docs, &files, surface);
            docs_loop(&mut docs, std::io::stdin().lock(), surface).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ingest {
            files,
            query,
            top_k,
        } => {
            let mut docs = document_session(&config, &api_key)?;
            stage_files(&mut docs, &files, surface);
            if docs.build_knowledge_base(surface).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            if let Some(query) = query {
                search_and_show(&mut docs, &query, top_k, surface).await;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn chat_session(config: &DocChatConfig, api_key: &str) -> ChatSession {
    let responder = OpenAiResponder::new(config, api_key);
    ChatSession::new(Box::new(responder), config.model.clone(), config.greeting.clone())
}

fn document_session(
    config: &DocChatConfig,
    api_key: &str,
) -> Result<DocumentSession, Box<dyn Error>> {
    let pipeline = IngestionPipeline::new(
        Box::new(StandardExtractor),
        create_embedder(config, api_key)?,
        ChunkParams::try_from(&config.chunking)?,
        config.embedding.batch_size,
    );
    Ok(DocumentSession::new(pipeline))
}

/// Write default `config.yaml` and `secrets.yaml`, leaving existing files alone.
///
/// # Errors
/// The directory or a file cannot be written.
fn init(config_dir: &Path) -> Result<(), Box<dyn Error>> {
    info!("Creating config directory: {}", config_dir.display());
    fs::create_dir_all(config_dir)?;

    let config_path = config_dir.join("config.yaml");
    if config_path.exists() {
        println!("Keeping existing {}", config_path.display());
    } else {
        fs::write(&config_path, serde_yaml::to_string(&DocChatConfig::default())?)?;
        println!("Wrote {}", config_path.display());
    }

    let secrets_path = config_dir.join("secrets.yaml");
    if secrets_path.exists() {
        println!("Keeping existing {}", secrets_path.display());
    } else {
        let secrets = Secrets {
            api_key: Some(PLACEHOLDER_API_KEY.to_string()),
        };
        fs::write(&secrets_path, serde_yaml::to_string(&secrets)?)?;
        println!(
            "Wrote {}; replace {} with your API key",
            secrets_path.display(),
            PLACEHOLDER_API_KEY
        );
    }
    Ok(())
}

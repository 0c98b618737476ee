//! This module provides functionality for loading and handling the application's configuration.
//!
//! Two YAML files live in the per-platform config directory (see [`crate::config_dir`]):
//!
//! - `config.yaml` holds the non-secret settings ([`DocChatConfig`]).
//! - `secrets.yaml` is the secret store and holds the API key ([`Secrets`]).
//!
//! Keeping the key out of `config.yaml` means the settings file can be shared or
//! committed without leaking credentials.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use docchat::config::load_config;
//!
//! let config = load_config("/path/to/config.yaml").unwrap();
//! println!("talking to {} at {}", config.model, config.api_base);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};

use tracing::*;

use crate::error::StartupError;

/// The value `docchat init` writes into `secrets.yaml`. It is rejected at startup.
pub const PLACEHOLDER_API_KEY: &str = "CHANGEME";

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct DocChatConfig {
    /// The base URL of an OpenAI compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// The chat model every conversation is bound to.
    #[serde(default = "default_model")]
    pub model: String,

    /// The assistant turn a fresh chat transcript starts with.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Optional instructions sent ahead of every conversation.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Ask the models endpoint whether `model` exists before opening a conversation.
    #[serde(default = "default_verify_model")]
    pub verify_model: bool,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Sliding-window parameters, measured in characters.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

/// Which embedding backend to use.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// The `/embeddings` endpoint of the configured API.
    OpenAi,
    /// A MiniLM sentence-embedding model run in-process.
    Local,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,
    /// Model identifier; when unset the provider's default is used.
    #[serde(default)]
    pub model: Option<String>,
    /// Texts per embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// The configured model, or the usual choice for the provider.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, EmbeddingProvider::OpenAi) => "text-embedding-004",
            (None, EmbeddingProvider::Local) => "sentence-transformers/all-MiniLM-L6-v2",
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_greeting() -> String {
    "Hello! I'm a chatbot backed by a large language model. How can I help you today?"
        .to_string()
}
fn default_verify_model() -> bool {
    true
}
fn default_chunk_size() -> usize {
    10_000
}
fn default_chunk_overlap() -> usize {
    1_000
}
fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::OpenAi
}
fn default_batch_size() -> usize {
    64
}

impl Default for DocChatConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            greeting: default_greeting(),
            system_prompt: None,
            verify_model: default_verify_model(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl DocChatConfig {
    /// Reject values that would only fail later, in the middle of a session.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.model.trim().is_empty() {
            return Err(StartupError::Config("`model` must not be empty".into()));
        }
        if self.chunking.size == 0 {
            return Err(StartupError::Config("`chunking.size` must be positive".into()));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(StartupError::Config(format!(
                "`chunking.overlap` ({}) must be smaller than `chunking.size` ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(StartupError::Config(
                "`embedding.batch_size` must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// Missing keys fall back to their defaults, so an empty file is a valid
/// configuration. The result is validated before it is returned.
///
/// # Errors
///
/// - The file cannot be read.
/// - The content is not valid YAML for [`DocChatConfig`].
/// - A value fails [`DocChatConfig::validate`].
pub fn load_config(file: impl AsRef<Path>) -> Result<DocChatConfig, Box<dyn Error>> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: DocChatConfig = if content.trim().is_empty() {
        DocChatConfig::default()
    } else {
        serde_yaml::from_str(&content)?
    };
    config.validate()?;
    Ok(config)
}

/// Values read from the secret store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Secrets {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Resolve the API key.
///
/// An explicit value (from `--api-key` or `DOCCHAT_API_KEY`) wins over the
/// secret store. An unreadable store, an empty value and the `init`
/// placeholder all count as absent.
///
/// # Errors
///
/// [`StartupError::MissingSecret`] when no usable key is found.
pub fn resolve_api_key(
    explicit: Option<&str>,
    secrets_file: impl AsRef<Path>,
) -> Result<String, StartupError> {
    let secrets_file = secrets_file.as_ref();

    let candidate = match explicit {
        Some(key) => Some(key.to_string()),
        None => match fs::read_to_string(secrets_file) {
            Ok(content) => match serde_yaml::from_str::<Secrets>(&content) {
                Ok(secrets) => secrets.api_key,
                Err(e) => {
                    warn!("Ignoring unparsable secret store {}: {}", secrets_file.display(), e);
                    None
                }
            },
            Err(e) => {
                debug!("No secret store at {}: {}", secrets_file.display(), e);
                None
            }
        },
    };

    match candidate.map(|key| key.trim().to_string()) {
        Some(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY => Ok(key),
        _ => Err(StartupError::MissingSecret {
            name: "api_key".to_string(),
            location: secrets_file.display().to_string(),
        }),
    }
}

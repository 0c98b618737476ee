//! # docchat (library root)
//!
//! Two small terminal applications over hosted language models:
//!
//! - a **chat session** that streams answers from an OpenAI compatible endpoint
//!   ([`chat`], [`responder`]), and
//! - a **document session** that extracts text from PDFs and text files, chunks and
//!   embeds it, and keeps the vectors in an in-memory HNSW index ([`ingest`]).
//!
//! The two share nothing but the plumbing: configuration ([`config`]), the error
//! taxonomy ([`error`]), the [`transcript::Transcript`] type and the terminal
//! [`surface`] they report through.
//!
//! ## Configuration directory
//! `config.yaml` and `secrets.yaml` live in the per-platform config directory returned
//! by [`config_dir`], e.g.:
//!
//! - Linux (XDG): `~/.config/docchat`
//! - macOS: `~/Library/Application Support/com.docchat.docchat`
//! - Windows: `C:\Users\<you>\AppData\Roaming\docchat\docchat\config`

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod interactive;
pub mod pretty;
pub mod responder;
pub mod surface;
pub mod transcript;

#[cfg(test)]
mod testing;

/// Returns the per-platform configuration directory for docchat.
///
/// # Errors
/// Fails when no home directory can be determined.
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "docchat", "docchat")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

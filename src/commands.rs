//! This module defines the command-line interface for the application using `clap`.
//!
//! [`Cli`] holds the global options, [`Commands`] the subcommands. The chat
//! subcommands (`ask`, `chat`) and the document subcommands (`docs`, `ingest`)
//! drive independent sessions.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use docchat::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    propagate_version = true,
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    /// Read settings from this file instead of the per-platform `config.yaml`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API key; takes precedence over `secrets.yaml`.
    #[arg(long, global = true, env = "DOCCHAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write default `config.yaml` and `secrets.yaml` into the config directory.
    Init,

    /// Ask a single question and stream the answer.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question to send.
        question: String,
    },

    /// Start an interactive chat session.
    ///
    /// Can be invoked with either 'chat' or 'i'.
    #[clap(name = "chat", alias = "i")]
    Chat,

    /// Start an interactive document session, optionally staging files first.
    #[clap(name = "docs")]
    Docs {
        /// PDF, `.txt` or `.md` files to stage.
        files: Vec<PathBuf>,
    },

    /// Build a knowledge base from files and optionally query it once.
    #[clap(name = "ingest")]
    Ingest {
        /// PDF, `.txt` or `.md` files to index.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Look this up in the freshly built index.
        #[arg(long, short = 'q')]
        query: Option<String>,

        /// Number of passages to return for `--query`.
        #[arg(long, short = 'k', default_value_t = 3)]
        top_k: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["docchat", "ask", "what is rust?"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ask { ref question } if question == "what is rust?"
        ));
    }

    #[test]
    fn test_chat_alias() {
        let cli = Cli::try_parse_from(["docchat", "i"]).unwrap();
        assert!(matches!(cli.command, Commands::Chat));
    }

    #[test]
    fn test_parse_ingest_with_query() {
        let cli = Cli::try_parse_from([
            "docchat", "ingest", "a.pdf", "b.txt", "--query", "summary", "-k", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Ingest {
                files,
                query,
                top_k,
            } => {
                assert_eq!(files, vec![PathBuf::from("a.pdf"), PathBuf::from("b.txt")]);
                assert_eq!(query.as_deref(), Some("summary"));
                assert_eq!(top_k, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_ingest_requires_files() {
        assert!(Cli::try_parse_from(["docchat", "ingest"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["docchat", "docs", "--config", "/tmp/c.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Commands::Docs { ref files } if files.is_empty()));
    }
}

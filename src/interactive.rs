//! Read-eval loops for the `chat` and `docs` subcommands.
//!
//! Both loops read one line at a time from any [`BufRead`], so tests can drive
//! them from a byte slice. Typing `exit` (or closing the input) ends the loop.

use crossterm::{
    ExecutableCommand,
    style::{Color, Print, SetForegroundColor},
};
use std::error::Error;
use std::io::{BufRead, Write, stdout};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::chat::ChatSession;
use crate::error::SearchError;
use crate::ingest::{Document, DocumentSession};
use crate::surface::Surface;

const DEFAULT_TOP_K: usize = 3;

fn prompt(label: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    out.execute(SetForegroundColor(Color::Green))?;
    out.execute(Print(format!("\n{label}> ")))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    out.flush()?;
    Ok(())
}

fn read_line(input: &mut impl BufRead) -> Result<Option<String>, Box<dyn Error>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn is_exit(line: &str) -> bool {
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Chat until `exit` or end of input.
///
/// A session that cannot be created ends the loop with an error on the surface.
///
/// # Errors
/// Reading the input fails.
pub async fn chat_loop(
    chat: &mut ChatSession,
    mut input: impl BufRead,
    surface: &mut dyn Surface,
) -> Result<(), Box<dyn Error>> {
    for turn in chat.transcript() {
        surface.show_turn(turn);
    }

    loop {
        prompt("you")?;
        let Some(line) = read_line(&mut input)? else {
            break;
        };
        if is_exit(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Err(e) = chat.send(&line, surface).await {
            surface.error(&e.to_string());
            break;
        }
    }
    Ok(())
}

/// One line of input to the document session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocsCommand {
    Add(Vec<PathBuf>),
    List,
    Clear,
    Build,
    Search { query: String, top_k: usize },
    Help,
    Exit,
}

impl DocsCommand {
    /// Parse a `:command`. Bare text is a search with the default `top_k`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if is_exit(line) {
            return Ok(DocsCommand::Exit);
        }

        let Some(rest) = line.strip_prefix(':') else {
            return Ok(DocsCommand::Search {
                query: line.to_string(),
                top_k: DEFAULT_TOP_K,
            });
        };

        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let args = args.trim();
        match name {
            "add" if !args.is_empty() => Ok(DocsCommand::Add(
                args.split_whitespace().map(PathBuf::from).collect(),
            )),
            "add" => Err("usage: :add FILE...".to_string()),
            "list" | "ls" => Ok(DocsCommand::List),
            "clear" => Ok(DocsCommand::Clear),
            "build" => Ok(DocsCommand::Build),
            "help" | "h" => Ok(DocsCommand::Help),
            "search" | "s" => parse_search(args),
            other => Err(format!("unknown command :{other} (try :help)")),
        }
    }
}

/// `[-k N] QUERY...`
fn parse_search(args: &str) -> Result<DocsCommand, String> {
    let mut top_k = DEFAULT_TOP_K;
    let mut query = args;
    if let Some(rest) = args.strip_prefix("-k") {
        let rest = rest.trim_start();
        let (count, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        top_k = count
            .parse()
            .map_err(|_| format!("`{count}` is not a number of results"))?;
        query = tail.trim();
    }
    if query.is_empty() {
        return Err("usage: :search [-k N] QUERY".to_string());
    }
    Ok(DocsCommand::Search {
        query: query.to_string(),
        top_k,
    })
}

const DOCS_HELP: &str = "\
:add FILE...          stage PDF, .txt or .md files
:list                 show staged files
:clear                unstage every file
:build                build the knowledge base from the staged files
:search [-k N] QUERY  look up passages (bare text works too)
exit                  leave";

/// Stage every file, reporting the ones that cannot be read.
pub fn stage_files(docs: &mut DocumentSession, files: &[PathBuf], surface: &mut dyn Surface) {
    for path in files {
        match Document::from_path(path) {
            Ok(document) => {
                surface.status(&format!("staged {}", document.name()));
                docs.add_document(document);
            }
            Err(e) => {
                warn!("Cannot stage {}: {}", path.display(), e);
                surface.warning(&format!("cannot stage {}: {}", path.display(), e));
            }
        }
    }
}

/// Run a lookup and print the hits through the surface.
pub async fn search_and_show(
    docs: &mut DocumentSession,
    query: &str,
    top_k: usize,
    surface: &mut dyn Surface,
) {
    let outcome = docs.search(query, top_k).await.map(|hits| hits.len());
    match outcome {
        Ok(count) => {
            debug!("{} passage(s) found", count);
            if let Some(answer) = docs.transcript().last() {
                surface.show_turn(answer);
            }
        }
        Err(SearchError::NoIndex) => {
            surface.warning("build a knowledge base first (:add FILE..., then :build)")
        }
        Err(e) => surface.error(&e.to_string()),
    }
}

/// Drive a [`DocumentSession`] until `exit` or end of input.
///
/// # Errors
/// Reading the input fails.
pub async fn docs_loop(
    docs: &mut DocumentSession,
    mut input: impl BufRead,
    surface: &mut dyn Surface,
) -> Result<(), Box<dyn Error>> {
    surface.status("Type :help for commands.");

    loop {
        prompt("docs")?;
        let Some(line) = read_line(&mut input)? else {
            break;
        };
        if line.is_empty() {
            continue;
        }

        let command = match DocsCommand::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                surface.warning(&message);
                continue;
            }
        };
        debug!("Document command {:?}", command);

        match command {
            DocsCommand::Exit => break,
            DocsCommand::Help => surface.status(DOCS_HELP),
            DocsCommand::Add(files) => stage_files(docs, &files, surface),
            DocsCommand::List => {
                if docs.documents().is_empty() {
                    surface.status("no documents staged");
                }
                for document in docs.documents() {
                    surface.status(&format!(
                        "{} ({:?}, {} bytes)",
                        document.name(),
                        document.kind(),
                        document.bytes().len()
                    ));
                }
            }
            DocsCommand::Clear => {
                docs.clear_documents();
                surface.status("staged documents cleared");
            }
            DocsCommand::Build => {
                // Failures were already reported by the pipeline.
                if let Ok(None) = docs.build_knowledge_base(surface).await {
                    surface.warning(
                        "nothing was indexed; the previous knowledge base is still active",
                    );
                }
            }
            DocsCommand::Search { query, top_k } => {
                search_and_show(docs, &query, top_k, surface).await
            }
        }
    }
    Ok(())
}

//! # Pretty Printing
//!
//! Terminal rendering of markdown-formatted model output.
//!
//! - [`print_pretty`] renders a complete piece of text at once (used for turns that
//!   are already in the transcript).
//! - [`PrettyPrinter`] renders a reply while it streams in. It buffers fragments
//!   until a full line is available, so markdown that spans fragment boundaries
//!   still renders correctly.
//!
//! | Markdown | Terminal |
//! |----------|----------|
//! | `# Header` | bold cyan |
//! | `**bold**` | bold |
//! | `*italic*` | italic |
//! | `` `code` `` | yellow |
//! | fenced code | syntax highlighted with `base16-ocean.dark` |
//!
//! Everything is written to a caller-supplied [`Write`], so the same code renders to
//! stdout in the binary and to a `Vec<u8>` in tests.

use crossterm::{
    QueueableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::io::Write;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

const FENCE: &str = "```";

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").expect("valid regex"));

fn theme() -> &'static Theme {
    &THEMES.themes["base16-ocean.dark"]
}

/// Print markdown text with pretty formatting and syntax-highlighted code blocks.
///
/// # Errors
/// Returns IO errors if writing to `out` fails.
pub fn print_pretty<W: Write>(text: &str, out: &mut W) -> Result<(), Box<dyn Error>> {
    let mut printer = PrettyPrinter::new(out);
    printer.add_chunk(text)?;
    printer.flush()?;
    Ok(())
}

/// Render one line of regular markdown and terminate it.
fn print_markdown_line<W: Write>(line: &str, out: &mut W) -> Result<(), Box<dyn Error>> {
    let header = line
        .strip_prefix("### ")
        .or_else(|| line.strip_prefix("## "))
        .or_else(|| line.strip_prefix("# "));

    if let Some(title) = header {
        out.queue(SetForegroundColor(Color::Cyan))?;
        out.queue(SetAttribute(Attribute::Bold))?;
        write!(out, "{title}")?;
        out.queue(SetAttribute(Attribute::Reset))?;
        out.queue(SetForegroundColor(Color::Reset))?;
    } else {
        write!(out, "{}", render_inline(line))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Apply inline code, bold and italic styling as raw ANSI sequences.
fn render_inline(line: &str) -> String {
    let styled = INLINE_CODE.replace_all(line, "\x1b[33m$1\x1b[39m");
    let styled = BOLD.replace_all(&styled, "\x1b[1m$1\x1b[22m");
    let styled = ITALIC.replace_all(&styled, "\x1b[3m$1\x1b[23m");
    styled.into_owned()
}

/// Print a code block with syntax highlighting
fn print_code_block<W: Write>(
    code: &str,
    language: &str,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    if !language.is_empty() {
        out.queue(SetForegroundColor(Color::DarkGrey))?;
        out.queue(SetAttribute(Attribute::Italic))?;
        writeln!(out, "[{language}]")?;
        out.queue(SetAttribute(Attribute::Reset))?;
        out.queue(SetForegroundColor(Color::Reset))?;
    }

    let ps = &*SYNTAXES;
    let syntax = ps
        .find_syntax_by_token(language)
        .or_else(|| ps.find_syntax_by_extension(language))
        .or_else(|| match language.to_lowercase().as_str() {
            "py" => ps.find_syntax_by_extension("python"),
            "js" | "javascript" => ps.find_syntax_by_extension("js"),
            "rs" => ps.find_syntax_by_extension("rust"),
            "sh" | "bash" | "shell" => ps.find_syntax_by_extension("sh"),
            "yml" => ps.find_syntax_by_extension("yaml"),
            _ => None,
        })
        .unwrap_or_else(|| ps.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, theme());
    for line in LinesWithEndings::from(code) {
        let ranges: Vec<(Style, &str)> = highlighter.highlight_line(line, ps)?;
        write!(out, "{}", as_24_bit_terminal_escaped(&ranges[..], false))?;
        out.queue(SetAttribute(Attribute::Reset))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Streaming markdown renderer.
///
/// Fragments are buffered until a newline arrives. Complete lines are rendered
/// immediately, except inside a fenced code block, where lines are collected and
/// the whole block is highlighted when the closing fence arrives.
pub struct PrettyPrinter<W: Write> {
    out: W,
    /// Text after the last newline.
    buffer: String,
    in_code_block: bool,
    code_language: String,
    code_content: String,
}

impl<W: Write> PrettyPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buffer: String::new(),
            in_code_block: false,
            code_language: String::new(),
            code_content: String::new(),
        }
    }

    /// Add a text fragment and print any complete markdown elements.
    ///
    /// # Errors
    /// Returns an error if writing to the terminal fails.
    pub fn add_chunk(&mut self, chunk: &str) -> Result<(), Box<dyn Error>> {
        self.buffer.push_str(chunk);

        while let Some(newline_idx) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_idx).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']))?;
        }

        self.out.flush()?;
        Ok(())
    }

    fn process_line(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        let fence = line.trim_start().strip_prefix(FENCE);

        match (self.in_code_block, fence) {
            (false, Some(language)) => {
                self.in_code_block = true;
                self.code_language = language.trim().to_string();
            }
            (false, None) => print_markdown_line(line, &mut self.out)?,
            (true, Some(_)) => self.finish_code_block()?,
            (true, None) => {
                self.code_content.push_str(line);
                self.code_content.push('\n');
            }
        }
        Ok(())
    }

    fn finish_code_block(&mut self) -> Result<(), Box<dyn Error>> {
        print_code_block(&self.code_content, &self.code_language, &mut self.out)?;
        self.in_code_block = false;
        self.code_language.clear();
        self.code_content.clear();
        Ok(())
    }

    /// Render whatever is still buffered, including an unterminated code block.
    ///
    /// Call this once the stream has ended.
    pub fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.process_line(&rest)?;
        }
        if self.in_code_block {
            self.finish_code_block()?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(printer: PrettyPrinter<Vec<u8>>) -> String {
        String::from_utf8(printer.into_inner()).unwrap()
    }

    #[test]
    fn test_pretty_printer_buffers_partial_lines() {
        let mut printer = PrettyPrinter::new(Vec::new());

        printer.add_chunk("Hello ").unwrap();
        assert_eq!(printer.buffer, "Hello ");
        printer.add_chunk("world").unwrap();
        assert_eq!(printer.buffer, "Hello world");
        assert!(printer.out.is_empty());

        printer.add_chunk("!\nnext").unwrap();
        assert_eq!(printer.buffer, "next");
        assert!(rendered(printer).contains("Hello world!"));
    }

    #[test]
    fn test_pretty_printer_flush_renders_tail() {
        let mut printer = PrettyPrinter::new(Vec::new());
        printer.add_chunk("no newline").unwrap();
        printer.flush().unwrap();
        assert!(printer.buffer.is_empty());
        assert!(rendered(printer).contains("no newline"));
    }

    #[test]
    fn test_code_block_split_across_fragments() {
        let mut printer = PrettyPrinter::new(Vec::new());
        for fragment in ["Intro\n``", "`rust\nfn main", "() {}\n", "```\nAfter\n"] {
            printer.add_chunk(fragment).unwrap();
        }
        assert!(!printer.in_code_block);
        assert!(printer.code_content.is_empty());

        let out = rendered(printer);
        assert!(out.contains("Intro"));
        assert!(out.contains("[rust]"));
        assert!(out.contains("main"));
        assert!(out.contains("After"));
    }

    #[test]
    fn test_unterminated_code_block_is_flushed() {
        let mut printer = PrettyPrinter::new(Vec::new());
        printer.add_chunk("```\nlet x = 1;\n").unwrap();
        assert!(printer.in_code_block);
        printer.flush().unwrap();
        assert!(!printer.in_code_block);
        assert!(rendered(printer).contains("let x = 1;"));
    }

    #[test]
    fn test_render_inline_strips_markers() {
        let line = render_inline("use **bold** and *soft* and `code`");
        assert!(!line.contains("**"));
        assert!(!line.contains('`'));
        assert!(line.contains("bold"));
        assert!(line.contains("soft"));
    }

    #[test]
    fn test_print_pretty_headers() {
        let mut out = Vec::new();
        print_pretty("# Title\n\nBody text.", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Title"));
        assert!(!text.contains("# Title"));
        assert!(text.contains("Body text."));
    }
}

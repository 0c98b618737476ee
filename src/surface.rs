//! # Surface
//!
//! The user-facing side of both sessions. Session objects never print; they report
//! through a [`Surface`], which keeps the orchestration testable and leaves rendering
//! decisions to the implementation.
//!
//! [`TerminalSurface`] is the implementation used by the binary: colored role labels,
//! markdown rendering through [`crate::pretty`], and an `indicatif` progress bar while
//! chunks are embedded.
//!
//! Rendering failures are logged and otherwise ignored. A broken terminal must not
//! change what ends up in a transcript.

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::io::{Stdout, Write, stderr, stdout};
use tracing::warn;

use crate::pretty::{PrettyPrinter, print_pretty};
use crate::transcript::{Role, Turn};

/// Where sessions render their output.
pub trait Surface {
    /// Render a complete turn.
    fn show_turn(&mut self, turn: &Turn);

    /// An assistant reply is about to stream in.
    fn begin_reply(&mut self);

    /// One streamed fragment of the current reply.
    fn reply_fragment(&mut self, fragment: &str);

    /// The current reply has ended, successfully or not.
    fn end_reply(&mut self);

    fn error(&mut self, message: &str);

    fn warning(&mut self, message: &str);

    /// Progress of a long-running step, e.g. the ingestion stage that just started.
    fn status(&mut self, message: &str);

    /// `done` out of `total` units of `label` are finished.
    fn progress(&mut self, label: &str, done: usize, total: usize);
}

fn role_color(role: Role) -> Color {
    match role {
        Role::System => Color::DarkGrey,
        Role::User => Color::Green,
        Role::Assistant => Color::Blue,
    }
}

fn log_render_failure(result: Result<(), Box<dyn Error>>) {
    if let Err(e) = result {
        warn!("Terminal rendering failed: {}", e);
    }
}

/// [`Surface`] that writes to the terminal.
pub struct TerminalSurface {
    printer: Option<PrettyPrinter<Stdout>>,
    progress: Option<ProgressBar>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            printer: None,
            progress: None,
        }
    }

    fn label(role: Role) -> Result<(), Box<dyn Error>> {
        let mut out = stdout();
        out.execute(SetForegroundColor(role_color(role)))?;
        out.execute(SetAttribute(Attribute::Bold))?;
        writeln!(out, "{role}:")?;
        out.execute(SetAttribute(Attribute::Reset))?;
        out.execute(SetForegroundColor(Color::Reset))?;
        Ok(())
    }

    /// Drop a bar left over from a step that stopped before reaching its total.
    fn clear_progress(&mut self) {
        if let Some(bar) = self.progress.take() {
            bar.finish_and_clear();
        }
    }

    fn colored_line(color: Color, prefix: &str, message: &str) -> Result<(), Box<dyn Error>> {
        let mut err = stderr();
        err.execute(SetForegroundColor(color))?;
        writeln!(err, "{prefix}{message}")?;
        err.execute(SetForegroundColor(Color::Reset))?;
        Ok(())
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for TerminalSurface {
    fn show_turn(&mut self, turn: &Turn) {
        log_render_failure(Self::label(turn.role()).and_then(|_| {
            let mut out = stdout();
            print_pretty(turn.content(), &mut out)
        }));
    }

    fn begin_reply(&mut self) {
        log_render_failure(Self::label(Role::Assistant));
        self.printer = Some(PrettyPrinter::new(stdout()));
    }

    fn reply_fragment(&mut self, fragment: &str) {
        if let Some(printer) = self.printer.as_mut() {
            log_render_failure(printer.add_chunk(fragment));
        }
    }

    fn end_reply(&mut self) {
        if let Some(mut printer) = self.printer.take() {
            log_render_failure(printer.flush());
        }
    }

    fn error(&mut self, message: &str) {
        self.clear_progress();
        log_render_failure(Self::colored_line(Color::Red, "error: ", message));
    }

    fn warning(&mut self, message: &str) {
        log_render_failure(Self::colored_line(Color::Yellow, "warning: ", message));
    }

    fn status(&mut self, message: &str) {
        log_render_failure(Self::colored_line(Color::DarkGrey, "", message));
    }

    fn progress(&mut self, label: &str, done: usize, total: usize) {
        if done == 0 {
            self.clear_progress();
        }
        let bar = self.progress.get_or_insert_with(|| {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        bar.set_length(total as u64);
        bar.set_message(label.to_string());
        bar.set_position(done as u64);

        if done >= total {
            self.clear_progress();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_clears_an_unfinished_bar() {
        let mut surface = TerminalSurface::new();
        surface.progress("Embedding", 0, 3);
        surface.progress("Embedding", 1, 3);
        assert!(surface.progress.is_some());

        surface.error("embedding failed");
        assert!(surface.progress.is_none());
    }

    #[test]
    fn test_new_step_replaces_a_stale_bar() {
        let mut surface = TerminalSurface::new();
        surface.progress("Embedding", 2, 5);
        surface.progress("Embedding", 0, 4);
        let bar = surface.progress.as_ref().unwrap();
        assert_eq!(bar.length(), Some(4));
        assert_eq!(bar.position(), 0);

        surface.progress("Embedding", 4, 4);
        assert!(surface.progress.is_none());
    }
}

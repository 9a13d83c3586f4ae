//! Terminal output for the REPL.
//!
//! Tracks how much of the streaming answer has been printed so each tick only
//! writes the new suffix.

use std::io::{Stdout, Write, stdout};

use crossterm::{
    cursor::MoveLeft,
    queue,
    style::{Print, Stylize},
    terminal::{Clear, ClearType},
};
use ragchat_engine::{
    App, Completion, ContextIndicator, EntryHandle, FileDescriptor, StatusKind, StatusMessage,
    UploadOutcome, sanitize_terminal_text,
};

const ASSISTANT_LABEL: &str = "assistant › ";
const PENDING_MARKER: &str = "…";

pub struct Console {
    out: Stdout,
    streaming: Option<EntryHandle>,
    printed: usize,
    marker_visible: bool,
    shown_mode: Option<ContextIndicator>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            out: stdout(),
            streaming: None,
            printed: 0,
            marker_visible: false,
            shown_mode: None,
        }
    }

    pub fn banner(&mut self) -> std::io::Result<()> {
        queue!(
            self.out,
            Print("ragchat".bold()),
            Print(" - ask about your documents. Type /help for commands.\n".dark_grey())
        )?;
        self.out.flush()
    }

    pub fn goodbye(&mut self) -> std::io::Result<()> {
        queue!(self.out, Print("\n"))?;
        self.out.flush()
    }

    pub fn prompt(&mut self) -> std::io::Result<()> {
        queue!(self.out, Print("you › ".cyan().bold()))?;
        self.out.flush()
    }

    pub fn prompt_if_idle(&mut self, app: &App) -> std::io::Result<()> {
        if app.is_streaming() {
            Ok(())
        } else {
            self.prompt()
        }
    }

    fn line(&mut self, text: impl std::fmt::Display) -> std::io::Result<()> {
        queue!(self.out, Print(text), Print("\n"))?;
        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> std::io::Result<()> {
        self.line(text.dark_grey())
    }

    pub fn warning(&mut self, text: &str) -> std::io::Result<()> {
        self.line(format!("warning: {text}").yellow())
    }

    pub fn error(&mut self, text: &str) -> std::io::Result<()> {
        self.line(text.red())
    }

    pub fn echo_user(&mut self, text: &str) -> std::io::Result<()> {
        self.line(sanitize_terminal_text(text).into_owned().italic())
    }

    pub fn status(&mut self, status: &StatusMessage) -> std::io::Result<()> {
        let text = sanitize_terminal_text(&status.text).into_owned();
        match status.kind {
            StatusKind::Info => self.line(text.dark_grey()),
            StatusKind::Success => self.line(text.green()),
            StatusKind::Error => self.line(text.red()),
        }
    }

    pub fn begin_response(&mut self, entry: EntryHandle) -> std::io::Result<()> {
        self.streaming = Some(entry);
        self.printed = 0;
        self.marker_visible = true;
        queue!(
            self.out,
            Print(ASSISTANT_LABEL.magenta().bold()),
            Print(PENDING_MARKER.dark_grey())
        )?;
        self.out.flush()
    }

    fn clear_marker(&mut self) -> std::io::Result<()> {
        if self.marker_visible {
            self.marker_visible = false;
            queue!(self.out, MoveLeft(1), Clear(ClearType::UntilNewLine))?;
        }
        Ok(())
    }

    /// Print whatever part of `content` has not been printed yet.
    pub fn stream_progress(&mut self, content: &str) -> std::io::Result<()> {
        let Some(fresh) = content.get(self.printed..).filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        self.clear_marker()?;
        queue!(self.out, Print(sanitize_terminal_text(fresh)))?;
        self.printed = content.len();
        self.out.flush()
    }

    pub fn finish_response(&mut self, content: &str, completion: Completion) -> std::io::Result<()> {
        self.stream_progress(content)?;
        self.clear_marker()?;
        queue!(self.out, Print("\n"))?;
        if completion == Completion::ClosedEarly {
            queue!(self.out, Print("(response ended early)\n".dark_grey()))?;
        }
        self.streaming = None;
        self.out.flush()
    }

    pub fn fail_response(&mut self, message: &str) -> std::io::Result<()> {
        self.clear_marker()?;
        if self.printed > 0 {
            queue!(self.out, Print("\n"))?;
        }
        self.streaming = None;
        self.error(&sanitize_terminal_text(message))
    }

    pub fn upload_outcome(&mut self, outcome: &UploadOutcome) -> std::io::Result<()> {
        let message = sanitize_terminal_text(&outcome.message).into_owned();
        let interrupted = self.streaming.is_some();
        if interrupted {
            self.clear_marker()?;
            queue!(self.out, Print("\n"))?;
        }
        if outcome.success {
            self.line(message.green())?;
        } else {
            self.line(message.red())?;
        }
        if interrupted {
            // Continue the answer on a fresh labelled line.
            queue!(self.out, Print(ASSISTANT_LABEL.magenta().bold()))?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn files(
        &mut self,
        files: &[FileDescriptor],
        indicator: ContextIndicator,
    ) -> std::io::Result<()> {
        if files.is_empty() {
            return match indicator {
                ContextIndicator::Unknown => self.notice(&indicator.label()),
                ContextIndicator::Known(_) => self.notice("No documents uploaded."),
            };
        }
        for file in files {
            self.line(format!("  {}", sanitize_terminal_text(&file.filename)))?;
        }
        Ok(())
    }

    pub fn mode(&mut self, indicator: ContextIndicator) -> std::io::Result<()> {
        self.shown_mode = Some(indicator);
        self.notice(&format!("[{}]", indicator.label()))
    }

    /// Whether `indicator` differs from what was last shown.
    ///
    /// The initial unknown state is not worth announcing.
    pub fn mode_changed(&self, indicator: ContextIndicator) -> bool {
        match self.shown_mode {
            Some(shown) => shown != indicator,
            None => indicator != ContextIndicator::Unknown,
        }
    }
}

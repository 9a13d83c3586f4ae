//! Slash-command parsing for the REPL.

use std::path::PathBuf;

use ragchat_engine::ChatAction;

pub const HELP: &str = "\
Commands:
  /upload <path>     upload a document (.pdf .txt .md .docx .png .jpg .jpeg)
  /files             list uploaded documents
  /mode              show whether answers use your documents
  /summarize         summarize the uploaded documents
  /projects          suggest projects based on the uploaded documents
  /explain [topic]   explain a topic using the uploaded documents
  /help              show this help
  /quit              exit
Anything else is sent as a chat message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    /// `None` re-submits the current selection, if any.
    Upload(Option<PathBuf>),
    Files,
    Mode,
    Action {
        action: ChatAction,
        topic: Option<String>,
    },
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Chat(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|arg| !arg.is_empty())),
            None => (rest, None),
        };

        match name.to_ascii_lowercase().as_str() {
            "upload" => Command::Upload(arg.map(|path| PathBuf::from(unquote(path)))),
            "files" => Command::Files,
            "mode" => Command::Mode,
            "summarize" => Command::Action {
                action: ChatAction::Summarize,
                topic: arg.map(str::to_string),
            },
            "projects" => Command::Action {
                action: ChatAction::SuggestProjects,
                topic: arg.map(str::to_string),
            },
            "explain" => Command::Action {
                action: ChatAction::Explain,
                topic: arg.map(str::to_string),
            },
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Unknown(name.to_string()),
        }
    }
}

/// Strip one pair of matching surrounding quotes, as shells would for a dragged-in path.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

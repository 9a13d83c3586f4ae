//! The ordered list of displayed conversation entries.
//!
//! The view is append-only. The only in-place mutation allowed is on the most recent
//! entry while it is an assistant response that has not reached a terminal state.
//!
//! Entries store raw text only. Markup is produced on demand by [`MessageEntry::markup`],
//! so streaming updates never pay for rendering a front end does not ask for.

use std::borrow::Cow;

use ragchat_types::{RenderState, Role};

use crate::render::{escape_html, render};

/// Markup shown for an assistant entry that has not received any content yet.
pub const TYPING_INDICATOR: &str =
    r#"<span class="typing-indicator"><span></span><span></span><span></span></span>"#;

/// Text shown while the conversation has no entries.
pub const EMPTY_CONVERSATION_PLACEHOLDER: &str =
    "Ask a question to get started, or upload documents to ground answers in them.";

/// Opaque reference to an entry, valid for the lifetime of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    role: Role,
    content: String,
    render_state: RenderState,
}

impl MessageEntry {
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Raw text: the answer so far, or the error message for errored entries.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn render_state(&self) -> RenderState {
        self.render_state
    }

    /// Markup to display. Pending entries show the typing indicator.
    #[must_use]
    pub fn markup(&self) -> Cow<'static, str> {
        match self.render_state {
            RenderState::Pending => Cow::Borrowed(TYPING_INDICATOR),
            RenderState::Errored => Cow::Owned(format!(
                r#"<span class="error">{}</span>"#,
                escape_html(&self.content)
            )),
            RenderState::Streaming | RenderState::Final => Cow::Owned(render(&self.content)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("no entry for handle {0:?}")]
    UnknownEntry(EntryHandle),
    #[error("entry {0:?} is not the most recent entry")]
    NotLatest(EntryHandle),
    #[error("entry {0:?} is not an assistant response")]
    NotAssistant(EntryHandle),
    #[error("entry {handle:?} is already {state:?}")]
    AlreadyTerminal {
        handle: EntryHandle,
        state: RenderState,
    },
}

#[derive(Debug)]
pub struct ConversationView {
    entries: Vec<MessageEntry>,
    placeholder_visible: bool,
}

impl Default for ConversationView {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationView {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            placeholder_visible: true,
        }
    }

    /// Append a complete entry.
    pub fn append_entry(&mut self, role: Role, content: impl Into<String>) -> EntryHandle {
        self.push(MessageEntry {
            role,
            content: content.into(),
            render_state: RenderState::Final,
        })
    }

    /// Append an empty assistant entry that shows the typing indicator.
    pub fn begin_response(&mut self) -> EntryHandle {
        self.push(MessageEntry {
            role: Role::Assistant,
            content: String::new(),
            render_state: RenderState::Pending,
        })
    }

    /// Replace the response text with `full_text`, the whole answer so far.
    pub fn update_streaming(&mut self, handle: EntryHandle, full_text: &str) -> Result<(), ViewError> {
        let entry = self.live_response_mut(handle)?;
        entry.content.clear();
        entry.content.push_str(full_text);
        entry.render_state = RenderState::Streaming;
        Ok(())
    }

    /// Mark the response complete, keeping whatever content it has.
    pub fn finalize(&mut self, handle: EntryHandle) -> Result<(), ViewError> {
        self.live_response_mut(handle)?.render_state = RenderState::Final;
        Ok(())
    }

    /// Replace the response with an error message.
    pub fn fail(&mut self, handle: EntryHandle, message: &str) -> Result<(), ViewError> {
        let entry = self.live_response_mut(handle)?;
        entry.content = message.to_string();
        entry.render_state = RenderState::Errored;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, handle: EntryHandle) -> Option<&MessageEntry> {
        self.entries.get(handle.0)
    }

    #[must_use]
    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The empty-conversation placeholder, until the first entry is added.
    #[must_use]
    pub fn placeholder(&self) -> Option<&'static str> {
        self.placeholder_visible
            .then_some(EMPTY_CONVERSATION_PLACEHOLDER)
    }

    fn push(&mut self, entry: MessageEntry) -> EntryHandle {
        self.remove_placeholder();
        self.entries.push(entry);
        EntryHandle(self.entries.len() - 1)
    }

    fn remove_placeholder(&mut self) {
        if self.placeholder_visible {
            tracing::trace!("Removing empty-conversation placeholder");
            self.placeholder_visible = false;
        }
    }

    fn live_response_mut(&mut self, handle: EntryHandle) -> Result<&mut MessageEntry, ViewError> {
        if handle.0 >= self.entries.len() {
            return Err(ViewError::UnknownEntry(handle));
        }
        if handle.0 + 1 != self.entries.len() {
            return Err(ViewError::NotLatest(handle));
        }
        let entry = &mut self.entries[handle.0];
        if entry.role != Role::Assistant {
            return Err(ViewError::NotAssistant(handle));
        }
        if entry.render_state.is_terminal() {
            return Err(ViewError::AlreadyTerminal {
                handle,
                state: entry.render_state,
            });
        }
        Ok(entry)
    }
}

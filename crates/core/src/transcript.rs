//! Transcript types.

use std::borrow::Cow;
use std::slice;

pub use tool_chat_model::ToolCallRequest as ToolRequest;

/// The role of a turn's author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The person chatting.
    User,
    /// The model.
    Assistant,
    /// A tool that ran on the model's behalf.
    Tool,
}

impl Role {
    /// Returns the lowercase name of the role.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry of a transcript.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Turn {
    /// A message typed by the user.
    User(String),
    /// A final answer from the model.
    Assistant(String),
    /// A model response that asked for tools to run.
    AssistantWithToolRequests {
        /// The text the model produced alongside the requests, if any.
        text: Option<String>,
        /// The requests, in the order the model emitted them.
        requests: Vec<ToolRequest>,
    },
    /// The outcome of one tool request.
    ToolResult {
        /// Id of the request this result answers.
        tool_call_id: String,
        /// Name of the tool that ran.
        name: String,
        /// The result rendered as text.
        content: String,
    },
}

impl Turn {
    /// Creates a user turn.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant turn.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::Assistant(content.into())
    }

    /// Returns the role of this turn.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            Turn::User(_) => Role::User,
            Turn::Assistant(_) | Turn::AssistantWithToolRequests { .. } => {
                Role::Assistant
            }
            Turn::ToolResult { .. } => Role::Tool,
        }
    }

    /// Returns the human-readable content of this turn.
    ///
    /// For tool requests this is the model's text followed by a summary
    /// of the pending calls.
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            Turn::User(content)
            | Turn::Assistant(content)
            | Turn::ToolResult { content, .. } => Cow::Borrowed(content),
            Turn::AssistantWithToolRequests { text, requests } => {
                let calls: Vec<_> = requests
                    .iter()
                    .map(|req| format!("{}({})", req.name, req.arguments))
                    .collect();
                let summary = format!("Calling tools: {}", calls.join(", "));
                match text.as_deref() {
                    Some(text) if !text.is_empty() => {
                        Cow::Owned(format!("{text}\n\n{summary}"))
                    }
                    _ => Cow::Owned(summary),
                }
            }
        }
    }
}

/// An ordered, append-only list of turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    #[inline]
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Returns all turns.
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the turns appended after the first `len` ones.
    #[inline]
    pub fn turns_since(&self, len: usize) -> &[Turn] {
        self.turns.get(len..).unwrap_or_default()
    }

    /// Returns the last turn.
    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` if there are no turns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns an iterator over the turns.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    /// Drops every turn after the first `len` ones.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    /// Removes all turns.
    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl From<Vec<Turn>> for Transcript {
    #[inline]
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = slice::Iter<'a, Turn>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

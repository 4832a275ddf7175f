//! Conversation history for one session
//!
//! The history is an append-only log of turns. Nothing in the crate removes,
//! reorders or edits a turn once it has been appended; the only mutation is
//! [`History::append`].

use crate::providers::ToolInvocationRequest;
use crate::tools::ToolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Task text from the operator
    User,
    /// Output of the completion service
    Model,
    /// Outcome of a local tool execution
    ToolResult,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Model => f.write_str("model"),
            Self::ToolResult => f.write_str("tool-result"),
        }
    }
}

/// Payload of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    /// Free text
    Text {
        /// The text
        text: String,
    },
    /// The model asked for a tool
    ToolInvocation {
        /// The request that was acted on
        request: ToolInvocationRequest,
    },
    /// A tool ran
    ToolResult {
        /// Call id of the request this answers
        call_id: String,
        /// Name of the tool that was requested
        name: String,
        /// Outcome
        result: ToolResult,
    },
}

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: TurnContent,
    timestamp: DateTime<Utc>,
}

impl Turn {
    /// A user turn carrying task text
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, TurnContent::Text { text: text.into() })
    }

    /// A model turn carrying final (or interim) text
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, TurnContent::Text { text: text.into() })
    }

    /// A model turn recording the invocation request that will be dispatched
    pub fn tool_invocation(request: ToolInvocationRequest) -> Self {
        Self::new(Role::Model, TurnContent::ToolInvocation { request })
    }

    /// A tool-result turn answering `request`
    pub fn tool_result(request: &ToolInvocationRequest, result: ToolResult) -> Self {
        Self::new(
            Role::ToolResult,
            TurnContent::ToolResult {
                call_id: request.id.clone(),
                name: request.name.clone(),
                result,
            },
        )
    }

    fn new(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Who produced the turn
    pub fn role(&self) -> Role {
        self.role
    }

    /// What the turn carries
    pub fn content(&self) -> &TurnContent {
        &self.content
    }

    /// When the turn was created
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Text of a `Text` turn
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Request of a `ToolInvocation` turn
    pub fn invocation(&self) -> Option<&ToolInvocationRequest> {
        match &self.content {
            TurnContent::ToolInvocation { request } => Some(request),
            _ => None,
        }
    }

    /// True for a model turn that asked for a tool
    pub fn is_tool_invocation(&self) -> bool {
        self.invocation().is_some()
    }

    fn estimated_tokens(&self) -> usize {
        match &self.content {
            TurnContent::Text { text } => estimate_tokens(text),
            TurnContent::ToolInvocation { request } => {
                estimate_tokens(&request.name) + estimate_tokens(&request.arguments.to_string())
            }
            TurnContent::ToolResult { name, result, .. } => {
                estimate_tokens(name) + estimate_tokens(&result.payload)
            }
        }
    }
}

/// Ordered, append-only log of turns owned by one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Creates an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn, returning its position
    pub fn append(&mut self, turn: Turn) -> usize {
        tracing::trace!("History append #{}: {}", self.turns.len(), turn.role());
        self.turns.push(turn);
        self.turns.len() - 1
    }

    /// Full ordered sequence of turns appended so far
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterates over the turns in order
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Most recent turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the most recent model text turn
    pub fn last_model_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|t| t.role() == Role::Model)
            .find_map(Turn::text)
    }

    /// Rough token count of the whole history, four characters per token
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(Turn::estimated_tokens).sum()
    }
}

fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

//! Core types for the chat pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attachment::Attachment;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }
}

/// Ordered conversation history.
///
/// Position is conversation order. A history is never mutated in place once
/// handed to the pipeline: [`History::extended_with`] produces a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History(Vec<Turn>);

impl History {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self(turns)
    }

    /// Return a copy of this history with `turn` appended.
    pub fn extended_with(&self, turn: Turn) -> Self {
        let mut turns = Vec::with_capacity(self.0.len() + 1);
        turns.extend_from_slice(&self.0);
        turns.push(turn);
        Self(turns)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn latest(&self) -> Option<&Turn> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Turn>> for History {
    fn from(turns: Vec<Turn>) -> Self {
        Self(turns)
    }
}

/// Which specialist answers a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    Clarify,
    IssueDetector,
    TenancyExpert,
}

impl RoutingDecision {
    /// Name of the specialist shown to the user alongside its output.
    pub fn specialist_name(&self) -> &'static str {
        match self {
            Self::Clarify => "Query Clarification Agent",
            Self::IssueDetector => "Property Issue Detector",
            Self::TenancyExpert => "Tenancy Agreement Expert",
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.specialist_name())
    }
}

/// One step of a generation session, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Narrative text produced by `specialist`.
    TextDelta { fragment: String, specialist: String },
    /// Raw tool-call argument text. Never reaches the caller.
    ToolCallFragment { raw: String },
    Completed,
    Failed { reason: String },
}

impl GenerationEvent {
    pub fn text(fragment: impl Into<String>, specialist: impl Into<String>) -> Self {
        Self::TextDelta {
            fragment: fragment.into(),
            specialist: specialist.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

/// Per-request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is asking, and when.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub user_id: String,
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            user_id: user_id.into(),
            received_at: Utc::now(),
        }
    }

    /// Context for callers without an authenticated identity.
    pub fn anonymous() -> Self {
        Self::new("Anonymous")
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

/// An inbound conversational turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub text: Option<String>,
    pub image: Option<Attachment>,
    pub history: History,
}

impl TurnRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: Attachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }
}

/// Buffered answer for the non-streaming path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub agent: String,
}

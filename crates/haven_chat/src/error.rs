//! Error types for the chat system.

use thiserror::Error;

use crate::types::RequestId;

/// Result type alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors that can surface from the chat pipeline.
///
/// Only [`ChatError::Input`], [`ChatError::Upstream`] and
/// [`ChatError::GenerationFailed`] are meant to reach the
/// caller as failures; the rest indicate misconfiguration or programming
/// errors.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The turn carried nothing to answer.
    #[error("{0}")]
    Input(String),

    /// The language-model call itself failed.
    #[error("AI service error: {0}")]
    Upstream(String),

    /// A generation session ended in failure before producing text.
    #[error("{0}")]
    GenerationFailed(String),

    /// Generation completed without producing any text.
    #[error("Sorry, I couldn't process that request. Agent failed to produce a result.")]
    EmptyResponse,

    #[error("LLM not configured. Set OPENAI_API_KEY")]
    LlmNotConfigured,

    #[error("An attachment is already bound to request {0}")]
    AttachmentAlreadyBound(RequestId),

    #[error("No attachment bound for request {0}")]
    AttachmentNotFound(RequestId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a tool invocation.
///
/// These never abort a generation session: the display text is handed back to
/// the model as the tool's output so it can explain the problem to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Error: No image data provided.")]
    NoAttachment,

    #[error("Error: Invalid image data.")]
    InvalidAttachment,

    #[error("Error: AI service failed ({0}).")]
    Upstream(String),

    #[error("Error: Tool '{0}' is not available to this specialist.")]
    UnknownTool(String),

    #[error("Error: Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Why a caller-supplied history payload was rejected.
#[derive(Error, Debug)]
pub enum HistoryParseError {
    #[error("history is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("history is not a list")]
    NotAList,

    #[error("invalid history item at index {index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

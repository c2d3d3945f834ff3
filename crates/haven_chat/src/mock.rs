//! Scriptable generator and image analyzer for testing.
//!
//! [`ScriptedGenerator`] replays predefined completions and chunk streams
//! and captures every request, so pipeline behavior can be verified without a
//! network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use crate::attachment::Attachment;
use crate::error::{ChatError, ChatResult, ToolError};
use crate::llm::{ChunkStream, CompletionRequest, FinishReason, ModelChunk, TextGenerator};
use crate::registry::ISSUE_DETECTOR_MARKER;
use crate::tools::ImageAnalyzer;

/// One scripted stream item.
#[derive(Debug, Clone)]
pub enum ScriptedChunk {
    Chunk(ModelChunk),
    /// Mid-stream transport failure.
    Error(String),
}

#[derive(Debug, Clone)]
enum ScriptedStream {
    Chunks(Vec<ScriptedChunk>),
    /// `stream()` itself fails.
    Refused(String),
}

/// Text generator that replays scripted output.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    completions: Arc<RwLock<VecDeque<Result<String, String>>>>,
    streams: Arc<RwLock<VecDeque<ScriptedStream>>>,
    completion_requests: Arc<RwLock<Vec<CompletionRequest>>>,
    stream_requests: Arc<RwLock<Vec<CompletionRequest>>>,
    chunk_delay: Arc<RwLock<Option<Duration>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the output of the next `complete` call.
    pub fn with_completion(self, text: impl Into<String>) -> Self {
        self.completions.write().push_back(Ok(text.into()));
        self
    }

    /// Make the next `complete` call fail.
    pub fn with_completion_failure(self, message: impl Into<String>) -> Self {
        self.completions.write().push_back(Err(message.into()));
        self
    }

    /// Queue the chunks of the next `stream` call.
    pub fn with_stream(self, chunks: Vec<ModelChunk>) -> Self {
        let scripted = chunks.into_iter().map(ScriptedChunk::Chunk).collect();
        self.streams.write().push_back(ScriptedStream::Chunks(scripted));
        self
    }

    /// Queue a stream that may include mid-stream failures.
    pub fn with_scripted_stream(self, chunks: Vec<ScriptedChunk>) -> Self {
        self.streams.write().push_back(ScriptedStream::Chunks(chunks));
        self
    }

    /// Queue a plain text answer, finished with `stop`.
    pub fn with_text_stream(self, fragments: &[&str]) -> Self {
        self.with_stream(text_chunks(fragments))
    }

    /// Make the next `stream` call fail before producing anything.
    pub fn with_stream_failure(self, message: impl Into<String>) -> Self {
        self.streams
            .write()
            .push_back(ScriptedStream::Refused(message.into()));
        self
    }

    /// Delay every streamed chunk.
    pub fn with_chunk_delay(self, delay: Duration) -> Self {
        *self.chunk_delay.write() = Some(delay);
        self
    }

    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completion_requests.read().clone()
    }

    pub fn stream_requests(&self) -> Vec<CompletionRequest> {
        self.stream_requests.read().clone()
    }

    /// Total number of model calls made.
    pub fn call_count(&self) -> usize {
        self.completion_requests.read().len() + self.stream_requests.read().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String> {
        self.completion_requests.write().push(request.clone());
        match self.completions.write().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ChatError::Upstream(message)),
            None => Err(ChatError::Upstream("no scripted completion".to_string())),
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<ChunkStream> {
        self.stream_requests.write().push(request.clone());
        let scripted = match self.streams.write().pop_front() {
            Some(ScriptedStream::Chunks(chunks)) => chunks,
            Some(ScriptedStream::Refused(message)) => return Err(ChatError::Upstream(message)),
            None => return Err(ChatError::Upstream("no scripted stream".to_string())),
        };

        let items = scripted.into_iter().map(|item| match item {
            ScriptedChunk::Chunk(chunk) => Ok(chunk),
            ScriptedChunk::Error(message) => Err(ChatError::Upstream(message)),
        });

        let delay = *self.chunk_delay.read();
        match delay {
            Some(delay) => Ok(stream::iter(items)
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed()),
            None => Ok(stream::iter(items).boxed()),
        }
    }
}

/// Text fragments followed by a `stop` finish.
pub fn text_chunks(fragments: &[&str]) -> Vec<ModelChunk> {
    fragments
        .iter()
        .map(|fragment| ModelChunk::Text(fragment.to_string()))
        .chain(std::iter::once(ModelChunk::Finished(FinishReason::Stop)))
        .collect()
}

/// A single tool call split into argument fragments, finished with `tool_calls`.
pub fn tool_call_chunks(id: &str, name: &str, argument_fragments: &[&str]) -> Vec<ModelChunk> {
    let mut chunks = vec![ModelChunk::ToolCallDelta {
        index: 0,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments: String::new(),
    }];
    chunks.extend(argument_fragments.iter().map(|fragment| ModelChunk::ToolCallDelta {
        index: 0,
        id: None,
        name: None,
        arguments: fragment.to_string(),
    }));
    chunks.push(ModelChunk::Finished(FinishReason::ToolCalls));
    chunks
}

/// Captured image analysis request.
#[derive(Debug, Clone)]
pub struct CapturedAnalysis {
    pub description: String,
    pub attachment: Attachment,
}

/// Image analyzer that records what it was shown.
#[derive(Clone, Default)]
pub struct RecordingImageAnalyzer {
    calls: Arc<RwLock<Vec<CapturedAnalysis>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl RecordingImageAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every analysis with an upstream error.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.failure.write() = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<CapturedAnalysis> {
        self.calls.read().clone()
    }
}

#[async_trait]
impl ImageAnalyzer for RecordingImageAnalyzer {
    async fn analyze(&self, attachment: &Attachment, description: &str) -> Result<String, ToolError> {
        self.calls.write().push(CapturedAnalysis {
            description: description.to_string(),
            attachment: attachment.clone(),
        });
        if let Some(message) = self.failure.read().clone() {
            return Err(ToolError::Upstream(message));
        }
        Ok(format!(
            "{} Analysis of {} bytes of {}: {}",
            ISSUE_DETECTOR_MARKER,
            attachment.bytes.len(),
            attachment.media_type,
            description
        ))
    }
}

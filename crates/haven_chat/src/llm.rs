//! LLM adapter for chat completions.
//!
//! The pipeline only ever talks to the [`TextGenerator`] trait. The production
//! implementation is [`OpenAiGenerator`], which speaks the OpenAI Chat
//! Completions protocol (plain and streamed).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::types::{Turn, TurnRole};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_RETRIES: u32 = 3;

/// Message role on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message sent to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    /// User message mixing text and images.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Output of a tool, answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::Text(output.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Plain text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            TurnRole::User => MessageRole::User,
            TurnRole::Assistant => MessageRole::Assistant,
            TurnRole::System => MessageRole::System,
        };
        Self::plain(role, turn.content.clone())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

/// A complete tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Function tool offered to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Whether Chat Completions accepts `web_search_options` for this model.
///
/// Only the `*-search-preview` models do; any other model rejects the
/// request with a 400.
pub fn supports_web_search(model: &str) -> bool {
    model.ends_with("-search-preview")
}

/// Everything needed for one model call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    /// Search context size when hosted web search is allowed.
    pub web_search: Option<String>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            web_search: None,
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_web_search(mut self, context_size: impl Into<String>) -> Self {
        self.web_search = Some(context_size.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why the model stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

impl From<&str> for FinishReason {
    fn from(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "length" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One decoded piece of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChunk {
    Text(String),
    /// Partial tool call. Fragments sharing an `index` belong to the same call.
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    Finished(FinishReason),
}

pub type ChunkStream = BoxStream<'static, ChatResult<ModelChunk>>;

/// The text-generation capability consumed by the pipeline.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run a completion to the end and return its text.
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String>;

    /// Start a streamed completion.
    async fn stream(&self, request: &CompletionRequest) -> ChatResult<ChunkStream>;
}

/// OpenAI-compatible generator.
pub struct OpenAiGenerator {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at an OpenAI-compatible server other than api.openai.com.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from `OPENAI_API_KEY` and optional `OPENAI_BASE_URL`.
    pub fn from_env() -> ChatResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ChatError::LlmNotConfigured)?;
        if api_key.is_empty() {
            return Err(ChatError::LlmNotConfigured);
        }
        let generator = Self::new(api_key);
        match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.is_empty() => Ok(generator.with_base_url(url)),
            _ => Ok(generator),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // POST with retries on transport errors, 5xx and 429.
    async fn send(&self, body: &OpenAIRequest<'_>) -> ChatResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 1s, 2s
                let delay = Duration::from_secs(1 << (attempt - 1));
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "OpenAI request failed");
                    last_error = Some(ChatError::Upstream(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let text = response.text().await.unwrap_or_default();
                warn!(attempt = attempt + 1, status = %status, "OpenAI returned a retryable status");
                last_error = Some(ChatError::Upstream(format!(
                    "OpenAI API error {} (attempt {}/{}): {}",
                    status,
                    attempt + 1,
                    MAX_RETRIES,
                    text
                )));
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ChatError::Upstream(format!(
                    "OpenAI API error {}: {}",
                    status, text
                )));
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| ChatError::Upstream("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String> {
        debug!(model = %request.model, messages = request.messages.len(), "Requesting completion");
        let body = OpenAIRequest::from_request(request, false);
        let response = self.send(&body).await?;

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Upstream(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ChatError::Upstream("No response from OpenAI".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<ChunkStream> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting streamed completion"
        );
        let body = OpenAIRequest::from_request(request, true);
        let response = self.send(&body).await?;
        Ok(decode_sse(response.bytes_stream().boxed()))
    }
}

/// Turn a streamed HTTP body into model chunks.
pub fn decode_sse<S, B, E>(body: S) -> ChunkStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    stream::unfold(
        (body, SseDecoder::default(), VecDeque::new(), false),
        |(mut body, mut decoder, mut pending, mut exhausted)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (body, decoder, pending, exhausted)));
                }
                if exhausted {
                    return None;
                }

                let decoded = match body.next().await {
                    Some(Ok(bytes)) => decoder.push(bytes.as_ref()),
                    Some(Err(e)) => {
                        exhausted = true;
                        Err(ChatError::Upstream(format!("stream read error: {}", e)))
                    }
                    None => {
                        exhausted = true;
                        decoder.finish()
                    }
                };

                match decoded {
                    Ok(chunks) => pending.extend(chunks.into_iter().map(Ok)),
                    Err(e) => {
                        exhausted = true;
                        pending.push_back(Err(e));
                    }
                }
                if decoder.is_done() {
                    exhausted = true;
                }
            }
        },
    )
    .boxed()
}

/// Incremental decoder for `data:` server-sent events.
///
/// Bytes are buffered until a blank line closes an event, so events split
/// across network chunks (including inside multi-byte characters) decode
/// correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> ChatResult<Vec<ModelChunk>> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while let Some((end, separator)) = find_event_boundary(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + separator).collect();
            let text = String::from_utf8_lossy(&event[..end]).into_owned();
            self.process_event(&text, &mut chunks)?;
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        Ok(chunks)
    }

    /// Flush whatever is left once the body ends.
    pub fn finish(&mut self) -> ChatResult<Vec<ModelChunk>> {
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).into_owned();
        let mut chunks = Vec::new();
        if !self.done && !text.trim().is_empty() {
            self.process_event(text.trim(), &mut chunks)?;
        }
        self.done = true;
        Ok(chunks)
    }

    /// Whether the `[DONE]` sentinel (or end of body) was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn process_event(&mut self, event: &str, chunks: &mut Vec<ModelChunk>) -> ChatResult<()> {
        let mut data = String::new();
        for line in event.lines() {
            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if payload == "[DONE]" {
                    self.done = true;
                    return Ok(());
                }
                data.push_str(payload);
            }
        }

        // keep-alive or comment
        if data.is_empty() {
            return Ok(());
        }

        let chunk: OpenAIStreamChunk = serde_json::from_str(&data).map_err(|e| {
            ChatError::Upstream(format!("failed to parse stream chunk: {} (data: {})", e, data))
        })?;

        if let Some(error) = chunk.error {
            return Err(ChatError::Upstream(error.message));
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                chunks.push(ModelChunk::Text(content));
            }
        }

        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            chunks.push(ModelChunk::ToolCallDelta {
                index: call.index.unwrap_or(0),
                id: call.id,
                name,
                arguments,
            });
        }

        if let Some(reason) = choice.finish_reason {
            chunks.push(ModelChunk::Finished(FinishReason::from(reason.as_str())));
        }

        Ok(())
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<WebSearchOptions<'a>>,
    stream: bool,
}

impl<'a> OpenAIRequest<'a> {
    fn from_request(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            max_completion_tokens: request.max_tokens,
            web_search_options: request
                .web_search
                .as_deref()
                .map(|search_context_size| WebSearchOptions { search_context_size }),
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct WebSearchOptions<'a> {
    search_context_size: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    error: Option<OpenAIErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    index: Option<u32>,
    id: Option<String>,
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}, "finish_reason": null}]})
        )
    }

    #[test]
    fn test_decoder_handles_split_events() {
        let mut decoder = SseDecoder::default();
        let event = text_event("Hello");
        let (head, tail) = event.split_at(10);

        assert!(decoder.push(head.as_bytes()).unwrap().is_empty());
        let chunks = decoder.push(tail.as_bytes()).unwrap();
        assert_eq!(chunks, vec![ModelChunk::Text("Hello".into())]);
    }

    #[test]
    fn test_decoder_handles_split_multibyte_characters() {
        let mut decoder = SseDecoder::default();
        let event = text_event("café");
        let bytes = event.as_bytes();
        let split = event.find('é').unwrap() + 1;

        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        let chunks = decoder.push(&bytes[split..]).unwrap();
        assert_eq!(chunks, vec![ModelChunk::Text("café".into())]);
    }

    #[test]
    fn test_decoder_tool_calls_and_finish() {
        let mut decoder = SseDecoder::default();
        let payload = concat!(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"analyze_property_image_tool","arguments":""}}]}}]}"#,
            "\n\n",
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"user_"}}]}}]}"#,
            "\n\n",
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "\n\n",
            "data: [DONE]\n\n",
        );

        let chunks = decoder.push(payload.as_bytes()).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks[0],
            ModelChunk::ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("analyze_property_image_tool".into()),
                arguments: String::new(),
            }
        );
        assert_eq!(
            chunks[1],
            ModelChunk::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "{\"user_".into(),
            }
        );
        assert_eq!(chunks[2], ModelChunk::Finished(FinishReason::ToolCalls));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_decoder_skips_comments_and_crlf() {
        let mut decoder = SseDecoder::default();
        let payload = format!(": keep-alive\r\n\r\n{}", text_event("x"));
        let chunks = decoder.push(payload.as_bytes()).unwrap();
        assert_eq!(chunks, vec![ModelChunk::Text("x".into())]);
    }

    #[test]
    fn test_decoder_reports_api_errors() {
        let mut decoder = SseDecoder::default();
        let err = decoder
            .push(b"data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n")
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        let event = text_event("tail");
        let trimmed = event.trim_end();
        assert!(decoder.push(trimmed.as_bytes()).unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec![ModelChunk::Text("tail".into())]);
    }

    #[tokio::test]
    async fn test_decode_sse_stream_stops_at_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", text_event("a"), text_event("b"), text_event("late"));
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let chunks: Vec<_> = decode_sse(stream::iter(parts)).collect().await;
        let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            chunks,
            vec![ModelChunk::Text("a".into()), ModelChunk::Text("b".into())]
        );
    }

    #[tokio::test]
    async fn test_decode_sse_surfaces_read_errors() {
        let parts: Vec<Result<Vec<u8>, String>> = vec![
            Ok(text_event("a").into_bytes()),
            Err("connection reset".to_string()),
        ];
        let chunks: Vec<_> = decode_sse(stream::iter(parts)).collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].as_ref().unwrap_err().to_string().contains("connection reset"));
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")])
            .with_web_search("medium");
        let body = serde_json::to_value(OpenAIRequest::from_request(&request, true)).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["web_search_options"]["search_context_size"], "medium");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_image_parts_serialization() {
        let message = ChatMessage::user_parts(vec![
            ContentPart::Text { text: "look".into() },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: "data:image/png;base64,AA==".into() },
            },
        ]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][1]["type"], "image_url");
        assert_eq!(value["content"][1]["image_url"]["url"], "data:image/png;base64,AA==");
        assert_eq!(message.text(), "look");
    }

    #[test]
    fn test_tool_result_message() {
        let value = serde_json::to_value(ChatMessage::tool_result("call_1", "done")).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
    }

    #[test]
    fn test_base_url_override() {
        let generator = OpenAiGenerator::new("key").with_base_url("http://localhost:11434/v1/");
        assert_eq!(generator.base_url(), "http://localhost:11434/v1");
    }
}

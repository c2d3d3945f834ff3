//! Generation sessions.
//!
//! A session drives one specialist for one request: it streams the model's
//! output as [`GenerationEvent`]s, executes tool calls in between model
//! rounds, and always ends with exactly one terminal event. The work runs on
//! its own task; dropping [`SessionEvents`] aborts it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::attachment::AttachmentHandle;
use crate::llm::{ChatMessage, CompletionRequest, ModelChunk, TextGenerator, ToolCall};
use crate::registry::SpecialistConfig;
use crate::settings::ModelSettings;
use crate::tools::ToolBox;
use crate::types::{GenerationEvent, History, RequestContext};

const EVENT_BUFFER: usize = 32;

/// Said when the model spends its last round asking for tools instead of answering.
pub const TOOL_ROUNDS_EXHAUSTED: &str =
    "I wasn't able to finish looking into this. Could you rephrase or add a bit more detail?";

/// Runs specialists.
pub struct GenerationSession {
    generator: Arc<dyn TextGenerator>,
    tools: Arc<ToolBox>,
    max_tool_rounds: u32,
    web_search_context_size: String,
}

impl GenerationSession {
    pub fn new(generator: Arc<dyn TextGenerator>, tools: Arc<ToolBox>, settings: &ModelSettings) -> Self {
        Self {
            generator,
            tools,
            max_tool_rounds: settings.max_tool_rounds,
            web_search_context_size: settings.web_search_context_size.clone(),
        }
    }

    /// Start generating.
    ///
    /// `history` must already end with the new turn. `attachment` is the
    /// request's own handle, if it sent an image.
    pub fn run(
        &self,
        config: Arc<SpecialistConfig>,
        history: History,
        attachment: Option<AttachmentHandle>,
        context: RequestContext,
    ) -> SessionEvents {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let driver = SessionDriver {
            generator: Arc::clone(&self.generator),
            tools: Arc::clone(&self.tools),
            config,
            history,
            attachment,
            context,
            max_tool_rounds: self.max_tool_rounds,
            web_search_context_size: self.web_search_context_size.clone(),
            events: tx,
        };

        SessionEvents {
            events: ReceiverStream::new(rx),
            task: tokio::spawn(driver.drive()),
        }
    }
}

/// Event stream of a running session.
pub struct SessionEvents {
    events: ReceiverStream<GenerationEvent>,
    task: JoinHandle<()>,
}

impl Stream for SessionEvents {
    type Item = GenerationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for SessionEvents {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionStop {
    Failed(String),
    Disconnected,
}

struct SessionDriver {
    generator: Arc<dyn TextGenerator>,
    tools: Arc<ToolBox>,
    config: Arc<SpecialistConfig>,
    history: History,
    attachment: Option<AttachmentHandle>,
    context: RequestContext,
    max_tool_rounds: u32,
    web_search_context_size: String,
    events: mpsc::Sender<GenerationEvent>,
}

impl SessionDriver {
    async fn drive(self) {
        let terminal = match self.generate().await {
            Ok(()) => GenerationEvent::Completed,
            Err(SessionStop::Failed(reason)) => {
                warn!(
                    request_id = %self.context.request_id,
                    specialist = self.config.name(),
                    reason = %reason,
                    "Generation failed"
                );
                GenerationEvent::Failed { reason }
            }
            Err(SessionStop::Disconnected) => {
                debug!(request_id = %self.context.request_id, "Consumer dropped, abandoning session");
                return;
            }
        };

        info!(
            request_id = %self.context.request_id,
            user_id = %self.context.user_id,
            specialist = self.config.name(),
            elapsed_ms = self.context.elapsed_ms(),
            "Generation session finished"
        );
        let _ = self.events.send(terminal).await;
    }

    async fn generate(&self) -> Result<(), SessionStop> {
        let specialist = self.config.name();

        if let Some(reply) = &self.config.fixed_reply {
            return self.emit(GenerationEvent::text(reply.clone(), specialist)).await;
        }

        let mut messages = self.initial_messages();
        let mut round = 0;
        let mut answered = false;

        loop {
            let offer_tools = self.config.has_tools() && round < self.max_tool_rounds;
            let request = self.build_request(messages.clone(), offer_tools);

            let mut chunks = self
                .generator
                .stream(&request)
                .await
                .map_err(|e| SessionStop::Failed(e.to_string()))?;

            let mut narrative = String::new();
            let mut pending = PendingToolCalls::default();

            while let Some(chunk) = chunks.next().await {
                match chunk.map_err(|e| SessionStop::Failed(e.to_string()))? {
                    ModelChunk::Text(fragment) => {
                        answered |= !fragment.trim().is_empty();
                        narrative.push_str(&fragment);
                        self.emit(GenerationEvent::text(fragment, specialist)).await?;
                    }
                    ModelChunk::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments,
                    } => {
                        pending.absorb(index, id, name, &arguments);
                        if !arguments.is_empty() {
                            self.emit(GenerationEvent::ToolCallFragment { raw: arguments })
                                .await?;
                        }
                    }
                    ModelChunk::Finished(reason) => {
                        debug!(?reason, round, "Model round finished");
                    }
                }
            }

            let calls = pending.into_calls();
            if calls.is_empty() {
                return Ok(());
            }
            if !offer_tools {
                warn!(specialist, round, "Model requested tools that were not offered, ignoring");
                if !answered {
                    self.emit(GenerationEvent::text(TOOL_ROUNDS_EXHAUSTED, specialist))
                        .await?;
                }
                return Ok(());
            }

            round += 1;
            messages.push(ChatMessage::assistant_tool_calls(narrative, calls.clone()));
            for call in &calls {
                info!(
                    request_id = %self.context.request_id,
                    tool = %call.function.name,
                    has_attachment = self.attachment.is_some(),
                    "Executing tool call"
                );
                let output = self
                    .tools
                    .invoke(call, &self.config.capability_tools, self.attachment.as_ref())
                    .await;
                messages.push(ChatMessage::tool_result(&call.id, output));
            }
        }
    }

    fn initial_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage::system(&self.config.persona_directives));
        messages.extend(self.history.turns().iter().map(ChatMessage::from));
        messages
    }

    fn build_request(&self, messages: Vec<ChatMessage>, offer_tools: bool) -> CompletionRequest {
        let mut request = CompletionRequest::new(&self.config.model, messages);
        if offer_tools {
            request = request.with_tools(ToolBox::definitions(&self.config.capability_tools));
        }
        if self.config.allow_web_search {
            request = request.with_web_search(&self.web_search_context_size);
        }
        request
    }

    async fn emit(&self, event: GenerationEvent) -> Result<(), SessionStop> {
        self.events
            .send(event)
            .await
            .map_err(|_| SessionStop::Disconnected)
    }
}

/// Tool calls being assembled from streamed deltas, keyed by index.
#[derive(Default)]
struct PendingToolCalls {
    calls: Vec<(u32, Option<String>, String, String)>,
}

impl PendingToolCalls {
    fn absorb(&mut self, index: u32, id: Option<String>, name: Option<String>, arguments: &str) {
        match self.calls.iter_mut().find(|(i, _, _, _)| *i == index) {
            Some((_, existing_id, existing_name, args)) => {
                if id.is_some() {
                    *existing_id = id;
                }
                if let Some(name) = name {
                    existing_name.push_str(&name);
                }
                args.push_str(arguments);
            }
            None => self
                .calls
                .push((index, id, name.unwrap_or_default(), arguments.to_string())),
        }
    }

    fn into_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|(index, id, name, arguments)| {
                let id = id.unwrap_or_else(|| format!("call_{}", index));
                ToolCall::function(id, name, arguments)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::{Attachment, AttachmentStore};
    use crate::llm::MessageRole;
    use crate::mock::{tool_call_chunks, RecordingImageAnalyzer, ScriptedChunk, ScriptedGenerator};
    use crate::registry::{SpecialistRegistry, CLARIFYING_QUESTION};
    use crate::types::{RequestId, RoutingDecision, Turn};

    struct Fixture {
        generator: Arc<ScriptedGenerator>,
        analyzer: Arc<RecordingImageAnalyzer>,
        store: Arc<AttachmentStore>,
        session: GenerationSession,
        registry: SpecialistRegistry,
    }

    fn fixture(generator: ScriptedGenerator, settings: ModelSettings) -> Fixture {
        let generator = Arc::new(generator);
        let analyzer = Arc::new(RecordingImageAnalyzer::new());
        let store = Arc::new(AttachmentStore::new());
        let tools = Arc::new(ToolBox::new(store.clone(), analyzer.clone()));
        let session = GenerationSession::new(generator.clone(), tools, &settings);
        Fixture {
            generator,
            analyzer,
            store,
            session,
            registry: SpecialistRegistry::new(&settings),
        }
    }

    fn history(text: &str) -> History {
        History::default().extended_with(Turn::user(text))
    }

    async fn run_to_end(
        fx: &Fixture,
        decision: RoutingDecision,
        text: &str,
        attachment: Option<AttachmentHandle>,
    ) -> Vec<GenerationEvent> {
        fx.session
            .run(
                fx.registry.get(decision),
                history(text),
                attachment,
                RequestContext::anonymous(),
            )
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_clarify_emits_fixed_question_without_model_call() {
        let fx = fixture(ScriptedGenerator::new(), ModelSettings::default());
        let events = run_to_end(&fx, RoutingDecision::Clarify, "Hi", None).await;

        assert_eq!(
            events,
            vec![
                GenerationEvent::text(CLARIFYING_QUESTION, "Query Clarification Agent"),
                GenerationEvent::Completed,
            ]
        );
        assert_eq!(fx.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_text_stream_ends_with_completed() {
        let fx = fixture(
            ScriptedGenerator::new().with_text_stream(&["**Tenancy Agreement Expert:**", " Usually", " yes."]),
            ModelSettings::default(),
        );
        let events = run_to_end(&fx, RoutingDecision::TenancyExpert, "Can I sublet?", None).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&GenerationEvent::Completed));
        assert_eq!(
            events[0],
            GenerationEvent::text("**Tenancy Agreement Expert:**", "Tenancy Agreement Expert")
        );

        let request = &fx.generator.stream_requests()[0];
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[1].text(), "Can I sublet?");
        assert_eq!(request.web_search.as_deref(), Some("medium"));
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_round_uses_request_attachment() {
        let generator = ScriptedGenerator::new()
            .with_stream(tool_call_chunks(
                "call_1",
                "analyze_property_image_tool",
                &["{\"user_", "description\": \"", "damp wall\"}"],
            ))
            .with_text_stream(&["**Property Issue Expert:**", " Rising damp."]);
        let fx = fixture(generator, ModelSettings::default());
        let guard = fx
            .store
            .bind_scoped(RequestId::new(), Attachment::new(b"jpeg".to_vec(), "image/jpeg"))
            .unwrap();

        let events = run_to_end(
            &fx,
            RoutingDecision::IssueDetector,
            "damp wall (See the attached image.)",
            Some(guard.handle().clone()),
        )
        .await;

        let fragments: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, GenerationEvent::ToolCallFragment { .. }))
            .collect();
        assert_eq!(fragments.len(), 3);
        assert_eq!(events.last(), Some(&GenerationEvent::Completed));

        let calls = fx.analyzer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].description, "damp wall");
        assert_eq!(calls[0].attachment.bytes, b"jpeg");

        let requests = fx.generator.stream_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        let tool_result = requests[1].messages.last().unwrap();
        assert_eq!(tool_result.role, MessageRole::Tool);
        assert_eq!(tool_result.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_result.text().contains("Analysis of 4 bytes of image/jpeg"));
    }

    #[tokio::test]
    async fn test_tool_without_attachment_still_completes() {
        let generator = ScriptedGenerator::new()
            .with_stream(tool_call_chunks(
                "call_1",
                "analyze_property_image_tool",
                &["{\"user_description\": \"see photo\"}"],
            ))
            .with_text_stream(&["**Property Issue Expert:** I could not see an image."]);
        let fx = fixture(generator, ModelSettings::default());

        let events = run_to_end(&fx, RoutingDecision::IssueDetector, "see photo", None).await;

        assert_eq!(events.last(), Some(&GenerationEvent::Completed));
        assert!(fx.analyzer.calls().is_empty());
        let requests = fx.generator.stream_requests();
        assert_eq!(
            requests[1].messages.last().unwrap().text(),
            "Error: No image data provided."
        );
    }

    #[tokio::test]
    async fn test_last_round_offers_no_tools() {
        let settings = ModelSettings {
            max_tool_rounds: 1,
            ..ModelSettings::default()
        };
        let generator = ScriptedGenerator::new()
            .with_stream(tool_call_chunks("a", "analyze_property_image_tool", &["{\"user_description\":\"x\"}"]))
            .with_stream(tool_call_chunks("b", "analyze_property_image_tool", &["{\"user_description\":\"y\"}"]));
        let fx = fixture(generator, settings);

        let events = run_to_end(&fx, RoutingDecision::IssueDetector, "x", None).await;

        assert_eq!(events.last(), Some(&GenerationEvent::Completed));
        assert!(events.contains(&GenerationEvent::text(
            TOOL_ROUNDS_EXHAUSTED,
            "Property Issue Detector"
        )));
        let requests = fx.generator.stream_requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].tools.is_empty());
        assert!(requests[1].tools.is_empty());
    }

    #[tokio::test]
    async fn test_last_round_tool_request_after_text_adds_nothing() {
        let settings = ModelSettings {
            max_tool_rounds: 0,
            ..ModelSettings::default()
        };
        let mut chunks = crate::mock::text_chunks(&["**Property Issue Expert:** Check the seal."]);
        chunks.pop();
        chunks.extend(tool_call_chunks("a", "analyze_property_image_tool", &["{}"]));
        let fx = fixture(ScriptedGenerator::new().with_stream(chunks), settings);

        let events = run_to_end(&fx, RoutingDecision::IssueDetector, "leak", None).await;

        assert_eq!(
            events.first(),
            Some(&GenerationEvent::text(
                "**Property Issue Expert:** Check the seal.",
                "Property Issue Detector"
            ))
        );
        assert!(!events.contains(&GenerationEvent::text(
            TOOL_ROUNDS_EXHAUSTED,
            "Property Issue Detector"
        )));
        assert_eq!(events.last(), Some(&GenerationEvent::Completed));
    }

    #[tokio::test]
    async fn test_refused_stream_fails() {
        let fx = fixture(
            ScriptedGenerator::new().with_stream_failure("401 Unauthorized"),
            ModelSettings::default(),
        );
        let events = run_to_end(&fx, RoutingDecision::TenancyExpert, "rent?", None).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            GenerationEvent::Failed { reason } => assert!(reason.contains("401 Unauthorized")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mid_stream_error_fails_after_text() {
        let generator = ScriptedGenerator::new().with_scripted_stream(vec![
            ScriptedChunk::Chunk(ModelChunk::Text("Partial".into())),
            ScriptedChunk::Error("connection reset".into()),
            ScriptedChunk::Chunk(ModelChunk::Text("never".into())),
        ]);
        let fx = fixture(generator, ModelSettings::default());
        let events = run_to_end(&fx, RoutingDecision::TenancyExpert, "rent?", None).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], GenerationEvent::text("Partial", "Tenancy Agreement Expert"));
        assert!(matches!(events[1], GenerationEvent::Failed { .. }));
    }

    #[test]
    fn test_pending_tool_calls_merge_by_index() {
        let mut pending = PendingToolCalls::default();
        pending.absorb(0, Some("call_a".into()), Some("analyze_".into()), "");
        pending.absorb(1, None, Some("other".into()), "{}");
        pending.absorb(0, None, Some("property_image_tool".into()), "{\"user_description\":");
        pending.absorb(0, None, None, "\"x\"}");

        let calls = pending.into_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "analyze_property_image_tool");
        assert_eq!(calls[0].function.arguments, "{\"user_description\":\"x\"}");
        assert_eq!(calls[1].id, "call_1");
    }
}

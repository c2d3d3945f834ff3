//! Turn handling from request to event stream.
//!
//! [`ChatService`] owns the routing pipeline: it validates the turn, binds the
//! request's image, picks a specialist, starts the generation session and
//! wraps its events in the tool-argument filter.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream};
use tracing::info;

use crate::attachment::{AttachmentGuard, AttachmentStore};
use crate::classifier::Classifier;
use crate::emitter::{self, Frame};
use crate::error::{ChatError, ChatResult};
use crate::filter::{filter_events, ToolArgumentFilter};
use crate::llm::TextGenerator;
use crate::registry::SpecialistRegistry;
use crate::session::GenerationSession;
use crate::settings::ModelSettings;
use crate::tools::{ImageAnalyzer, LlmImageAnalyzer, ToolBox};
use crate::types::{ChatReply, GenerationEvent, RequestContext, RoutingDecision, Turn, TurnRequest};

/// Stands in for missing text on an image turn, and is appended to every image turn.
pub const IMAGE_NOTE: &str = "See the attached image.";

pub const MISSING_INPUT: &str = "Please provide text or an image.";
pub const MISSING_CONTINUATION: &str = "No new message provided to continue.";

/// Entry point for conversational turns.
pub struct ChatService {
    classifier: Classifier,
    registry: SpecialistRegistry,
    session: GenerationSession,
    attachments: Arc<AttachmentStore>,
}

impl ChatService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        analyzer: Arc<dyn ImageAnalyzer>,
        settings: &ModelSettings,
    ) -> Self {
        let attachments = Arc::new(AttachmentStore::new());
        let tools = Arc::new(ToolBox::new(Arc::clone(&attachments), analyzer));
        Self {
            classifier: Classifier::new(Arc::clone(&generator), &settings.classifier_model),
            registry: SpecialistRegistry::new(settings),
            session: GenerationSession::new(generator, tools, settings),
            attachments,
        }
    }

    /// Service whose image analysis runs on the same generator.
    pub fn from_generator(generator: Arc<dyn TextGenerator>, settings: &ModelSettings) -> Self {
        let analyzer = Arc::new(LlmImageAnalyzer::new(
            Arc::clone(&generator),
            &settings.image_analysis_model,
            settings.image_analysis_max_tokens,
        ));
        Self::new(generator, analyzer, settings)
    }

    pub fn attachments(&self) -> &Arc<AttachmentStore> {
        &self.attachments
    }

    /// Route a turn and start generating.
    ///
    /// Fails only for unusable input; generation problems arrive in the
    /// stream as a terminal [`GenerationEvent::Failed`].
    pub async fn start_turn(&self, request: TurnRequest, context: RequestContext) -> ChatResult<TurnStream> {
        let TurnRequest {
            text,
            image,
            history,
        } = request;
        let text = text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let (latest, decision) = match (text, image.is_some()) {
            (text, true) => {
                let text = text.as_deref().unwrap_or(IMAGE_NOTE).to_string();
                (
                    Turn::user(format!("{} ({})", text, IMAGE_NOTE)),
                    RoutingDecision::IssueDetector,
                )
            }
            (Some(text), false) => {
                let latest = Turn::user(text);
                let decision = self.classifier.classify(&latest, &history).await;
                (latest, decision)
            }
            (None, false) if history.is_empty() => {
                return Err(ChatError::Input(MISSING_INPUT.to_string()))
            }
            (None, false) => return Err(ChatError::Input(MISSING_CONTINUATION.to_string())),
        };

        let attachment = image
            .map(|image| self.attachments.bind_scoped(context.request_id, image))
            .transpose()?;

        let config = self.registry.get(decision);
        info!(
            request_id = %context.request_id,
            user_id = %context.user_id,
            specialist = config.name(),
            has_image = attachment.is_some(),
            history_len = history.len(),
            "Routing turn"
        );

        let filter = ToolArgumentFilter::for_specialist(&config);
        let events = self.session.run(
            Arc::clone(&config),
            history.extended_with(latest),
            attachment.as_ref().map(|guard| guard.handle().clone()),
            context,
        );

        Ok(TurnStream {
            decision,
            events: filter_events(events, filter),
            attachment,
        })
    }

    /// Run a turn to the end and return the whole answer.
    pub async fn respond(&self, request: TurnRequest, context: RequestContext) -> ChatResult<ChatReply> {
        let turn = self.start_turn(request, context).await?;
        let agent = turn.agent();
        emitter::collect_reply(turn.into_frames(), agent).await
    }
}

/// Filtered events of one routed turn.
///
/// Holds the request's attachment until the terminal event has been yielded
/// or the stream is dropped.
pub struct TurnStream {
    decision: RoutingDecision,
    events: BoxStream<'static, GenerationEvent>,
    attachment: Option<AttachmentGuard>,
}

impl TurnStream {
    pub fn decision(&self) -> RoutingDecision {
        self.decision
    }

    /// Name of the answering specialist.
    pub fn agent(&self) -> &'static str {
        self.decision.specialist_name()
    }

    pub fn into_frames(self) -> BoxStream<'static, Frame> {
        let agent = self.agent();
        emitter::frames(self, agent)
    }
}

impl Stream for TurnStream {
    type Item = GenerationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.events.as_mut().poll_next(cx);
        if let Poll::Ready(Some(event)) = &polled {
            if event.is_terminal() {
                self.attachment = None;
            }
        }
        polled
    }
}

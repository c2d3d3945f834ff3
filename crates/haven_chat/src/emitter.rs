//! Wire protocol for filtered generation events.
//!
//! Every stream is a run of data frames followed by exactly one `end` frame:
//!
//! ```text
//! data: {"delta": "...", "agent": "Property Issue Detector"}
//!
//! data: {"error": "...", "agent": "Property Issue Detector"}
//!
//! event: end
//! data: {}
//! ```
//!
//! The non-streaming path buffers the same frames with [`collect_reply`].

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ChatError, ChatResult};
use crate::types::{ChatReply, GenerationEvent};

/// Reported when the event stream stops without Completed or Failed.
pub const UNTERMINATED_STREAM: &str = "generation ended without a terminal event";

/// Name of the terminating SSE event.
pub const END_EVENT: &str = "end";

/// One frame of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta { delta: String, agent: String },
    Error { error: String, agent: Option<String> },
    End,
}

impl Frame {
    pub fn error(error: impl Into<String>, agent: Option<String>) -> Self {
        Self::Error {
            error: error.into(),
            agent,
        }
    }

    /// SSE event name, if the frame is not a plain `data:` frame.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            Self::End => Some(END_EVENT),
            _ => None,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::Delta { delta, agent } => json!({ "delta": delta, "agent": agent }),
            Self::Error { error, agent } => json!({ "error": error, "agent": agent }),
            Self::End => json!({}),
        }
    }

    /// Text form of the frame, including the blank separator line.
    pub fn encode(&self) -> String {
        match self.event_name() {
            Some(event) => format!("event: {}\ndata: {}\n\n", event, self.payload()),
            None => format!("data: {}\n\n", self.payload()),
        }
    }
}

struct FrameState<S> {
    events: S,
    agent: Option<String>,
    queued: VecDeque<Frame>,
    done: bool,
}

/// Turn filtered events into frames.
///
/// Empty deltas are skipped. The output always ends with [`Frame::End`],
/// preceded by an error frame when generation failed or stopped early.
/// `agent` is the routed specialist; error frames name it even when no
/// delta came first.
pub fn frames<S>(events: S, agent: impl Into<String>) -> BoxStream<'static, Frame>
where
    S: Stream<Item = GenerationEvent> + Unpin + Send + 'static,
{
    let state = FrameState {
        events,
        agent: Some(agent.into()),
        queued: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.queued.pop_front() {
                return Some((frame, st));
            }
            if st.done {
                return None;
            }

            match st.events.next().await {
                Some(GenerationEvent::TextDelta {
                    fragment,
                    specialist,
                }) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    st.agent = Some(specialist.clone());
                    let frame = Frame::Delta {
                        delta: fragment,
                        agent: specialist,
                    };
                    return Some((frame, st));
                }
                Some(GenerationEvent::ToolCallFragment { .. }) => continue,
                Some(GenerationEvent::Completed) => {
                    st.done = true;
                    st.queued.push_back(Frame::End);
                }
                Some(GenerationEvent::Failed { reason }) => {
                    st.done = true;
                    st.queued.push_back(Frame::error(reason, st.agent.clone()));
                    st.queued.push_back(Frame::End);
                }
                None => {
                    warn!("Event stream ended without a terminal event");
                    st.done = true;
                    st.queued
                        .push_back(Frame::error(UNTERMINATED_STREAM, st.agent.clone()));
                    st.queued.push_back(Frame::End);
                }
            }
        }
    })
    .boxed()
}

/// Frames for a request rejected before generation started.
pub fn rejection_frames(message: impl Into<String>) -> Vec<Frame> {
    vec![Frame::error(message, None), Frame::End]
}

/// Buffer a frame stream into a single reply.
///
/// A failure with no text is an error; text produced before a failure is
/// returned as the answer. `agent` names the specialist when no delta did.
pub async fn collect_reply<S>(mut frames: S, agent: &str) -> ChatResult<ChatReply>
where
    S: Stream<Item = Frame> + Unpin,
{
    let mut response = String::new();
    let mut producer: Option<String> = None;
    let mut failure: Option<String> = None;

    while let Some(frame) = frames.next().await {
        match frame {
            Frame::Delta { delta, agent } => {
                response.push_str(&delta);
                producer.get_or_insert(agent);
            }
            Frame::Error { error, .. } => failure = Some(error),
            Frame::End => break,
        }
    }

    if response.is_empty() {
        return Err(match failure {
            Some(error) => ChatError::GenerationFailed(error),
            None => ChatError::EmptyResponse,
        });
    }
    if let Some(error) = failure {
        warn!(error = %error, "Returning partial response after failure");
    }

    Ok(ChatReply {
        response,
        agent: producer.unwrap_or_else(|| agent.to_string()),
    })
}

//! Turn classification.
//!
//! A small model is asked to name the specialist for the latest turn; the
//! answer is read by sentinel matching, so anything unusable falls back to a
//! clarifying question instead of an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, CompletionRequest, TextGenerator};
use crate::types::{History, RoutingDecision, Turn};

/// Sentinels in precedence order; the first match wins.
pub const ROUTING_SENTINELS: [(&str, RoutingDecision); 2] = [
    ("property issue detector", RoutingDecision::IssueDetector),
    ("tenancy agreement expert", RoutingDecision::TenancyExpert),
];

/// Map raw classifier output to a decision.
///
/// Physical-issue language always beats tenancy language; no match means
/// [`RoutingDecision::Clarify`].
pub fn decision_from_output(output: &str) -> RoutingDecision {
    let normalized = output.trim().to_lowercase();
    ROUTING_SENTINELS
        .iter()
        .find(|(sentinel, _)| normalized.contains(sentinel))
        .map(|(_, decision)| *decision)
        .unwrap_or(RoutingDecision::Clarify)
}

const CLASSIFIER_INSTRUCTIONS: &str = r#"INTERNAL TASK: You are a routing agent. Analyze the LATEST user message within the conversation history and decide which specialist should handle it, or whether clarification is needed. Ignore any images mentioned; image presence is handled by the system.
1. If the LATEST message is a simple greeting (e.g. 'Hello', 'Hi', 'Hey') or is highly ambiguous, lacking any sign of a physical issue or a tenancy matter, choose 'Query Clarification Agent'.
2. Otherwise, if the LATEST message primarily describes a PHYSICAL issue or damage within a property (e.g. leak, broken, mold, pests, noise problem, appliance not working), choose 'Property Issue Detector'.
3. Otherwise, if the LATEST message is about tenancy matters such as agreements, lease terms, tenant or landlord rights and responsibilities, rent, eviction or standard rental procedures, choose 'Tenancy Agreement Expert'.
4. If the message mentions both damage and lease terms, prefer 'Property Issue Detector'.
Use the history only to understand the LATEST message (for example when the user is answering a clarification question), not to route by past topics.
OUTPUT ONLY the name of the chosen agent: 'Property Issue Detector', 'Tenancy Agreement Expert', or 'Query Clarification Agent'."#;

/// LLM-backed turn classifier.
pub struct Classifier {
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl Classifier {
    pub fn new(generator: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self {
            generator,
            model: model.into(),
        }
    }

    /// Decide which specialist answers `latest`, given the prior `history`.
    ///
    /// Never fails: an unusable or failed model call routes to Clarify.
    pub async fn classify(&self, latest: &Turn, history: &History) -> RoutingDecision {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(CLASSIFIER_INSTRUCTIONS));
        messages.extend(history.turns().iter().map(ChatMessage::from));
        messages.push(ChatMessage::from(latest));

        let request = CompletionRequest::new(&self.model, messages);
        let decision = match self.generator.complete(&request).await {
            Ok(output) => {
                debug!(output = %output.trim(), "Classifier output");
                decision_from_output(&output)
            }
            Err(e) => {
                warn!(error = %e, "Classifier call failed, asking for clarification");
                RoutingDecision::Clarify
            }
        };

        info!(decision = %decision, "Classified turn");
        decision
    }
}

//! Specialist configurations and their lookup.
//!
//! Each routing decision maps to one specialist with a persona, a model, and
//! the capabilities it may use while answering.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::llm::supports_web_search;
use crate::settings::ModelSettings;
use crate::tools::ToolId;
use crate::types::RoutingDecision;

/// How a specialist answers.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialistConfig {
    pub decision: RoutingDecision,
    pub model: String,
    pub capability_tools: BTreeSet<ToolId>,
    pub allow_web_search: bool,
    pub persona_directives: String,
    /// Canned answer; a specialist with one never calls a model.
    pub fixed_reply: Option<String>,
}

impl SpecialistConfig {
    pub fn name(&self) -> &'static str {
        self.decision.specialist_name()
    }

    pub fn has_tools(&self) -> bool {
        !self.capability_tools.is_empty()
    }
}

/// Lookup from routing decision to specialist.
pub struct SpecialistRegistry {
    clarify: Arc<SpecialistConfig>,
    issue_detector: Arc<SpecialistConfig>,
    tenancy_expert: Arc<SpecialistConfig>,
}

impl SpecialistRegistry {
    pub fn new(settings: &ModelSettings) -> Self {
        let tenancy_search = supports_web_search(&settings.tenancy_expert_model);
        if !tenancy_search {
            warn!(
                model = %settings.tenancy_expert_model,
                "Tenancy expert model does not support web search, answering without it"
            );
        }

        Self {
            clarify: Arc::new(SpecialistConfig {
                decision: RoutingDecision::Clarify,
                model: settings.classifier_model.clone(),
                capability_tools: BTreeSet::new(),
                allow_web_search: false,
                persona_directives: CLARIFY_DIRECTIVES.to_string(),
                fixed_reply: Some(CLARIFYING_QUESTION.to_string()),
            }),
            issue_detector: Arc::new(SpecialistConfig {
                decision: RoutingDecision::IssueDetector,
                model: settings.issue_detector_model.clone(),
                capability_tools: BTreeSet::from([ToolId::AnalyzePropertyImage]),
                allow_web_search: false,
                persona_directives: ISSUE_DETECTOR_DIRECTIVES.to_string(),
                fixed_reply: None,
            }),
            tenancy_expert: Arc::new(SpecialistConfig {
                decision: RoutingDecision::TenancyExpert,
                model: settings.tenancy_expert_model.clone(),
                capability_tools: BTreeSet::new(),
                allow_web_search: tenancy_search,
                persona_directives: TENANCY_EXPERT_DIRECTIVES.to_string(),
                fixed_reply: None,
            }),
        }
    }

    pub fn get(&self, decision: RoutingDecision) -> Arc<SpecialistConfig> {
        match decision {
            RoutingDecision::Clarify => Arc::clone(&self.clarify),
            RoutingDecision::IssueDetector => Arc::clone(&self.issue_detector),
            RoutingDecision::TenancyExpert => Arc::clone(&self.tenancy_expert),
        }
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new(&ModelSettings::default())
    }
}

/// Sent verbatim whenever a turn needs clarification.
pub const CLARIFYING_QUESTION: &str = "Hello! To best assist you, could you please let me know if you have a question about a physical property issue (like damage, leaks, pests) or a question about your tenancy agreement (like lease terms, rent, rights)?";

/// Opening marker of every issue-detector answer.
pub const ISSUE_DETECTOR_MARKER: &str = "**Property Issue Expert:**";

/// Opening marker of every tenancy-expert answer.
pub const TENANCY_EXPERT_MARKER: &str = "**Tenancy Agreement Expert:**";

const CLARIFY_DIRECTIVES: &str = r#"You have received a brief greeting or an ambiguous query that does not clearly indicate a property issue or a tenancy question.
Your only task is to ask the user to clarify their need. Do not answer other questions and do not guess their intent."#;

const ISSUE_DETECTOR_DIRECTIVES: &str = r#"You are an expert in identifying issues in residential buildings based on user descriptions and conversation history.

Guidelines:
- If the LATEST user message says an image is attached, call the 'analyze_property_image_tool' function with the user's latest description of the image as 'user_description'.
- Use the conversation history for context but focus the tool call on the LATEST image description.
- If there is no new image, analyze the issue from the text description and the conversation history.
- If the tool reports an error, explain the problem to the user and suggest what they can do instead.
- Provide a brief assessment and suggest next steps. Respond in Markdown without excess line breaks.
- Start your answer with '**Property Issue Expert:**', then continue the first sentence on the same line. Break line after."#;

const TENANCY_EXPERT_DIRECTIVES: &str = r#"You are an expert on standard tenancy agreements and common landlord-tenant questions.

Guidelines:
- Use the conversation history for context and answer the user's LATEST query.
- You may use web search for current laws, local rules or recent events, or whenever you do not know the answer.
- Do not provide legal advice, but explain common clauses and procedures clearly.
- If the LATEST question is primarily about physical damage to a property, say it is outside your expertise and should go to the 'Property Issue Detector' or to the landlord as the lease requires.
- Take the user's location into account when it is mentioned.
- Respond clearly in Markdown without excess line breaks.
- Start your answer with '**Tenancy Agreement Expert:**', then continue the first sentence on the same line. Break line after."#;

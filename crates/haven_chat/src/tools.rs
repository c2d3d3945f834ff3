//! Tools a specialist may call while generating.
//!
//! The only tool that touches request data is the image analyzer, and it sees
//! an image only through the [`AttachmentHandle`] of the request it runs for.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::attachment::{Attachment, AttachmentHandle, AttachmentStore};
use crate::error::ToolError;
use crate::llm::{
    ChatMessage, CompletionRequest, ContentPart, FunctionDefinition, ImageUrl, TextGenerator,
    ToolCall, ToolDefinition,
};

/// Identifier of a function tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolId {
    AnalyzePropertyImage,
}

impl ToolId {
    /// Function name exposed to the model.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalyzePropertyImage => "analyze_property_image_tool",
        }
    }

    /// The tool's declared parameter name.
    pub fn argument_key(&self) -> &'static str {
        match self {
            Self::AnalyzePropertyImage => "user_description",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "analyze_property_image_tool" => Some(Self::AnalyzePropertyImage),
            _ => None,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::AnalyzePropertyImage => ToolDefinition {
                kind: "function".to_string(),
                function: FunctionDefinition {
                    name: self.name().to_string(),
                    description: "Analyze the image attached to the current message for \
                                  property issues such as leaks, mold, damage or pests."
                        .to_string(),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": {
                            "user_description": {
                                "type": "string",
                                "description": "The user's latest description of what the image shows."
                            }
                        },
                        "required": ["user_description"],
                        "additionalProperties": false
                    }),
                },
            },
        }
    }
}

/// Vision capability behind the image tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, attachment: &Attachment, description: &str) -> Result<String, ToolError>;
}

const IMAGE_ANALYSIS_DIRECTIVES: &str = "You are an expert in identifying potential issues in residential properties. \
Analyze the user's description and the provided image. \
Identify the likely issue (e.g., water leak, mold, broken window, pest infestation). \
Provide a brief assessment and suggest potential next steps. \
Return markdown formatted output for chat and don't add extra line breaks. \
Start your answer with '**Property Issue Expert:**', then continue the first sentence on the same line. Break line after.";

/// [`ImageAnalyzer`] backed by a vision-capable chat model.
pub struct LlmImageAnalyzer {
    generator: Arc<dyn TextGenerator>,
    model: String,
    max_tokens: u32,
}

impl LlmImageAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            generator,
            model: model.into(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ImageAnalyzer for LlmImageAnalyzer {
    async fn analyze(&self, attachment: &Attachment, description: &str) -> Result<String, ToolError> {
        let prompt = format!(
            "{}\n\nUser description: '{}'",
            IMAGE_ANALYSIS_DIRECTIVES, description
        );
        let message = ChatMessage::user_parts(vec![
            ContentPart::Text { text: prompt },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: attachment.data_url(),
                },
            },
        ]);
        let request =
            CompletionRequest::new(&self.model, vec![message]).with_max_tokens(self.max_tokens);

        match self.generator.complete(&request).await {
            Ok(text) if text.trim().is_empty() => Ok("AI analysis produced no text.".to_string()),
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(error = %e, "Image analysis call failed");
                Err(ToolError::Upstream(e.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeImageArgs {
    user_description: String,
}

/// Executes tool calls on behalf of a generation session.
pub struct ToolBox {
    attachments: Arc<AttachmentStore>,
    analyzer: Arc<dyn ImageAnalyzer>,
}

impl ToolBox {
    pub fn new(attachments: Arc<AttachmentStore>, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        Self {
            attachments,
            analyzer,
        }
    }

    pub fn definitions(tools: &BTreeSet<ToolId>) -> Vec<ToolDefinition> {
        tools.iter().map(ToolId::definition).collect()
    }

    /// Run `call` and return its output text.
    ///
    /// Tool failures are reported in the output, never as an error, so the
    /// model can still finish its answer.
    pub async fn invoke(
        &self,
        call: &ToolCall,
        allowed: &BTreeSet<ToolId>,
        attachment: Option<&AttachmentHandle>,
    ) -> String {
        match self.try_invoke(call, allowed, attachment).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.function.name, error = %e, "Tool invocation failed");
                e.to_string()
            }
        }
    }

    async fn try_invoke(
        &self,
        call: &ToolCall,
        allowed: &BTreeSet<ToolId>,
        attachment: Option<&AttachmentHandle>,
    ) -> Result<String, ToolError> {
        let tool = ToolId::from_name(&call.function.name)
            .filter(|tool| allowed.contains(tool))
            .ok_or_else(|| ToolError::UnknownTool(call.function.name.clone()))?;

        match tool {
            ToolId::AnalyzePropertyImage => {
                let args: AnalyzeImageArgs = serde_json::from_str(&call.function.arguments)
                    .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
                self.analyze_image(&args.user_description, attachment).await
            }
        }
    }

    async fn analyze_image(
        &self,
        description: &str,
        attachment: Option<&AttachmentHandle>,
    ) -> Result<String, ToolError> {
        let handle = attachment.ok_or(ToolError::NoAttachment)?;
        let image = self
            .attachments
            .resolve(handle)
            .map_err(|_| ToolError::NoAttachment)?;
        image.validate()?;

        info!(
            request_id = %handle.request_id(),
            media_type = %image.media_type,
            "Analyzing property image"
        );
        self.analyzer.analyze(&image, description).await
    }
}

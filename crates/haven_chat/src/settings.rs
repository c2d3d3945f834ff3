//! Model settings for the classifier and specialists.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ChatResult;

/// Which models back each stage of the pipeline.
///
/// Loaded from a JSON settings file; every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub classifier_model: String,
    pub issue_detector_model: String,
    pub tenancy_expert_model: String,
    pub image_analysis_model: String,
    pub image_analysis_max_tokens: u32,
    /// Upper bound on model/tool round trips within one session.
    pub max_tool_rounds: u32,
    pub web_search_context_size: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            classifier_model: "gpt-4o-mini".to_string(),
            issue_detector_model: "gpt-4o".to_string(),
            tenancy_expert_model: "gpt-4o-mini-search-preview".to_string(),
            image_analysis_model: "gpt-4.1".to_string(),
            image_analysis_max_tokens: 500,
            max_tool_rounds: 3,
            web_search_context_size: "medium".to_string(),
        }
    }
}

impl ModelSettings {
    pub fn from_file(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        info!(path = %path.display(), "Loaded model settings");
        Ok(settings)
    }
}

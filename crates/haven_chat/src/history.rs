//! Parsing of caller-supplied conversation history.

use serde_json::Value;

use crate::error::HistoryParseError;
use crate::types::{History, Turn, TurnRole};

impl History {
    /// Parse a JSON list of `{role, content}` objects.
    ///
    /// Blank input is an empty history. Any structural problem is reported as a
    /// typed [`HistoryParseError`]; the caller decides whether to recover.
    pub fn from_json(raw: &str) -> Result<Self, HistoryParseError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(raw)?;
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(HistoryParseError::NotAList),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| parse_turn(index, item))
            .collect::<Result<Vec<_>, _>>()
            .map(History::new)
    }
}

fn parse_turn(index: usize, item: Value) -> Result<Turn, HistoryParseError> {
    let invalid = |reason: &str| HistoryParseError::InvalidItem {
        index,
        reason: reason.to_string(),
    };

    let object = item.as_object().ok_or_else(|| invalid("not an object"))?;

    let role = match object.get("role").ok_or_else(|| invalid("missing role"))? {
        Value::String(role) => match role.as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            "system" => TurnRole::System,
            other => return Err(invalid(&format!("unknown role '{}'", other))),
        },
        _ => return Err(invalid("role is not a string")),
    };

    let content = match object
        .get("content")
        .ok_or_else(|| invalid("missing content"))?
    {
        Value::String(content) => content.clone(),
        _ => return Err(invalid("content is not a string")),
    };

    Ok(Turn { role, content })
}

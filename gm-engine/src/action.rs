//! The one-action-per-step protocol spoken by the model.
//!
//! Each planning step the model must answer with a single JSON object
//! `{"action": <name>, "parameters": {...}}`. Names outside the catalog and
//! malformed parameters are reported back to the model; text that contains
//! no JSON object at all is taken as the reply itself.

use gm_core::types::{CharacterId, LocationId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default row count for `query_events` and `rag_search`.
pub const DEFAULT_LIMIT: i64 = 5;
/// Upper clamp of `query_events`.
pub const MAX_EVENT_LIMIT: i64 = 50;
/// Upper clamp of `rag_search`.
pub const MAX_RAG_LIMIT: i64 = 20;

/// One catalog entry with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "parameters", rename_all = "snake_case")]
pub enum ToolAction {
    /// Recent events, optionally of one kind.
    QueryEvents {
        /// Event kind filter.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        /// Requested row count, clamped to `1..=50`.
        #[serde(default, deserialize_with = "lenient_limit", skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
    },
    /// Append (and index) a new event.
    #[serde(rename_all = "camelCase")]
    UpsertEvent {
        /// Kind label.
        kind: String,
        /// One-line summary.
        summary: String,
        /// Location the event happened at.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location_id: Option<LocationId>,
    },
    /// Similarity search over indexed memories.
    RagSearch {
        /// Query text.
        #[serde(alias = "query")]
        q: String,
        /// Requested hit count, clamped to `1..=20`.
        #[serde(default, deserialize_with = "lenient_limit", skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
    },
    /// Cheapest route between two locations.
    #[serde(rename_all = "camelCase")]
    Pathfind {
        /// Origin.
        from_id: LocationId,
        /// Destination.
        to_id: LocationId,
    },
    /// Snapshot of recent locations and events.
    WorldContext {},
    /// Read a character's scene document.
    #[serde(rename_all = "camelCase")]
    GetSceneState {
        /// Owner.
        character_id: CharacterId,
    },
    /// Replace a character's scene document.
    #[serde(rename_all = "camelCase")]
    SetSceneState {
        /// Owner.
        character_id: CharacterId,
        /// New document, stored as given.
        state: Value,
    },
    /// Terminal action carrying the narrative reply.
    Final {
        /// Reply text.
        #[serde(default, deserialize_with = "lenient_text")]
        reply: String,
    },
}

impl ToolAction {
    /// Catalog name of this action.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueryEvents { .. } => "query_events",
            Self::UpsertEvent { .. } => "upsert_event",
            Self::RagSearch { .. } => "rag_search",
            Self::Pathfind { .. } => "pathfind",
            Self::WorldContext {} => "world_context",
            Self::GetSceneState { .. } => "get_scene_state",
            Self::SetSceneState { .. } => "set_scene_state",
            Self::Final { .. } => "final",
        }
    }

    /// Whether this action ends the loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    /// Decode a request object, distinguishing unknown names from bad
    /// parameters.
    ///
    /// A missing `parameters` key is read as `{}`.
    ///
    /// # Errors
    ///
    /// See [`ActionError`].
    pub fn from_value(value: &Value) -> Result<Self, ActionError> {
        let Value::Object(object) = value else {
            return Err(ActionError::NotAnObject);
        };
        let Some(name) = object.get("action").and_then(Value::as_str) else {
            return Err(ActionError::MissingAction);
        };
        if !CATALOG.contains(&name) {
            return Err(ActionError::UnknownAction(name.to_string()));
        }

        let parameters = match object.get("parameters") {
            Some(parameters @ Value::Object(_)) => parameters.clone(),
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(_) => {
                return Err(ActionError::InvalidParameters {
                    action: name.to_string(),
                    message: "parameters must be an object".to_string(),
                });
            }
        };

        // Only the two protocol keys are decoded; anything else the model
        // adds next to them is ignored.
        let mut request = Map::new();
        request.insert("action".to_string(), Value::String(name.to_string()));
        request.insert("parameters".to_string(), parameters);

        serde_json::from_value(Value::Object(request)).map_err(|e| ActionError::InvalidParameters {
            action: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Canonical JSON text of this request.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"action":"{}"}}"#, self.name()))
    }
}

/// Names accepted by [`ToolAction::from_value`].
pub const CATALOG: &[&str] = &[
    "query_events",
    "upsert_event",
    "rag_search",
    "pathfind",
    "world_context",
    "get_scene_state",
    "set_scene_state",
    "final",
];

/// Why a JSON object is not a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The value is not a JSON object.
    #[error("request is not a JSON object")]
    NotAnObject,
    /// No string `action` key.
    #[error("missing_action")]
    MissingAction,
    /// Name outside the catalog.
    #[error("unknown_action")]
    UnknownAction(String),
    /// Known name, wrong parameter shape.
    #[error("invalid_parameters: {message}")]
    InvalidParameters {
        /// Action name.
        action: String,
        /// Decoder message.
        message: String,
    },
}

impl ActionError {
    /// Action name to report, if one was given.
    #[must_use]
    pub fn action(&self) -> &str {
        match self {
            Self::NotAnObject | Self::MissingAction => "unknown",
            Self::UnknownAction(name) | Self::InvalidParameters { action: name, .. } => name,
        }
    }
}

/// Clamp an optional requested limit into `1..=max`.
#[must_use]
pub fn clamp_limit(limit: Option<i64>, max: i64) -> usize {
    let clamped = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, max);
    usize::try_from(clamped).unwrap_or(1)
}

// Models send limits as ints, floats or numeric strings; anything else is
// treated as absent.
fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    #[allow(clippy::cast_possible_truncation)]
    let limit = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    };
    Ok(limit)
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Model output parsing
// ---------------------------------------------------------------------------

/// What one completion turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// A valid catalog request.
    Action(ToolAction),
    /// A JSON object that is not a valid request.
    Rejected {
        /// The object as sent.
        request: Value,
        /// Why it was refused.
        error: ActionError,
    },
    /// No JSON object: the text is the reply.
    RawFallback(String),
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or bare).
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Find the JSON value in `text`: the whole text, else the span from the
/// first `{` to the last `}`.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let clean = strip_code_fences(text);
    if clean.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(clean) {
        return Some(value);
    }
    let start = clean.find('{')?;
    let end = clean.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&clean[start..=end]).ok()
}

/// Classify one completion.
#[must_use]
pub fn parse_model_output(text: &str) -> ModelTurn {
    match extract_json(text) {
        Some(value @ Value::Object(_)) => match ToolAction::from_value(&value) {
            Ok(action) => ModelTurn::Action(action),
            Err(error) => ModelTurn::Rejected {
                request: value,
                error,
            },
        },
        _ => ModelTurn::RawFallback(strip_code_fences(text).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_final() {
        let turn = parse_model_output("```json\n{\"action\":\"final\",\"parameters\":{\"reply\":\"Ciao\"}}\n```");
        assert_eq!(
            turn,
            ModelTurn::Action(ToolAction::Final {
                reply: "Ciao".to_string()
            })
        );
    }

    #[test]
    fn finds_object_inside_prose() {
        let turn = parse_model_output("Ecco: {\"action\":\"world_context\",\"parameters\":{}} fatto");
        assert_eq!(turn, ModelTurn::Action(ToolAction::WorldContext {}));
    }

    #[test]
    fn missing_parameters_are_empty() {
        let turn = parse_model_output(r#"{"action":"world_context"}"#);
        assert_eq!(turn, ModelTurn::Action(ToolAction::WorldContext {}));
    }

    #[test]
    fn plain_text_is_raw_fallback() {
        let turn = parse_model_output("  La strada è deserta.\n- Avanzare  ");
        assert_eq!(
            turn,
            ModelTurn::RawFallback("La strada è deserta.\n- Avanzare".to_string())
        );
    }

    #[test]
    fn non_object_json_is_raw_fallback() {
        assert_eq!(parse_model_output("42"), ModelTurn::RawFallback("42".to_string()));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let turn = parse_model_output(r#"{"action":"summon_horde","parameters":{}}"#);
        match turn {
            ModelTurn::Rejected { error, .. } => {
                assert_eq!(error, ActionError::UnknownAction("summon_horde".to_string()));
                assert_eq!(error.to_string(), "unknown_action");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn bad_parameters_are_rejected_with_name() {
        let turn = parse_model_output(r#"{"action":"pathfind","parameters":{"fromId":"a"}}"#);
        let ModelTurn::Rejected { error, .. } = turn else {
            panic!("expected rejection");
        };
        assert_eq!(error.action(), "pathfind");
        assert!(matches!(error, ActionError::InvalidParameters { .. }));
    }

    #[test]
    fn object_without_action_is_rejected() {
        let turn = parse_model_output(r#"{"reply":"ciao"}"#);
        assert!(matches!(
            turn,
            ModelTurn::Rejected {
                error: ActionError::MissingAction,
                ..
            }
        ));
    }

    #[test]
    fn extra_top_level_keys_are_ignored() {
        let turn = parse_model_output(r#"{"thought":"serve contesto","action":"world_context","parameters":{}}"#);
        assert_eq!(turn, ModelTurn::Action(ToolAction::WorldContext {}));
    }

    #[test]
    fn lenient_fields() {
        let action = ToolAction::from_value(&json!({
            "action": "rag_search",
            "parameters": {"query": "convoglio", "limit": "7"}
        }))
        .expect("valid");
        assert_eq!(
            action,
            ToolAction::RagSearch {
                q: "convoglio".to_string(),
                limit: Some(7)
            }
        );

        let action = ToolAction::from_value(&json!({
            "action": "query_events",
            "parameters": {"limit": 3.9}
        }))
        .expect("valid");
        assert_eq!(action, ToolAction::QueryEvents { kind: None, limit: Some(3) });

        let action = ToolAction::from_value(&json!({
            "action": "final",
            "parameters": {"reply": 12}
        }))
        .expect("valid");
        assert_eq!(action, ToolAction::Final { reply: "12".to_string() });
    }

    #[test]
    fn canonical_json_uses_wire_names() {
        let action = ToolAction::Pathfind {
            from_id: LocationId::from("a"),
            to_id: LocationId::from("b"),
        };
        let value: Value = serde_json::from_str(&action.to_json()).expect("json");
        assert_eq!(
            value,
            json!({"action": "pathfind", "parameters": {"fromId": "a", "toId": "b"}})
        );
    }

    #[test]
    fn limits_clamp() {
        assert_eq!(clamp_limit(None, MAX_EVENT_LIMIT), 5);
        assert_eq!(clamp_limit(Some(0), MAX_EVENT_LIMIT), 1);
        assert_eq!(clamp_limit(Some(-4), MAX_RAG_LIMIT), 1);
        assert_eq!(clamp_limit(Some(500), MAX_EVENT_LIMIT), 50);
        assert_eq!(clamp_limit(Some(500), MAX_RAG_LIMIT), 20);
    }
}

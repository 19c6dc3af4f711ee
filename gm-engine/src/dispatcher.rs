//! Tool dispatcher: routes one [`ToolAction`] to the world store.
//!
//! Execution never fails from the loop's point of view. Store and index
//! errors are caught here and turned into [`ToolResult::Error`], which the
//! orchestrator feeds back to the model as an observation.

use std::sync::Arc;

use gm_core::graph::{CostGraph, PathResult};
use gm_core::persistence::WorldStore;
use gm_core::retrieval::{MemoryHit, MemoryIndex, WORLD_SCOPE};
use gm_core::types::{CharacterId, Event, EventQuery, Location, LocationId, NewEvent};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::action::{clamp_limit, ActionError, ToolAction, MAX_EVENT_LIMIT, MAX_RAG_LIMIT};

/// Locations included in a `world_context` snapshot.
pub const CONTEXT_LOCATIONS: usize = 20;
/// Events included in a `world_context` snapshot.
pub const CONTEXT_EVENTS: usize = 10;

/// Outcome of one dispatched action, serialized as `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ToolResult {
    /// `query_events`: most recent first.
    Events(Vec<Event>),
    /// `upsert_event`: the appended event.
    Event(Event),
    /// `rag_search`: best match first.
    Rag(Vec<MemoryHit>),
    /// `pathfind`.
    Path(PathResult),
    /// `world_context`.
    World {
        /// Most recently updated locations.
        locations: Vec<Location>,
        /// Most recent events.
        events: Vec<Event>,
    },
    /// `get_scene_state`.
    #[serde(rename_all = "camelCase")]
    SceneState {
        /// Owner.
        character_id: CharacterId,
        /// Stored document, `null` if none.
        state: Option<Value>,
    },
    /// `set_scene_state`.
    #[serde(rename_all = "camelCase")]
    SceneStateSaved {
        /// Always true.
        ok: bool,
        /// Owner.
        character_id: CharacterId,
    },
    /// `final` reaching the dispatcher; echoed back unchanged.
    Final {
        /// Reply text.
        reply: String,
    },
    /// Refused or failed action.
    Error {
        /// Action name.
        action: String,
        /// Failure description.
        error: String,
    },
}

impl ToolResult {
    /// Whether the action failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Error result for a request that could not be decoded.
    #[must_use]
    pub fn rejected(error: &ActionError) -> Self {
        Self::Error {
            action: error.action().to_string(),
            error: error.to_string(),
        }
    }

    /// JSON text of this result, cut to at most `max_chars` characters.
    #[must_use]
    pub fn observation(&self, max_chars: usize) -> String {
        let text = serde_json::to_string(self)
            .unwrap_or_else(|e| json!({"type": "error", "data": {"error": e.to_string()}}).to_string());
        truncate_chars(&text, max_chars)
    }
}

/// First `max_chars` characters of `text`, never splitting a character.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Executes catalog actions against a store and an optional memory index.
#[derive(Clone)]
pub struct ToolDispatcher {
    store: Arc<dyn WorldStore>,
    index: Option<MemoryIndex>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    /// Create a dispatcher. Without an index, `upsert_event` does not index
    /// and `rag_search` returns nothing.
    #[must_use]
    pub fn new(store: Arc<dyn WorldStore>, index: Option<MemoryIndex>) -> Self {
        Self { store, index }
    }

    /// The store actions run against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WorldStore> {
        &self.store
    }

    /// Run one action. Failures come back as [`ToolResult::Error`].
    pub fn execute(&self, action: &ToolAction) -> ToolResult {
        let name = action.name();
        match self.try_execute(action) {
            Ok(result) => {
                debug!(action = name, "Tool executed");
                result
            }
            Err(e) => {
                warn!(action = name, error = %e, "Tool failed");
                ToolResult::Error {
                    action: name.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Decode and run a raw request object.
    pub fn execute_json(&self, request: &Value) -> ToolResult {
        match ToolAction::from_value(request) {
            Ok(action) => self.execute(&action),
            Err(e) => {
                warn!(action = e.action(), error = %e, "Tool request refused");
                ToolResult::rejected(&e)
            }
        }
    }

    fn try_execute(&self, action: &ToolAction) -> gm_core::error::Result<ToolResult> {
        let store = self.store.as_ref();
        match action {
            ToolAction::QueryEvents { kind, limit } => {
                let mut query = EventQuery::recent(clamp_limit(*limit, MAX_EVENT_LIMIT));
                if let Some(kind) = kind {
                    query = query.of_kind(kind.clone());
                }
                Ok(ToolResult::Events(store.recent_events(&query)?))
            }
            ToolAction::UpsertEvent {
                kind,
                summary,
                location_id,
            } => Ok(ToolResult::Event(self.upsert_event(kind, summary, location_id.clone())?)),
            ToolAction::RagSearch { q, limit } => {
                let hits = match &self.index {
                    Some(index) => index.search(store, q, clamp_limit(*limit, MAX_RAG_LIMIT))?,
                    None => Vec::new(),
                };
                Ok(ToolResult::Rag(hits))
            }
            ToolAction::Pathfind { from_id, to_id } => {
                let graph = CostGraph::load(store)?;
                Ok(ToolResult::Path(graph.shortest_path(from_id, to_id)))
            }
            ToolAction::WorldContext {} => Ok(ToolResult::World {
                locations: store.list_locations(CONTEXT_LOCATIONS)?,
                events: store.recent_events(&EventQuery::recent(CONTEXT_EVENTS))?,
            }),
            ToolAction::GetSceneState { character_id } => Ok(ToolResult::SceneState {
                character_id: character_id.clone(),
                state: store.get_scene_state(character_id)?,
            }),
            ToolAction::SetSceneState {
                character_id,
                state,
            } => {
                store.upsert_scene_state(character_id, state)?;
                Ok(ToolResult::SceneStateSaved {
                    ok: true,
                    character_id: character_id.clone(),
                })
            }
            ToolAction::Final { reply } => Ok(ToolResult::Final {
                reply: reply.clone(),
            }),
        }
    }

    fn upsert_event(
        &self,
        kind: &str,
        summary: &str,
        location_id: Option<LocationId>,
    ) -> gm_core::error::Result<Event> {
        let event = self.store.append_event(
            NewEvent::new(kind, summary)
                .with_payload(json!({ "gmAsserted": true }))
                .at_location(location_id),
        )?;

        if let Some(index) = &self.index {
            let content = format!("{}: {}", event.kind, event.summary);
            let ref_id = event.location_id.as_ref().map(LocationId::as_str);
            if let Err(e) = index.index(self.store.as_ref(), event.id.as_str(), WORLD_SCOPE, ref_id, &content) {
                warn!(event = %event.id, error = %e, "Event stored but not indexed");
            }
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_core::embedding::HashingEmbeddingProvider;
    use gm_core::persistence::SqliteWorldStore;
    use gm_core::seed::{seed_demo_world, CASERTA_ID, NAPOLI_ID};

    fn dispatcher(with_index: bool) -> ToolDispatcher {
        let store: Arc<dyn WorldStore> = Arc::new(SqliteWorldStore::open_in_memory().expect("store"));
        seed_demo_world(store.as_ref()).expect("seed");
        let index = with_index.then(|| {
            MemoryIndex::new(Arc::new(HashingEmbeddingProvider::new(64).expect("provider")))
        });
        ToolDispatcher::new(store, index)
    }

    #[test]
    fn unknown_action_is_an_error_result() {
        let d = dispatcher(false);
        let result = d.execute_json(&json!({"action": "teleport", "parameters": {}}));
        assert_eq!(
            result,
            ToolResult::Error {
                action: "teleport".to_string(),
                error: "unknown_action".to_string()
            }
        );
    }

    #[test]
    fn pathfind_between_seeded_locations() {
        let d = dispatcher(false);
        let result = d.execute(&ToolAction::Pathfind {
            from_id: LocationId::from(NAPOLI_ID),
            to_id: LocationId::from(CASERTA_ID),
        });
        let ToolResult::Path(path) = result else {
            panic!("expected path, got {result:?}");
        };
        assert!((path.cost - 77.0).abs() < f64::EPSILON);
        assert_eq!(path.path.len(), 2);
    }

    #[test]
    fn upsert_then_query_and_search() {
        let d = dispatcher(true);
        let created = d.execute(&ToolAction::UpsertEvent {
            kind: "scene".to_string(),
            summary: "Un convoglio di sopravvissuti attraversa il ponte".to_string(),
            location_id: Some(LocationId::from(NAPOLI_ID)),
        });
        let ToolResult::Event(event) = created else {
            panic!("expected event");
        };
        assert_eq!(event.payload, json!({"gmAsserted": true}));

        let ToolResult::Events(events) = d.execute(&ToolAction::QueryEvents {
            kind: Some("scene".to_string()),
            limit: None,
        }) else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);

        let ToolResult::Rag(hits) = d.execute(&ToolAction::RagSearch {
            q: "convoglio sul ponte".to_string(),
            limit: Some(3),
        }) else {
            panic!("expected hits");
        };
        assert_eq!(hits[0].id, event.id.as_str());
        assert_eq!(hits[0].ref_id.as_deref(), Some(NAPOLI_ID));
    }

    #[test]
    fn rag_without_index_is_empty() {
        let d = dispatcher(false);
        let result = d.execute(&ToolAction::RagSearch {
            q: "qualcosa".to_string(),
            limit: None,
        });
        assert_eq!(result, ToolResult::Rag(Vec::new()));
    }

    #[test]
    fn set_scene_state_replaces_document() {
        let d = dispatcher(false);
        let character = d.store().create_character("Ada", &[]).expect("character");
        let id = character.id.clone();

        let saved = d.execute(&ToolAction::SetSceneState {
            character_id: id.clone(),
            state: json!({"phase": "parley"}),
        });
        assert_eq!(
            saved,
            ToolResult::SceneStateSaved {
                ok: true,
                character_id: id.clone()
            }
        );

        let read = d.execute(&ToolAction::GetSceneState { character_id: id.clone() });
        assert_eq!(
            read,
            ToolResult::SceneState {
                character_id: id,
                state: Some(json!({"phase": "parley"}))
            }
        );
    }

    #[test]
    fn world_context_lists_locations_and_events() {
        let d = dispatcher(false);
        let ToolResult::World { locations, events } = d.execute(&ToolAction::WorldContext {}) else {
            panic!("expected world");
        };
        assert_eq!(locations.len(), 2);
        assert!(!events.is_empty());
    }

    #[test]
    fn observation_is_tagged_and_bounded() {
        let result = ToolResult::Final {
            reply: "è".repeat(50),
        };
        let full = result.observation(10_000);
        assert!(full.starts_with(r#"{"type":"final","data":{"reply":"#));
        let cut = result.observation(20);
        assert_eq!(cut.chars().count(), 20);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("àèìòù", 2), "àè");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}

//! The orchestration loop: one player message in, one narrative reply out.
//!
//! ```text
//! PLANNING ──(tool action)──▶ TOOL_CALL ──observation──▶ PLANNING
//!    │                                                     │
//!    └──(final / raw text, not repeated)──▶ FINALIZING ◀───┘ budget spent:
//!                                              │            forced request
//!                                              ▼
//!                    comprehension filter → review → ≤1 rewrite → options
//!                                              │
//!                                              ▼
//!                                 scene event + location resolution → DONE
//! ```
//!
//! Every turn is a strictly sequential chain of completion requests; nothing
//! is shared between turns except through the [`WorldStore`].

use std::sync::Arc;

use gm_core::config::{GmConfig, LlmConfig, OrchestratorConfig};
use gm_core::embedding::provider_from_config;
use gm_core::graph::{CostGraph, PathResult};
use gm_core::persistence::WorldStore;
use gm_core::retrieval::MemoryIndex;
use gm_core::sanitizer::Sanitizer;
use gm_core::types::{
    event_kind, Character, CharacterId, EventQuery, GeoPoint, LocationId, NewEvent, SceneStateDoc,
};
use gm_llm::prompt::{self, render_template};
use gm_llm::{CompletionService, Conversation, LlmClient, LlmError, SamplingParams};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::action::{parse_model_output, strip_code_fences, ModelTurn, ToolAction};
use crate::dispatcher::{ToolDispatcher, ToolResult};
use crate::error::Result;

/// Reply used when a candidate is empty.
const EMPTY_REPLY: &str = "...";

/// Trace notes.
pub mod note {
    /// The model answered with plain text instead of an action.
    pub const RAW_FALLBACK: &str = "raw_fallback";
    /// The terminal candidate repeated the previous one and was refused.
    pub const REPEATED: &str = "repeated";
    /// The reply came from the forced finalization request.
    pub const FORCED: &str = "forced";
    /// The completion service was unreachable; the fixed reply was used.
    pub const STUB: &str = "stub";
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// One player message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Speaking character.
    pub character_id: CharacterId,
    /// What the player wrote.
    pub text: String,
}

impl TurnRequest {
    /// Build a request.
    #[must_use]
    pub fn new(character_id: impl Into<CharacterId>, text: impl Into<String>) -> Self {
        Self {
            character_id: character_id.into(),
            text: text.into(),
        }
    }
}

/// One step of the loop, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Action name (`final` for terminal steps).
    pub action: String,
    /// What happened, when not a plain success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TraceEntry {
    fn new(action: impl Into<String>, note: Option<String>) -> Self {
        Self {
            action: action.into(),
            note,
        }
    }

    fn noted(action: impl Into<String>, note: &str) -> Self {
        Self::new(action, Some(note.to_string()))
    }
}

/// The answer to one [`TurnRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReply {
    /// Narrative text shown to the player.
    pub reply: String,
    /// Quick-reply choices pulled from the text.
    pub options: Vec<String>,
    /// Steps taken.
    pub trace: Vec<TraceEntry>,
    /// The character's position after the turn.
    pub location: Option<GeoPoint>,
}

impl TurnReply {
    fn character_not_found() -> Self {
        Self {
            reply: prompt::CHARACTER_NOT_FOUND.to_string(),
            options: Vec::new(),
            trace: Vec::new(),
            location: None,
        }
    }
}

/// A route query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRequest {
    /// Origin.
    pub from_id: LocationId,
    /// Destination.
    pub to_id: LocationId,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

fn planning_params(step: usize) -> SamplingParams {
    let temperature = if step == 0 { 0.4 } else { 0.6 };
    SamplingParams::new(temperature).with_penalties(0.6, 0.5)
}

fn forced_params() -> SamplingParams {
    SamplingParams::new(0.7).with_penalties(0.7, 0.6)
}

fn regeneration_params() -> SamplingParams {
    SamplingParams::new(0.5)
}

/// Build the completion service described by `config`.
///
/// # Errors
///
/// Returns [`LlmError::ConfigError`] for an unknown provider.
pub fn build_completion(config: &LlmConfig) -> Result<Arc<dyn CompletionService>> {
    Ok(Arc::new(LlmClient::from_config(config)?))
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the completion service through the tool catalog.
pub struct Orchestrator {
    store: Arc<dyn WorldStore>,
    completion: Arc<dyn CompletionService>,
    dispatcher: ToolDispatcher,
    sanitizer: Sanitizer,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.completion.model_name())
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Candidate reply from the planning phase.
struct Planned {
    reply: String,
    trace: Vec<TraceEntry>,
}

impl Orchestrator {
    /// Assemble an orchestrator from explicit parts.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorldStore>,
        completion: Arc<dyn CompletionService>,
        index: Option<MemoryIndex>,
        sanitizer: Sanitizer,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(Arc::clone(&store), index);
        Self {
            store,
            completion,
            dispatcher,
            sanitizer,
            config,
        }
    }

    /// Assemble an orchestrator from configuration. Retrieval, when enabled,
    /// uses the embedding provider named by `retrieval.provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding provider cannot be built.
    pub fn from_config(
        store: Arc<dyn WorldStore>,
        completion: Arc<dyn CompletionService>,
        config: &GmConfig,
    ) -> Result<Self> {
        let index = if config.retrieval.enabled {
            let provider = provider_from_config(&config.retrieval)?;
            info!(model = provider.model_name(), dims = provider.dimensions(), "retrieval enabled");
            Some(MemoryIndex::new(provider))
        } else {
            None
        };
        Ok(Self::new(
            store,
            completion,
            index,
            Sanitizer::new(config.sanitizer.clone()),
            config.orchestrator.clone(),
        ))
    }

    /// The dispatcher used for tool calls.
    #[must_use]
    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Cheapest route between two locations.
    ///
    /// # Errors
    ///
    /// Returns an error if the waypoints cannot be read.
    pub fn pathfind(&self, request: &PathRequest) -> Result<PathResult> {
        let graph = CostGraph::load(self.store.as_ref())?;
        Ok(graph.shortest_path(&request.from_id, &request.to_id))
    }

    /// Run one full turn for `request`.
    ///
    /// Always yields a reply unless the store itself fails: unknown
    /// characters get a fixed message, an unreachable model the stub reply.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EngineError`] only for persistence failures outside
    /// tool calls.
    pub async fn handle_player_message(&self, request: &TurnRequest) -> Result<TurnReply> {
        let Some(character) = self.store.get_character(&request.character_id)? else {
            warn!(character = %request.character_id, "Turn for unknown character");
            return Ok(TurnReply::character_not_found());
        };

        info!(character = %character.id, name = %character.name, "Turn started");

        if !self.completion.is_available() {
            warn!(character = %character.id, "Completion service unavailable, using stub reply");
            return self.stub_turn(&character, &request.text, Vec::new());
        }

        let previous = self.previous_candidate(&character.id)?;
        match self.plan(&character, &request.text, previous).await {
            Ok(planned) => {
                let (reply, options) = self.finalize(&character, &planned.reply, true).await;
                self.record_scene(&character, &request.text, &reply, Some(&planned.reply))?;
                let location = self.resolve_location(&character.id)?;
                info!(
                    character = %character.id,
                    steps = planned.trace.len(),
                    options = options.len(),
                    "Turn finished"
                );
                Ok(TurnReply {
                    reply,
                    options,
                    trace: planned.trace,
                    location,
                })
            }
            Err((error, trace)) => {
                warn!(character = %character.id, error = %error, "Completion failed, using stub reply");
                self.stub_turn(&character, &request.text, trace)
            }
        }
    }

    // -- Planning -----------------------------------------------------------

    async fn plan(
        &self,
        character: &Character,
        text: &str,
        mut last_candidate: Option<String>,
    ) -> std::result::Result<Planned, (LlmError, Vec<TraceEntry>)> {
        let mut conversation = self.opening(character, text);
        let mut trace = Vec::new();

        for step in 0..self.config.max_steps {
            let response = match self
                .completion
                .complete(conversation.messages(), &planning_params(step))
                .await
            {
                Ok(response) => response,
                Err(e) => return Err((e, trace)),
            };

            let (candidate, raw) = match parse_model_output(&response.text) {
                ModelTurn::Action(ToolAction::Final { reply }) => (reply, false),
                ModelTurn::RawFallback(text) => {
                    warn!(step, "Model output is not an action, taking it as the reply");
                    (text, true)
                }
                ModelTurn::Action(action) => {
                    let result = self.dispatcher.execute(&action);
                    trace.push(TraceEntry::new(action.name(), error_note(&result)));
                    conversation.push_assistant(action.to_json());
                    self.observe(&mut conversation, &result);
                    debug!(step, action = action.name(), "Tool step");
                    continue;
                }
                ModelTurn::Rejected { request, error } => {
                    let result = ToolResult::rejected(&error);
                    trace.push(TraceEntry::new(error.action(), error_note(&result)));
                    conversation.push_assistant(request.to_string());
                    self.observe(&mut conversation, &result);
                    debug!(step, error = %error, "Tool request refused");
                    continue;
                }
            };

            let candidate = non_empty(candidate);
            if self.repeats(last_candidate.as_deref(), &candidate) {
                debug!(step, "Terminal candidate repeats the previous one");
                trace.push(TraceEntry::noted("final", note::REPEATED));
                conversation.push_assistant(response.text);
                conversation.push_system(prompt::REPETITION_NOTICE);
                last_candidate = Some(candidate);
                continue;
            }

            trace.push(TraceEntry::new(
                "final",
                raw.then(|| note::RAW_FALLBACK.to_string()),
            ));
            return Ok(Planned {
                reply: candidate,
                trace,
            });
        }

        debug!(max_steps = self.config.max_steps, "Step budget spent, forcing final");
        conversation.push_system(prompt::FORCE_FINAL);
        let response = match self
            .completion
            .complete(conversation.messages(), &forced_params())
            .await
        {
            Ok(response) => response,
            Err(e) => return Err((e, trace)),
        };
        trace.push(TraceEntry::noted("final", note::FORCED));
        Ok(Planned {
            reply: non_empty(forced_reply(&response.text)),
            trace,
        })
    }

    fn opening(&self, character: &Character, text: &str) -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push_system(prompt::SYSTEM_PROMPT);
        conversation.push_system(prompt::tool_prompt());
        conversation.push_user(render_template(
            prompt::PLAYER_INPUT,
            &[("name", character.name.as_str()), ("text", text)],
        ));
        conversation.push_system(render_template(
            prompt::OPENING_HINT,
            &[("character_id", character.id.as_str())],
        ));
        conversation
    }

    fn observe(&self, conversation: &mut Conversation, result: &ToolResult) {
        let observation = result.observation(self.config.observation_max_chars);
        conversation.push_system(render_template(
            prompt::OBSERVATION,
            &[("observation", observation.as_str())],
        ));
    }

    fn repeats(&self, previous: Option<&str>, candidate: &str) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        let n = self.config.repetition_prefix_chars;
        previous.chars().take(n).eq(candidate.chars().take(n))
    }

    /// The raw model text behind the character's last scene. Stub scenes and
    /// older events without a `candidate` fall back to the stored reply.
    fn previous_candidate(&self, character_id: &CharacterId) -> Result<Option<String>> {
        let query = EventQuery::recent(1)
            .of_kind(event_kind::SCENE)
            .for_character(character_id.clone());
        let events = self.store.recent_events(&query)?;
        Ok(events.first().and_then(|e| {
            e.payload
                .get("candidate")
                .or_else(|| e.payload.get("reply"))
                .and_then(Value::as_str)
                .map(str::to_string)
        }))
    }

    // -- Finalizing ---------------------------------------------------------

    async fn finalize(&self, character: &Character, text: &str, regenerate: bool) -> (String, Vec<String>) {
        let mut reply = self.sanitizer.apply_comprehension(text, character);

        let review = self.sanitizer.review(&reply);
        if review.needs_regeneration() {
            if regenerate && self.sanitizer.config().regeneration_enabled {
                warn!(character = %character.id, reason = %review.reason(), "Reply flagged, requesting rewrite");
                reply = self.regenerate(&reply, &review.reason()).await;
            } else {
                debug!(character = %character.id, reason = %review.reason(), "Reply flagged, rewrite skipped");
            }
        }

        let options = self.sanitizer.extract_options(&reply);
        (reply, options)
    }

    async fn regenerate(&self, reply: &str, problems: &str) -> String {
        let instruction = render_template(
            prompt::REGENERATE,
            &[
                ("language", self.sanitizer.config().reply_language.as_str()),
                ("problems", problems),
                ("reply", reply),
            ],
        );
        let mut conversation = Conversation::new();
        conversation.push_system(prompt::SYSTEM_PROMPT);
        conversation.push_user(instruction);

        match self
            .completion
            .complete(conversation.messages(), &regeneration_params())
            .await
        {
            Ok(response) => {
                let rewritten = strip_code_fences(&response.text);
                if rewritten.is_empty() {
                    warn!("Rewrite came back empty, keeping original reply");
                    reply.to_string()
                } else {
                    rewritten.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "Rewrite failed, keeping original reply");
                reply.to_string()
            }
        }
    }

    fn stub_turn(&self, character: &Character, text: &str, mut trace: Vec<TraceEntry>) -> Result<TurnReply> {
        let stub = render_template(prompt::STUB_REPLY, &[("text", text)]);
        let reply = self.sanitizer.apply_comprehension(&stub, character);
        let review = self.sanitizer.review(&reply);
        if review.needs_regeneration() {
            debug!(reason = %review.reason(), "Stub reply flagged, no model to rewrite it");
        }
        let options = self.sanitizer.extract_options(&reply);

        self.record_scene(character, text, &reply, None)?;
        let location = self.resolve_location(&character.id)?;
        trace.push(TraceEntry::noted("final", note::STUB));

        Ok(TurnReply {
            reply,
            options,
            trace,
            location,
        })
    }

    /// Append the turn's scene event. `candidate` is the accepted model text
    /// before finalizing; `None` marks a stub turn.
    fn record_scene(&self, character: &Character, text: &str, reply: &str, candidate: Option<&str>) -> Result<()> {
        let (summary, payload) = match candidate {
            Some(candidate) => (
                format!("Interazione: {}", character.name),
                json!({ "text": text, "reply": reply, "candidate": candidate }),
            ),
            None => (
                format!("Interazione: {} (stub)", character.name),
                json!({ "text": text, "reply": reply }),
            ),
        };
        let event = self.store.append_event(
            NewEvent::new(event_kind::SCENE, summary)
                .with_payload(payload)
                .for_character(character.id.clone()),
        )?;
        debug!(event = %event.id, character = %character.id, "Scene recorded");
        Ok(())
    }

    /// Make sure the character's scene document carries a usable location,
    /// writing the default one if needed, and return it.
    fn resolve_location(&self, character_id: &CharacterId) -> Result<Option<GeoPoint>> {
        let mut document = match self.store.get_scene_state(character_id)? {
            Some(value @ Value::Object(_)) => value,
            _ => SceneStateDoc::intro().to_value(),
        };

        if let Some(point) = SceneStateDoc::from_value(&document).valid_location() {
            return Ok(Some(point.clone()));
        }

        let point = self.config.default_location.clone();
        if let Value::Object(map) = &mut document {
            map.insert("location".to_string(), serde_json::to_value(&point).map_err(gm_core::GmError::from)?);
        }
        self.store.upsert_scene_state(character_id, &document)?;
        debug!(character = %character_id, location = %point, "Default location written");
        Ok(Some(point))
    }
}

fn error_note(result: &ToolResult) -> Option<String> {
    match result {
        ToolResult::Error { error, .. } => Some(format!("error: {error}")),
        _ => None,
    }
}

fn non_empty(text: String) -> String {
    if text.trim().is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        text
    }
}

/// Reply text of the forced request: a `final` action, else a top-level
/// `reply` string, else the raw text.
fn forced_reply(text: &str) -> String {
    match parse_model_output(text) {
        ModelTurn::Action(ToolAction::Final { reply }) => reply,
        ModelTurn::RawFallback(raw) => raw,
        ModelTurn::Action(_) | ModelTurn::Rejected { .. } => crate::action::extract_json(text)
            .as_ref()
            .and_then(|v| v.get("reply"))
            .and_then(Value::as_str)
            .map_or_else(|| strip_code_fences(text).to_string(), str::to_string),
    }
}

//! Core type definitions for the world model.
//!
//! Everything here is serializable; JSON field names follow the camelCase
//! convention of the tool protocol so values can be handed to the model as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a player character.
    CharacterId
);
string_id!(
    /// Identifier of a location (a node in the travel graph).
    LocationId
);
string_id!(
    /// Identifier of an appended event.
    EventId
);

// ---------------------------------------------------------------------------
// Languages & characters
// ---------------------------------------------------------------------------

/// A language or dialect known to the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Short code, e.g. `"it"` or `"nap"`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// `"language"` or `"dialect"`.
    pub kind: String,
    /// Region where it is spoken.
    pub region: String,
}

/// A character's proficiency in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSkill {
    /// Language code.
    pub code: String,
    /// Proficiency from 0 (none) to 5 (native).
    pub level: u8,
}

impl LanguageSkill {
    /// Highest proficiency level.
    pub const MAX_LEVEL: u8 = 5;

    /// Create a skill entry, clamping the level into `0..=5`.
    #[must_use]
    pub fn new(code: impl Into<String>, level: u8) -> Self {
        Self {
            code: code.into(),
            level: level.min(Self::MAX_LEVEL),
        }
    }
}

/// A player character as seen by the orchestrator (read-only during a turn).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Character id.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Known languages, strongest first.
    pub languages: Vec<LanguageSkill>,
}

impl Character {
    /// Whether the character has any proficiency entry for `code`.
    #[must_use]
    pub fn knows_language(&self, code: &str) -> bool {
        self.languages.iter().any(|l| l.code == code)
    }

    /// Codes of all known languages, in stored order.
    #[must_use]
    pub fn language_codes(&self) -> Vec<&str> {
        self.languages.iter().map(|l| l.code.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A map-displayable position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Optional label shown on the map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GeoPoint {
    /// Create a named point.
    #[must_use]
    pub fn named(lat: f64, lon: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lon,
            name: Some(name.into()),
        }
    }

    /// Both coordinates are finite and inside the valid degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({:.4}, {:.4})", self.lat, self.lon),
            None => write!(f, "({:.4}, {:.4})", self.lat, self.lon),
        }
    }
}

/// A node of the travel graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Location id.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Free-form category (`city_district`, `rural`, ...).
    pub kind: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Region label.
    pub region: String,
    /// Danger level, perturbed by the world tick.
    pub danger_level: u8,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Position of this location as a map point.
    #[must_use]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::named(self.lat, self.lon, self.name.clone())
    }
}

/// A directed, weighted edge between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    /// Source location.
    pub from_id: LocationId,
    /// Destination location.
    pub to_id: LocationId,
    /// Travel time in minutes.
    pub travel_minutes: u32,
    /// Abstract risk score.
    pub risk: u32,
}

impl Waypoint {
    /// Create an edge.
    #[must_use]
    pub fn new(
        from_id: impl Into<LocationId>,
        to_id: impl Into<LocationId>,
        travel_minutes: u32,
        risk: u32,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            travel_minutes,
            risk,
        }
    }

    /// Scalar weight used for ranking routes: minutes plus risk.
    #[must_use]
    pub fn weight(&self) -> f64 {
        f64::from(self.travel_minutes) + f64::from(self.risk)
    }
}

// ---------------------------------------------------------------------------
// Scene state
// ---------------------------------------------------------------------------

/// Phase every new character starts in.
pub const INTRO_PHASE: &str = "intro";

/// Per-character scene document.
///
/// Unknown keys survive a read/write cycle through `extra`. A malformed
/// `location` value is read as absent rather than failing the whole document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneStateDoc {
    /// Narrative stage label (`intro`, `parley`, `road`, ...).
    #[serde(default)]
    pub phase: String,
    /// Current position, if one has been set.
    #[serde(
        default,
        deserialize_with = "lenient_point",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<GeoPoint>,
    /// Any other keys the model chose to store.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SceneStateDoc {
    /// The document created alongside a new character.
    #[must_use]
    pub fn intro() -> Self {
        Self {
            phase: INTRO_PHASE.to_string(),
            ..Self::default()
        }
    }

    /// Interpret an arbitrary JSON value as a scene document.
    ///
    /// Each known key is decoded on its own: a non-string `phase` reads as
    /// empty and a malformed `location` as absent, without affecting the
    /// other. Non-object values yield an empty document.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        let mut doc = Self::default();
        for (key, field) in map {
            match key.as_str() {
                "phase" => doc.phase = field.as_str().unwrap_or_default().to_string(),
                "location" => doc.location = serde_json::from_value(field.clone()).ok(),
                _ => {
                    doc.extra.insert(key.clone(), field.clone());
                }
            }
        }
        doc
    }

    /// Serialize back into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The stored location, only if it is usable on a map.
    #[must_use]
    pub fn valid_location(&self) -> Option<&GeoPoint> {
        self.location.as_ref().filter(|p| p.is_valid())
    }
}

fn lenient_point<'de, D>(deserializer: D) -> Result<Option<GeoPoint>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Well-known event kinds.
pub mod event_kind {
    /// One per orchestrated turn.
    pub const SCENE: &str = "scene";
    /// Danger perturbation by the world tick.
    pub const WORLD_TICK: &str = "world_tick";
    /// Initial world description.
    pub const WORLD_SEED: &str = "world_seed";
}

/// An append-only log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event id.
    pub id: EventId,
    /// Kind label.
    pub kind: String,
    /// One-line summary.
    pub summary: String,
    /// Arbitrary structured detail.
    pub payload: Value,
    /// Character the event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<CharacterId>,
    /// Location the event happened at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<LocationId>,
    /// Append time.
    pub timestamp: DateTime<Utc>,
}

/// An event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Kind label.
    pub kind: String,
    /// One-line summary.
    pub summary: String,
    /// Structured detail (defaults to `{}`).
    pub payload: Value,
    /// Owning character.
    pub character_id: Option<CharacterId>,
    /// Location.
    pub location_id: Option<LocationId>,
}

impl NewEvent {
    /// Start a new event with an empty payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            summary: summary.into(),
            payload: Value::Object(Map::new()),
            character_id: None,
            location_id: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attach the owning character.
    #[must_use]
    pub fn for_character(mut self, id: CharacterId) -> Self {
        self.character_id = Some(id);
        self
    }

    /// Attach a location.
    #[must_use]
    pub fn at_location(mut self, id: Option<LocationId>) -> Self {
        self.location_id = id;
        self
    }
}

/// Filter for reading recent events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    /// Only events of this kind.
    pub kind: Option<String>,
    /// Only events owned by this character.
    pub character_id: Option<CharacterId>,
    /// Maximum number of rows.
    pub limit: usize,
}

impl EventQuery {
    /// Most recent `limit` events of any kind.
    #[must_use]
    pub fn recent(limit: usize) -> Self {
        Self {
            kind: None,
            character_id: None,
            limit,
        }
    }

    /// Restrict to one kind.
    #[must_use]
    pub fn of_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Restrict to one character.
    #[must_use]
    pub fn for_character(mut self, id: CharacterId) -> Self {
        self.character_id = Some(id);
        self
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// A character's standing with one NPC.
///
/// Scores are free-form floats written by the host; turns never change them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// The player character.
    pub character_id: CharacterId,
    /// The NPC the scores refer to.
    pub npc_id: String,
    /// How much the NPC trusts the character.
    pub trust: f64,
    /// How much the NPC fears the character.
    pub fear: f64,
    /// Standing among the NPC's people.
    pub reputation: f64,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// A neutral relationship (all scores zero).
    #[must_use]
    pub fn neutral(character_id: CharacterId, npc_id: impl Into<String>) -> Self {
        Self {
            character_id,
            npc_id: npc_id.into(),
            trust: 0.0,
            fear: 0.0,
            reputation: 0.0,
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// A dense vector embedding for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

/// A stored, embedded snippet of world memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryVector {
    /// Id of the indexed record (usually an event id).
    pub id: String,
    /// Scope label, e.g. `"world"`.
    pub scope: String,
    /// Related record, e.g. a location id.
    pub ref_id: Option<String>,
    /// Indexed text.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scene_state_keeps_unknown_keys() {
        let raw = json!({"phase": "parley", "notes": "sentinella sui tetti", "trust": 2});
        let doc = SceneStateDoc::from_value(&raw);
        assert_eq!(doc.phase, "parley");
        assert!(doc.location.is_none());
        assert_eq!(doc.to_value(), raw);
    }

    #[test]
    fn malformed_location_reads_as_absent() {
        let raw = json!({"phase": "road", "location": {"lat": "north"}});
        let doc = SceneStateDoc::from_value(&raw);
        assert_eq!(doc.phase, "road");
        assert!(doc.location.is_none());
    }

    #[test]
    fn location_survives_mistyped_phase() {
        for phase in [json!(null), json!(2), json!(["road"])] {
            let raw = json!({"phase": phase, "location": {"lat": 41.07, "lon": 14.33, "name": "Caserta"}, "mood": "tesa"});
            let doc = SceneStateDoc::from_value(&raw);
            assert_eq!(doc.phase, "");
            assert_eq!(doc.valid_location(), Some(&GeoPoint::named(41.07, 14.33, "Caserta")));
            assert_eq!(doc.extra.get("mood"), Some(&json!("tesa")));
        }
    }

    #[test]
    fn out_of_range_location_is_not_valid() {
        let raw = json!({"phase": "road", "location": {"lat": 140.0, "lon": 14.0}});
        let doc = SceneStateDoc::from_value(&raw);
        assert!(doc.location.is_some());
        assert!(doc.valid_location().is_none());
    }

    #[test]
    fn non_object_scene_state_is_empty() {
        let doc = SceneStateDoc::from_value(&json!("intro"));
        assert_eq!(doc, SceneStateDoc::default());
    }

    #[test]
    fn language_level_is_clamped() {
        assert_eq!(LanguageSkill::new("it", 9).level, 5);
    }

    #[test]
    fn waypoint_weight_adds_time_and_risk() {
        assert_eq!(Waypoint::new("a", "b", 10, 1).weight(), 11.0);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = LocationId::from("napoli");
        assert_eq!(serde_json::to_value(&id).expect("json"), json!("napoli"));
    }
}

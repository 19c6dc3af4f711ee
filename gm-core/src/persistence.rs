//! SQLite persistence layer for the world model.
//!
//! The orchestrator only talks to the [`WorldStore`] trait; the bundled
//! implementation keeps everything in one SQLite file:
//!
//! ```sql
//! languages(code PK, name, kind, region)
//! characters(id PK, name, created_at)
//! character_languages(character_id, code, level, PK(character_id, code))
//! locations(id PK, name, kind, lat, lon, region, danger_level, updated_at)
//! waypoints(seq PK AUTOINCREMENT, from_id, to_id, travel_minutes, risk)
//! events(seq PK AUTOINCREMENT, id UNIQUE, kind, summary, payload, character_id, location_id, ts)
//! scene_states(character_id PK, state, updated_at)
//! memory_vectors(id PK, scope, ref_id, content, embedding)
//! ```
//!
//! JSON columns (`payload`, `state`, `embedding`) keep the schema stable while
//! the documents evolve. Scene states are upserted on their key, so there is
//! at most one per character; concurrent turns for the same character are
//! last-writer-wins.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::{GmError, Result};
use crate::types::{
    Character, CharacterId, Embedding, Event, EventId, EventQuery, Language, LanguageSkill,
    Location, LocationId, MemoryVector, NewEvent, Relationship, SceneStateDoc, Waypoint,
};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistence collaborator consumed by the dispatcher and orchestrator.
///
/// Implementations must provide per-key atomic upserts; nothing else about
/// isolation is assumed.
pub trait WorldStore: Send + Sync {
    /// Insert or update a language.
    fn upsert_language(&self, language: &Language) -> Result<()>;

    /// All known languages, ordered by code.
    fn list_languages(&self) -> Result<Vec<Language>>;

    /// Create a character and its initial scene state (phase `intro`).
    fn create_character(&self, name: &str, languages: &[LanguageSkill]) -> Result<Character>;

    /// Read a character with its languages, strongest first.
    fn get_character(&self, id: &CharacterId) -> Result<Option<Character>>;

    /// Append an event, assigning its id and timestamp.
    fn append_event(&self, event: NewEvent) -> Result<Event>;

    /// Read events most recent first.
    fn recent_events(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// Current scene document of a character, as stored.
    fn get_scene_state(&self, character_id: &CharacterId) -> Result<Option<Value>>;

    /// Replace the scene document of a character.
    fn upsert_scene_state(&self, character_id: &CharacterId, state: &Value) -> Result<()>;

    /// Insert or update a location.
    fn upsert_location(&self, location: &Location) -> Result<()>;

    /// Locations, most recently updated first.
    fn list_locations(&self, limit: usize) -> Result<Vec<Location>>;

    /// The location that has gone longest without an update.
    fn least_recently_updated_location(&self) -> Result<Option<Location>>;

    /// Set a location's danger level and bump its update time.
    fn set_danger_level(&self, id: &LocationId, level: u8) -> Result<()>;

    /// Append a directed edge.
    fn insert_waypoint(&self, waypoint: &Waypoint) -> Result<()>;

    /// All waypoints in insertion order.
    fn list_waypoints(&self) -> Result<Vec<Waypoint>>;

    /// Insert or replace an embedded memory.
    fn upsert_memory_vector(&self, vector: &MemoryVector) -> Result<()>;

    /// All embedded memories.
    fn list_memory_vectors(&self) -> Result<Vec<MemoryVector>>;

    /// Insert or replace the relationship keyed by `(character_id, npc_id)`.
    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// A character's relationships, ordered by NPC id.
    fn relationships_for(&self, character_id: &CharacterId) -> Result<Vec<Relationship>>;
}

// ---------------------------------------------------------------------------
// SqliteWorldStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS languages (
    code   TEXT PRIMARY KEY,
    name   TEXT NOT NULL,
    kind   TEXT NOT NULL,
    region TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS characters (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS character_languages (
    character_id TEXT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
    code         TEXT NOT NULL,
    level        INTEGER NOT NULL,
    PRIMARY KEY (character_id, code)
);
CREATE TABLE IF NOT EXISTS locations (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    kind         TEXT NOT NULL,
    lat          REAL NOT NULL,
    lon          REAL NOT NULL,
    region       TEXT NOT NULL,
    danger_level INTEGER NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS waypoints (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id        TEXT NOT NULL,
    to_id          TEXT NOT NULL,
    travel_minutes INTEGER NOT NULL,
    risk           INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    id           TEXT NOT NULL UNIQUE,
    kind         TEXT NOT NULL,
    summary      TEXT NOT NULL,
    payload      TEXT NOT NULL,
    character_id TEXT,
    location_id  TEXT,
    ts           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS events_kind ON events(kind);
CREATE INDEX IF NOT EXISTS events_character ON events(character_id);
CREATE TABLE IF NOT EXISTS scene_states (
    character_id TEXT PRIMARY KEY,
    state        TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS relationships (
    character_id TEXT NOT NULL,
    npc_id       TEXT NOT NULL,
    trust        REAL NOT NULL,
    fear         REAL NOT NULL,
    reputation   REAL NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (character_id, npc_id)
);
CREATE TABLE IF NOT EXISTS memory_vectors (
    id        TEXT PRIMARY KEY,
    scope     TEXT NOT NULL,
    ref_id    TEXT,
    content   TEXT NOT NULL,
    embedding TEXT NOT NULL
);
";

/// Handle to an open SQLite world database.
///
/// # Usage
///
/// ```no_run
/// # use gm_core::persistence::{SqliteWorldStore, WorldStore};
/// # use gm_core::config::PersistenceConfig;
/// # use gm_core::types::LanguageSkill;
/// let store = SqliteWorldStore::open("world.db", &PersistenceConfig::default())?;
/// let hero = store.create_character("Jake", &[LanguageSkill::new("it", 5)])?;
/// assert!(store.get_scene_state(&hero.id)?.is_some());
/// # Ok::<(), gm_core::error::GmError>(())
/// ```
pub struct SqliteWorldStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteWorldStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWorldStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteWorldStore {
    /// Open (or create) a database at `path`.
    ///
    /// The schema is created if missing. WAL mode is enabled when
    /// `config.wal_mode` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "World store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Return the path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run an integrity check on the database.
    ///
    /// # Errors
    ///
    /// Returns [`GmError::Database`] if the check query itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let conn = self.conn.lock();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

// Fixed-width timestamps so text ordering matches time ordering.
fn stamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    stamp(&Utc::now())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GmError::Serialization(format!("bad timestamp '{raw}': {e}")))
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| GmError::Serialization(e.to_string()))
}

/// Raw event row before JSON/time decoding.
struct EventRow {
    id: String,
    kind: String,
    summary: String,
    payload: String,
    character_id: Option<String>,
    location_id: Option<String>,
    ts: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            summary: row.get(2)?,
            payload: row.get(3)?,
            character_id: row.get(4)?,
            location_id: row.get(5)?,
            ts: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Event> {
        Ok(Event {
            id: EventId(self.id),
            kind: self.kind,
            summary: self.summary,
            payload: parse_json(&self.payload)?,
            character_id: self.character_id.map(CharacterId),
            location_id: self.location_id.map(LocationId),
            timestamp: parse_time(&self.ts)?,
        })
    }
}

struct LocationRow {
    id: String,
    name: String,
    kind: String,
    lat: f64,
    lon: f64,
    region: String,
    danger_level: i64,
    updated_at: String,
}

impl LocationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            lat: row.get(3)?,
            lon: row.get(4)?,
            region: row.get(5)?,
            danger_level: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<Location> {
        Ok(Location {
            id: LocationId(self.id),
            name: self.name,
            kind: self.kind,
            lat: self.lat,
            lon: self.lon,
            region: self.region,
            danger_level: u8::try_from(self.danger_level.clamp(0, i64::from(u8::MAX)))
                .unwrap_or(u8::MAX),
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

const LOCATION_COLUMNS: &str = "id, name, kind, lat, lon, region, danger_level, updated_at";

impl WorldStore for SqliteWorldStore {
    fn upsert_language(&self, language: &Language) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO languages (code, name, kind, region) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                region = excluded.region",
            params![language.code, language.name, language.kind, language.region],
        )?;
        Ok(())
    }

    fn list_languages(&self) -> Result<Vec<Language>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT code, name, kind, region FROM languages ORDER BY code")?;
        let rows = stmt.query_map([], |row| {
            Ok(Language {
                code: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                region: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_character(&self, name: &str, languages: &[LanguageSkill]) -> Result<Character> {
        let id = CharacterId::generate();
        let created = now();
        let intro = serde_json::to_string(&SceneStateDoc::intro().to_value())?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO characters (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), name, created],
        )?;
        for skill in languages {
            tx.execute(
                "INSERT INTO character_languages (character_id, code, level) VALUES (?1, ?2, ?3)
                 ON CONFLICT(character_id, code) DO UPDATE SET level = excluded.level",
                params![id.as_str(), skill.code, skill.level],
            )?;
        }
        tx.execute(
            "INSERT INTO scene_states (character_id, state, updated_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), intro, created],
        )?;
        tx.commit()?;
        drop(conn);

        info!(character = %id, name, "Character created");
        self.get_character(&id)?
            .ok_or_else(|| GmError::CharacterNotFound(id.to_string()))
    }

    fn get_character(&self, id: &CharacterId) -> Result<Option<Character>> {
        let conn = self.conn.lock();
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM characters WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(name) = name else {
            return Ok(None);
        };

        let mut stmt = conn.prepare_cached(
            "SELECT code, level FROM character_languages
             WHERE character_id = ?1 ORDER BY level DESC, code ASC",
        )?;
        let languages = stmt
            .query_map(params![id.as_str()], |row| {
                let level: u8 = row.get(1)?;
                Ok(LanguageSkill::new(row.get::<_, String>(0)?, level))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(Character {
            id: id.clone(),
            name,
            languages,
        }))
    }

    fn append_event(&self, event: NewEvent) -> Result<Event> {
        let stored = Event {
            id: EventId::generate(),
            kind: event.kind,
            summary: event.summary,
            payload: event.payload,
            character_id: event.character_id,
            location_id: event.location_id,
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_string(&stored.payload)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO events (id, kind, summary, payload, character_id, location_id, ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id.as_str(),
                stored.kind,
                stored.summary,
                payload,
                stored.character_id.as_ref().map(CharacterId::as_str),
                stored.location_id.as_ref().map(LocationId::as_str),
                stamp(&stored.timestamp),
            ],
        )?;

        debug!(event = %stored.id, kind = %stored.kind, "Event appended");
        Ok(stored)
    }

    fn recent_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, kind, summary, payload, character_id, location_id, ts FROM events
             WHERE (?1 IS NULL OR kind = ?1) AND (?2 IS NULL OR character_id = ?2)
             ORDER BY seq DESC
             LIMIT ?3",
        )?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![
                    query.kind,
                    query.character_id.as_ref().map(CharacterId::as_str),
                    limit
                ],
                EventRow::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(EventRow::decode).collect()
    }

    fn get_scene_state(&self, character_id: &CharacterId) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT state FROM scene_states WHERE character_id = ?1",
                params![character_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        raw.as_deref().map(parse_json).transpose()
    }

    fn upsert_scene_state(&self, character_id: &CharacterId, state: &Value) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scene_states (character_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(character_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at",
            params![character_id.as_str(), json, now()],
        )?;
        debug!(character = %character_id, "Scene state saved");
        Ok(())
    }

    fn upsert_location(&self, location: &Location) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO locations (id, name, kind, lat, lon, region, danger_level, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                lat = excluded.lat,
                lon = excluded.lon,
                region = excluded.region,
                danger_level = excluded.danger_level,
                updated_at = excluded.updated_at",
            params![
                location.id.as_str(),
                location.name,
                location.kind,
                location.lat,
                location.lon,
                location.region,
                location.danger_level,
                stamp(&location.updated_at),
            ],
        )?;
        Ok(())
    }

    fn list_locations(&self, limit: usize) -> Result<Vec<Location>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY updated_at DESC, id ASC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], LocationRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(LocationRow::decode).collect()
    }

    fn least_recently_updated_location(&self) -> Result<Option<Location>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY updated_at ASC, id ASC LIMIT 1"
                ),
                [],
                LocationRow::from_row,
            )
            .optional()?;
        row.map(LocationRow::decode).transpose()
    }

    fn set_danger_level(&self, id: &LocationId, level: u8) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE locations SET danger_level = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.as_str(), level, now()],
        )?;
        if changed == 0 {
            return Err(GmError::LocationNotFound(id.to_string()));
        }
        Ok(())
    }

    fn insert_waypoint(&self, waypoint: &Waypoint) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO waypoints (from_id, to_id, travel_minutes, risk) VALUES (?1, ?2, ?3, ?4)",
            params![
                waypoint.from_id.as_str(),
                waypoint.to_id.as_str(),
                waypoint.travel_minutes,
                waypoint.risk
            ],
        )?;
        Ok(())
    }

    fn list_waypoints(&self) -> Result<Vec<Waypoint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT from_id, to_id, travel_minutes, risk FROM waypoints ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Waypoint {
                from_id: LocationId(row.get(0)?),
                to_id: LocationId(row.get(1)?),
                travel_minutes: row.get(2)?,
                risk: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn upsert_memory_vector(&self, vector: &MemoryVector) -> Result<()> {
        let embedding = serde_json::to_string(&vector.embedding.0)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memory_vectors (id, scope, ref_id, content, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                scope = excluded.scope,
                ref_id = excluded.ref_id,
                content = excluded.content,
                embedding = excluded.embedding",
            params![vector.id, vector.scope, vector.ref_id, vector.content, embedding],
        )?;
        Ok(())
    }

    fn list_memory_vectors(&self) -> Result<Vec<MemoryVector>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, scope, ref_id, content, embedding FROM memory_vectors")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, scope, ref_id, content, embedding)| -> Result<MemoryVector> {
                let values: Vec<f32> = serde_json::from_str(&embedding)?;
                Ok(MemoryVector {
                    id,
                    scope,
                    ref_id,
                    content,
                    embedding: Embedding(values),
                })
            })
            .collect()
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO relationships (character_id, npc_id, trust, fear, reputation, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(character_id, npc_id) DO UPDATE SET
                trust = excluded.trust,
                fear = excluded.fear,
                reputation = excluded.reputation,
                updated_at = excluded.updated_at",
            params![
                relationship.character_id.as_str(),
                relationship.npc_id,
                relationship.trust,
                relationship.fear,
                relationship.reputation,
                stamp(&relationship.updated_at)
            ],
        )?;
        debug!(character = %relationship.character_id, npc = %relationship.npc_id, "Relationship saved");
        Ok(())
    }

    fn relationships_for(&self, character_id: &CharacterId) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT npc_id, trust, fear, reputation, updated_at FROM relationships
             WHERE character_id = ?1 ORDER BY npc_id ASC",
        )?;
        let rows = stmt
            .query_map(params![character_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(npc_id, trust, fear, reputation, updated_at)| -> Result<Relationship> {
                Ok(Relationship {
                    character_id: character_id.clone(),
                    npc_id,
                    trust,
                    fear,
                    reputation,
                    updated_at: parse_time(&updated_at)?,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

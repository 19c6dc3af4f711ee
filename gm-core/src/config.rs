//! Configuration for the game-master engine.
//!
//! Maps directly to `gm.toml`. Every section is optional; an empty file
//! yields the defaults below.

use serde::{Deserialize, Serialize};

use crate::types::GeoPoint;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GmConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Completion-service settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Orchestration loop tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Reply policy settings.
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    /// Similarity index settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Persistence settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Background world tick.
    #[serde(default)]
    pub world_tick: WorldTickConfig,
}

impl GmConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GmError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::GmError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides for secrets and the model name.
    ///
    /// `GM_LLM_API_KEY` wins over `OPENAI_API_KEY`; `GM_LLM_MODEL` replaces
    /// the configured model.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let key = std::env::var("GM_LLM_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.llm.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("GM_LLM_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Completion-service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai", "ollama", "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL of the API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for OpenAI-compatible providers. Without one, that provider
    /// is treated as unconfigured.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,
    /// Transport retries inside the client. The loop itself never retries.
    #[serde(default)]
    pub max_retries: u32,
    /// Token cap per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            request_timeout_ms: default_timeout(),
            max_retries: 0,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Orchestration loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Planning requests before finalization is forced.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Leading characters compared by the anti-repetition guard.
    #[serde(default = "default_repetition_prefix")]
    pub repetition_prefix_chars: usize,
    /// Maximum characters of a tool observation fed back to the model.
    #[serde(default = "default_observation_chars")]
    pub observation_max_chars: usize,
    /// Position injected when the scene state has none.
    #[serde(default = "default_location")]
    pub default_location: GeoPoint,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            repetition_prefix_chars: default_repetition_prefix(),
            observation_max_chars: default_observation_chars(),
            default_location: default_location(),
        }
    }
}

/// Reply policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Human-readable name of the language replies must be written in.
    #[serde(default = "default_reply_language")]
    pub reply_language: String,
    /// Code of the local dialect subject to partial comprehension.
    #[serde(default = "default_dialect_code")]
    pub dialect_code: String,
    /// Words whose presence signals dialect speech.
    #[serde(default = "default_dialect_cues")]
    pub dialect_cues: Vec<String>,
    /// Prefix of a partially understood reply.
    #[serde(default = "default_partial_marker")]
    pub partial_marker: String,
    /// Proper nouns that must never appear in a reply.
    #[serde(default = "default_banned_names")]
    pub banned_names: Vec<String>,
    /// Function words of the language replies must NOT be written in.
    #[serde(default = "default_foreign_words")]
    pub foreign_function_words: Vec<String>,
    /// Maximum quick-reply options extracted from a reply.
    #[serde(default = "default_max_options")]
    pub max_options: usize,
    /// Whether a flagged reply triggers one regeneration request.
    #[serde(default = "default_true")]
    pub regeneration_enabled: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            reply_language: default_reply_language(),
            dialect_code: default_dialect_code(),
            dialect_cues: default_dialect_cues(),
            partial_marker: default_partial_marker(),
            banned_names: default_banned_names(),
            foreign_function_words: default_foreign_words(),
            max_options: default_max_options(),
            regeneration_enabled: true,
        }
    }
}

/// Similarity index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// When false, events are not indexed and `rag_search` returns nothing.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Embedding backend: `"hashing"`, `"stub"` or `"onnx"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Embedding vector dimensions. Ignored by `"onnx"`.
    #[serde(default = "default_dimensions")]
    pub embedding_dimensions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_embedding_provider(),
            embedding_dimensions: default_dimensions(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
        }
    }
}

/// Background world tick settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldTickConfig {
    /// Whether the ticker should be started by the host process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between ticks.
    #[serde(default = "default_tick_interval")]
    pub interval_seconds: u64,
    /// Upper clamp of a location's danger level.
    #[serde(default = "default_max_danger")]
    pub max_danger: u8,
}

impl Default for WorldTickConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_tick_interval(),
            max_danger: default_max_danger(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_provider() -> String { "openai".to_string() }
fn default_base_url() -> String { "https://api.openai.com".to_string() }
fn default_model() -> String { "llama3".to_string() }
fn default_timeout() -> u64 { 30_000 }
fn default_max_tokens() -> u32 { 700 }
fn default_max_steps() -> usize { 6 }
fn default_repetition_prefix() -> usize { 180 }
fn default_observation_chars() -> usize { 6000 }
fn default_location() -> GeoPoint { GeoPoint::named(40.8529, 14.2681, "Napoli — Centro Storico") }
fn default_reply_language() -> String { "italiano".to_string() }
fn default_dialect_code() -> String { "nap".to_string() }
fn default_dialect_cues() -> Vec<String> { vec!["napoletano".to_string(), "nap".to_string()] }
fn default_partial_marker() -> String { "Capisci a metà: ".to_string() }
fn default_max_options() -> usize { 6 }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_dimensions() -> usize { 256 }
fn default_db_path() -> String { "gm_world.db".to_string() }
fn default_tick_interval() -> u64 { 120 }
fn default_max_danger() -> u8 { 7 }

fn default_banned_names() -> Vec<String> {
    [
        "Rick", "Daryl", "Michonne", "Negan", "Carol", "Glenn", "Maggie", "Carl", "Judith",
        "Shane", "Lori", "Hershel", "Eugene", "Rosita", "Abraham", "Ezekiel", "Tara", "Sasha",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_foreign_words() -> Vec<String> {
    [
        "the", "and", "you", "your", "with", "is", "are", "this", "that", "what", "there", "have",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = GmConfig::from_toml("").expect("parse");
        assert_eq!(config.orchestrator.max_steps, 6);
        assert_eq!(config.orchestrator.repetition_prefix_chars, 180);
        assert_eq!(config.sanitizer.dialect_code, "nap");
        assert_eq!(config.world_tick.max_danger, 7);
        assert!(config.retrieval.enabled);
        assert_eq!(config.retrieval.provider, "hashing");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = GmConfig::from_toml(
            r#"
            [llm]
            provider = "ollama"
            base_url = "http://localhost:11434"

            [orchestrator]
            max_steps = 3
            default_location = { lat = 41.07, lon = 14.33, name = "Caserta" }
            "#,
        )
        .expect("parse");
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.request_timeout_ms, 30_000);
        assert_eq!(config.orchestrator.max_steps, 3);
        assert_eq!(config.orchestrator.observation_max_chars, 6000);
        assert_eq!(config.orchestrator.default_location.name.as_deref(), Some("Caserta"));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = GmConfig::from_toml("[llm\nprovider=").expect_err("invalid");
        assert!(matches!(err, crate::GmError::Config(_)));
    }

    #[test]
    fn default_location_is_valid() {
        assert!(OrchestratorConfig::default().default_location.is_valid());
    }
}

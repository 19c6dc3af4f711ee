//! Prompt Quality Evaluation: Golden Test Set.
//!
//! Curated template→expectation pairs that pin down the prompts the loop
//! sends. The checks are offline: they verify rendering only.
//!
//! Set `GM_EVAL_LLM=1` (plus the usual `[llm]` environment) to also send the
//! health-check ping to the configured backend.

use gm_core::config::GmConfig;
use gm_llm::prompt;
use gm_llm::{CompletionService, LlmClient};

/// A golden test case for prompt evaluation.
struct GoldenCase {
    /// Human-readable name for the test case.
    name: &'static str,
    /// Template constant under test.
    template: &'static str,
    /// Template variables to fill in.
    vars: Vec<(&'static str, &'static str)>,
    /// Strings that MUST appear in the rendered prompt.
    prompt_must_contain: Vec<&'static str>,
    /// Strings that MUST NOT appear in the rendered prompt.
    prompt_must_not_contain: Vec<&'static str>,
}

fn golden_cases() -> Vec<GoldenCase> {
    vec![
        // ---------------------------------------------------------------
        // 1. Opening messages
        // ---------------------------------------------------------------
        GoldenCase {
            name: "player_input",
            template: prompt::PLAYER_INPUT,
            vars: vec![("name", "Jake Milton"), ("text", "Busso al cancello")],
            prompt_must_contain: vec!["PG: Jake Milton", "input: Busso al cancello"],
            prompt_must_not_contain: vec!["{name}", "{text}"],
        },
        GoldenCase {
            name: "opening_hint",
            template: prompt::OPENING_HINT,
            vars: vec![("character_id", "c-123")],
            prompt_must_contain: vec![r#"characterId="c-123""#, "get_scene_state", "world_context"],
            prompt_must_not_contain: vec!["{character_id}"],
        },
        GoldenCase {
            name: "tool_prompt",
            template: prompt::TOOL_PROMPT,
            vars: vec![("tool_catalog", prompt::TOOL_CATALOG)],
            prompt_must_contain: vec![
                "REGOLE DI PROGRESSIONE",
                r#""action": "set_scene_state""#,
                r#""action": "rag_search""#,
                "una azione per volta",
            ],
            prompt_must_not_contain: vec!["{tool_catalog}"],
        },
        // ---------------------------------------------------------------
        // 2. Loop feedback
        // ---------------------------------------------------------------
        GoldenCase {
            name: "observation",
            template: prompt::OBSERVATION,
            vars: vec![("observation", r#"{"type":"path","data":{"cost":77.0}}"#)],
            prompt_must_contain: vec!["Osservazione: {\"type\":\"path\"", "\"final\""],
            prompt_must_not_contain: vec!["{observation}"],
        },
        GoldenCase {
            name: "regenerate",
            template: prompt::REGENERATE,
            vars: vec![
                ("language", "italiano"),
                ("problems", "banned: Rick"),
                ("reply", "Rick is waiting at the gate."),
            ],
            prompt_must_contain: vec!["esclusivamente in italiano", "banned: Rick", "Rick is waiting"],
            prompt_must_not_contain: vec!["{language}", "{problems}", "{reply}"],
        },
        // ---------------------------------------------------------------
        // 3. Fixed replies
        // ---------------------------------------------------------------
        GoldenCase {
            name: "stub_reply",
            template: prompt::STUB_REPLY,
            vars: vec![("text", "Ciao?")],
            prompt_must_contain: vec![
                r#"Hai detto: "Ciao?""#,
                "- Chiedere di trattare",
                "- Andartene in silenzio",
            ],
            prompt_must_not_contain: vec!["{text}"],
        },
    ]
}

#[test]
fn golden_templates_render() {
    for case in golden_cases() {
        let rendered = prompt::render_template(case.template, &case.vars);
        for needle in &case.prompt_must_contain {
            assert!(
                rendered.contains(needle),
                "[{}] missing '{needle}' in:\n{rendered}",
                case.name
            );
        }
        for needle in &case.prompt_must_not_contain {
            assert!(
                !rendered.contains(needle),
                "[{}] unexpected '{needle}' in:\n{rendered}",
                case.name
            );
        }
    }
}

#[test]
fn policy_bans_canon_characters_and_requires_italian() {
    assert!(prompt::SYSTEM_PROMPT.contains("italiano"));
    assert!(prompt::SYSTEM_PROMPT.contains("Rick"));
    assert!(prompt::SYSTEM_PROMPT.contains("originali"));
}

#[test]
fn stub_reply_has_four_options() {
    let bullets = prompt::STUB_REPLY
        .lines()
        .filter(|l| l.starts_with("- "))
        .count();
    assert_eq!(bullets, 4);
}

#[tokio::test]
async fn online_health_check() {
    if std::env::var("GM_EVAL_LLM").as_deref() != Ok("1") {
        return;
    }
    let config = GmConfig::default().with_env_overrides();
    let client = LlmClient::from_config(&config.llm).expect("client");
    assert!(client.is_available(), "GM_EVAL_LLM=1 but no backend configured");
    let response = client.health_check().await.expect("ping");
    assert!(!response.model.is_empty());
}

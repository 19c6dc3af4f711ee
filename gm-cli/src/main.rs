use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use gm_core::config::GmConfig;
use gm_core::persistence::{SqliteWorldStore, WorldStore};
use gm_core::seed::seed_demo_world;
use gm_core::world::tick_once;
use gm_engine::{build_completion, init_tracing, Orchestrator, PathRequest, TurnRequest, WorldTicker};
use gm_llm::{CompletionService, LlmClient};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

fn print_usage() {
    println!("gm-cli [--config PATH] <command>");
    println!("commands:");
    println!("  seed                      create the demo world, print its character");
    println!("  turn <character_id> <text...>");
    println!("                            run one game-master turn, print the reply JSON");
    println!("  path <from_id> <to_id>    cheapest route between two locations");
    println!("  relationships <character_id>");
    println!("                            NPC standing scores for a character");
    println!("  tick                      apply one world tick");
    println!("  ticker <seconds>          run the background ticker for a while");
    println!("  health                    ping the configured completion service");
}

/// Split `--config PATH` off the argument list.
fn split_config(args: &[String]) -> Result<(Option<PathBuf>, Vec<String>)> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("missing value for --config")?;
            config = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(path));
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((config, rest))
}

fn load_config(path: Option<&PathBuf>) -> Result<GmConfig> {
    let config = match path {
        Some(path) => GmConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GmConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn open_store(config: &GmConfig) -> Result<Arc<dyn WorldStore>> {
    let store = SqliteWorldStore::open(&config.persistence.path, &config.persistence)
        .with_context(|| format!("failed to open {}", config.persistence.path))?;
    Ok(Arc::new(store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(config: &GmConfig, args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("seed") => {
            let store = open_store(config)?;
            let character = seed_demo_world(store.as_ref())?;
            print_json(&character)
        }
        Some("turn") => {
            let character_id = args.get(1).context("missing character_id")?;
            let text = args[2..].join(" ");
            if text.trim().is_empty() {
                bail!("missing text");
            }
            let store = open_store(config)?;
            let completion = build_completion(&config.llm)?;
            let orchestrator = Orchestrator::from_config(store, completion, config)?;
            let reply = orchestrator
                .handle_player_message(&TurnRequest::new(character_id.as_str(), text))
                .await?;
            print_json(&reply)
        }
        Some("path") => {
            let from_id = args.get(1).context("missing from_id")?;
            let to_id = args.get(2).context("missing to_id")?;
            let store = open_store(config)?;
            let orchestrator =
                Orchestrator::from_config(store, Arc::new(LlmClient::none()), config)?;
            let route = orchestrator.pathfind(&PathRequest {
                from_id: from_id.as_str().into(),
                to_id: to_id.as_str().into(),
            })?;
            print_json(&route)
        }
        Some("relationships") => {
            let character_id = args.get(1).context("missing character_id")?;
            let store = open_store(config)?;
            let rels = store.relationships_for(&character_id.as_str().into())?;
            print_json(&rels)
        }
        Some("tick") => {
            let store = open_store(config)?;
            let mut rng = StdRng::from_entropy();
            match tick_once(store.as_ref(), &mut rng, config.world_tick.max_danger)? {
                Some(event) => print_json(&event),
                None => {
                    println!("no locations to tick");
                    Ok(())
                }
            }
        }
        Some("ticker") => {
            let seconds = args
                .get(1)
                .context("missing seconds")?
                .parse::<u64>()
                .context("invalid seconds")?;
            if !config.world_tick.enabled {
                bail!("world_tick.enabled is false");
            }
            let store = open_store(config)?;
            let ticker = WorldTicker::start(store, &config.world_tick);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            let ticks = ticker.stop().await;
            println!("ticks applied: {ticks}");
            Ok(())
        }
        Some("health") => {
            let client = LlmClient::from_config(&config.llm)?;
            if !client.is_available() {
                println!("completion service: not configured (stub replies)");
                return Ok(());
            }
            let response = client.health_check().await?;
            println!(
                "completion service: ok model={} latency_ms={}",
                response.model, response.latency_ms
            );
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
        None => {
            print_usage();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let (config_path, args) = split_config(&args)?;
    let config = load_config(config_path.as_ref())?;
    init_tracing(&config.general);

    info!(db = %config.persistence.path, provider = %config.llm.provider, "gm-cli starting");
    run(&config, &args).await
}

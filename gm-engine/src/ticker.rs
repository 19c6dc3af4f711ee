//! Background world tick as an owned task.
//!
//! The host process starts one [`WorldTicker`] and keeps the handle; the
//! task ends on [`WorldTicker::stop`] or when the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use gm_core::config::WorldTickConfig;
use gm_core::persistence::WorldStore;
use gm_core::world::tick_once;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to the running tick task.
#[derive(Debug)]
pub struct WorldTicker {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl WorldTicker {
    /// Spawn the ticker with the configured period. Must be called inside a
    /// Tokio runtime.
    #[must_use]
    pub fn start(store: Arc<dyn WorldStore>, config: &WorldTickConfig) -> Self {
        let period = Duration::from_secs(config.interval_seconds.max(1));
        Self::start_with_period(store, period, config.max_danger)
    }

    /// Spawn the ticker with an explicit period.
    #[must_use]
    pub fn start_with_period(store: Arc<dyn WorldStore>, period: Duration, max_danger: u8) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticks = 0_u64;
            info!(period_ms = period.as_millis() as u64, max_danger, "World ticker started");

            loop {
                tokio::select! {
                    changed = signal.changed() => {
                        if changed.is_err() || *signal.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(period) => {
                        match tick_once(store.as_ref(), &mut rng, max_danger) {
                            Ok(Some(event)) => {
                                ticks += 1;
                                debug!(event = %event.id, summary = %event.summary, "World tick applied");
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "World tick failed"),
                        }
                    }
                }
            }

            info!(ticks, "World ticker stopped");
            ticks
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Whether the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the task. Returns the number of ticks
    /// that produced an event.
    pub async fn stop(mut self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "World ticker task ended abnormally");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for WorldTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_core::persistence::SqliteWorldStore;
    use gm_core::seed::seed_demo_world;
    use gm_core::types::{event_kind, EventQuery};

    fn seeded_store() -> Arc<dyn WorldStore> {
        let store: Arc<dyn WorldStore> = Arc::new(SqliteWorldStore::open_in_memory().expect("store"));
        seed_demo_world(store.as_ref()).expect("seed");
        store
    }

    #[tokio::test]
    async fn ticks_until_stopped() {
        let store = seeded_store();
        let ticker = WorldTicker::start_with_period(Arc::clone(&store), Duration::from_millis(10), 7);
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        let ticks = ticker.stop().await;
        assert!(ticks >= 1);

        let events = store
            .recent_events(&EventQuery::recent(100).of_kind(event_kind::WORLD_TICK))
            .expect("events");
        assert_eq!(events.len() as u64, ticks);
    }

    #[tokio::test]
    async fn stop_before_first_tick() {
        let store = seeded_store();
        let ticker = WorldTicker::start_with_period(Arc::clone(&store), Duration::from_secs(3600), 7);
        assert_eq!(ticker.stop().await, 0);
    }

    #[tokio::test]
    async fn empty_world_ticks_quietly() {
        let store: Arc<dyn WorldStore> = Arc::new(SqliteWorldStore::open_in_memory().expect("store"));
        let ticker = WorldTicker::start_with_period(store, Duration::from_millis(5), 7);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticker.stop().await, 0);
    }
}

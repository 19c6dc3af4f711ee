//! One step of world simulation: danger drifts at the stalest location.

use rand::Rng;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::persistence::WorldStore;
use crate::types::{event_kind, Event, NewEvent};

/// Nudge the least-recently-updated location's danger by one step.
///
/// The direction is a fair coin; the new level is clamped to
/// `0..=max_danger`. Returns the appended `world_tick` event, or `None`
/// when there are no locations.
///
/// # Errors
///
/// Returns the store's error on a failed read or write.
pub fn tick_once<R: Rng>(
    store: &dyn WorldStore,
    rng: &mut R,
    max_danger: u8,
) -> Result<Option<Event>> {
    let Some(location) = store.least_recently_updated_location()? else {
        debug!("World tick skipped: no locations");
        return Ok(None);
    };

    let stepped = if rng.gen_bool(0.5) {
        location.danger_level.saturating_add(1)
    } else {
        location.danger_level.saturating_sub(1)
    };
    let level = stepped.min(max_danger);

    store.set_danger_level(&location.id, level)?;

    let event = store.append_event(
        NewEvent::new(
            event_kind::WORLD_TICK,
            format!("Pericolo aggiornato a {level} in {}", location.name),
        )
        .with_payload(json!({ "locationId": location.id }))
        .at_location(Some(location.id.clone())),
    )?;

    debug!(location = %location.id, from = location.danger_level, to = level, "World tick");
    Ok(Some(event))
}

//! Demo world: two Campanian settlements, the road between them, and one
//! player character.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::Result;
use crate::persistence::WorldStore;
use crate::types::{
    event_kind, Character, Language, LanguageSkill, Location, LocationId, NewEvent, Relationship,
    Waypoint,
};

/// Id of the Naples location.
pub const NAPOLI_ID: &str = "napoli-centro";
/// Id of the Caserta location.
pub const CASERTA_ID: &str = "caserta-campagna";
/// NPC guarding the Naples barricade.
pub const SENTINEL_NPC: &str = "sentinella-porta-capuana";

fn language(code: &str, name: &str, kind: &str, region: &str) -> Language {
    Language {
        code: code.to_string(),
        name: name.to_string(),
        kind: kind.to_string(),
        region: region.to_string(),
    }
}

/// Populate `store` with the demo world and return its player character.
///
/// Languages and locations are upserted, so seeding twice does not
/// duplicate them; waypoints, the seed event and the character (with one
/// wary NPC relationship) are added each time.
///
/// # Errors
///
/// Returns the store's error on any failed write.
pub fn seed_demo_world(store: &dyn WorldStore) -> Result<Character> {
    for lang in [
        language("it", "Italiano", "language", "Italia"),
        language("es", "Español", "language", "España"),
        language("en_us", "English (US)", "language", "USA"),
        language("nap", "Napoletano", "dialect", "Campania"),
    ] {
        store.upsert_language(&lang)?;
    }

    let now = Utc::now();
    store.upsert_location(&Location {
        id: LocationId::from(NAPOLI_ID),
        name: "Napoli — Centro Storico".to_string(),
        kind: "city_district".to_string(),
        lat: 40.8529,
        lon: 14.2681,
        region: "Campania".to_string(),
        danger_level: 2,
        updated_at: now,
    })?;
    store.upsert_location(&Location {
        id: LocationId::from(CASERTA_ID),
        name: "Caserta — Campagna".to_string(),
        kind: "rural".to_string(),
        lat: 41.07,
        lon: 14.33,
        region: "Campania".to_string(),
        danger_level: 1,
        updated_at: now,
    })?;

    store.insert_waypoint(&Waypoint::new(NAPOLI_ID, CASERTA_ID, 75, 2))?;
    store.insert_waypoint(&Waypoint::new(CASERTA_ID, NAPOLI_ID, 75, 2))?;

    store.append_event(
        NewEvent::new(
            event_kind::WORLD_SEED,
            "Insediamenti sparsi in Campania. Voci di un convoglio a sud.",
        )
        .with_payload(json!({ "region": "Campania" })),
    )?;

    let hero = store.create_character(
        "Jake Milton",
        &[LanguageSkill::new("it", 5), LanguageSkill::new("nap", 1)],
    )?;

    store.upsert_relationship(&Relationship {
        trust: 0.2,
        fear: 0.1,
        ..Relationship::neutral(hero.id.clone(), SENTINEL_NPC)
    })?;

    info!(character = %hero.id, "Demo world seeded");
    Ok(hero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CostGraph;
    use crate::persistence::SqliteWorldStore;
    use crate::types::EventQuery;

    #[test]
    fn seeded_world_is_connected() {
        let store = SqliteWorldStore::open_in_memory().expect("store");
        let hero = seed_demo_world(&store).expect("seed");

        assert_eq!(hero.language_codes(), vec!["it", "nap"]);
        assert_eq!(store.list_languages().expect("langs").len(), 4);
        assert_eq!(store.list_locations(10).expect("locs").len(), 2);

        let graph = CostGraph::load(&store).expect("graph");
        let route = graph.shortest_path(&NAPOLI_ID.into(), &CASERTA_ID.into());
        assert_eq!(route.cost, 77.0);
        assert_eq!(route.path.len(), 2);

        let seed_events = store
            .recent_events(&EventQuery::recent(5).of_kind(event_kind::WORLD_SEED))
            .expect("events");
        assert_eq!(seed_events.len(), 1);

        let rels = store.relationships_for(&hero.id).expect("relationships");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].npc_id, SENTINEL_NPC);
    }
}

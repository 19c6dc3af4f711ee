//! Similarity search over embedded world memories.
//!
//! Vectors live in the store next to everything else; a search embeds the
//! query and ranks every stored vector by cosine similarity. Collections here
//! are small (one entry per indexed event), so a linear scan is enough.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::Result;
use crate::persistence::WorldStore;
use crate::types::MemoryVector;

/// Scope label used for event memories.
pub const WORLD_SCOPE: &str = "world";

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHit {
    /// Id of the indexed record.
    pub id: String,
    /// Scope label.
    pub scope: String,
    /// Related record, if any.
    pub ref_id: Option<String>,
    /// Indexed text.
    pub content: String,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Embeds snippets on write and ranks them on read.
#[derive(Clone)]
pub struct MemoryIndex {
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("model", &self.provider.model_name())
            .field("dimensions", &self.provider.dimensions())
            .finish()
    }
}

impl MemoryIndex {
    /// Create an index backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Embed `content` and store it under `id`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns embedding or store errors.
    pub fn index(
        &self,
        store: &dyn WorldStore,
        id: &str,
        scope: &str,
        ref_id: Option<&str>,
        content: &str,
    ) -> Result<()> {
        let embedding = self.provider.embed(content)?;
        store.upsert_memory_vector(&MemoryVector {
            id: id.to_string(),
            scope: scope.to_string(),
            ref_id: ref_id.map(str::to_string),
            content: content.to_string(),
            embedding,
        })?;
        debug!(id, scope, "Memory indexed");
        Ok(())
    }

    /// The `limit` stored memories most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns embedding or store errors.
    pub fn search(&self, store: &dyn WorldStore, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let query_embedding = self.provider.embed(query)?;

        let mut hits: Vec<MemoryHit> = store
            .list_memory_vectors()?
            .into_iter()
            .map(|v| MemoryHit {
                score: cosine_similarity(&query_embedding, &v.embedding),
                id: v.id,
                scope: v.scope,
                ref_id: v.ref_id,
                content: v.content,
            })
            .collect();

        // Stable sort: equal scores keep store order.
        hits.sort_by_key(|h| std::cmp::Reverse(OrderedFloat(h.score)));
        hits.truncate(limit);

        debug!(query, hits = hits.len(), "Memory search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::persistence::SqliteWorldStore;

    fn index() -> MemoryIndex {
        MemoryIndex::new(Arc::new(HashingEmbeddingProvider::new(128).expect("provider")))
    }

    #[test]
    fn search_ranks_by_similarity() {
        let store = SqliteWorldStore::open_in_memory().expect("store");
        let index = index();
        index
            .index(&store, "e1", WORLD_SCOPE, None, "world_tick: Pericolo aggiornato a 3 in Caserta")
            .expect("index");
        index
            .index(&store, "e2", WORLD_SCOPE, Some("napoli"), "scene: un convoglio armato passa a sud")
            .expect("index");

        let hits = index.search(&store, "convoglio armato", 5).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "e2");
        assert_eq!(hits[0].ref_id.as_deref(), Some("napoli"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_respects_limit() {
        let store = SqliteWorldStore::open_in_memory().expect("store");
        let index = index();
        for i in 0..5 {
            index
                .index(&store, &format!("e{i}"), WORLD_SCOPE, None, &format!("note {i}"))
                .expect("index");
        }
        assert_eq!(index.search(&store, "note", 2).expect("search").len(), 2);
    }

    #[test]
    fn empty_store_yields_nothing() {
        let store = SqliteWorldStore::open_in_memory().expect("store");
        assert!(index().search(&store, "anything", 5).expect("search").is_empty());
    }

    #[test]
    fn hits_serialize_with_camel_case() {
        let hit = MemoryHit {
            id: "e1".to_string(),
            scope: WORLD_SCOPE.to_string(),
            ref_id: Some("napoli".to_string()),
            content: "x".to_string(),
            score: 0.5,
        };
        let json = serde_json::to_value(&hit).expect("json");
        assert_eq!(json["refId"], "napoli");
    }
}

//! Travel cost graph and shortest-path queries.
//!
//! Waypoints are grouped by source into adjacency lists that keep load
//! order; parallel edges are neither merged nor sorted. Routes are ranked by
//! a single scalar per edge, taken from [`Waypoint::weight`] when the graph
//! is built.
//!
//! Dijkstra's invariant holds unconditionally because both components are
//! unsigned. Among equal-cost alternatives the first one reaching the
//! frontier wins; callers must not rely on which.

use std::cmp::Reverse;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::persistence::WorldStore;
use crate::types::{LocationId, Waypoint};

/// An outgoing edge in the adjacency map.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Destination location.
    pub to: LocationId,
    /// Travel time in minutes.
    pub travel_minutes: u32,
    /// Abstract risk score.
    pub risk: u32,
    /// Ranking weight of the source waypoint.
    pub weight: f64,
}

/// Result of a shortest-path query.
///
/// An unreachable destination has an infinite `cost` and the one-element
/// path `[to]`; check [`PathResult::is_reachable`] rather than the path
/// length. Infinite costs serialize as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Sum of edge weights along `path`.
    #[serde(with = "cost_serde")]
    pub cost: f64,
    /// Visited locations from origin to destination.
    pub path: Vec<LocationId>,
}

impl PathResult {
    /// Whether a route was found.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.cost.is_finite()
    }
}

mod cost_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cost: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if cost.is_finite() {
            serializer.serialize_f64(*cost)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

/// Directed weighted graph over location ids.
#[derive(Debug, Clone, Default)]
pub struct CostGraph {
    adjacency: HashMap<LocationId, Vec<Edge>>,
}

impl CostGraph {
    /// Group waypoints by source id, preserving their order.
    #[must_use]
    pub fn from_waypoints<I>(waypoints: I) -> Self
    where
        I: IntoIterator<Item = Waypoint>,
    {
        let mut adjacency: HashMap<LocationId, Vec<Edge>> = HashMap::new();
        for wp in waypoints {
            let weight = wp.weight();
            adjacency.entry(wp.from_id).or_default().push(Edge {
                to: wp.to_id,
                travel_minutes: wp.travel_minutes,
                risk: wp.risk,
                weight,
            });
        }
        Self { adjacency }
    }

    /// Build the graph from every waypoint in the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if waypoints cannot be read.
    pub fn load(store: &dyn WorldStore) -> Result<Self> {
        let waypoints = store.list_waypoints()?;
        let graph = Self::from_waypoints(waypoints);
        debug!(
            nodes = graph.adjacency.len(),
            edges = graph.edge_count(),
            "Cost graph built"
        );
        Ok(graph)
    }

    /// Outgoing edges of `id`, in load order.
    #[must_use]
    pub fn edges_from(&self, id: &LocationId) -> &[Edge] {
        self.adjacency.get(id).map_or(&[], Vec::as_slice)
    }

    /// Number of locations with at least one outgoing edge.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Total number of edges, parallel edges included.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Cheapest route from `from` to `to`.
    ///
    /// Both endpoints count as graph nodes even when they have no edges.
    #[must_use]
    pub fn shortest_path(&self, from: &LocationId, to: &LocationId) -> PathResult {
        let mut dist: HashMap<&LocationId, f64> = HashMap::new();
        let mut prev: HashMap<&LocationId, &LocationId> = HashMap::new();
        let mut settled: HashSet<&LocationId> = HashSet::new();
        // (cost, insertion sequence) so equal costs pop in arrival order.
        let mut frontier = BinaryHeap::new();
        let mut seq: u64 = 0;

        dist.insert(from, 0.0);
        frontier.push(Reverse((OrderedFloat(0.0), seq, from)));

        while let Some(Reverse((OrderedFloat(d), _, u))) = frontier.pop() {
            if !settled.insert(u) {
                continue;
            }
            if u == to {
                break;
            }
            for edge in self.edges_from(u) {
                if settled.contains(&edge.to) {
                    continue;
                }
                let alt = d + edge.weight;
                let improved = match dist.entry(&edge.to) {
                    Entry::Occupied(mut e) if alt < *e.get() => {
                        e.insert(alt);
                        true
                    }
                    Entry::Occupied(_) => false,
                    Entry::Vacant(e) => {
                        e.insert(alt);
                        true
                    }
                };
                if improved {
                    prev.insert(&edge.to, u);
                    seq += 1;
                    frontier.push(Reverse((OrderedFloat(alt), seq, &edge.to)));
                }
            }
        }

        let cost = dist.get(to).copied().unwrap_or(f64::INFINITY);
        let mut path = vec![to.clone()];
        let mut cur = to;
        while let Some(&p) = prev.get(cur) {
            path.push(p.clone());
            cur = p;
        }
        path.reverse();

        PathResult { cost, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LocationId {
        LocationId::from(s)
    }

    fn sample() -> CostGraph {
        CostGraph::from_waypoints(vec![
            Waypoint::new("A", "B", 10, 1),
            Waypoint::new("B", "C", 5, 0),
            Waypoint::new("A", "C", 30, 5),
        ])
    }

    #[test]
    fn prefers_cheaper_indirect_route() {
        let result = sample().shortest_path(&id("A"), &id("C"));
        assert_eq!(result.cost, 16.0);
        assert_eq!(result.path, vec![id("A"), id("B"), id("C")]);
    }

    #[test]
    fn unreachable_returns_infinite_and_singleton_path() {
        let result = sample().shortest_path(&id("C"), &id("A"));
        assert!(result.cost.is_infinite());
        assert!(!result.is_reachable());
        assert_eq!(result.path, vec![id("A")]);
    }

    #[test]
    fn unknown_endpoints_are_still_nodes() {
        let result = sample().shortest_path(&id("X"), &id("Y"));
        assert!(!result.is_reachable());
        assert_eq!(result.path, vec![id("Y")]);
    }

    #[test]
    fn same_origin_and_destination_costs_zero() {
        let result = sample().shortest_path(&id("A"), &id("A"));
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.path, vec![id("A")]);
    }

    #[test]
    fn parallel_edges_are_kept_in_load_order() {
        let graph = CostGraph::from_waypoints(vec![
            Waypoint::new("A", "B", 50, 0),
            Waypoint::new("A", "B", 5, 0),
        ]);
        let edges = graph.edges_from(&id("A"));
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].travel_minutes, 50);
        assert_eq!(edges[1].travel_minutes, 5);
        assert_eq!(graph.shortest_path(&id("A"), &id("B")).cost, 5.0);
    }

    #[test]
    fn route_cost_is_sum_of_waypoint_weights() {
        let legs = vec![
            Waypoint::new("A", "B", 12, 3),
            Waypoint::new("B", "C", 40, 9),
        ];
        let expected: f64 = legs.iter().map(Waypoint::weight).sum();
        let graph = CostGraph::from_waypoints(legs.clone());
        assert_eq!(graph.edges_from(&id("A"))[0].weight, legs[0].weight());
        assert_eq!(graph.shortest_path(&id("A"), &id("C")).cost, expected);
    }

    #[test]
    fn target_only_nodes_are_reachable() {
        let graph = CostGraph::from_waypoints(vec![Waypoint::new("A", "Z", 3, 4)]);
        let result = graph.shortest_path(&id("A"), &id("Z"));
        assert_eq!(result.cost, 7.0);
        assert_eq!(result.path, vec![id("A"), id("Z")]);
    }

    #[test]
    fn infinite_cost_serializes_as_null() {
        let result = sample().shortest_path(&id("C"), &id("A"));
        let json = serde_json::to_value(&result).expect("json");
        assert!(json["cost"].is_null());
        let back: PathResult = serde_json::from_value(json).expect("back");
        assert!(back.cost.is_infinite());
    }
}

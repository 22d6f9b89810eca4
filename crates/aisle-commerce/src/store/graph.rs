//! Store layout graph.

use crate::error::FulfillmentError;
use crate::ids::AisleId;
use petgraph::algo::{connected_components, dijkstra};
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A walkable location in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisleNode {
    pub id: AisleId,
    /// Shopper-facing label, e.g. "Aisle 3".
    pub label: String,
    /// Section name, e.g. "Dairy".
    pub section: String,
    /// Floor-plan coordinates in metres, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<(f64, f64)>,
}

impl AisleNode {
    pub fn new(id: impl Into<AisleId>, label: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            section: section.into(),
            position: None,
        }
    }
}

/// Walkway between two aisles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisleEdge {
    pub from: AisleId,
    pub to: AisleId,
    /// Walking distance in metres.
    pub distance: f64,
}

impl AisleEdge {
    pub fn new(from: impl Into<AisleId>, to: impl Into<AisleId>, distance: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            distance,
        }
    }
}

/// Immutable weighted undirected graph over a store's aisles.
///
/// All-pairs walking distances are computed once at construction; the graph
/// must be connected and contain its entry and fallback nodes.
#[derive(Debug, Clone)]
pub struct StoreGraph {
    graph: UnGraph<AisleNode, f64>,
    /// Node indices ordered by aisle id.
    index: BTreeMap<AisleId, NodeIndex>,
    distances: Vec<Vec<f64>>,
    entry: AisleId,
    fallback: AisleId,
    checkout: Option<AisleId>,
}

impl StoreGraph {
    pub fn new(
        nodes: Vec<AisleNode>,
        edges: Vec<AisleEdge>,
        entry: AisleId,
        fallback: AisleId,
        checkout: Option<AisleId>,
    ) -> Result<Self, FulfillmentError> {
        let mut sorted = nodes;
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut graph = UnGraph::with_capacity(sorted.len(), edges.len());
        let mut index = BTreeMap::new();
        for node in sorted {
            let id = node.id.clone();
            let idx = graph.add_node(node);
            if index.insert(id.clone(), idx).is_some() {
                return Err(FulfillmentError::Config(format!("duplicate aisle {}", id)));
            }
        }

        for edge in edges {
            if !edge.distance.is_finite() || edge.distance < 0.0 {
                return Err(FulfillmentError::Config(format!(
                    "walkway {} - {} has invalid distance {}",
                    edge.from, edge.to, edge.distance
                )));
            }
            let (Some(a), Some(b)) = (index.get(&edge.from), index.get(&edge.to)) else {
                return Err(FulfillmentError::Config(format!(
                    "walkway {} - {} references an unknown aisle",
                    edge.from, edge.to
                )));
            };
            graph.add_edge(*a, *b, edge.distance);
        }

        let roles = [
            ("entry", Some(&entry)),
            ("fallback", Some(&fallback)),
            ("checkout", checkout.as_ref()),
        ];
        for (role, id) in roles {
            if let Some(id) = id.filter(|id| !index.contains_key(*id)) {
                return Err(FulfillmentError::Config(format!(
                    "{} node {} is not in the store graph",
                    role, id
                )));
            }
        }
        if connected_components(&graph) != 1 {
            return Err(FulfillmentError::Config(
                "store graph is not connected".to_string(),
            ));
        }

        let distances = index
            .values()
            .map(|from| {
                let reached = dijkstra(&graph, *from, None, |e| *e.weight());
                index
                    .values()
                    .map(|to| reached.get(to).copied().unwrap_or(f64::INFINITY))
                    .collect()
            })
            .collect();

        Ok(Self {
            graph,
            index,
            distances,
            entry,
            fallback,
            checkout,
        })
    }

    pub fn entry(&self) -> &AisleId {
        &self.entry
    }

    pub fn fallback(&self) -> &AisleId {
        &self.fallback
    }

    pub fn checkout(&self) -> Option<&AisleId> {
        self.checkout.as_ref()
    }

    pub fn contains(&self, id: &AisleId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &AisleId) -> Option<&AisleNode> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Shortest walking distance between two aisles.
    pub fn distance(&self, from: &AisleId, to: &AisleId) -> Option<f64> {
        let a = self.index.get(from)?.index();
        let b = self.index.get(to)?.index();
        Some(self.distances[a][b])
    }

    /// Aisles in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &AisleNode> {
        self.index.values().map(|idx| &self.graph[*idx])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

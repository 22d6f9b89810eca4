//! In-store walking routes.
//!
//! Exact minimum walks are a travelling-salesman problem; checkouts visit
//! tens of aisles at most, so a nearest-neighbour tour from the entry plus a
//! bounded 2-opt pass is close enough. Ties always break on aisle id, so the
//! same input always yields the same plan.

use super::graph::StoreGraph;
use crate::cart::ProcessedLine;
use crate::catalog::Catalog;
use crate::ids::{AisleId, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const EPSILON: f64 = 1e-9;

/// Tunables for [`RouteOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Average shopper walking speed.
    pub walking_speed_mps: f64,
    /// Maximum number of improving 2-opt moves.
    pub two_opt_iteration_cap: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            walking_speed_mps: 1.2,
            two_opt_iteration_cap: 64,
        }
    }
}

/// One product pick-up along the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub product_id: ProductId,
    pub product_name: String,
    pub aisle_id: AisleId,
    pub aisle_label: String,
    /// Metres walked from the entry when reaching this stop.
    pub running_distance: f64,
}

/// Ordered walking plan for one checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub stops: Vec<RouteStop>,
    /// Metres, including the exit leg when the store has a checkout node.
    pub total_distance: f64,
    pub estimated_time_secs: f64,
    /// Checkout node the route ends at, if any.
    pub exit: Option<AisleId>,
    /// Products routed to the fallback aisle and similar notices.
    pub warnings: Vec<String>,
}

impl RoutePlan {
    /// Distinct aisles in visiting order.
    pub fn aisles(&self) -> Vec<&AisleId> {
        let mut out: Vec<&AisleId> = Vec::new();
        for stop in &self.stops {
            if out.last() != Some(&&stop.aisle_id) {
                out.push(&stop.aisle_id);
            }
        }
        out
    }
}

/// Pure route planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptimizer {
    options: RouteOptions,
}

impl RouteOptimizer {
    pub fn new(options: RouteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    /// Plan a route for priced lines.
    pub fn plan_lines(&self, graph: &StoreGraph, catalog: &Catalog, lines: &[ProcessedLine]) -> RoutePlan {
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id.clone()).collect();
        self.plan(graph, catalog, &ids)
    }

    /// Plan a route visiting every distinct product's aisle once.
    pub fn plan(&self, graph: &StoreGraph, catalog: &Catalog, product_ids: &[ProductId]) -> RoutePlan {
        let mut warnings = Vec::new();
        let mut by_aisle: BTreeMap<AisleId, BTreeMap<ProductId, String>> = BTreeMap::new();

        for product_id in product_ids {
            let name = catalog
                .get(product_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| product_id.to_string());
            let aisle = match catalog.location(product_id) {
                Some(aisle) if graph.contains(aisle) => aisle.clone(),
                mapped => {
                    let detail = match mapped {
                        Some(aisle) => format!("aisle {} is not on the store map", aisle),
                        None => "no aisle mapping".to_string(),
                    };
                    tracing::warn!(
                        product_id = %product_id,
                        fallback = %graph.fallback(),
                        "{}, routing to fallback aisle",
                        detail
                    );
                    warnings.push(format!(
                        "{}: {}; look for it at {}",
                        name,
                        detail,
                        graph.fallback()
                    ));
                    graph.fallback().clone()
                }
            };
            by_aisle.entry(aisle).or_default().insert(product_id.clone(), name);
        }

        let targets: BTreeSet<AisleId> = by_aisle.keys().cloned().collect();
        let tour = self.tour(graph, targets);

        let mut stops = Vec::new();
        let mut walked = 0.0;
        let mut at = graph.entry().clone();
        for aisle in &tour {
            walked += dist(graph, &at, aisle);
            at = aisle.clone();
            let label = graph
                .node(aisle)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| aisle.to_string());
            if let Some(products) = by_aisle.get(aisle) {
                for (product_id, name) in products {
                    stops.push(RouteStop {
                        product_id: product_id.clone(),
                        product_name: name.clone(),
                        aisle_id: aisle.clone(),
                        aisle_label: label.clone(),
                        running_distance: walked,
                    });
                }
            }
        }

        let exit = graph.checkout().cloned();
        if let Some(checkout) = &exit {
            walked += dist(graph, &at, checkout);
        }

        let speed = if self.options.walking_speed_mps > 0.0 {
            self.options.walking_speed_mps
        } else {
            RouteOptions::default().walking_speed_mps
        };
        RoutePlan {
            stops,
            total_distance: walked,
            estimated_time_secs: walked / speed,
            exit,
            warnings,
        }
    }

    /// Order `targets` starting from the entry node.
    pub fn tour(&self, graph: &StoreGraph, targets: BTreeSet<AisleId>) -> Vec<AisleId> {
        let mut remaining: Vec<AisleId> = targets.into_iter().collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut at = graph.entry().clone();

        // Nearest neighbour; `remaining` is in id order so the first minimum
        // wins ties.
        while !remaining.is_empty() {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (i, aisle) in remaining.iter().enumerate() {
                let d = dist(graph, &at, aisle);
                if d < best_d - EPSILON {
                    best = i;
                    best_d = d;
                }
            }
            at = remaining.remove(best);
            order.push(at.clone());
        }

        self.two_opt(graph, order)
    }

    /// Reverse segments while that shortens the walk. The entry stays first
    /// and, when the store has a checkout node, the exit stays last.
    fn two_opt(&self, graph: &StoreGraph, order: Vec<AisleId>) -> Vec<AisleId> {
        let mut path = Vec::with_capacity(order.len() + 2);
        path.push(graph.entry().clone());
        path.extend(order);
        let fixed_end = graph.checkout().cloned();
        if let Some(checkout) = &fixed_end {
            path.push(checkout.clone());
        }

        // Indices 1..=last are movable.
        let last = if fixed_end.is_some() {
            path.len().saturating_sub(2)
        } else {
            path.len().saturating_sub(1)
        };

        let mut moves = 0;
        'improve: while moves < self.options.two_opt_iteration_cap {
            for i in 1..last {
                for j in (i + 1)..=last {
                    let before_i = dist(graph, &path[i - 1], &path[i]);
                    let after_i = dist(graph, &path[i - 1], &path[j]);
                    let (before_j, after_j) = match path.get(j + 1) {
                        Some(next) => (dist(graph, &path[j], next), dist(graph, &path[i], next)),
                        None => (0.0, 0.0),
                    };
                    if after_i + after_j < before_i + before_j - EPSILON {
                        path[i..=j].reverse();
                        moves += 1;
                        continue 'improve;
                    }
                }
            }
            break;
        }

        path.remove(0);
        if fixed_end.is_some() {
            path.pop();
        }
        path
    }
}

fn dist(graph: &StoreGraph, a: &AisleId, b: &AisleId) -> f64 {
    graph.distance(a, b).unwrap_or(f64::INFINITY)
}

/// Walking distance of visiting `order` from the entry, plus the exit leg.
pub fn path_length(graph: &StoreGraph, order: &[AisleId]) -> f64 {
    let mut total = 0.0;
    let mut at = graph.entry();
    for aisle in order {
        total += dist(graph, at, aisle);
        at = aisle;
    }
    if let Some(checkout) = graph.checkout() {
        total += dist(graph, at, checkout);
    }
    total
}

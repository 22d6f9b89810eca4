//! Store layout and walking routes.

mod graph;
mod route;

pub use graph::{AisleEdge, AisleNode, StoreGraph};
pub use route::{path_length, RouteOptimizer, RouteOptions, RoutePlan, RouteStop};

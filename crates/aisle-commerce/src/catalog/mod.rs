//! Product catalog module.
//!
//! Contains products, their aisle locations, stock records and stock status.

mod product;
mod stock;

pub use product::{Catalog, Product};
pub use stock::{StockRecord, StockStatus, StockThresholds};

//! Stock records and availability classification.

use crate::ids::{ProductId, StoreId};
use serde::{Deserialize, Serialize};

/// Snapshot of one `(product, store)` ledger row.
///
/// Only the inventory ledger creates or mutates these; everyone else sees
/// copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockRecord {
    /// Product.
    pub product_id: ProductId,
    /// Store.
    pub store_id: StoreId,
    /// Physical quantity on the shelf. Never negative.
    pub quantity: i64,
    /// Quantity held by live reservations.
    pub reserved: i64,
    /// Monotonic version, bumped on every change.
    pub version: u64,
    /// Unix millis of the last change.
    pub updated_at: i64,
    /// Average units sold per day, for days-of-supply prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_sales_rate: Option<f64>,
}

impl StockRecord {
    /// Quantity that can still be sold (physical minus live holds).
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }

    /// Check if a specific quantity can be covered.
    pub fn can_fulfill(&self, quantity: i64) -> bool {
        self.available() >= quantity
    }

    /// Classify this row for display.
    pub fn status(&self, thresholds: &StockThresholds) -> StockStatus {
        StockStatus::classify(Some(self.available()), self.daily_sales_rate, thresholds)
    }
}

/// Thresholds for low-stock classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockThresholds {
    /// Quantity at or below which an item is low.
    pub low_stock_quantity: i64,
    /// Predicted days of supply below which an item is low.
    pub days_supply: f64,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            low_stock_quantity: 3,
            days_supply: 1.0,
        }
    }
}

/// Shopper-facing availability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StockStatus {
    /// Comfortably in stock.
    InStock { quantity: i64 },
    /// Few units left or expected to sell out soon.
    LowStock {
        quantity: i64,
        /// `None` when the item has no recorded sales.
        days_left: Option<f64>,
    },
    /// Nothing available.
    OutOfStock,
    /// Not stocked at this store.
    Unknown,
}

impl StockStatus {
    /// Classify an available quantity.
    ///
    /// Low when the quantity is at or below the threshold, or when the
    /// predicted days of supply fall under the threshold. No sales rate
    /// means supply never runs out on its own.
    pub fn classify(
        available: Option<i64>,
        daily_sales_rate: Option<f64>,
        thresholds: &StockThresholds,
    ) -> Self {
        let Some(quantity) = available else {
            return StockStatus::Unknown;
        };
        if quantity <= 0 {
            return StockStatus::OutOfStock;
        }

        let days_left = daily_sales_rate
            .filter(|rate| *rate > 0.0)
            .map(|rate| quantity as f64 / rate);

        let low_by_quantity = quantity <= thresholds.low_stock_quantity;
        let low_by_days = days_left.is_some_and(|days| days < thresholds.days_supply);

        if low_by_quantity || low_by_days {
            StockStatus::LowStock {
                quantity,
                days_left,
            }
        } else {
            StockStatus::InStock { quantity }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::InStock { .. } => "in_stock",
            StockStatus::LowStock { .. } => "low_stock",
            StockStatus::OutOfStock => "out_of_stock",
            StockStatus::Unknown => "unknown",
        }
    }

    /// Human-readable message for the shopper.
    pub fn message(&self) -> String {
        match self {
            StockStatus::InStock { quantity } => format!("In stock ({} available).", quantity),
            StockStatus::LowStock {
                quantity,
                days_left: Some(days),
            } => format!(
                "Only {} left! Expected to last ~{:.1} day(s).",
                quantity, days
            ),
            StockStatus::LowStock { quantity, .. } => format!("Only {} left!", quantity),
            StockStatus::OutOfStock => "This item is currently out of stock.".to_string(),
            StockStatus::Unknown => "Product not stocked at this store.".to_string(),
        }
    }
}

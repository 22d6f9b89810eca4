//! Cart lines as they move through the pipeline.

use crate::catalog::StockStatus;
use crate::ids::{DealId, ProductId};
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Raw cart input: a product and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A line after substitution, ready for pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLine {
    /// Product that will be committed (the substitute, if any).
    pub product_id: ProductId,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Original product when this line carries a substitute.
    pub substitute_of: Option<ProductId>,
    pub substitution_reason: Option<String>,
    pub stock_status: StockStatus,
}

/// One deal applied to a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDeal {
    pub deal_id: DealId,
    pub stacking_class: String,
    /// Discount this deal took off each unit, after earlier deals.
    pub discount_per_unit: Money,
    /// Human-readable audit line.
    pub summary: String,
}

/// A fully priced line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
    /// Price before any discount.
    pub unit_price: Money,
    pub discount_per_unit: Money,
    pub final_unit_price: Money,
    pub substitute_of: Option<ProductId>,
    pub substitution_reason: Option<String>,
    pub stock_status: StockStatus,
    pub applied_deals: Vec<AppliedDeal>,
    /// Informational notes, e.g. a price clamped at zero.
    pub notes: Vec<String>,
}

impl ProcessedLine {
    /// Final price times quantity.
    pub fn line_total(&self) -> Result<Money, crate::FulfillmentError> {
        self.final_unit_price.checked_mul(self.quantity)
    }

    pub fn is_substitute(&self) -> bool {
        self.substitute_of.is_some()
    }
}

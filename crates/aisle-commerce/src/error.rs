//! Fulfillment error types.

use crate::checkout::LineFailure;
use crate::ids::{OrderId, ProductId, ReservationId, StoreId};
use aisle_data::TimeoutError;
use thiserror::Error;

/// Errors that can occur in the checkout fulfillment pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FulfillmentError {
    /// Product not found in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The ledger has no row for this product at this store.
    #[error("No stock record for {product_id} at {store_id}")]
    StockRecordNotFound {
        product_id: ProductId,
        store_id: StoreId,
    },

    /// Not enough available stock.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The stock row changed since it was read.
    #[error("Version conflict on {product_id}: expected {expected}, found {actual}")]
    VersionConflict {
        product_id: ProductId,
        expected: u64,
        actual: u64,
    },

    /// Neither the product nor any declared substitute can cover the quantity.
    #[error("No substitute available for {product_id} (requested {requested})")]
    NoSubstituteAvailable {
        product_id: ProductId,
        requested: i64,
    },

    /// Reservation token unknown, already used, or expired.
    #[error("Reservation not found or expired: {0}")]
    ReservationNotFound(ReservationId),

    /// Invalid quantity.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Substitutions must be confirmed before commit.
    #[error("Unconfirmed substitutions for: {}", join_ids(.0))]
    UnconfirmedSubstitution(Vec<ProductId>),

    /// Invalid checkout state transition.
    #[error("Invalid checkout transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Order attempt ended in `failed`; compensations already applied.
    #[error("Commit of order {order_id} failed for: {}", join_failures(.failures))]
    CommitFailed {
        order_id: OrderId,
        failures: Vec<LineFailure>,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An external collaborator did not answer in time.
    #[error(transparent)]
    Unavailable(#[from] TimeoutError),

    /// Hard storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid store configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FulfillmentError {
    /// Whether the caller should re-run substitution/pricing against fresh
    /// data, as opposed to a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FulfillmentError::InsufficientStock { .. }
                | FulfillmentError::VersionConflict { .. }
                | FulfillmentError::NoSubstituteAvailable { .. }
                | FulfillmentError::UnconfirmedSubstitution(_)
                | FulfillmentError::CommitFailed { .. }
                | FulfillmentError::ReservationNotFound(_)
        )
    }

    /// Product ids the client should look at again.
    pub fn problem_products(&self) -> Vec<ProductId> {
        match self {
            FulfillmentError::InsufficientStock { product_id, .. }
            | FulfillmentError::VersionConflict { product_id, .. }
            | FulfillmentError::NoSubstituteAvailable { product_id, .. }
            | FulfillmentError::ProductNotFound(product_id) => vec![product_id.clone()],
            FulfillmentError::UnconfirmedSubstitution(ids) => ids.clone(),
            FulfillmentError::CommitFailed { failures, .. } => {
                failures.iter().map(|f| f.product_id.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter().map(ProductId::as_str).collect::<Vec<_>>().join(", ")
}

fn join_failures(failures: &[LineFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.product_id, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "storage")]
impl From<aisle_db::DbError> for FulfillmentError {
    fn from(e: aisle_db::DbError) -> Self {
        FulfillmentError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for FulfillmentError {
    fn from(e: serde_json::Error) -> Self {
        FulfillmentError::Serialization(e.to_string())
    }
}

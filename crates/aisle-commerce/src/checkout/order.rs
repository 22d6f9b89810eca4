//! Order types.

use crate::ids::{OrderId, ProductId, StoreId, UserId};
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, stock not yet settled.
    #[default]
    Pending,
    /// Every line decremented; immutable from here on.
    Committed,
    /// A line could not be decremented; compensations applied.
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Committed => "committed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "committed" => Some(OrderStatus::Committed),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Check if order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Committed | OrderStatus::Failed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub final_unit_price: Money,
}

/// Why a line failed to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientStock { available: i64 },
    VersionConflict { expected: u64, actual: u64 },
    /// The ledger or order store failed while settling the line.
    Storage { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InsufficientStock { available } => {
                write!(f, "insufficient stock, {} available", available)
            }
            FailureReason::VersionConflict { expected, actual } => write!(
                f,
                "stock kept changing (version {} != {})",
                expected, actual
            ),
            FailureReason::Storage { message } => write!(f, "storage failure: {}", message),
        }
    }
}

/// A line that could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub product_id: ProductId,
    pub requested: i64,
    pub reason: FailureReason,
}

/// A persisted order attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub store_id: StoreId,
    /// Unix millis.
    pub created_at: i64,
    pub status: OrderStatus,
    pub total_amount: Money,
    /// Written on commit.
    pub lines: Vec<OrderLine>,
    /// Written on failure.
    pub failures: Vec<LineFailure>,
}

impl Order {
    /// A fresh pending order.
    pub fn pending(
        id: OrderId,
        user_id: UserId,
        store_id: StoreId,
        total_amount: Money,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            store_id,
            created_at,
            status: OrderStatus::Pending,
            total_amount,
            lines: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn receipt(&self) -> CommitReceipt {
        CommitReceipt {
            order_id: self.id.clone(),
            status: self.status,
            total_amount: self.total_amount,
        }
    }
}

/// What a successful commit hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

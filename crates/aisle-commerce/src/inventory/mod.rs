//! Inventory ledger.
//!
//! The ledger is the only owner of stock rows. It guarantees single-row
//! atomicity: every mutation either applies completely and bumps the row
//! version, or changes nothing. Multi-row consistency is the caller's job
//! (see the checkout saga).

mod clock;
mod memory;
#[cfg(feature = "storage")]
mod sqlite;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::InMemoryLedger;
#[cfg(feature = "storage")]
pub use sqlite::SqliteLedger;

use crate::catalog::StockRecord;
use crate::error::FulfillmentError;
use crate::ids::{ProductId, ReservationId, StoreId};
use aisle_data::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecrementOutcome {
    /// Stock was decremented by exactly the requested amount.
    Applied { remaining: i64, version: u64 },
    /// The row version no longer matches; nothing changed.
    VersionConflict { actual: u64 },
    /// Not enough available stock; nothing changed.
    InsufficientStock { available: i64 },
}

/// A soft hold on available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationToken {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub amount: i64,
    /// Unix millis after which the hold is void.
    pub expires_at: i64,
}

/// Authoritative stock counts per `(product, store)`.
///
/// Implementations must make [`InventoryLedger::try_decrement`] a single
/// compare-and-swap on `(quantity, version)` and must never block one row on
/// another.
pub trait InventoryLedger: Send + Sync {
    /// Current row, or `None` if the product is not stocked at the store.
    fn get_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
    ) -> Result<Option<StockRecord>, FulfillmentError>;

    /// Every row of a store, ordered by product id.
    fn list_stock(&self, store_id: &StoreId) -> Result<Vec<StockRecord>, FulfillmentError>;

    /// Decrement by `amount` if the row is still at `expected_version` and
    /// enough stock is available. Never retries internally.
    fn try_decrement(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        expected_version: u64,
    ) -> Result<DecrementOutcome, FulfillmentError>;

    /// Unconditionally add `amount` (compensation, restock).
    fn increment(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
    ) -> Result<StockRecord, FulfillmentError>;

    /// Create or overwrite a row's physical quantity.
    fn set_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        quantity: i64,
        daily_sales_rate: Option<f64>,
    ) -> Result<StockRecord, FulfillmentError>;

    /// Hold `amount` of available stock for `ttl`.
    fn reserve(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        ttl: Duration,
    ) -> Result<ReservationToken, FulfillmentError>;

    /// Turn a live hold into a physical decrement.
    fn confirm_reservation(
        &self,
        token: &ReservationToken,
    ) -> Result<StockRecord, FulfillmentError>;

    /// Drop a hold early. Releasing an unknown or expired hold is a no-op.
    fn release_reservation(&self, token: &ReservationToken) -> Result<(), FulfillmentError>;
}

/// One product's quantity in a stock mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// A decrement that took effect and may need compensating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDecrement {
    pub product_id: ProductId,
    pub quantity: i64,
    pub version: u64,
}

/// Why a single line could not be decremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecrementFailure {
    InsufficientStock { available: i64 },
    /// Retries exhausted while the row kept changing.
    VersionConflict { expected: u64, actual: u64 },
}

/// Per-line results of [`decrement_lines`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecrementReport {
    pub applied: Vec<AppliedDecrement>,
    pub failed: Vec<(StockLine, DecrementFailure)>,
}

impl DecrementReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Unix-millis expiry of a hold taken at `now` for `ttl`.
pub(crate) fn hold_expiry(now: i64, ttl: Duration) -> Result<i64, FulfillmentError> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or(FulfillmentError::Overflow)
}

/// Merge lines that name the same product, keeping first-seen order.
pub fn merge_lines(lines: &[StockLine]) -> Vec<StockLine> {
    let mut merged: Vec<StockLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// Attempt a decrement for every line, collecting per-line results.
///
/// Each line reads its row and issues a conditional decrement; a version
/// conflict re-reads and retries within `retry`'s budget. Insufficient stock
/// is never retried. Nothing is rolled back here: callers decide whether
/// partial success must be compensated.
pub fn decrement_lines(
    ledger: &dyn InventoryLedger,
    store_id: &StoreId,
    lines: &[StockLine],
    retry: &RetryPolicy,
) -> Result<DecrementReport, FulfillmentError> {
    let mut report = DecrementReport::default();

    for line in merge_lines(lines) {
        if line.quantity <= 0 {
            return Err(FulfillmentError::InvalidQuantity(line.quantity));
        }
        match decrement_line(ledger, store_id, &line, retry)? {
            Ok(applied) => report.applied.push(applied),
            Err(failure) => report.failed.push((line, failure)),
        }
    }

    Ok(report)
}

/// Decrement one line, re-reading and retrying on version conflicts.
///
/// The outer `Result` carries hard ledger failures; the inner one says
/// whether the decrement took effect.
pub fn decrement_line(
    ledger: &dyn InventoryLedger,
    store_id: &StoreId,
    line: &StockLine,
    retry: &RetryPolicy,
) -> Result<Result<AppliedDecrement, DecrementFailure>, FulfillmentError> {
    let mut attempt = 0;
    loop {
        let Some(record) = ledger.get_stock(&line.product_id, store_id)? else {
            return Ok(Err(DecrementFailure::InsufficientStock { available: 0 }));
        };

        match ledger.try_decrement(&line.product_id, store_id, line.quantity, record.version)? {
            DecrementOutcome::Applied { version, .. } => {
                return Ok(Ok(AppliedDecrement {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    version,
                }));
            }
            DecrementOutcome::InsufficientStock { available } => {
                return Ok(Err(DecrementFailure::InsufficientStock { available }));
            }
            DecrementOutcome::VersionConflict { actual } => {
                if !retry.allows(attempt) {
                    return Ok(Err(DecrementFailure::VersionConflict {
                        expected: record.version,
                        actual,
                    }));
                }
                tracing::debug!(
                    product_id = %line.product_id,
                    store_id = %store_id,
                    expected = record.version,
                    actual,
                    attempt,
                    "version conflict, re-reading stock row"
                );
                let delay = retry.delay(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ledger_with(rows: &[(&str, i64)]) -> InMemoryLedger {
        let ledger = InMemoryLedger::new(Arc::new(ManualClock::new(0)));
        for (product, qty) in rows {
            ledger
                .set_stock(&ProductId::new(*product), &StoreId::new("S1"), *qty, None)
                .unwrap();
        }
        ledger
    }

    fn line(product: &str, quantity: i64) -> StockLine {
        StockLine {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    #[test]
    fn test_hold_expiry_rejects_unbounded_ttl() {
        assert_eq!(hold_expiry(1_000, Duration::from_secs(2)), Ok(3_000));
        assert_eq!(
            hold_expiry(1_000, Duration::MAX),
            Err(FulfillmentError::Overflow)
        );
        assert_eq!(
            hold_expiry(i64::MAX - 10, Duration::from_millis(11)),
            Err(FulfillmentError::Overflow)
        );
    }

    #[test]
    fn test_merge_lines_keeps_order() {
        let merged = merge_lines(&[line("b", 1), line("a", 2), line("b", 3)]);
        assert_eq!(merged, vec![line("b", 4), line("a", 2)]);
    }

    #[test]
    fn test_decrement_lines_collects_failures() {
        let ledger = ledger_with(&[("milk", 2), ("eggs", 12)]);
        let report = decrement_lines(
            &ledger,
            &StoreId::new("S1"),
            &[line("milk", 5), line("eggs", 6), line("ghost", 1)],
            &RetryPolicy::none(),
        )
        .unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].product_id.as_str(), "eggs");
        assert_eq!(report.failed.len(), 2);
        assert_eq!(
            report.failed[0].1,
            DecrementFailure::InsufficientStock { available: 2 }
        );
        assert_eq!(
            report.failed[1].1,
            DecrementFailure::InsufficientStock { available: 0 }
        );
    }

    #[test]
    fn test_decrement_lines_rejects_non_positive() {
        let ledger = ledger_with(&[("milk", 2)]);
        let err = decrement_lines(
            &ledger,
            &StoreId::new("S1"),
            &[line("milk", 0)],
            &RetryPolicy::none(),
        )
        .unwrap_err();
        assert_eq!(err, FulfillmentError::InvalidQuantity(0));
    }
}

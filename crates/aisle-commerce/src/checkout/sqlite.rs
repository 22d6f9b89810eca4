//! SQLite-backed order store.

use super::order::{FailureReason, LineFailure, Order, OrderLine, OrderStatus};
use super::orders::{require_pending, BeginOutcome, OrderStore};
use crate::error::FulfillmentError;
use crate::ids::{OrderId, ProductId, StoreId, UserId};
use crate::money::{Currency, Money};
use aisle_db::{params, Db, DbError, Tx};
use serde::Deserialize;
use std::sync::Arc;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id           TEXT    PRIMARY KEY,
    user_id      TEXT    NOT NULL,
    store_id     TEXT    NOT NULL,
    status       TEXT    NOT NULL,
    total_minor  INTEGER NOT NULL,
    currency     TEXT    NOT NULL,
    created_at   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS order_lines (
    order_id          TEXT    NOT NULL REFERENCES orders (id),
    position          INTEGER NOT NULL,
    product_id        TEXT    NOT NULL,
    quantity          INTEGER NOT NULL,
    unit_price_minor  INTEGER NOT NULL,
    PRIMARY KEY (order_id, position)
);
CREATE TABLE IF NOT EXISTS order_failures (
    order_id    TEXT    NOT NULL REFERENCES orders (id),
    position    INTEGER NOT NULL,
    product_id  TEXT    NOT NULL,
    requested   INTEGER NOT NULL,
    reason      TEXT    NOT NULL,
    PRIMARY KEY (order_id, position)
);
";

#[derive(Deserialize)]
struct OrderRow {
    id: String,
    user_id: String,
    store_id: String,
    status: String,
    total_minor: i64,
    currency: String,
    created_at: i64,
}

#[derive(Deserialize)]
struct LineRow {
    product_id: String,
    quantity: i64,
    unit_price_minor: i64,
}

#[derive(Deserialize)]
struct FailureRow {
    product_id: String,
    requested: i64,
    reason: String,
}

/// Orders persisted in SQLite.
pub struct SqliteOrderStore {
    db: Arc<Db>,
}

impl SqliteOrderStore {
    /// Wrap a database, creating the order tables if needed.
    pub fn new(db: Arc<Db>) -> Result<Self, FulfillmentError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }
}

fn load(tx: &Tx<'_>, id: &OrderId) -> Result<Option<Order>, DbError> {
    let Some(row) = tx.query_optional::<OrderRow>(
        "SELECT id, user_id, store_id, status, total_minor, currency, created_at
         FROM orders WHERE id = ?1",
        params![id.as_str()],
    )?
    else {
        return Ok(None);
    };

    let currency = Currency::from_code(&row.currency)
        .ok_or_else(|| DbError::TypeError(format!("unknown currency {}", row.currency)))?;
    let status = OrderStatus::parse(&row.status)
        .ok_or_else(|| DbError::TypeError(format!("unknown order status {}", row.status)))?;

    let lines = tx
        .query(
            "SELECT product_id, quantity, unit_price_minor FROM order_lines
             WHERE order_id = ?1 ORDER BY position",
            params![id.as_str()],
        )?
        .deserialize_all::<LineRow>()?
        .into_iter()
        .map(|l| OrderLine {
            product_id: ProductId::new(l.product_id),
            quantity: l.quantity,
            final_unit_price: Money::new(l.unit_price_minor, currency),
        })
        .collect();

    let failures = tx
        .query(
            "SELECT product_id, requested, reason FROM order_failures
             WHERE order_id = ?1 ORDER BY position",
            params![id.as_str()],
        )?
        .deserialize_all::<FailureRow>()?
        .into_iter()
        .map(|f| -> Result<LineFailure, DbError> {
            Ok(LineFailure {
                product_id: ProductId::new(f.product_id),
                requested: f.requested,
                reason: serde_json::from_str::<FailureReason>(&f.reason)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Order {
        id: OrderId::new(row.id),
        user_id: UserId::new(row.user_id),
        store_id: StoreId::new(row.store_id),
        created_at: row.created_at,
        status,
        total_amount: Money::new(row.total_minor, currency),
        lines,
        failures,
    }))
}

fn set_status(tx: &Tx<'_>, id: &OrderId, status: OrderStatus) -> Result<(), DbError> {
    tx.execute(
        "UPDATE orders SET status = ?2 WHERE id = ?1",
        params![id.as_str(), status.as_str()],
    )?;
    Ok(())
}

impl OrderStore for SqliteOrderStore {
    fn begin(&self, order: &Order) -> Result<BeginOutcome, FulfillmentError> {
        let outcome = self.db.transaction(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO orders
                 (id, user_id, store_id, status, total_minor, currency, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    order.id.as_str(),
                    order.user_id.as_str(),
                    order.store_id.as_str(),
                    order.status.as_str(),
                    order.total_amount.minor,
                    order.total_amount.currency.code(),
                    order.created_at
                ],
            )?;
            if inserted == 1 {
                return Ok(BeginOutcome::Created);
            }
            load(tx, &order.id)?
                .map(BeginOutcome::Existing)
                .ok_or(DbError::NotFound)
        })?;
        Ok(outcome)
    }

    fn mark_committed(&self, id: &OrderId, lines: &[OrderLine]) -> Result<Order, FulfillmentError> {
        self.db.transaction(|tx| {
            let Some(order) = load(tx, id)? else {
                return Ok(Err(FulfillmentError::OrderNotFound(id.clone())));
            };
            if let Err(e) = require_pending(&order, OrderStatus::Committed) {
                return Ok(Err(e));
            }
            for (position, line) in lines.iter().enumerate() {
                tx.execute(
                    "INSERT INTO order_lines
                     (order_id, position, product_id, quantity, unit_price_minor)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.as_str(),
                        position,
                        line.product_id.as_str(),
                        line.quantity,
                        line.final_unit_price.minor
                    ],
                )?;
            }
            set_status(tx, id, OrderStatus::Committed)?;
            Ok(Ok(Order {
                status: OrderStatus::Committed,
                lines: lines.to_vec(),
                ..order
            }))
        })?
    }

    fn mark_failed(
        &self,
        id: &OrderId,
        failures: &[LineFailure],
    ) -> Result<Order, FulfillmentError> {
        self.db.transaction(|tx| {
            let Some(order) = load(tx, id)? else {
                return Ok(Err(FulfillmentError::OrderNotFound(id.clone())));
            };
            if let Err(e) = require_pending(&order, OrderStatus::Failed) {
                return Ok(Err(e));
            }
            for (position, failure) in failures.iter().enumerate() {
                tx.execute(
                    "INSERT INTO order_failures
                     (order_id, position, product_id, requested, reason)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.as_str(),
                        position,
                        failure.product_id.as_str(),
                        failure.requested,
                        serde_json::to_string(&failure.reason)?
                    ],
                )?;
            }
            set_status(tx, id, OrderStatus::Failed)?;
            Ok(Ok(Order {
                status: OrderStatus::Failed,
                failures: failures.to_vec(),
                ..order
            }))
        })?
    }

    fn get(&self, id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        Ok(self.db.transaction(|tx| load(tx, id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteOrderStore {
        SqliteOrderStore::new(Arc::new(Db::open_in_memory().unwrap())).unwrap()
    }

    fn pending(id: &str) -> Order {
        Order::pending(
            OrderId::new(id),
            UserId::new("u-1"),
            StoreId::new("S1"),
            Money::new(1098, Currency::USD),
            42,
        )
    }

    #[test]
    fn test_begin_and_replay() {
        let store = store();
        assert_eq!(store.begin(&pending("o1")).unwrap(), BeginOutcome::Created);
        match store.begin(&pending("o1")).unwrap() {
            BeginOutcome::Existing(order) => {
                assert_eq!(order.status, OrderStatus::Pending);
                assert_eq!(order.created_at, 42);
            }
            other => panic!("expected existing order, got {:?}", other),
        }
    }

    #[test]
    fn test_committed_lines_persist() {
        let store = store();
        store.begin(&pending("o1")).unwrap();
        let lines = vec![
            OrderLine {
                product_id: ProductId::new("milk"),
                quantity: 2,
                final_unit_price: Money::new(299, Currency::USD),
            },
            OrderLine {
                product_id: ProductId::new("bread"),
                quantity: 1,
                final_unit_price: Money::new(500, Currency::USD),
            },
        ];
        store.mark_committed(&OrderId::new("o1"), &lines).unwrap();
        let loaded = store.get(&OrderId::new("o1")).unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Committed);
        assert_eq!(loaded.lines, lines);
        assert!(store.mark_committed(&OrderId::new("o1"), &lines).is_err());
    }

    #[test]
    fn test_failures_persist() {
        let store = store();
        store.begin(&pending("o2")).unwrap();
        let failures = vec![LineFailure {
            product_id: ProductId::new("milk"),
            requested: 5,
            reason: FailureReason::InsufficientStock { available: 2 },
        }];
        store.mark_failed(&OrderId::new("o2"), &failures).unwrap();
        let loaded = store.get(&OrderId::new("o2")).unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Failed);
        assert_eq!(loaded.failures, failures);
    }
}

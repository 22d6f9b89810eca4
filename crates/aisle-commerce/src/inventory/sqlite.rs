//! SQLite-backed inventory ledger.

use super::{hold_expiry, Clock, DecrementOutcome, InventoryLedger, ReservationToken};
use crate::catalog::StockRecord;
use crate::error::FulfillmentError;
use crate::ids::{ProductId, ReservationId, StoreId};
use aisle_db::{params, Db, DbError, Tx};
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stock (
    store_id         TEXT    NOT NULL,
    product_id       TEXT    NOT NULL,
    quantity         INTEGER NOT NULL CHECK (quantity >= 0),
    version          INTEGER NOT NULL DEFAULT 0,
    updated_at       INTEGER NOT NULL,
    daily_sales_rate REAL,
    PRIMARY KEY (store_id, product_id)
);
CREATE TABLE IF NOT EXISTS reservations (
    id          TEXT    PRIMARY KEY,
    store_id    TEXT    NOT NULL,
    product_id  TEXT    NOT NULL,
    amount      INTEGER NOT NULL CHECK (amount > 0),
    expires_at  INTEGER NOT NULL,
    FOREIGN KEY (store_id, product_id) REFERENCES stock (store_id, product_id)
);
CREATE INDEX IF NOT EXISTS idx_reservations_row
    ON reservations (store_id, product_id, expires_at);
";

const SELECT_ROW: &str = "
SELECT s.product_id, s.store_id, s.quantity, s.version, s.updated_at, s.daily_sales_rate,
       COALESCE((SELECT SUM(r.amount) FROM reservations r
                 WHERE r.store_id = s.store_id AND r.product_id = s.product_id
                   AND r.expires_at > ?3), 0) AS reserved
FROM stock s
WHERE s.store_id = ?1 AND s.product_id = ?2
";

/// Ledger persisted in a SQLite database.
///
/// Every mutation is one immediate transaction whose guard lives in the
/// `WHERE` clause of a single `UPDATE`, so the row count tells whether the
/// compare-and-swap held.
pub struct SqliteLedger {
    db: Arc<Db>,
    clock: Arc<dyn Clock>,
}

impl SqliteLedger {
    /// Wrap a database, creating the ledger tables if needed.
    pub fn new(db: Arc<Db>, clock: Arc<dyn Clock>) -> Result<Self, FulfillmentError> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db, clock })
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }
}

fn purge_expired(
    tx: &Tx<'_>,
    product_id: &ProductId,
    store_id: &StoreId,
    now: i64,
) -> Result<(), DbError> {
    tx.execute(
        "DELETE FROM reservations WHERE store_id = ?1 AND product_id = ?2 AND expires_at <= ?3",
        params![store_id.as_str(), product_id.as_str(), now],
    )?;
    Ok(())
}

fn read_row(
    tx: &Tx<'_>,
    product_id: &ProductId,
    store_id: &StoreId,
    now: i64,
) -> Result<Option<StockRecord>, DbError> {
    tx.query_optional(
        SELECT_ROW,
        params![store_id.as_str(), product_id.as_str(), now],
    )
}

impl InventoryLedger for SqliteLedger {
    fn get_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
    ) -> Result<Option<StockRecord>, FulfillmentError> {
        let now = self.clock.now_millis();
        Ok(self
            .db
            .query_optional(SELECT_ROW, params![store_id.as_str(), product_id.as_str(), now])?)
    }

    fn list_stock(&self, store_id: &StoreId) -> Result<Vec<StockRecord>, FulfillmentError> {
        let now = self.clock.now_millis();
        let sql = "
SELECT s.product_id, s.store_id, s.quantity, s.version, s.updated_at, s.daily_sales_rate,
       COALESCE((SELECT SUM(r.amount) FROM reservations r
                 WHERE r.store_id = s.store_id AND r.product_id = s.product_id
                   AND r.expires_at > ?2), 0) AS reserved
FROM stock s
WHERE s.store_id = ?1
ORDER BY s.product_id
";
        Ok(self.db.query_as(sql, params![store_id.as_str(), now])?)
    }

    fn try_decrement(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        expected_version: u64,
    ) -> Result<DecrementOutcome, FulfillmentError> {
        if amount <= 0 {
            return Err(FulfillmentError::InvalidQuantity(amount));
        }
        let now = self.clock.now_millis();

        let outcome = self.db.transaction(|tx| {
            purge_expired(tx, product_id, store_id, now)?;
            let changed = tx.execute(
                "UPDATE stock
                 SET quantity = quantity - ?3, version = version + 1, updated_at = ?5
                 WHERE store_id = ?1 AND product_id = ?2 AND version = ?4
                   AND quantity - COALESCE((SELECT SUM(amount) FROM reservations
                                            WHERE store_id = ?1 AND product_id = ?2), 0) >= ?3",
                params![
                    store_id.as_str(),
                    product_id.as_str(),
                    amount,
                    expected_version,
                    now
                ],
            )?;

            let row = read_row(tx, product_id, store_id, now)?;
            Ok(match row {
                None => DecrementOutcome::InsufficientStock { available: 0 },
                Some(row) if changed == 1 => DecrementOutcome::Applied {
                    remaining: row.quantity,
                    version: row.version,
                },
                Some(row) if row.version != expected_version => {
                    DecrementOutcome::VersionConflict {
                        actual: row.version,
                    }
                }
                Some(row) => DecrementOutcome::InsufficientStock {
                    available: row.available(),
                },
            })
        })?;
        Ok(outcome)
    }

    fn increment(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
    ) -> Result<StockRecord, FulfillmentError> {
        if amount <= 0 {
            return Err(FulfillmentError::InvalidQuantity(amount));
        }
        let now = self.clock.now_millis();
        self.db
            .transaction(|tx| {
                let changed = tx.execute(
                    "UPDATE stock
                     SET quantity = quantity + ?3, version = version + 1, updated_at = ?4
                     WHERE store_id = ?1 AND product_id = ?2",
                    params![store_id.as_str(), product_id.as_str(), amount, now],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                read_row(tx, product_id, store_id, now)
            })?
            .ok_or_else(|| FulfillmentError::StockRecordNotFound {
                product_id: product_id.clone(),
                store_id: store_id.clone(),
            })
    }

    fn set_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        quantity: i64,
        daily_sales_rate: Option<f64>,
    ) -> Result<StockRecord, FulfillmentError> {
        if quantity < 0 {
            return Err(FulfillmentError::InvalidQuantity(quantity));
        }
        let now = self.clock.now_millis();
        let row = self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO stock (store_id, product_id, quantity, version, updated_at, daily_sales_rate)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)
                 ON CONFLICT (store_id, product_id) DO UPDATE SET
                     quantity = excluded.quantity,
                     version = stock.version + 1,
                     updated_at = excluded.updated_at,
                     daily_sales_rate = excluded.daily_sales_rate",
                params![
                    store_id.as_str(),
                    product_id.as_str(),
                    quantity,
                    now,
                    daily_sales_rate
                ],
            )?;
            read_row(tx, product_id, store_id, now)
        })?;
        row.ok_or_else(|| FulfillmentError::StockRecordNotFound {
            product_id: product_id.clone(),
            store_id: store_id.clone(),
        })
    }

    fn reserve(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        ttl: Duration,
    ) -> Result<ReservationToken, FulfillmentError> {
        if amount <= 0 {
            return Err(FulfillmentError::InvalidQuantity(amount));
        }
        let now = self.clock.now_millis();
        let expires_at = hold_expiry(now, ttl)?;
        let token = ReservationToken {
            id: ReservationId::generate(),
            product_id: product_id.clone(),
            store_id: store_id.clone(),
            amount,
            expires_at,
        };

        let result: Result<Result<(), i64>, DbError> = self.db.transaction(|tx| {
            purge_expired(tx, product_id, store_id, now)?;
            let available = read_row(tx, product_id, store_id, now)?
                .map(|row| row.available())
                .unwrap_or(0);
            if available < amount {
                return Ok(Err(available));
            }
            tx.execute(
                "INSERT INTO reservations (id, store_id, product_id, amount, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    token.id.as_str(),
                    store_id.as_str(),
                    product_id.as_str(),
                    amount,
                    token.expires_at
                ],
            )?;
            tx.execute(
                "UPDATE stock SET version = version + 1, updated_at = ?3
                 WHERE store_id = ?1 AND product_id = ?2",
                params![store_id.as_str(), product_id.as_str(), now],
            )?;
            Ok(Ok(()))
        });

        match result? {
            Ok(()) => Ok(token),
            Err(available) => Err(FulfillmentError::InsufficientStock {
                product_id: product_id.clone(),
                requested: amount,
                available,
            }),
        }
    }

    fn confirm_reservation(
        &self,
        token: &ReservationToken,
    ) -> Result<StockRecord, FulfillmentError> {
        let now = self.clock.now_millis();
        let confirmed = self.db.transaction(|tx| {
            purge_expired(tx, &token.product_id, &token.store_id, now)?;
            let removed = tx.execute(
                "DELETE FROM reservations WHERE id = ?1",
                params![token.id.as_str()],
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE stock
                 SET quantity = quantity - ?3, version = version + 1, updated_at = ?4
                 WHERE store_id = ?1 AND product_id = ?2",
                params![
                    token.store_id.as_str(),
                    token.product_id.as_str(),
                    token.amount,
                    now
                ],
            )?;
            Ok(true)
        })?;

        if !confirmed {
            return Err(FulfillmentError::ReservationNotFound(token.id.clone()));
        }
        self.get_stock(&token.product_id, &token.store_id)?
            .ok_or_else(|| FulfillmentError::StockRecordNotFound {
                product_id: token.product_id.clone(),
                store_id: token.store_id.clone(),
            })
    }

    fn release_reservation(&self, token: &ReservationToken) -> Result<(), FulfillmentError> {
        let now = self.clock.now_millis();
        self.db.transaction(|tx| {
            let removed = tx.execute(
                "DELETE FROM reservations WHERE id = ?1 AND expires_at > ?2",
                params![token.id.as_str(), now],
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE stock SET version = version + 1, updated_at = ?3
                     WHERE store_id = ?1 AND product_id = ?2",
                    params![token.store_id.as_str(), token.product_id.as_str(), now],
                )?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ManualClock;

    fn ledger() -> (SqliteLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(10_000));
        let db = Arc::new(Db::open_in_memory().unwrap());
        (SqliteLedger::new(db, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_set_and_get_stock() {
        let (ledger, _) = ledger();
        let milk = ProductId::new("milk");
        let store = StoreId::new("S001");
        let rec = ledger.set_stock(&milk, &store, 4, Some(2.5)).unwrap();
        assert_eq!(rec.quantity, 4);
        assert_eq!(rec.daily_sales_rate, Some(2.5));

        let again = ledger.set_stock(&milk, &store, 6, None).unwrap();
        assert_eq!(again.version, rec.version + 1);
        assert_eq!(ledger.list_stock(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_conditional_decrement() {
        let (ledger, _) = ledger();
        let milk = ProductId::new("milk");
        let store = StoreId::new("S001");
        let rec = ledger.set_stock(&milk, &store, 3, None).unwrap();

        assert_eq!(
            ledger.try_decrement(&milk, &store, 1, rec.version + 1).unwrap(),
            DecrementOutcome::VersionConflict {
                actual: rec.version
            }
        );
        assert_eq!(
            ledger.try_decrement(&milk, &store, 4, rec.version).unwrap(),
            DecrementOutcome::InsufficientStock { available: 3 }
        );
        assert_eq!(
            ledger.try_decrement(&milk, &store, 3, rec.version).unwrap(),
            DecrementOutcome::Applied {
                remaining: 0,
                version: rec.version + 1
            }
        );
        assert_eq!(
            ledger
                .try_decrement(&ProductId::new("ghost"), &store, 1, 0)
                .unwrap(),
            DecrementOutcome::InsufficientStock { available: 0 }
        );
    }

    #[test]
    fn test_reservation_lifecycle() {
        let (ledger, clock) = ledger();
        let eggs = ProductId::new("eggs");
        let store = StoreId::new("S001");
        ledger.set_stock(&eggs, &store, 12, None).unwrap();

        let token = ledger
            .reserve(&eggs, &store, 10, Duration::from_secs(30))
            .unwrap();
        assert_eq!(
            ledger.get_stock(&eggs, &store).unwrap().unwrap().available(),
            2
        );
        assert!(ledger
            .reserve(&eggs, &store, 3, Duration::from_secs(30))
            .is_err());

        let rec = ledger.confirm_reservation(&token).unwrap();
        assert_eq!(rec.quantity, 2);
        assert_eq!(rec.reserved, 0);

        let expiring = ledger
            .reserve(&eggs, &store, 2, Duration::from_secs(1))
            .unwrap();
        clock.advance_millis(1_000);
        assert_eq!(
            ledger.get_stock(&eggs, &store).unwrap().unwrap().available(),
            2
        );
        assert!(matches!(
            ledger.confirm_reservation(&expiring),
            Err(FulfillmentError::ReservationNotFound(_))
        ));
        ledger.release_reservation(&expiring).unwrap();
    }

    #[test]
    fn test_increment_unknown_row() {
        let (ledger, _) = ledger();
        assert!(matches!(
            ledger.increment(&ProductId::new("x"), &StoreId::new("S"), 1),
            Err(FulfillmentError::StockRecordNotFound { .. })
        ));
    }
}

//! In-memory inventory ledger.

use super::{hold_expiry, Clock, DecrementOutcome, InventoryLedger, ReservationToken};
use crate::catalog::StockRecord;
use crate::error::FulfillmentError;
use crate::ids::{ProductId, ReservationId, StoreId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type RowKey = (StoreId, ProductId);

#[derive(Debug)]
struct Hold {
    id: ReservationId,
    amount: i64,
    expires_at: i64,
}

#[derive(Debug)]
struct Row {
    quantity: i64,
    version: u64,
    updated_at: i64,
    daily_sales_rate: Option<f64>,
    holds: Vec<Hold>,
}

impl Row {
    fn purge_expired(&mut self, now: i64) {
        self.holds.retain(|h| h.expires_at > now);
    }

    fn reserved(&self) -> i64 {
        self.holds.iter().map(|h| h.amount).sum()
    }

    fn available(&self) -> i64 {
        self.quantity - self.reserved()
    }

    fn touch(&mut self, now: i64) {
        self.version += 1;
        self.updated_at = now;
    }

    fn snapshot(&self, key: &RowKey) -> StockRecord {
        StockRecord {
            product_id: key.1.clone(),
            store_id: key.0.clone(),
            quantity: self.quantity,
            reserved: self.reserved(),
            version: self.version,
            updated_at: self.updated_at,
            daily_sales_rate: self.daily_sales_rate,
        }
    }
}

/// Ledger backed by process memory.
///
/// Each row sits behind its own mutex; the row map lock is only held long
/// enough to find or insert a row, so rows never wait on each other.
pub struct InMemoryLedger {
    rows: RwLock<HashMap<RowKey, Arc<Mutex<Row>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn row(&self, product_id: &ProductId, store_id: &StoreId) -> Option<Arc<Mutex<Row>>> {
        self.rows
            .read()
            .get(&(store_id.clone(), product_id.clone()))
            .cloned()
    }

    fn require_row(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
    ) -> Result<Arc<Mutex<Row>>, FulfillmentError> {
        self.row(product_id, store_id)
            .ok_or_else(|| FulfillmentError::StockRecordNotFound {
                product_id: product_id.clone(),
                store_id: store_id.clone(),
            })
    }
}

impl InventoryLedger for InMemoryLedger {
    fn get_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
    ) -> Result<Option<StockRecord>, FulfillmentError> {
        let now = self.clock.now_millis();
        Ok(self.row(product_id, store_id).map(|row| {
            let mut row = row.lock();
            row.purge_expired(now);
            row.snapshot(&(store_id.clone(), product_id.clone()))
        }))
    }

    fn list_stock(&self, store_id: &StoreId) -> Result<Vec<StockRecord>, FulfillmentError> {
        let now = self.clock.now_millis();
        let rows: Vec<(RowKey, Arc<Mutex<Row>>)> = self
            .rows
            .read()
            .iter()
            .filter(|(key, _)| &key.0 == store_id)
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect();

        let mut records: Vec<StockRecord> = rows
            .iter()
            .map(|(key, row)| {
                let mut row = row.lock();
                row.purge_expired(now);
                row.snapshot(key)
            })
            .collect();
        records.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(records)
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
        let Some(row) = self.row(product_id, store_id) else {
            return Ok(DecrementOutcome::InsufficientStock { available: 0 });
        };

        let now = self.clock.now_millis();
        let mut row = row.lock();
        row.purge_expired(now);

        if row.version != expected_version {
            return Ok(DecrementOutcome::VersionConflict {
                actual: row.version,
            });
        }
        let available = row.available();
        if available < amount {
            return Ok(DecrementOutcome::InsufficientStock { available });
        }

        row.quantity -= amount;
        row.touch(now);
        Ok(DecrementOutcome::Applied {
            remaining: row.quantity,
            version: row.version,
        })
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
        let row = self.require_row(product_id, store_id)?;
        let now = self.clock.now_millis();
        let mut row = row.lock();
        row.purge_expired(now);
        row.quantity = row
            .quantity
            .checked_add(amount)
            .ok_or(FulfillmentError::Overflow)?;
        row.touch(now);
        Ok(row.snapshot(&(store_id.clone(), product_id.clone())))
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
        let key = (store_id.clone(), product_id.clone());
        let now = self.clock.now_millis();
        let row = self
            .rows
            .write()
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Row {
                    quantity: 0,
                    version: 0,
                    updated_at: now,
                    daily_sales_rate: None,
                    holds: Vec::new(),
                }))
            })
            .clone();

        let mut row = row.lock();
        row.purge_expired(now);
        row.quantity = quantity;
        row.daily_sales_rate = daily_sales_rate;
        row.touch(now);
        Ok(row.snapshot(&key))
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
        let Some(row) = self.row(product_id, store_id) else {
            return Err(FulfillmentError::InsufficientStock {
                product_id: product_id.clone(),
                requested: amount,
                available: 0,
            });
        };

        let mut row = row.lock();
        row.purge_expired(now);
        let available = row.available();
        if available < amount {
            return Err(FulfillmentError::InsufficientStock {
                product_id: product_id.clone(),
                requested: amount,
                available,
            });
        }

        let token = ReservationToken {
            id: ReservationId::generate(),
            product_id: product_id.clone(),
            store_id: store_id.clone(),
            amount,
            expires_at,
        };
        row.holds.push(Hold {
            id: token.id.clone(),
            amount,
            expires_at: token.expires_at,
        });
        row.touch(now);
        Ok(token)
    }

    fn confirm_reservation(
        &self,
        token: &ReservationToken,
    ) -> Result<StockRecord, FulfillmentError> {
        let row = self.require_row(&token.product_id, &token.store_id)?;
        let now = self.clock.now_millis();
        let mut row = row.lock();
        row.purge_expired(now);

        let Some(index) = row.holds.iter().position(|h| h.id == token.id) else {
            return Err(FulfillmentError::ReservationNotFound(token.id.clone()));
        };
        let hold = row.holds.remove(index);
        // A live hold is always backed by physical stock
        row.quantity -= hold.amount;
        row.touch(now);
        Ok(row.snapshot(&(token.store_id.clone(), token.product_id.clone())))
    }

    fn release_reservation(&self, token: &ReservationToken) -> Result<(), FulfillmentError> {
        let Some(row) = self.row(&token.product_id, &token.store_id) else {
            return Ok(());
        };
        let now = self.clock.now_millis();
        let mut row = row.lock();
        row.purge_expired(now);
        let before = row.holds.len();
        row.holds.retain(|h| h.id != token.id);
        if row.holds.len() != before {
            row.touch(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ManualClock;

    fn setup(qty: i64) -> (InMemoryLedger, Arc<ManualClock>, ProductId, StoreId) {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = InMemoryLedger::new(clock.clone());
        let product = ProductId::new("milk");
        let store = StoreId::new("S001");
        ledger.set_stock(&product, &store, qty, None).unwrap();
        (ledger, clock, product, store)
    }

    #[test]
    fn test_get_stock_unknown_row() {
        let (ledger, _, _, store) = setup(1);
        assert!(ledger
            .get_stock(&ProductId::new("bread"), &store)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_try_decrement_applies_and_bumps_version() {
        let (ledger, _, product, store) = setup(5);
        let before = ledger.get_stock(&product, &store).unwrap().unwrap();
        let outcome = ledger
            .try_decrement(&product, &store, 2, before.version)
            .unwrap();
        assert_eq!(
            outcome,
            DecrementOutcome::Applied {
                remaining: 3,
                version: before.version + 1
            }
        );
    }

    #[test]
    fn test_try_decrement_stale_version_changes_nothing() {
        let (ledger, _, product, store) = setup(5);
        let before = ledger.get_stock(&product, &store).unwrap().unwrap();
        let outcome = ledger
            .try_decrement(&product, &store, 1, before.version + 7)
            .unwrap();
        assert_eq!(
            outcome,
            DecrementOutcome::VersionConflict {
                actual: before.version
            }
        );
        assert_eq!(ledger.get_stock(&product, &store).unwrap().unwrap(), before);
    }

    #[test]
    fn test_try_decrement_never_goes_negative() {
        let (ledger, _, product, store) = setup(2);
        let v = ledger.get_stock(&product, &store).unwrap().unwrap().version;
        let outcome = ledger.try_decrement(&product, &store, 5, v).unwrap();
        assert_eq!(outcome, DecrementOutcome::InsufficientStock { available: 2 });
        assert_eq!(
            ledger.get_stock(&product, &store).unwrap().unwrap().quantity,
            2
        );
    }

    #[test]
    fn test_increment_restores() {
        let (ledger, _, product, store) = setup(2);
        let record = ledger.increment(&product, &store, 3).unwrap();
        assert_eq!(record.quantity, 5);
        assert!(ledger
            .increment(&ProductId::new("ghost"), &store, 1)
            .is_err());
    }

    #[test]
    fn test_reservation_reduces_available_until_expiry() {
        let (ledger, clock, product, store) = setup(5);
        let token = ledger
            .reserve(&product, &store, 4, Duration::from_secs(60))
            .unwrap();

        let record = ledger.get_stock(&product, &store).unwrap().unwrap();
        assert_eq!(record.quantity, 5);
        assert_eq!(record.available(), 1);

        // A second hold cannot overbook
        assert!(matches!(
            ledger.reserve(&product, &store, 2, Duration::from_secs(60)),
            Err(FulfillmentError::InsufficientStock { available: 1, .. })
        ));

        clock.advance_millis(60_001);
        let record = ledger.get_stock(&product, &store).unwrap().unwrap();
        assert_eq!(record.available(), 5);
        assert!(matches!(
            ledger.confirm_reservation(&token),
            Err(FulfillmentError::ReservationNotFound(_))
        ));
    }

    #[test]
    fn test_reserve_with_unbounded_ttl_holds_nothing() {
        let (ledger, _, product, store) = setup(5);
        assert_eq!(
            ledger.reserve(&product, &store, 2, Duration::MAX),
            Err(FulfillmentError::Overflow)
        );
        let record = ledger.get_stock(&product, &store).unwrap().unwrap();
        assert_eq!(record.reserved, 0);
        assert_eq!(record.available(), 5);
    }

    #[test]
    fn test_confirm_reservation_decrements_physical_stock() {
        let (ledger, _, product, store) = setup(5);
        let token = ledger
            .reserve(&product, &store, 3, Duration::from_secs(60))
            .unwrap();
        let record = ledger.confirm_reservation(&token).unwrap();
        assert_eq!(record.quantity, 2);
        assert_eq!(record.reserved, 0);
        // Confirming twice fails
        assert!(ledger.confirm_reservation(&token).is_err());
    }

    #[test]
    fn test_release_reservation() {
        let (ledger, _, product, store) = setup(5);
        let token = ledger
            .reserve(&product, &store, 5, Duration::from_secs(60))
            .unwrap();
        ledger.release_reservation(&token).unwrap();
        ledger.release_reservation(&token).unwrap();
        assert_eq!(
            ledger
                .get_stock(&product, &store)
                .unwrap()
                .unwrap()
                .available(),
            5
        );
    }

    #[test]
    fn test_decrement_respects_holds() {
        let (ledger, _, product, store) = setup(3);
        ledger
            .reserve(&product, &store, 2, Duration::from_secs(60))
            .unwrap();
        let v = ledger.get_stock(&product, &store).unwrap().unwrap().version;
        assert_eq!(
            ledger.try_decrement(&product, &store, 2, v).unwrap(),
            DecrementOutcome::InsufficientStock { available: 1 }
        );
    }

    #[test]
    fn test_list_stock_sorted() {
        let (ledger, _, _, store) = setup(1);
        ledger
            .set_stock(&ProductId::new("apples"), &store, 9, Some(3.0))
            .unwrap();
        let rows = ledger.list_stock(&store).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_id.as_str(), "apples");
        assert!(ledger.list_stock(&StoreId::new("other")).unwrap().is_empty());
    }
}

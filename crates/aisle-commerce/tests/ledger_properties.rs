//! Concurrent decrement schedules against every ledger backend.

use aisle_commerce::inventory::{DecrementOutcome, InMemoryLedger, InventoryLedger, ManualClock};
use aisle_commerce::{ProductId, StoreId};
use proptest::prelude::*;
use proptest::test_runner::Config;
use std::sync::Arc;

/// Each worker loops on read + conditional decrement until its amount is
/// either applied or refused for lack of stock. Returns the applied total.
fn run_schedule(ledger: Arc<dyn InventoryLedger>, schedule: &[Vec<i64>]) -> i64 {
    let product = ProductId::new("p");
    let store = StoreId::new("S1");
    std::thread::scope(|s| {
        let handles: Vec<_> = schedule
            .iter()
            .map(|amounts| {
                let ledger = ledger.clone();
                let product = product.clone();
                let store = store.clone();
                s.spawn(move || {
                    let mut applied = 0;
                    for amount in amounts {
                        loop {
                            let record = ledger.get_stock(&product, &store).unwrap().unwrap();
                            match ledger
                                .try_decrement(&product, &store, *amount, record.version)
                                .unwrap()
                            {
                                DecrementOutcome::Applied { remaining, .. } => {
                                    assert!(remaining >= 0);
                                    applied += amount;
                                    break;
                                }
                                DecrementOutcome::InsufficientStock { available } => {
                                    assert!(available < *amount);
                                    break;
                                }
                                DecrementOutcome::VersionConflict { .. } => continue,
                            }
                        }
                    }
                    applied
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    })
}

fn schedules() -> impl Strategy<Value = (i64, Vec<Vec<i64>>)> {
    (
        0_i64..40,
        prop::collection::vec(prop::collection::vec(1_i64..6, 1..8), 2..5),
    )
}

proptest! {
    #![proptest_config(Config::with_cases(48))]

    #[test]
    fn in_memory_never_oversells((initial, schedule) in schedules()) {
        let ledger = Arc::new(InMemoryLedger::new(Arc::new(ManualClock::new(0))));
        ledger.set_stock(&ProductId::new("p"), &StoreId::new("S1"), initial, None).unwrap();

        let applied = run_schedule(ledger.clone(), &schedule);
        let record = ledger.get_stock(&ProductId::new("p"), &StoreId::new("S1")).unwrap().unwrap();

        prop_assert!(record.quantity >= 0);
        prop_assert!(applied <= initial);
        prop_assert_eq!(record.quantity, initial - applied);
    }

    #[cfg(feature = "storage")]
    #[test]
    fn sqlite_never_oversells((initial, schedule) in schedules()) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(aisle_db::Db::open(dir.path().join("ledger.db")).unwrap());
        let ledger = Arc::new(
            aisle_commerce::inventory::SqliteLedger::new(db, Arc::new(ManualClock::new(0))).unwrap(),
        );
        ledger.set_stock(&ProductId::new("p"), &StoreId::new("S1"), initial, None).unwrap();

        let applied = run_schedule(ledger.clone(), &schedule);
        let record = ledger.get_stock(&ProductId::new("p"), &StoreId::new("S1")).unwrap().unwrap();

        prop_assert!(record.quantity >= 0);
        prop_assert!(applied <= initial);
        prop_assert_eq!(record.quantity, initial - applied);
    }
}

//! Shared store fixture for the integration tests.

#![allow(dead_code)]

use aisle_commerce::checkout::{BeginOutcome, LineFailure, OrderLine};
use aisle_commerce::prelude::*;
use std::future::Future;

pub const STORE: &str = "S1";

/// A small grocery store.
///
/// ```text
/// entry --4-- a1 (bakery) --6-- a2 (dairy) --6-- a3 (pantry) --5-- tills
///   |                                                  |
///   2                                                  7
///   |                                                  |
/// service                                         a4 (produce)
/// ```
pub fn store_config() -> StoreConfig {
    serde_json::from_value(serde_json::json!({
        "store_id": STORE,
        "currency": "USD",
        "entry_node": "entry",
        "fallback_node": "service",
        "checkout_node": "tills",
        "products": [
            { "id": "bread",  "name": "Sourdough Bread", "price": 4.50, "category": "bakery", "aisle": "a1" },
            { "id": "milk",   "name": "Whole Milk",      "price": 2.99, "category": "dairy",  "aisle": "a2" },
            { "id": "oat",    "name": "Oat Milk",        "price": 3.49, "category": "dairy",  "aisle": "a2" },
            { "id": "butter", "name": "Butter",          "price": 3.00, "category": "dairy",  "aisle": "a2" },
            { "id": "coffee", "name": "Coffee Beans",    "price": 9.99, "category": "pantry", "aisle": "a3" },
            { "id": "pasta",  "name": "Penne",           "price": 1.50, "category": "pantry", "aisle": "a3" },
            { "id": "apples", "name": "Apples",          "price": 0.80, "category": "produce","aisle": "a4" },
            { "id": "candles","name": "Candles",         "price": 5.00, "category": "home" }
        ],
        "aisles": [
            { "id": "entry",   "label": "Entrance",     "section": "front" },
            { "id": "service", "label": "Service Desk", "section": "front" },
            { "id": "a1",      "label": "Aisle 1",      "section": "bakery" },
            { "id": "a2",      "label": "Aisle 2",      "section": "dairy" },
            { "id": "a3",      "label": "Aisle 3",      "section": "pantry" },
            { "id": "a4",      "label": "Aisle 4",      "section": "produce" },
            { "id": "tills",   "label": "Checkout",     "section": "front" }
        ],
        "edges": [
            { "from": "entry", "to": "service", "distance": 2.0 },
            { "from": "entry", "to": "a1",      "distance": 4.0 },
            { "from": "a1",    "to": "a2",      "distance": 6.0 },
            { "from": "a2",    "to": "a3",      "distance": 6.0 },
            { "from": "a3",    "to": "a4",      "distance": 7.0 },
            { "from": "a3",    "to": "tills",   "distance": 5.0 }
        ],
        "deals": [
            {
                "id": "dairy-10",
                "name": "Dairy week",
                "predicate": { "type": "category", "category": "dairy" },
                "discount": { "type": "percentage", "percent": 10 },
                "stacking_class": "weekly"
            },
            {
                "id": "pasta-3",
                "name": "Pasta night",
                "predicate": { "type": "basket_category_count", "category": "pantry", "min_quantity": 3 },
                "discount": { "type": "fixed_amount", "amount": 0.25 },
                "stacking_class": "basket"
            }
        ],
        "substitutions": [
            { "product_id": "milk", "substitute_id": "oat", "similarity": 0.7, "tag": "milk" }
        ],
        "purchase_history": [
            { "invoice_id": "i1", "product_id": "bread" },
            { "invoice_id": "i1", "product_id": "butter" },
            { "invoice_id": "i2", "product_id": "bread" },
            { "invoice_id": "i2", "product_id": "butter" },
            { "invoice_id": "i3", "product_id": "pasta" },
            { "invoice_id": "i3", "product_id": "coffee" }
        ]
    }))
    .expect("fixture config")
}

pub struct Harness {
    pub coordinator: Arc<CheckoutCoordinator>,
    pub ledger: Arc<InMemoryLedger>,
    pub orders: Arc<InMemoryOrderStore>,
    pub clock: Arc<ManualClock>,
}

/// In-memory store with `stock` loaded.
pub fn harness(stock: &[(&str, i64)]) -> Harness {
    let config = store_config();
    let context = Arc::new(config.build_context().expect("context"));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
    for (product, quantity) in stock {
        ledger
            .set_stock(&ProductId::new(*product), &StoreId::new(STORE), *quantity, None)
            .expect("seed stock");
    }
    let orders = Arc::new(InMemoryOrderStore::new());
    let settings = config.checkout.settings().expect("settings");
    let coordinator = CheckoutCoordinator::new(context, ledger.clone(), orders.clone(), clock.clone())
        .with_settings(settings);
    Harness {
        coordinator: Arc::new(coordinator),
        ledger,
        orders,
        clock,
    }
}

pub fn quantity(ledger: &dyn InventoryLedger, product: &str) -> i64 {
    ledger
        .get_stock(&ProductId::new(product), &StoreId::new(STORE))
        .expect("read stock")
        .map(|r| r.quantity)
        .unwrap_or(0)
}

/// Run a future to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Coordinator over caller-supplied backends, priced with the fixture store.
pub fn coordinator_with(
    ledger: Arc<dyn InventoryLedger>,
    orders: Arc<dyn OrderStore>,
    clock: Arc<ManualClock>,
) -> CheckoutCoordinator {
    let config = store_config();
    let context = Arc::new(config.build_context().expect("context"));
    let settings = config.checkout.settings().expect("settings");
    CheckoutCoordinator::new(context, ledger, orders, clock).with_settings(settings)
}

/// Ledger that errors on chosen products and otherwise delegates.
pub struct FaultyLedger {
    pub inner: Arc<InMemoryLedger>,
    /// `try_decrement` on this product returns a storage error.
    pub broken_decrement: Option<ProductId>,
    /// `increment` on this product returns a storage error.
    pub broken_increment: Option<ProductId>,
}

impl FaultyLedger {
    fn check(broken: &Option<ProductId>, product_id: &ProductId) -> Result<(), FulfillmentError> {
        match broken {
            Some(id) if id == product_id => Err(FulfillmentError::Storage("ledger offline".into())),
            _ => Ok(()),
        }
    }
}

impl InventoryLedger for FaultyLedger {
    fn get_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
    ) -> Result<Option<StockRecord>, FulfillmentError> {
        self.inner.get_stock(product_id, store_id)
    }

    fn list_stock(&self, store_id: &StoreId) -> Result<Vec<StockRecord>, FulfillmentError> {
        self.inner.list_stock(store_id)
    }

    fn try_decrement(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        expected_version: u64,
    ) -> Result<DecrementOutcome, FulfillmentError> {
        Self::check(&self.broken_decrement, product_id)?;
        self.inner
            .try_decrement(product_id, store_id, amount, expected_version)
    }

    fn increment(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
    ) -> Result<StockRecord, FulfillmentError> {
        Self::check(&self.broken_increment, product_id)?;
        self.inner.increment(product_id, store_id, amount)
    }

    fn set_stock(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        quantity: i64,
        daily_sales_rate: Option<f64>,
    ) -> Result<StockRecord, FulfillmentError> {
        self.inner
            .set_stock(product_id, store_id, quantity, daily_sales_rate)
    }

    fn reserve(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        amount: i64,
        ttl: std::time::Duration,
    ) -> Result<ReservationToken, FulfillmentError> {
        self.inner.reserve(product_id, store_id, amount, ttl)
    }

    fn confirm_reservation(
        &self,
        token: &ReservationToken,
    ) -> Result<StockRecord, FulfillmentError> {
        self.inner.confirm_reservation(token)
    }

    fn release_reservation(&self, token: &ReservationToken) -> Result<(), FulfillmentError> {
        self.inner.release_reservation(token)
    }
}

/// Order store whose terminal writes can be made to fail.
pub struct FaultyOrders {
    pub inner: Arc<InMemoryOrderStore>,
    pub fail_commit: bool,
    pub fail_failed: bool,
}

impl OrderStore for FaultyOrders {
    fn begin(&self, order: &Order) -> Result<BeginOutcome, FulfillmentError> {
        self.inner.begin(order)
    }

    fn mark_committed(&self, id: &OrderId, lines: &[OrderLine]) -> Result<Order, FulfillmentError> {
        if self.fail_commit {
            return Err(FulfillmentError::Storage("disk full".into()));
        }
        self.inner.mark_committed(id, lines)
    }

    fn mark_failed(
        &self,
        id: &OrderId,
        failures: &[LineFailure],
    ) -> Result<Order, FulfillmentError> {
        if self.fail_failed {
            return Err(FulfillmentError::Storage("disk full".into()));
        }
        self.inner.mark_failed(id, failures)
    }

    fn get(&self, id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        self.inner.get(id)
    }
}

//! Order persistence.

use super::order::{LineFailure, Order, OrderLine, OrderStatus};
use crate::error::FulfillmentError;
use crate::ids::OrderId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Result of [`OrderStore::begin`].
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// The pending order was written.
    Created,
    /// An order with this id already exists; nothing was written.
    Existing(Order),
}

/// Where orders live. The id is the idempotency key.
pub trait OrderStore: Send + Sync {
    /// Insert `order` (status `pending`) unless its id is already taken.
    fn begin(&self, order: &Order) -> Result<BeginOutcome, FulfillmentError>;

    /// Write the lines and flip a pending order to `committed`.
    fn mark_committed(&self, id: &OrderId, lines: &[OrderLine]) -> Result<Order, FulfillmentError>;

    /// Record the failing lines and flip a pending order to `failed`.
    fn mark_failed(
        &self,
        id: &OrderId,
        failures: &[LineFailure],
    ) -> Result<Order, FulfillmentError>;

    fn get(&self, id: &OrderId) -> Result<Option<Order>, FulfillmentError>;
}

pub(crate) fn require_pending(order: &Order, to: OrderStatus) -> Result<(), FulfillmentError> {
    if order.status != OrderStatus::Pending {
        return Err(FulfillmentError::InvalidTransition {
            from: order.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// Order store backed by process memory.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn begin(&self, order: &Order) -> Result<BeginOutcome, FulfillmentError> {
        let mut orders = self.orders.lock();
        if let Some(existing) = orders.get(&order.id) {
            return Ok(BeginOutcome::Existing(existing.clone()));
        }
        orders.insert(order.id.clone(), order.clone());
        Ok(BeginOutcome::Created)
    }

    fn mark_committed(&self, id: &OrderId, lines: &[OrderLine]) -> Result<Order, FulfillmentError> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| FulfillmentError::OrderNotFound(id.clone()))?;
        require_pending(order, OrderStatus::Committed)?;
        order.lines = lines.to_vec();
        order.status = OrderStatus::Committed;
        Ok(order.clone())
    }

    fn mark_failed(
        &self,
        id: &OrderId,
        failures: &[LineFailure],
    ) -> Result<Order, FulfillmentError> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| FulfillmentError::OrderNotFound(id.clone()))?;
        require_pending(order, OrderStatus::Failed)?;
        order.failures = failures.to_vec();
        order.status = OrderStatus::Failed;
        Ok(order.clone())
    }

    fn get(&self, id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        Ok(self.orders.lock().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::order::FailureReason;
    use crate::ids::{ProductId, StoreId, UserId};
    use crate::money::{Currency, Money};

    fn pending(id: &str) -> Order {
        Order::pending(
            OrderId::new(id),
            UserId::new("u"),
            StoreId::new("S1"),
            Money::new(500, Currency::USD),
            0,
        )
    }

    #[test]
    fn test_begin_is_idempotent() {
        let store = InMemoryOrderStore::new();
        assert_eq!(store.begin(&pending("o1")).unwrap(), BeginOutcome::Created);
        assert!(matches!(
            store.begin(&pending("o1")).unwrap(),
            BeginOutcome::Existing(_)
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_commit_then_fail_rejected() {
        let store = InMemoryOrderStore::new();
        store.begin(&pending("o1")).unwrap();
        let lines = vec![OrderLine {
            product_id: ProductId::new("milk"),
            quantity: 1,
            final_unit_price: Money::new(500, Currency::USD),
        }];
        let order = store.mark_committed(&OrderId::new("o1"), &lines).unwrap();
        assert_eq!(order.status, OrderStatus::Committed);
        assert_eq!(order.lines, lines);

        let failure = LineFailure {
            product_id: ProductId::new("milk"),
            requested: 1,
            reason: FailureReason::InsufficientStock { available: 0 },
        };
        assert!(matches!(
            store.mark_failed(&OrderId::new("o1"), &[failure]),
            Err(FulfillmentError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_unknown_order() {
        let store = InMemoryOrderStore::new();
        assert!(store.get(&OrderId::new("nope")).unwrap().is_none());
        assert!(matches!(
            store.mark_committed(&OrderId::new("nope"), &[]),
            Err(FulfillmentError::OrderNotFound(_))
        ));
    }
}

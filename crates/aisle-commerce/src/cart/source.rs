//! Where deal rules come from.

use super::deal::{DealBook, DealRule};
use crate::error::FulfillmentError;
use crate::ids::StoreId;
use async_trait::async_trait;
use std::sync::Arc;

/// Supplier of the deals currently on offer at a store.
///
/// Implementations may call out to a remote service; callers wrap them in a
/// timeout and treat expiry as `Unavailable`.
#[async_trait]
pub trait DealSource: Send + Sync {
    /// Every rule that may apply at `store_id`, valid or not.
    async fn deals(&self, store_id: &StoreId) -> Result<Vec<DealRule>, FulfillmentError>;
}

/// Deals from the configured deal book.
#[derive(Debug, Clone)]
pub struct StaticDeals {
    book: Arc<DealBook>,
}

impl StaticDeals {
    pub fn new(book: Arc<DealBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl DealSource for StaticDeals {
    async fn deals(&self, _store_id: &StoreId) -> Result<Vec<DealRule>, FulfillmentError> {
        Ok(self.book.rules().to_vec())
    }
}

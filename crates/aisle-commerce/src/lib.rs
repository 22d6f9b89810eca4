//! Checkout-time fulfillment for a grocery storefront.
//!
//! Given a cart, this crate:
//!
//! - **Substitution**: swaps short lines for declared in-stock substitutes
//! - **Pricing**: applies deal rules under a stacking policy, in integer minor units
//! - **Routing**: orders the aisles to visit into a short, reproducible walk
//! - **Checkout**: commits the order against a shared inventory ledger with
//!   saga-style compensation, idempotent per order id
//!
//! # Example
//!
//! ```rust,ignore
//! use aisle_commerce::prelude::*;
//!
//! let context = Arc::new(store_config.build_context()?);
//! let coordinator = CheckoutCoordinator::new(context, ledger, orders, Arc::new(SystemClock));
//!
//! let mut session = coordinator
//!     .enrich_cart(UserId::new("u-1"), &[CartLine::new("milk", 2)])
//!     .await?;
//! coordinator.plan(&mut session)?;
//! let receipt = coordinator.commit(&mut session)?;
//! println!("{} {}", receipt.order_id, receipt.total_amount.display());
//! ```

pub mod error;
pub mod ids;
pub mod money;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod inventory;
pub mod recommend;
pub mod store;
pub mod substitution;

pub use error::FulfillmentError;
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::FulfillmentError;
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    // Catalog and stock
    pub use crate::catalog::{Catalog, Product, StockRecord, StockStatus, StockThresholds};
    pub use crate::inventory::{
        Clock, DecrementOutcome, InMemoryLedger, InventoryLedger, ManualClock, ReservationToken,
        StockLine, SystemClock,
    };

    // Cart and pricing
    pub use crate::cart::{
        CartLine, DealBook, DealPredicate, DealRule, DealSource, DiscountEngine, DiscountKind,
        EnrichedLine, PricingResult, ProcessedLine,
    };
    pub use crate::substitution::{Resolution, SubstitutionResolver, SubstitutionTable};

    // Store layout
    pub use crate::store::{AisleEdge, AisleNode, RouteOptimizer, RoutePlan, StoreGraph};
    pub use crate::recommend::{PurchaseHistory, Recommendation, Recommender};

    // Checkout
    pub use crate::checkout::{
        CheckoutCoordinator, CheckoutSession, CheckoutSettings, CheckoutState, CommitReceipt,
        InMemoryOrderStore, Order, OrderStatus, OrderStore, StoreContext,
    };
    pub use crate::config::StoreConfig;

    pub use std::sync::Arc;
}

//! Store configuration.
//!
//! A [`StoreConfig`] describes one store in full: products and their aisles,
//! the walkway graph, deals, substitutions, opening stock, purchase history
//! and checkout tunables. It is deserialized once at start-up and turned into
//! the immutable values a [`CheckoutCoordinator`](crate::checkout::CheckoutCoordinator)
//! shares by reference.

use crate::cart::{DealBook, DealPredicate, DealRule, DiscountKind};
use crate::catalog::{Catalog, Product, StockThresholds};
use crate::checkout::{CheckoutSettings, StoreContext};
use crate::error::FulfillmentError;
use crate::ids::{AisleId, DealId, ProductId, StoreId};
use crate::inventory::InventoryLedger;
use crate::money::{Currency, Money};
use crate::recommend::{PurchaseHistory, PurchaseRecord, DEFAULT_MIN_SUPPORT};
use crate::store::{AisleEdge, AisleNode, RouteOptions, StoreGraph};
use crate::substitution::{SubstituteCandidate, SubstitutionTable};
use aisle_data::{RetryPolicy, TimeoutConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything known about one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub store_id: StoreId,

    #[serde(default)]
    pub currency: Currency,

    /// Where every route starts.
    pub entry_node: AisleId,

    /// Where products without a known aisle are picked up.
    pub fallback_node: AisleId,

    /// Where every route ends, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_node: Option<AisleId>,

    #[serde(default)]
    pub checkout: CheckoutTunables,

    #[serde(default)]
    pub products: Vec<ProductConfig>,

    #[serde(default)]
    pub aisles: Vec<AisleNode>,

    #[serde(default)]
    pub edges: Vec<AisleEdge>,

    #[serde(default)]
    pub deals: Vec<DealConfig>,

    #[serde(default)]
    pub substitutions: Vec<SubstitutionConfig>,

    /// Opening stock, loaded into an empty ledger.
    #[serde(default)]
    pub stock: Vec<StockConfig>,

    #[serde(default)]
    pub purchase_history: Vec<PurchaseRecord>,
}

/// A product entry. Prices are decimal in the store currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aisle: Option<AisleId>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A deal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealConfig {
    pub id: DealId,
    pub name: String,
    pub predicate: DealPredicate,
    pub discount: DiscountConfig,
    #[serde(default = "default_stacking_class")]
    pub stacking_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

fn default_stacking_class() -> String {
    "default".to_string()
}

/// Discount as written in configuration. The unit is always explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountConfig {
    /// `percent = 15` means 15% off.
    Percentage { percent: f64 },
    /// `amount = 1.50` means 1.50 off each unit.
    FixedAmount { amount: f64 },
}

/// One declared substitute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionConfig {
    pub product_id: ProductId,
    pub substitute_id: ProductId,
    pub similarity: f64,
    #[serde(default)]
    pub tag: String,
}

/// Opening stock for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockConfig {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_sales_rate: Option<f64>,
}

/// `[checkout]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutTunables {
    pub max_version_retries: u32,
    pub reservation_ttl_secs: u64,
    pub deal_timeout_ms: u64,
    pub walking_speed_mps: f64,
    pub two_opt_iteration_cap: usize,
    pub low_stock_threshold: i64,
    pub days_supply_threshold: f64,
    pub min_support: u32,
}

impl Default for CheckoutTunables {
    fn default() -> Self {
        let route = RouteOptions::default();
        let thresholds = StockThresholds::default();
        Self {
            max_version_retries: 3,
            reservation_ttl_secs: 15 * 60,
            deal_timeout_ms: 300,
            walking_speed_mps: route.walking_speed_mps,
            two_opt_iteration_cap: route.two_opt_iteration_cap,
            low_stock_threshold: thresholds.low_stock_quantity,
            days_supply_threshold: thresholds.days_supply,
            min_support: DEFAULT_MIN_SUPPORT,
        }
    }
}

impl CheckoutTunables {
    /// Coordinator settings for these tunables.
    pub fn settings(&self) -> Result<CheckoutSettings, FulfillmentError> {
        if !(self.walking_speed_mps.is_finite() && self.walking_speed_mps > 0.0) {
            return Err(FulfillmentError::Config(format!(
                "walking_speed_mps must be positive, got {}",
                self.walking_speed_mps
            )));
        }
        if self.deal_timeout_ms == 0 {
            return Err(FulfillmentError::Config(
                "deal_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(CheckoutSettings {
            retry: RetryPolicy::new(self.max_version_retries),
            deal_timeout: TimeoutConfig::from_total(Duration::from_millis(self.deal_timeout_ms)),
            thresholds: StockThresholds {
                low_stock_quantity: self.low_stock_threshold,
                days_supply: self.days_supply_threshold,
            },
            route: RouteOptions {
                walking_speed_mps: self.walking_speed_mps,
                two_opt_iteration_cap: self.two_opt_iteration_cap,
            },
            reservation_ttl: Duration::from_secs(self.reservation_ttl_secs),
        })
    }
}

impl StoreConfig {
    /// Validate and build the shared store values.
    pub fn build_context(&self) -> Result<StoreContext, FulfillmentError> {
        let products = self.products.iter().map(|p| {
            let mut product = Product::new(
                p.id.clone(),
                p.name.clone(),
                Money::from_decimal(p.price, self.currency),
                p.category.clone(),
            );
            product.brand = p.brand.clone();
            product.attributes = p.attributes.clone();
            product
        });
        let locations = self
            .products
            .iter()
            .filter_map(|p| Some((p.id.clone(), p.aisle.clone()?)));
        let catalog = Catalog::new(self.currency, products)?.with_locations(locations)?;

        let graph = StoreGraph::new(
            self.aisles.clone(),
            self.edges.clone(),
            self.entry_node.clone(),
            self.fallback_node.clone(),
            self.checkout_node.clone(),
        )?;
        for (product_id, aisle) in self
            .products
            .iter()
            .filter_map(|p| Some((&p.id, p.aisle.as_ref()?)))
        {
            if !graph.contains(aisle) {
                tracing::warn!(
                    product_id = %product_id,
                    aisle = %aisle,
                    "product located in an aisle missing from the store graph"
                );
            }
        }

        let deals = self
            .deals
            .iter()
            .map(|d| d.to_rule(self.currency))
            .collect::<Result<Vec<_>, _>>()?;

        let substitutions = SubstitutionTable::new(
            &catalog,
            self.substitutions.iter().map(|s| {
                (
                    s.product_id.clone(),
                    SubstituteCandidate {
                        product_id: s.substitute_id.clone(),
                        similarity: s.similarity,
                        tag: s.tag.clone(),
                    },
                )
            }),
        )?;

        let history =
            PurchaseHistory::from_records(&self.purchase_history, self.checkout.min_support);

        tracing::info!(
            store_id = %self.store_id,
            products = catalog.len(),
            aisles = graph.len(),
            deals = deals.len(),
            "store configuration loaded"
        );

        Ok(StoreContext {
            store_id: self.store_id.clone(),
            catalog: Arc::new(catalog),
            graph: Arc::new(graph),
            deals: Arc::new(DealBook::new(deals)),
            substitutions: Arc::new(substitutions),
            history: Arc::new(history),
        })
    }

    /// Write opening stock into `ledger`. Returns the number of rows written.
    pub fn seed_ledger(
        &self,
        catalog: &Catalog,
        ledger: &dyn InventoryLedger,
    ) -> Result<usize, FulfillmentError> {
        for row in &self.stock {
            catalog.require(&row.product_id)?;
            if row.quantity < 0 {
                return Err(FulfillmentError::InvalidQuantity(row.quantity));
            }
            ledger.set_stock(
                &row.product_id,
                &self.store_id,
                row.quantity,
                row.daily_sales_rate,
            )?;
        }
        Ok(self.stock.len())
    }
}

impl DealConfig {
    fn to_rule(&self, currency: Currency) -> Result<DealRule, FulfillmentError> {
        let kind = match self.discount {
            DiscountConfig::Percentage { percent } => {
                if !percent.is_finite() || percent < 0.0 {
                    return Err(FulfillmentError::Config(format!(
                        "deal {}: percentage {} is not a valid discount",
                        self.id, percent
                    )));
                }
                DiscountKind::Percentage {
                    basis_points: (percent * 100.0).round() as u32,
                }
            }
            DiscountConfig::FixedAmount { amount } => DiscountKind::FixedAmount {
                amount: Money::from_decimal(amount, currency),
            },
        };
        Ok(DealRule::new(
            self.id.clone(),
            self.name.clone(),
            self.predicate.clone(),
            kind,
            self.stacking_class.clone(),
        )
        .valid_between(
            self.valid_from.map(|t| t.timestamp_millis()),
            self.valid_until.map(|t| t.timestamp_millis()),
        ))
    }
}

//! Product types and the immutable catalog snapshot.

use crate::error::FulfillmentError;
use crate::ids::{AisleId, ProductId};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A product as seen by the checkout pipeline.
///
/// Immutable for the duration of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Shelf price per unit.
    pub price: Money,
    /// Category used by deal predicates.
    pub category: String,
    /// Brand, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Opaque key/value attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Product {
    /// Create a product with no attributes.
    pub fn new(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            category: category.into(),
            brand: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Set the brand.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Read-only product catalog for one store.
///
/// Built once at start-up and shared by reference.
#[derive(Debug, Clone)]
pub struct Catalog {
    currency: Currency,
    products: BTreeMap<ProductId, Product>,
    locations: HashMap<ProductId, AisleId>,
}

impl Catalog {
    /// Build a catalog. Every price must be in `currency` and ids unique.
    pub fn new(
        currency: Currency,
        products: impl IntoIterator<Item = Product>,
    ) -> Result<Self, FulfillmentError> {
        let mut map = BTreeMap::new();
        for product in products {
            if product.price.currency != currency {
                return Err(FulfillmentError::CurrencyMismatch {
                    expected: currency.code().to_string(),
                    got: product.price.currency.code().to_string(),
                });
            }
            if product.price.is_negative() {
                return Err(FulfillmentError::Config(format!(
                    "product {} has a negative price",
                    product.id
                )));
            }
            if let Some(previous) = map.insert(product.id.clone(), product) {
                return Err(FulfillmentError::Config(format!(
                    "duplicate product id {}",
                    previous.id
                )));
            }
        }
        Ok(Self {
            currency,
            products: map,
            locations: HashMap::new(),
        })
    }

    /// Attach aisle locations. Unknown products are rejected.
    pub fn with_locations(
        mut self,
        locations: impl IntoIterator<Item = (ProductId, AisleId)>,
    ) -> Result<Self, FulfillmentError> {
        for (product_id, aisle) in locations {
            if !self.products.contains_key(&product_id) {
                return Err(FulfillmentError::ProductNotFound(product_id));
            }
            self.locations.insert(product_id, aisle);
        }
        Ok(self)
    }

    /// The store currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Look up a product.
    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    /// Look up a product, failing with `ProductNotFound`.
    pub fn require(&self, id: &ProductId) -> Result<&Product, FulfillmentError> {
        self.get(id)
            .ok_or_else(|| FulfillmentError::ProductNotFound(id.clone()))
    }

    /// Aisle where the product is shelved, if mapped.
    pub fn location(&self, id: &ProductId) -> Option<&AisleId> {
        self.locations.get(id)
    }

    /// Iterate over products in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

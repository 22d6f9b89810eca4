//! Out-of-stock substitution.
//!
//! Substitutes come from pre-declared product-to-product associations. The
//! resolver only reads the ledger; a proposed substitute is advisory until
//! the shopper confirms it on the checkout session.

use crate::catalog::{Catalog, Product};
use crate::error::FulfillmentError;
use crate::ids::{ProductId, StoreId};
use crate::inventory::InventoryLedger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A declared substitute for some product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstituteCandidate {
    pub product_id: ProductId,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
    /// Category/type tag shown to the shopper, e.g. "plant-based milk".
    pub tag: String,
}

/// Immutable substitution associations, keyed by the original product.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    by_product: BTreeMap<ProductId, Vec<SubstituteCandidate>>,
}

impl SubstitutionTable {
    /// Build the table, validating scores and catalog membership.
    pub fn new(
        catalog: &Catalog,
        entries: impl IntoIterator<Item = (ProductId, SubstituteCandidate)>,
    ) -> Result<Self, FulfillmentError> {
        let mut by_product: BTreeMap<ProductId, Vec<SubstituteCandidate>> = BTreeMap::new();
        for (original, candidate) in entries {
            catalog.require(&original)?;
            catalog.require(&candidate.product_id)?;
            if original == candidate.product_id {
                return Err(FulfillmentError::Config(format!(
                    "product {} cannot substitute itself",
                    original
                )));
            }
            if !(0.0..=1.0).contains(&candidate.similarity) {
                return Err(FulfillmentError::Config(format!(
                    "similarity {} for {} -> {} is outside [0, 1]",
                    candidate.similarity, original, candidate.product_id
                )));
            }
            by_product.entry(original).or_default().push(candidate);
        }
        Ok(Self { by_product })
    }

    /// Declared substitutes for a product, in declaration order.
    pub fn candidates(&self, product_id: &ProductId) -> &[SubstituteCandidate] {
        self.by_product
            .get(product_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Outcome of [`SubstitutionResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum Resolution {
    /// The requested product covers the quantity.
    Original {
        product_id: ProductId,
        available: i64,
    },
    /// A substitute covers the full quantity instead.
    Substitute {
        original: ProductId,
        substitute: ProductId,
        similarity: f64,
        reason: String,
        available: i64,
    },
}

impl Resolution {
    /// The product that would be committed.
    pub fn product_id(&self) -> &ProductId {
        match self {
            Resolution::Original { product_id, .. } => product_id,
            Resolution::Substitute { substitute, .. } => substitute,
        }
    }

    pub fn is_substitute(&self) -> bool {
        matches!(self, Resolution::Substitute { .. })
    }
}

/// Resolves out-of-stock lines to in-stock substitutes.
pub struct SubstitutionResolver {
    catalog: Arc<Catalog>,
    table: Arc<SubstitutionTable>,
    ledger: Arc<dyn InventoryLedger>,
}

impl SubstitutionResolver {
    pub fn new(
        catalog: Arc<Catalog>,
        table: Arc<SubstitutionTable>,
        ledger: Arc<dyn InventoryLedger>,
    ) -> Self {
        Self {
            catalog,
            table,
            ledger,
        }
    }

    fn available(&self, product_id: &ProductId, store_id: &StoreId) -> Result<i64, FulfillmentError> {
        Ok(self
            .ledger
            .get_stock(product_id, store_id)?
            .map(|record| record.available())
            .unwrap_or(0))
    }

    /// Keep the requested product if it covers `requested`, otherwise pick
    /// the best declared substitute that does.
    ///
    /// Candidates are ranked by descending similarity, then by ascending
    /// absolute price difference, then by product id.
    pub fn resolve(
        &self,
        product_id: &ProductId,
        store_id: &StoreId,
        requested: i64,
    ) -> Result<Resolution, FulfillmentError> {
        if requested <= 0 {
            return Err(FulfillmentError::InvalidQuantity(requested));
        }
        let original = self.catalog.require(product_id)?;
        let available = self.available(product_id, store_id)?;
        if available >= requested {
            return Ok(Resolution::Original {
                product_id: product_id.clone(),
                available,
            });
        }

        let mut ranked: Vec<(&SubstituteCandidate, &Product, i64, i64)> = Vec::new();
        for candidate in self.table.candidates(product_id) {
            let Some(product) = self.catalog.get(&candidate.product_id) else {
                continue;
            };
            let stock = self.available(&candidate.product_id, store_id)?;
            if stock < requested {
                continue;
            }
            let delta = (product.price.minor - original.price.minor).abs();
            ranked.push((candidate, product, delta, stock));
        }
        ranked.sort_by(|a, b| {
            b.0.similarity
                .total_cmp(&a.0.similarity)
                .then(a.2.cmp(&b.2))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let Some((candidate, product, _, stock)) = ranked.into_iter().next() else {
            tracing::warn!(
                product_id = %product_id,
                store_id = %store_id,
                requested,
                available,
                "no substitute covers the requested quantity"
            );
            return Err(FulfillmentError::NoSubstituteAvailable {
                product_id: product_id.clone(),
                requested,
            });
        };

        let reason = format!(
            "{} has only {} available; {} is a {:.0}% match ({}).",
            original.name,
            available,
            product.name,
            candidate.similarity * 100.0,
            candidate.tag
        );
        tracing::debug!(
            original = %product_id,
            substitute = %product.id,
            similarity = candidate.similarity,
            "proposing substitute"
        );
        Ok(Resolution::Substitute {
            original: product_id.clone(),
            substitute: product.id.clone(),
            similarity: candidate.similarity,
            reason,
            available: stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{InMemoryLedger, ManualClock};
    use crate::money::{Currency, Money};

    fn product(id: &str, cents: i64) -> Product {
        Product::new(id, id.to_uppercase(), Money::new(cents, Currency::USD), "dairy")
    }

    fn candidate(id: &str, similarity: f64) -> SubstituteCandidate {
        SubstituteCandidate {
            product_id: ProductId::new(id),
            similarity,
            tag: "milk".into(),
        }
    }

    fn resolver(stock: &[(&str, i64)]) -> SubstitutionResolver {
        let catalog = Arc::new(
            Catalog::new(
                Currency::USD,
                vec![
                    product("milk", 349),
                    product("oat", 429),
                    product("soy", 379),
                    product("almond", 329),
                ],
            )
            .unwrap(),
        );
        let table = SubstitutionTable::new(
            &catalog,
            vec![
                (ProductId::new("milk"), candidate("oat", 0.8)),
                (ProductId::new("milk"), candidate("soy", 0.8)),
                (ProductId::new("milk"), candidate("almond", 0.6)),
            ],
        )
        .unwrap();
        let ledger = InMemoryLedger::new(Arc::new(ManualClock::new(0)));
        let store = StoreId::new("S1");
        for (id, qty) in stock {
            ledger
                .set_stock(&ProductId::new(*id), &store, *qty, None)
                .unwrap();
        }
        SubstitutionResolver::new(catalog, Arc::new(table), Arc::new(ledger))
    }

    #[test]
    fn test_original_when_in_stock() {
        let r = resolver(&[("milk", 5)]);
        let res = r
            .resolve(&ProductId::new("milk"), &StoreId::new("S1"), 5)
            .unwrap();
        assert!(!res.is_substitute());
        assert_eq!(res.product_id().as_str(), "milk");
    }

    #[test]
    fn test_tie_on_similarity_breaks_by_price_delta() {
        let r = resolver(&[("milk", 2), ("oat", 10), ("soy", 10), ("almond", 10)]);
        let res = r
            .resolve(&ProductId::new("milk"), &StoreId::new("S1"), 5)
            .unwrap();
        // soy is 30c away, oat is 80c away
        assert_eq!(res.product_id().as_str(), "soy");
        match res {
            Resolution::Substitute { reason, .. } => assert!(reason.contains("MILK")),
            other => panic!("expected substitute, got {:?}", other),
        }
    }

    #[test]
    fn test_skips_candidates_without_enough_stock() {
        let r = resolver(&[("milk", 2), ("oat", 4), ("soy", 1), ("almond", 5)]);
        let res = r
            .resolve(&ProductId::new("milk"), &StoreId::new("S1"), 5)
            .unwrap();
        assert_eq!(res.product_id().as_str(), "almond");
    }

    #[test]
    fn test_no_substitute_available() {
        let r = resolver(&[("milk", 2)]);
        let err = r
            .resolve(&ProductId::new("milk"), &StoreId::new("S1"), 5)
            .unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::NoSubstituteAvailable {
                product_id: ProductId::new("milk"),
                requested: 5
            }
        );
    }

    #[test]
    fn test_table_rejects_bad_scores() {
        let catalog = Catalog::new(Currency::USD, vec![product("a", 1), product("b", 1)]).unwrap();
        assert!(SubstitutionTable::new(
            &catalog,
            vec![(ProductId::new("a"), candidate("b", 1.5))]
        )
        .is_err());
        assert!(SubstitutionTable::new(
            &catalog,
            vec![(ProductId::new("a"), candidate("a", 0.5))]
        )
        .is_err());
    }
}

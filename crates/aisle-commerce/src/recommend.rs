//! Frequently-bought-together recommendations.

use crate::catalog::Catalog;
use crate::ids::ProductId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const DEFAULT_MIN_SUPPORT: u32 = 2;
pub const DEFAULT_LIMIT: usize = 3;
const REASON: &str = "Frequently bought with items on your list.";

/// One product on a past invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub invoice_id: String,
    pub product_id: ProductId,
}

/// Co-occurrence counts mined from purchase history. Built once.
#[derive(Debug, Clone, Default)]
pub struct PurchaseHistory {
    pairs: BTreeMap<ProductId, BTreeMap<ProductId, u32>>,
    invoices: usize,
}

impl PurchaseHistory {
    /// Count how many invoices contain each ordered product pair, keeping
    /// pairs seen on at least `min_support` invoices.
    pub fn from_records(records: &[PurchaseRecord], min_support: u32) -> Self {
        let mut invoices: BTreeMap<&str, BTreeSet<&ProductId>> = BTreeMap::new();
        for record in records {
            invoices
                .entry(record.invoice_id.as_str())
                .or_default()
                .insert(&record.product_id);
        }

        let mut pairs: BTreeMap<ProductId, BTreeMap<ProductId, u32>> = BTreeMap::new();
        for items in invoices.values() {
            for a in items {
                for b in items {
                    if a != b {
                        *pairs
                            .entry((*a).clone())
                            .or_default()
                            .entry((*b).clone())
                            .or_insert(0) += 1;
                    }
                }
            }
        }
        for related in pairs.values_mut() {
            related.retain(|_, count| *count >= min_support);
        }
        pairs.retain(|_, related| !related.is_empty());

        tracing::debug!(
            products = pairs.len(),
            invoices = invoices.len(),
            "built frequently-bought-together pairs"
        );
        Self {
            pairs,
            invoices: invoices.len(),
        }
    }

    /// Products bought with `product_id` and how often.
    pub fn related(&self, product_id: &ProductId) -> impl Iterator<Item = (&ProductId, u32)> {
        self.pairs
            .get(product_id)
            .into_iter()
            .flat_map(|m| m.iter().map(|(id, count)| (id, *count)))
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices
    }
}

/// A suggested addition to the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub product_name: String,
    pub reason: String,
    pub score: u32,
}

/// Suggests products commonly bought with a list.
pub struct Recommender {
    catalog: Arc<Catalog>,
    history: Arc<PurchaseHistory>,
    limit: usize,
}

impl Recommender {
    pub fn new(catalog: Arc<Catalog>, history: Arc<PurchaseHistory>) -> Self {
        Self {
            catalog,
            history,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Top suggestions for `product_ids`, highest score first, ties by id.
    /// Products already on the list or unknown to the catalog are skipped.
    pub fn recommend(&self, product_ids: &[ProductId]) -> Vec<Recommendation> {
        let on_list: BTreeSet<&ProductId> = product_ids.iter().collect();
        let mut scores: BTreeMap<&ProductId, u32> = BTreeMap::new();
        for id in &on_list {
            for (related, count) in self.history.related(id) {
                *scores.entry(related).or_insert(0) += count;
            }
        }

        let mut ranked: Vec<(&ProductId, u32)> = scores
            .into_iter()
            .filter(|(id, _)| !on_list.contains(id))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let product = self.catalog.get(id)?;
                Some(Recommendation {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    reason: REASON.to_string(),
                    score,
                })
            })
            .take(self.limit)
            .collect()
    }
}

//! Deal rule definitions.

use crate::ids::{DealId, ProductId};
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// What a deal applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealPredicate {
    /// A single product.
    Product { product_id: ProductId },
    /// Every product in a category.
    Category { category: String },
    /// Products in `category`, once the whole basket holds at least
    /// `min_quantity` units of that category.
    BasketCategoryCount { category: String, min_quantity: i64 },
}

impl DealPredicate {
    /// Basket-level predicates are evaluated after per-line matching.
    pub fn is_basket_level(&self) -> bool {
        matches!(self, DealPredicate::BasketCategoryCount { .. })
    }
}

/// How much a deal takes off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percentage in basis points (1500 = 15%).
    Percentage { basis_points: u32 },
    /// Fixed amount off each unit.
    FixedAmount { amount: Money },
}

impl DiscountKind {
    /// Discount this kind yields on `price` alone, capped at the price.
    pub fn discount_on(&self, price: Money) -> Money {
        let raw = match self {
            DiscountKind::Percentage { basis_points } => price.basis_points(*basis_points),
            DiscountKind::FixedAmount { amount } => Money::new(amount.minor, price.currency),
        };
        Money::new(raw.minor.clamp(0, price.minor.max(0)), price.currency)
    }

    pub fn is_percentage(&self) -> bool {
        matches!(self, DiscountKind::Percentage { .. })
    }

    fn describe(&self) -> String {
        match self {
            DiscountKind::Percentage { basis_points } => {
                let whole = basis_points / 100;
                let frac = basis_points % 100;
                if frac == 0 {
                    format!("{}% off", whole)
                } else {
                    format!("{}.{:02}% off", whole, frac)
                }
            }
            DiscountKind::FixedAmount { amount } => format!("{} off", amount.display()),
        }
    }
}

/// Why a rule cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RuleError {
    #[error("deal {0}: percentage above 100%")]
    PercentageOutOfRange(DealId),

    #[error("deal {0}: negative fixed amount")]
    NegativeAmount(DealId),

    #[error("deal {deal_id}: amount in {got}, store prices in {expected}")]
    CurrencyMismatch {
        deal_id: DealId,
        expected: Currency,
        got: Currency,
    },

    #[error("deal {0}: validity window ends before it starts")]
    EmptyWindow(DealId),

    #[error("deal {deal_id}: {message}")]
    InvalidPredicate { deal_id: DealId, message: String },
}

/// A discount rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRule {
    pub id: DealId,
    pub name: String,
    pub predicate: DealPredicate,
    pub kind: DiscountKind,
    /// Rules in the same class are mutually exclusive.
    pub stacking_class: String,
    /// Unix millis, inclusive.
    #[serde(default)]
    pub valid_from: Option<i64>,
    /// Unix millis, inclusive.
    #[serde(default)]
    pub valid_until: Option<i64>,
}

impl DealRule {
    pub fn new(
        id: impl Into<DealId>,
        name: impl Into<String>,
        predicate: DealPredicate,
        kind: DiscountKind,
        stacking_class: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            predicate,
            kind,
            stacking_class: stacking_class.into(),
            valid_from: None,
            valid_until: None,
        }
    }

    /// Restrict the validity window.
    pub fn valid_between(mut self, from: Option<i64>, until: Option<i64>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    /// Check that the rule can be evaluated against prices in `currency`.
    pub fn validate(&self, currency: Currency) -> Result<(), RuleError> {
        match &self.kind {
            DiscountKind::Percentage { basis_points } if *basis_points > 10_000 => {
                return Err(RuleError::PercentageOutOfRange(self.id.clone()));
            }
            DiscountKind::FixedAmount { amount } if amount.is_negative() => {
                return Err(RuleError::NegativeAmount(self.id.clone()));
            }
            DiscountKind::FixedAmount { amount } if amount.currency != currency => {
                return Err(RuleError::CurrencyMismatch {
                    deal_id: self.id.clone(),
                    expected: currency,
                    got: amount.currency,
                });
            }
            _ => {}
        }

        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if until < from {
                return Err(RuleError::EmptyWindow(self.id.clone()));
            }
        }

        let bad = |message: &str| RuleError::InvalidPredicate {
            deal_id: self.id.clone(),
            message: message.to_string(),
        };
        match &self.predicate {
            DealPredicate::Category { category } if category.trim().is_empty() => {
                Err(bad("empty category"))
            }
            DealPredicate::BasketCategoryCount { category, .. } if category.trim().is_empty() => {
                Err(bad("empty category"))
            }
            DealPredicate::BasketCategoryCount { min_quantity, .. } if *min_quantity <= 0 => {
                Err(bad("basket threshold must be positive"))
            }
            _ => Ok(()),
        }
    }

    /// Whether the rule is in force at `as_of` (unix millis).
    pub fn is_active(&self, as_of: i64) -> bool {
        self.valid_from.map_or(true, |from| as_of >= from)
            && self.valid_until.map_or(true, |until| as_of <= until)
    }

    /// Audit line for a line the rule touched.
    pub fn summary(&self, product_name: &str, line_discount: Money) -> String {
        format!(
            "{} ({}) applied to {} (-{})",
            self.name,
            self.kind.describe(),
            product_name,
            line_discount.display()
        )
    }
}

/// The store's configured deals, loaded once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealBook {
    rules: Vec<DealRule>,
}

impl DealBook {
    /// Malformed rules are kept; the engine skips them at pricing time.
    pub fn new(rules: Vec<DealRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DealRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

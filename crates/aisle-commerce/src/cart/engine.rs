//! Deal pricing.
//!
//! Pricing runs in two passes over the basket: per-line predicates first,
//! then basket-level predicates against the whole pass-one basket. Within a
//! stacking class the single best rule wins; across classes percentages
//! compose multiplicatively before fixed amounts. Rules are ordered by id
//! before evaluation, so the result never depends on the order they were
//! supplied in.

use super::deal::{DealPredicate, DealRule, DiscountKind, RuleError};
use super::line::{AppliedDeal, EnrichedLine, ProcessedLine};
use crate::error::FulfillmentError;
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priced basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub lines: Vec<ProcessedLine>,
    pub subtotal: Money,
    pub total_discount: Money,
    pub total_after_discount: Money,
    pub applied_deal_summaries: Vec<String>,
    /// Rules that could not be evaluated and were left out.
    pub skipped_rules: Vec<RuleError>,
}

/// Pure discount calculator for one store currency.
#[derive(Debug, Clone, Copy)]
pub struct DiscountEngine {
    currency: Currency,
}

impl DiscountEngine {
    pub fn new(currency: Currency) -> Self {
        Self { currency }
    }

    /// Price `lines` against `rules` as of `as_of` (unix millis).
    pub fn price(
        &self,
        lines: &[EnrichedLine],
        rules: &[DealRule],
        as_of: i64,
    ) -> Result<PricingResult, FulfillmentError> {
        let mut skipped_rules = Vec::new();
        let mut active: Vec<&DealRule> = Vec::with_capacity(rules.len());
        for rule in rules {
            match rule.validate(self.currency) {
                Ok(()) if rule.is_active(as_of) => active.push(rule),
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(deal_id = %rule.id, error = %e, "skipping malformed deal rule");
                    skipped_rules.push(e);
                }
            }
        }
        active.sort_by(|a, b| a.id.cmp(&b.id));
        skipped_rules.sort_by_key(|e| e.to_string());

        for line in lines {
            if line.quantity <= 0 {
                return Err(FulfillmentError::InvalidQuantity(line.quantity));
            }
            if line.unit_price.currency != self.currency {
                return Err(FulfillmentError::CurrencyMismatch {
                    expected: self.currency.code().to_string(),
                    got: line.unit_price.currency.code().to_string(),
                });
            }
        }

        // Pass 1: rules that look at a single line.
        let mut matches: Vec<Vec<&DealRule>> = lines
            .iter()
            .map(|line| {
                active
                    .iter()
                    .copied()
                    .filter(|rule| line_matches(&rule.predicate, line))
                    .collect()
            })
            .collect();

        // Pass 2: basket-level rules against the pass-1 basket.
        let mut category_units: BTreeMap<&str, i64> = BTreeMap::new();
        for line in lines {
            *category_units.entry(line.category.as_str()).or_insert(0) += line.quantity;
        }
        for (line, matched) in lines.iter().zip(matches.iter_mut()) {
            for rule in active.iter().copied() {
                if let DealPredicate::BasketCategoryCount {
                    category,
                    min_quantity,
                } = &rule.predicate
                {
                    let units = category_units.get(category.as_str()).copied().unwrap_or(0);
                    if &line.category == category && units >= *min_quantity {
                        matched.push(rule);
                    }
                }
            }
        }

        let mut processed = Vec::with_capacity(lines.len());
        for (line, matched) in lines.iter().zip(matches) {
            processed.push(self.apply(line, matched)?);
        }

        let subtotal = sum_lines(&processed, self.currency, |l| l.unit_price)?;
        let total_after_discount = sum_lines(&processed, self.currency, |l| l.final_unit_price)?;
        let total_discount = subtotal.checked_sub(&total_after_discount)?;
        let applied_deal_summaries = processed
            .iter()
            .flat_map(|l| l.applied_deals.iter().map(|d| d.summary.clone()))
            .collect();

        Ok(PricingResult {
            lines: processed,
            subtotal,
            total_discount,
            total_after_discount,
            applied_deal_summaries,
            skipped_rules,
        })
    }

    fn apply(
        &self,
        line: &EnrichedLine,
        matched: Vec<&DealRule>,
    ) -> Result<ProcessedLine, FulfillmentError> {
        // Best rule per stacking class, judged on the undiscounted price.
        let mut best: BTreeMap<&str, &DealRule> = BTreeMap::new();
        for rule in matched {
            let candidate = rule.kind.discount_on(line.unit_price);
            match best.get(rule.stacking_class.as_str()) {
                Some(current) => {
                    let incumbent = current.kind.discount_on(line.unit_price);
                    if candidate > incumbent || (candidate == incumbent && rule.id < current.id) {
                        best.insert(rule.stacking_class.as_str(), rule);
                    }
                }
                None => {
                    best.insert(rule.stacking_class.as_str(), rule);
                }
            }
        }

        let mut chosen: Vec<&DealRule> = best.into_values().collect();
        chosen.sort_by(|a, b| {
            b.kind
                .is_percentage()
                .cmp(&a.kind.is_percentage())
                .then_with(|| a.stacking_class.cmp(&b.stacking_class))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut remaining = line.unit_price;
        let mut applied = Vec::with_capacity(chosen.len());
        let mut notes = Vec::new();
        for rule in chosen {
            if remaining.is_zero() {
                break;
            }
            let wanted = match &rule.kind {
                DiscountKind::Percentage { basis_points } => {
                    remaining.basis_points(*basis_points)
                }
                DiscountKind::FixedAmount { amount } => *amount,
            };
            let take = if wanted > remaining {
                notes.push(format!(
                    "{} would take the unit price below zero; clamped to {}",
                    rule.name,
                    Money::zero(self.currency).display()
                ));
                remaining
            } else {
                wanted
            };
            if take.is_zero() {
                continue;
            }
            remaining = remaining.checked_sub(&take)?;
            applied.push(AppliedDeal {
                deal_id: rule.id.clone(),
                stacking_class: rule.stacking_class.clone(),
                discount_per_unit: take,
                summary: rule.summary(&line.product_name, take.checked_mul(line.quantity)?),
            });
        }

        Ok(ProcessedLine {
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            category: line.category.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount_per_unit: line.unit_price.checked_sub(&remaining)?,
            final_unit_price: remaining,
            substitute_of: line.substitute_of.clone(),
            substitution_reason: line.substitution_reason.clone(),
            stock_status: line.stock_status,
            applied_deals: applied,
            notes,
        })
    }
}

fn line_matches(predicate: &DealPredicate, line: &EnrichedLine) -> bool {
    match predicate {
        DealPredicate::Product { product_id } => &line.product_id == product_id,
        DealPredicate::Category { category } => &line.category == category,
        DealPredicate::BasketCategoryCount { .. } => false,
    }
}

fn sum_lines(
    lines: &[ProcessedLine],
    currency: Currency,
    unit: impl Fn(&ProcessedLine) -> Money,
) -> Result<Money, FulfillmentError> {
    lines.iter().try_fold(Money::zero(currency), |acc, line| {
        acc.checked_add(&unit(line).checked_mul(line.quantity)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StockStatus;
    use crate::ids::{DealId, ProductId};

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    fn line(id: &str, category: &str, cents: i64, qty: i64) -> EnrichedLine {
        EnrichedLine {
            product_id: ProductId::new(id),
            product_name: id.to_string(),
            category: category.to_string(),
            quantity: qty,
            unit_price: usd(cents),
            substitute_of: None,
            substitution_reason: None,
            stock_status: StockStatus::InStock { quantity: 10 },
        }
    }

    fn pct(id: &str, predicate: DealPredicate, bps: u32, class: &str) -> DealRule {
        DealRule::new(id, id, predicate, DiscountKind::Percentage { basis_points: bps }, class)
    }

    fn fixed(id: &str, predicate: DealPredicate, cents: i64, class: &str) -> DealRule {
        DealRule::new(id, id, predicate, DiscountKind::FixedAmount { amount: usd(cents) }, class)
    }

    fn product(id: &str) -> DealPredicate {
        DealPredicate::Product {
            product_id: ProductId::new(id),
        }
    }

    fn category(c: &str) -> DealPredicate {
        DealPredicate::Category {
            category: c.to_string(),
        }
    }

    #[test]
    fn test_no_rules_no_discount() {
        let engine = DiscountEngine::new(Currency::USD);
        let result = engine.price(&[line("milk", "dairy", 349, 2)], &[], 0).unwrap();
        assert_eq!(result.subtotal, usd(698));
        assert!(result.total_discount.is_zero());
        assert_eq!(result.lines[0].final_unit_price, usd(349));
    }

    #[test]
    fn test_same_class_picks_greatest() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![
            pct("a", category("dairy"), 1000, "promo"),
            fixed("b", product("milk"), 50, "promo"),
        ];
        let result = engine.price(&[line("milk", "dairy", 349, 1)], &rules, 0).unwrap();
        // 10% of 349 = 35, fixed is 50
        assert_eq!(result.lines[0].discount_per_unit, usd(50));
        assert_eq!(result.lines[0].applied_deals.len(), 1);
        assert_eq!(result.lines[0].applied_deals[0].deal_id, DealId::new("b"));
    }

    #[test]
    fn test_same_class_tie_goes_to_lower_id() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![
            fixed("z", product("milk"), 50, "promo"),
            fixed("m", category("dairy"), 50, "promo"),
        ];
        let result = engine.price(&[line("milk", "dairy", 349, 1)], &rules, 0).unwrap();
        assert_eq!(result.lines[0].applied_deals[0].deal_id, DealId::new("m"));
    }

    #[test]
    fn test_classes_stack_percent_before_fixed() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![
            fixed("coupon", product("milk"), 100, "coupon"),
            pct("weekly", category("dairy"), 2000, "weekly"),
            pct("member", category("dairy"), 1000, "member"),
        ];
        let result = engine.price(&[line("milk", "dairy", 1000, 2)], &rules, 0).unwrap();
        // 1000 -> member 10% (100) -> 900 -> weekly 20% (180) -> 720 -> coupon 100 -> 620
        let l = &result.lines[0];
        assert_eq!(l.final_unit_price, usd(620));
        assert_eq!(l.discount_per_unit, usd(380));
        assert_eq!(result.total_discount, usd(760));
        assert_eq!(result.total_after_discount, usd(1240));
        let order: Vec<&str> = l.applied_deals.iter().map(|d| d.deal_id.as_str()).collect();
        assert_eq!(order, vec!["member", "weekly", "coupon"]);
    }

    #[test]
    fn test_clamp_at_zero_records_note() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![
            fixed("big", product("gum"), 500, "a"),
            fixed("more", product("gum"), 100, "b"),
        ];
        let result = engine.price(&[line("gum", "candy", 199, 1)], &rules, 0).unwrap();
        let l = &result.lines[0];
        assert_eq!(l.final_unit_price, usd(0));
        assert_eq!(l.discount_per_unit, usd(199));
        assert_eq!(l.notes.len(), 1);
        assert_eq!(l.applied_deals.len(), 1);
    }

    #[test]
    fn test_basket_threshold_uses_whole_basket() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![pct(
            "snack3",
            DealPredicate::BasketCategoryCount {
                category: "snacks".into(),
                min_quantity: 3,
            },
            1000,
            "basket",
        )];
        let two = engine
            .price(
                &[line("chips", "snacks", 300, 1), line("pretzel", "snacks", 200, 1)],
                &rules,
                0,
            )
            .unwrap();
        assert!(two.total_discount.is_zero());

        let three = engine
            .price(
                &[
                    line("chips", "snacks", 300, 2),
                    line("pretzel", "snacks", 200, 1),
                    line("milk", "dairy", 349, 1),
                ],
                &rules,
                0,
            )
            .unwrap();
        assert_eq!(three.lines[0].discount_per_unit, usd(30));
        assert_eq!(three.lines[1].discount_per_unit, usd(20));
        assert!(three.lines[2].applied_deals.is_empty());
    }

    #[test]
    fn test_malformed_rule_skipped_others_apply() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![
            pct("broken", category("dairy"), 25_000, "a"),
            pct("ok", category("dairy"), 1000, "b"),
        ];
        let result = engine.price(&[line("milk", "dairy", 1000, 1)], &rules, 0).unwrap();
        assert_eq!(result.skipped_rules.len(), 1);
        assert_eq!(result.lines[0].discount_per_unit, usd(100));
        assert_eq!(result.applied_deal_summaries.len(), 1);
    }

    #[test]
    fn test_inactive_rules_ignored() {
        let engine = DiscountEngine::new(Currency::USD);
        let rules = vec![pct("old", category("dairy"), 1000, "a").valid_between(None, Some(50))];
        let result = engine.price(&[line("milk", "dairy", 1000, 1)], &rules, 100).unwrap();
        assert!(result.total_discount.is_zero());
        assert!(result.skipped_rules.is_empty());
    }
}

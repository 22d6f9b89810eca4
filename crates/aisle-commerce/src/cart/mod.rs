//! Cart lines, deal rules and pricing.

mod deal;
mod engine;
mod line;
mod source;

pub use deal::{DealBook, DealPredicate, DealRule, DiscountKind, RuleError};
pub use engine::{DiscountEngine, PricingResult};
pub use line::{AppliedDeal, CartLine, EnrichedLine, ProcessedLine};
pub use source::{DealSource, StaticDeals};

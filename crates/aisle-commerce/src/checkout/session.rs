//! Checkout session state machine.
//!
//! `Built -> Priced -> Planned -> Committing -> Committed | Failed`
//!
//! Planning is optional: a priced session may commit directly. Declining a
//! substitution sends the session back to `Built` so it must be re-priced.

use super::order::CommitReceipt;
use crate::cart::{EnrichedLine, PricingResult};
use crate::error::FulfillmentError;
use crate::ids::{OrderId, ProductId, StoreId, UserId};
use crate::inventory::ReservationToken;
use crate::store::RoutePlan;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Steps in the checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Lines enriched, substitutions proposed.
    Built,
    /// Deal pricing attached.
    Priced,
    /// Walking route attached.
    Planned,
    /// Stock is being settled; cannot be cancelled.
    Committing,
    Committed,
    Failed,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Built => "built",
            CheckoutState::Priced => "priced",
            CheckoutState::Planned => "planned",
            CheckoutState::Committing => "committing",
            CheckoutState::Committed => "committed",
            CheckoutState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Committed | CheckoutState::Failed)
    }

    /// Whether the session can still be edited or cancelled.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            CheckoutState::Built | CheckoutState::Priced | CheckoutState::Planned
        )
    }
}

/// A substitute offered for a short line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionProposal {
    /// The line as the shopper asked for it.
    pub original: EnrichedLine,
    pub substitute: ProductId,
    pub similarity: f64,
    pub reason: String,
    pub confirmed: bool,
}

/// One shopper's checkout, from enriched cart to terminal order state.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    order_id: OrderId,
    user_id: UserId,
    store_id: StoreId,
    state: CheckoutState,
    lines: Vec<EnrichedLine>,
    proposals: BTreeMap<ProductId, SubstitutionProposal>,
    shortages: BTreeSet<ProductId>,
    pricing: Option<PricingResult>,
    route: Option<RoutePlan>,
    holds: Vec<ReservationToken>,
    outcome: Option<Result<CommitReceipt, FulfillmentError>>,
}

impl CheckoutSession {
    pub(crate) fn new(
        order_id: OrderId,
        user_id: UserId,
        store_id: StoreId,
        lines: Vec<EnrichedLine>,
        proposals: BTreeMap<ProductId, SubstitutionProposal>,
        shortages: BTreeSet<ProductId>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            store_id,
            state: CheckoutState::Built,
            lines,
            proposals,
            shortages,
            pricing: None,
            route: None,
            holds: Vec::new(),
            outcome: None,
        }
    }

    /// The idempotency key for this checkout's order.
    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn store_id(&self) -> &StoreId {
        &self.store_id
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Lines as they would be committed.
    pub fn lines(&self) -> &[EnrichedLine] {
        &self.lines
    }

    pub fn proposals(&self) -> impl Iterator<Item = &SubstitutionProposal> {
        self.proposals.values()
    }

    /// Products with neither enough stock nor a usable substitute.
    pub fn shortages(&self) -> impl Iterator<Item = &ProductId> {
        self.shortages.iter()
    }

    pub fn pricing(&self) -> Option<&PricingResult> {
        self.pricing.as_ref()
    }

    pub fn route(&self) -> Option<&RoutePlan> {
        self.route.as_ref()
    }

    pub fn holds(&self) -> &[ReservationToken] {
        &self.holds
    }

    /// Stored commit result once the session is terminal.
    pub fn outcome(&self) -> Option<&Result<CommitReceipt, FulfillmentError>> {
        self.outcome.as_ref()
    }

    /// Original products whose proposed substitute awaits confirmation.
    pub fn unconfirmed(&self) -> Vec<ProductId> {
        self.proposals
            .iter()
            .filter(|(_, p)| !p.confirmed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn require_open(&self, to: CheckoutState) -> Result<(), FulfillmentError> {
        if !self.state.is_open() {
            return Err(self.transition_error(to));
        }
        Ok(())
    }

    fn transition_error(&self, to: CheckoutState) -> FulfillmentError {
        FulfillmentError::InvalidTransition {
            from: self.state.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    /// Accept the substitute proposed for `original`.
    pub fn confirm_substitution(&mut self, original: &ProductId) -> Result<(), FulfillmentError> {
        self.require_open(self.state)?;
        let proposal = self
            .proposals
            .get_mut(original)
            .ok_or_else(|| FulfillmentError::ProductNotFound(original.clone()))?;
        proposal.confirmed = true;
        Ok(())
    }

    /// Reject the substitute proposed for `original` and go back to the
    /// product the shopper asked for. Pricing and route are dropped.
    pub fn decline_substitution(&mut self, original: &ProductId) -> Result<(), FulfillmentError> {
        self.require_open(CheckoutState::Built)?;
        let proposal = self
            .proposals
            .remove(original)
            .ok_or_else(|| FulfillmentError::ProductNotFound(original.clone()))?;
        for line in self.lines.iter_mut() {
            if line.substitute_of.as_ref() == Some(original) {
                *line = proposal.original.clone();
            }
        }
        self.shortages.insert(original.clone());
        self.pricing = None;
        self.route = None;
        self.state = CheckoutState::Built;
        Ok(())
    }

    pub(crate) fn attach_pricing(&mut self, pricing: PricingResult) -> Result<(), FulfillmentError> {
        self.require_open(CheckoutState::Priced)?;
        self.pricing = Some(pricing);
        self.route = None;
        self.state = CheckoutState::Priced;
        Ok(())
    }

    pub(crate) fn attach_route(&mut self, route: RoutePlan) -> Result<(), FulfillmentError> {
        if !matches!(self.state, CheckoutState::Priced | CheckoutState::Planned) {
            return Err(self.transition_error(CheckoutState::Planned));
        }
        self.route = Some(route);
        self.state = CheckoutState::Planned;
        Ok(())
    }

    pub(crate) fn attach_holds(&mut self, holds: Vec<ReservationToken>) -> Result<(), FulfillmentError> {
        self.require_open(self.state)?;
        self.holds = holds;
        Ok(())
    }

    pub(crate) fn take_holds(&mut self) -> Vec<ReservationToken> {
        std::mem::take(&mut self.holds)
    }

    /// Move to `Committing`. Refuses while substitutions are unconfirmed.
    pub(crate) fn begin_commit(&mut self) -> Result<&PricingResult, FulfillmentError> {
        if !matches!(self.state, CheckoutState::Priced | CheckoutState::Planned) {
            return Err(self.transition_error(CheckoutState::Committing));
        }
        let unconfirmed = self.unconfirmed();
        if !unconfirmed.is_empty() {
            return Err(FulfillmentError::UnconfirmedSubstitution(unconfirmed));
        }
        self.state = CheckoutState::Committing;
        self.pricing
            .as_ref()
            .ok_or_else(|| FulfillmentError::InvalidTransition {
                from: CheckoutState::Built.as_str().to_string(),
                to: CheckoutState::Committing.as_str().to_string(),
            })
    }

    pub(crate) fn finish(&mut self, outcome: Result<CommitReceipt, FulfillmentError>) {
        self.state = if outcome.is_ok() {
            CheckoutState::Committed
        } else {
            CheckoutState::Failed
        };
        self.outcome = Some(outcome);
    }
}

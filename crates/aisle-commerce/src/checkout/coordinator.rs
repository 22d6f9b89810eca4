//! Checkout orchestration.
//!
//! The coordinator walks a [`CheckoutSession`] through enrichment,
//! substitution, pricing and routing, and finally commits it with a saga:
//! decrement every line, and if any line fails, compensate the lines that
//! succeeded with increments and mark the order failed.

use super::order::{CommitReceipt, FailureReason, LineFailure, Order, OrderLine, OrderStatus};
use super::orders::{BeginOutcome, OrderStore};
use super::session::{CheckoutSession, CheckoutState, SubstitutionProposal};
use crate::cart::{CartLine, DealBook, DealRule, DealSource, DiscountEngine, EnrichedLine, StaticDeals};
use crate::catalog::{Catalog, StockStatus, StockThresholds};
use crate::error::FulfillmentError;
use crate::ids::{OrderId, ProductId, StoreId, UserId};
use crate::inventory::{
    decrement_line, merge_lines, AppliedDecrement, Clock, DecrementFailure, InventoryLedger,
    ReservationToken, StockLine,
};
use crate::money::Money;
use crate::recommend::{PurchaseHistory, Recommendation, Recommender};
use crate::store::{RouteOptimizer, RouteOptions, RoutePlan, StoreGraph};
use crate::substitution::{Resolution, SubstitutionResolver, SubstitutionTable};
use aisle_data::{with_timeout, Dependency, RetryPolicy, TimeoutConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Immutable per-store data, loaded once and shared.
#[derive(Debug, Clone)]
pub struct StoreContext {
    pub store_id: StoreId,
    pub catalog: Arc<Catalog>,
    pub graph: Arc<StoreGraph>,
    pub deals: Arc<DealBook>,
    pub substitutions: Arc<SubstitutionTable>,
    pub history: Arc<PurchaseHistory>,
}

/// Coordinator tunables.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Re-read budget for version conflicts during commit.
    pub retry: RetryPolicy,
    /// Deadline for fetching deals.
    pub deal_timeout: TimeoutConfig,
    pub thresholds: StockThresholds,
    pub route: RouteOptions,
    /// Lifetime of holds taken by [`CheckoutCoordinator::hold`].
    pub reservation_ttl: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::for_dependency(Dependency::Ledger),
            deal_timeout: TimeoutConfig::for_dependency(Dependency::Deals),
            thresholds: StockThresholds::default(),
            route: RouteOptions::default(),
            reservation_ttl: Duration::from_secs(15 * 60),
        }
    }
}

/// Drives checkouts for one store.
///
/// Holds no per-checkout state: every session is owned by its caller, so a
/// coordinator can be shared across threads and tasks freely.
pub struct CheckoutCoordinator {
    context: Arc<StoreContext>,
    ledger: Arc<dyn InventoryLedger>,
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    deal_source: Arc<dyn DealSource>,
    resolver: SubstitutionResolver,
    engine: DiscountEngine,
    router: RouteOptimizer,
    recommender: Recommender,
    settings: CheckoutSettings,
}

impl CheckoutCoordinator {
    pub fn new(
        context: Arc<StoreContext>,
        ledger: Arc<dyn InventoryLedger>,
        orders: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = CheckoutSettings::default();
        Self {
            resolver: SubstitutionResolver::new(
                context.catalog.clone(),
                context.substitutions.clone(),
                ledger.clone(),
            ),
            engine: DiscountEngine::new(context.catalog.currency()),
            router: RouteOptimizer::new(settings.route),
            recommender: Recommender::new(context.catalog.clone(), context.history.clone()),
            deal_source: Arc::new(StaticDeals::new(context.deals.clone())),
            context,
            ledger,
            orders,
            clock,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: CheckoutSettings) -> Self {
        self.router = RouteOptimizer::new(settings.route);
        self.settings = settings;
        self
    }

    /// Fetch deals from `source` instead of the store's static deal book.
    pub fn with_deal_source(mut self, source: Arc<dyn DealSource>) -> Self {
        self.deal_source = source;
        self
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    pub fn store_id(&self) -> &StoreId {
        &self.context.store_id
    }

    // ------------------------------------------------------------------
    // Session steps
    // ------------------------------------------------------------------

    /// Enrich `lines` and propose substitutes for short ones.
    pub fn build_session(
        &self,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<CheckoutSession, FulfillmentError> {
        self.assemble(OrderId::generate(), user_id, lines, true)
    }

    /// Like [`build_session`](Self::build_session) with a caller-chosen order id.
    pub fn build_session_with_id(
        &self,
        order_id: OrderId,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<CheckoutSession, FulfillmentError> {
        self.assemble(order_id, user_id, lines, true)
    }

    fn assemble(
        &self,
        order_id: OrderId,
        user_id: UserId,
        lines: &[CartLine],
        resolve: bool,
    ) -> Result<CheckoutSession, FulfillmentError> {
        let mut enriched = Vec::with_capacity(lines.len());
        let mut proposals = BTreeMap::new();
        let mut shortages = BTreeSet::new();

        for line in merge_cart(lines)? {
            let original = self.enrich_line(&line.product_id, line.quantity)?;
            if !resolve {
                enriched.push(original);
                continue;
            }
            match self
                .resolver
                .resolve(&line.product_id, &self.context.store_id, line.quantity)
            {
                Ok(Resolution::Original { .. }) => enriched.push(original),
                Ok(Resolution::Substitute {
                    substitute,
                    similarity,
                    reason,
                    ..
                }) => {
                    let mut replacement = self.enrich_line(&substitute, line.quantity)?;
                    replacement.substitute_of = Some(line.product_id.clone());
                    replacement.substitution_reason = Some(reason.clone());
                    enriched.push(replacement);
                    proposals.insert(
                        line.product_id.clone(),
                        SubstitutionProposal {
                            original,
                            substitute,
                            similarity,
                            reason,
                            confirmed: false,
                        },
                    );
                }
                Err(FulfillmentError::NoSubstituteAvailable { product_id, .. }) => {
                    shortages.insert(product_id);
                    enriched.push(original);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(CheckoutSession::new(
            order_id,
            user_id,
            self.context.store_id.clone(),
            enriched,
            proposals,
            shortages,
        ))
    }

    fn enrich_line(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<EnrichedLine, FulfillmentError> {
        let product = self.context.catalog.require(product_id)?;
        Ok(EnrichedLine {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            category: product.category.clone(),
            quantity,
            unit_price: product.price,
            substitute_of: None,
            substitution_reason: None,
            stock_status: self.stock_status(product_id)?,
        })
    }

    /// Attach deal pricing. Deals are fetched under the configured deadline.
    pub async fn price(&self, session: &mut CheckoutSession) -> Result<(), FulfillmentError> {
        let rules = self.fetch_deals().await?;
        let pricing = self
            .engine
            .price(session.lines(), &rules, self.clock.now_millis())?;
        session.attach_pricing(pricing)
    }

    async fn fetch_deals(&self) -> Result<Vec<DealRule>, FulfillmentError> {
        let deals = with_timeout(
            Dependency::Deals,
            &self.settings.deal_timeout,
            self.deal_source.deals(&self.context.store_id),
        )
        .await??;
        Ok(deals)
    }

    /// Attach a walking route for the priced lines.
    pub fn plan(&self, session: &mut CheckoutSession) -> Result<(), FulfillmentError> {
        let route = match session.pricing() {
            Some(pricing) => {
                self.router
                    .plan_lines(&self.context.graph, &self.context.catalog, &pricing.lines)
            }
            None => {
                return Err(FulfillmentError::InvalidTransition {
                    from: session.state().as_str().to_string(),
                    to: CheckoutState::Planned.as_str().to_string(),
                })
            }
        };
        session.attach_route(route)
    }

    /// Reserve stock for every line until the session commits or is
    /// cancelled. All or nothing: a line that cannot be held releases the
    /// holds taken so far.
    pub fn hold(&self, session: &mut CheckoutSession) -> Result<(), FulfillmentError> {
        if !session.state().is_open() {
            return Err(FulfillmentError::InvalidTransition {
                from: session.state().as_str().to_string(),
                to: "held".to_string(),
            });
        }
        self.release_all(session.take_holds());

        let lines: Vec<StockLine> = session
            .lines()
            .iter()
            .map(|l| StockLine {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
            })
            .collect();

        let mut tokens = Vec::with_capacity(lines.len());
        for line in merge_lines(&lines) {
            match self.ledger.reserve(
                &line.product_id,
                &self.context.store_id,
                line.quantity,
                self.settings.reservation_ttl,
            ) {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    self.release_all(tokens);
                    return Err(e);
                }
            }
        }
        session.attach_holds(tokens)
    }

    /// Abandon a session before commit. Holds are released; nothing else in
    /// the ledger is touched.
    pub fn cancel(&self, mut session: CheckoutSession) -> Result<(), FulfillmentError> {
        if !session.state().is_open() {
            return Err(FulfillmentError::InvalidTransition {
                from: session.state().as_str().to_string(),
                to: "cancelled".to_string(),
            });
        }
        self.release_all(session.take_holds());
        debug!(order_id = %session.order_id(), "checkout cancelled");
        Ok(())
    }

    fn release_all(&self, tokens: Vec<ReservationToken>) {
        for token in tokens {
            if let Err(e) = self.ledger.release_reservation(&token) {
                warn!(reservation_id = %token.id, error = %e, "failed to release hold");
            }
        }
    }

    /// Commit a priced session.
    ///
    /// Runs to a terminal state once stock settlement starts. Calling it
    /// again on a terminal session returns the stored result.
    pub fn commit(&self, session: &mut CheckoutSession) -> Result<CommitReceipt, FulfillmentError> {
        if let Some(outcome) = session.outcome() {
            return outcome.clone();
        }
        if let Some(order) = self.orders.get(session.order_id())? {
            if order.status.is_terminal() {
                self.release_all(session.take_holds());
                debug!(order_id = %order.id, status = %order.status, "replaying stored order result");
                let outcome = replay(order);
                session.finish(outcome.clone());
                return outcome;
            }
        }
        let pricing = session.begin_commit()?.clone();
        let lines: Vec<OrderLine> = pricing
            .lines
            .iter()
            .map(|l| OrderLine {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
                final_unit_price: l.final_unit_price,
            })
            .collect();
        let holds = session.take_holds();
        let outcome = self.run_saga(
            session.order_id(),
            session.user_id(),
            &lines,
            pricing.total_after_discount,
            holds,
        );
        session.finish(outcome.clone());
        outcome
    }

    fn run_saga(
        &self,
        order_id: &OrderId,
        user_id: &UserId,
        lines: &[OrderLine],
        total: Money,
        holds: Vec<ReservationToken>,
    ) -> Result<CommitReceipt, FulfillmentError> {
        let pending = Order::pending(
            order_id.clone(),
            user_id.clone(),
            self.context.store_id.clone(),
            total,
            self.clock.now_millis(),
        );
        if let BeginOutcome::Existing(order) = self.orders.begin(&pending)? {
            self.release_all(holds);
            debug!(order_id = %order_id, status = %order.status, "replaying stored order result");
            return replay(order);
        }

        let stock_lines: Vec<StockLine> = lines
            .iter()
            .map(|l| StockLine {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
            })
            .collect();
        let mut holds: HashMap<ProductId, ReservationToken> = holds
            .into_iter()
            .map(|t| (t.product_id.clone(), t))
            .collect();

        let mut applied: Vec<AppliedDecrement> = Vec::new();
        let mut failures: Vec<LineFailure> = Vec::new();
        for line in merge_lines(&stock_lines) {
            let hold = holds.remove(&line.product_id);
            match self.settle_line(&line, hold) {
                Ok(Ok(done)) => applied.push(done),
                Ok(Err(failure)) => failures.push(LineFailure {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    reason: failure_reason(failure),
                }),
                Err(hard) => {
                    error!(order_id = %order_id, product_id = %line.product_id, error = %hard, "ledger failure during commit");
                    self.release_all(holds.into_values().collect());
                    failures.push(storage_failure(&line.product_id, line.quantity, &hard));
                    let _ = self.abandon(order_id, &applied, &failures);
                    return Err(hard);
                }
            }
        }
        self.release_all(holds.into_values().collect());

        if failures.is_empty() {
            match self.orders.mark_committed(order_id, lines) {
                Ok(order) => {
                    info!(
                        order_id = %order_id,
                        store_id = %self.context.store_id,
                        lines = lines.len(),
                        total = %order.total_amount,
                        "order committed"
                    );
                    return Ok(order.receipt());
                }
                Err(hard) => {
                    error!(order_id = %order_id, error = %hard, "could not record committed order");
                    let failures: Vec<LineFailure> = applied
                        .iter()
                        .map(|done| storage_failure(&done.product_id, done.quantity, &hard))
                        .collect();
                    let _ = self.abandon(order_id, &applied, &failures);
                    return Err(hard);
                }
            }
        }

        self.abandon(order_id, &applied, &failures)?;
        info!(
            order_id = %order_id,
            store_id = %self.context.store_id,
            failed = failures.len(),
            compensated = applied.len(),
            "order failed"
        );
        Err(FulfillmentError::CommitFailed {
            order_id: order_id.clone(),
            failures,
        })
    }

    /// Compensate `applied` and flip the order to `failed`. An order that
    /// cannot be marked stays pending and is reported for reconciliation.
    fn abandon(
        &self,
        order_id: &OrderId,
        applied: &[AppliedDecrement],
        failures: &[LineFailure],
    ) -> Result<(), FulfillmentError> {
        self.compensate(order_id, applied);
        if let Err(e) = self.orders.mark_failed(order_id, failures) {
            error!(
                target: "reconciliation",
                order_id = %order_id,
                compensated = applied.len(),
                error = %e,
                "order left pending after compensation"
            );
            return Err(e);
        }
        Ok(())
    }

    /// Settle one line, preferring its live hold.
    fn settle_line(
        &self,
        line: &StockLine,
        hold: Option<ReservationToken>,
    ) -> Result<Result<AppliedDecrement, DecrementFailure>, FulfillmentError> {
        if let Some(token) = hold {
            if token.amount == line.quantity {
                match self.ledger.confirm_reservation(&token) {
                    Ok(record) => {
                        return Ok(Ok(AppliedDecrement {
                            product_id: line.product_id.clone(),
                            quantity: line.quantity,
                            version: record.version,
                        }))
                    }
                    Err(FulfillmentError::ReservationNotFound(id)) => {
                        debug!(reservation_id = %id, "hold lapsed, decrementing directly");
                    }
                    Err(e) => return Err(e),
                }
            } else {
                self.release_all(vec![token]);
            }
        }
        decrement_line(
            self.ledger.as_ref(),
            &self.context.store_id,
            line,
            &self.settings.retry,
        )
    }

    /// Undo applied decrements, newest first. A failed increment is logged
    /// for reconciliation and does not stop the others.
    fn compensate(&self, order_id: &OrderId, applied: &[AppliedDecrement]) {
        for done in applied.iter().rev() {
            if let Err(e) = self
                .ledger
                .increment(&done.product_id, &self.context.store_id, done.quantity)
            {
                error!(
                    target: "reconciliation",
                    order_id = %order_id,
                    product_id = %done.product_id,
                    store_id = %self.context.store_id,
                    quantity = done.quantity,
                    error = %e,
                    "compensating increment failed"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // One-shot operations
    // ------------------------------------------------------------------

    /// Enriched, substituted and priced basket.
    pub async fn enrich_cart(
        &self,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<CheckoutSession, FulfillmentError> {
        let mut session = self.build_session(user_id, lines)?;
        self.price(&mut session).await?;
        Ok(session)
    }

    /// Walking route for a list of products.
    pub fn optimize_path(&self, product_ids: &[ProductId]) -> RoutePlan {
        self.router
            .plan(&self.context.graph, &self.context.catalog, product_ids)
    }

    pub fn recommend(&self, product_ids: &[ProductId]) -> Vec<Recommendation> {
        self.recommender.recommend(product_ids)
    }

    /// Price and commit `lines` exactly as given, with no substitution.
    pub async fn commit_order(
        &self,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<CommitReceipt, FulfillmentError> {
        self.commit_order_with_id(OrderId::generate(), user_id, lines)
            .await
    }

    /// [`commit_order`](Self::commit_order) under a caller-chosen order id.
    /// Repeating the call with the same id replays the stored result.
    pub async fn commit_order_with_id(
        &self,
        order_id: OrderId,
        user_id: UserId,
        lines: &[CartLine],
    ) -> Result<CommitReceipt, FulfillmentError> {
        let mut session = self.assemble(order_id, user_id, lines, false)?;
        self.price(&mut session).await?;
        self.commit(&mut session)
    }

    /// Decrement every line or none of them.
    ///
    /// The inner `Err` lists the lines that failed; any line that had
    /// already been decremented is restored before returning.
    pub fn decrement_stock(
        &self,
        lines: &[StockLine],
    ) -> Result<Result<Vec<AppliedDecrement>, Vec<LineFailure>>, FulfillmentError> {
        let mutation_id = OrderId::generate();
        debug!(mutation_id = %mutation_id, lines = lines.len(), "decrementing stock");
        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for line in merge_lines(lines) {
            if line.quantity <= 0 {
                self.compensate(&mutation_id, &applied);
                return Err(FulfillmentError::InvalidQuantity(line.quantity));
            }
            match decrement_line(
                self.ledger.as_ref(),
                &self.context.store_id,
                &line,
                &self.settings.retry,
            ) {
                Ok(Ok(done)) => applied.push(done),
                Ok(Err(failure)) => failures.push(LineFailure {
                    product_id: line.product_id.clone(),
                    requested: line.quantity,
                    reason: failure_reason(failure),
                }),
                Err(e) => {
                    self.compensate(&mutation_id, &applied);
                    return Err(e);
                }
            }
        }
        if failures.is_empty() {
            return Ok(Ok(applied));
        }
        self.compensate(&mutation_id, &applied);
        Ok(Err(failures))
    }

    /// Shopper-facing availability of one product.
    pub fn stock_status(&self, product_id: &ProductId) -> Result<StockStatus, FulfillmentError> {
        Ok(self
            .ledger
            .get_stock(product_id, &self.context.store_id)?
            .map(|record| record.status(&self.settings.thresholds))
            .unwrap_or(StockStatus::Unknown))
    }

    pub fn order(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        self.orders.get(order_id)
    }
}

fn merge_cart(lines: &[CartLine]) -> Result<Vec<CartLine>, FulfillmentError> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(FulfillmentError::InvalidQuantity(line.quantity));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    Ok(merged)
}

fn failure_reason(failure: DecrementFailure) -> FailureReason {
    match failure {
        DecrementFailure::InsufficientStock { available } => {
            FailureReason::InsufficientStock { available }
        }
        DecrementFailure::VersionConflict { expected, actual } => {
            FailureReason::VersionConflict { expected, actual }
        }
    }
}

fn storage_failure(product_id: &ProductId, requested: i64, error: &FulfillmentError) -> LineFailure {
    LineFailure {
        product_id: product_id.clone(),
        requested,
        reason: FailureReason::Storage {
            message: error.to_string(),
        },
    }
}

fn replay(order: Order) -> Result<CommitReceipt, FulfillmentError> {
    match order.status {
        OrderStatus::Committed => Ok(order.receipt()),
        OrderStatus::Failed => Err(FulfillmentError::CommitFailed {
            order_id: order.id,
            failures: order.failures,
        }),
        OrderStatus::Pending => Err(FulfillmentError::InvalidTransition {
            from: OrderStatus::Pending.to_string(),
            to: CheckoutState::Committing.as_str().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{DealPredicate, DiscountKind};
    use crate::catalog::Product;
    use crate::checkout::InMemoryOrderStore;
    use crate::ids::AisleId;
    use crate::inventory::{InMemoryLedger, ManualClock};
    use crate::money::Currency;
    use crate::store::{AisleEdge, AisleNode};
    use crate::substitution::SubstituteCandidate;

    const STORE: &str = "S1";

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::USD)
    }

    fn fixture(stock: &[(&str, i64)]) -> (CheckoutCoordinator, Arc<InMemoryLedger>) {
        let catalog = Catalog::new(
            Currency::USD,
            vec![
                Product::new("milk", "Whole Milk", usd(300), "dairy"),
                Product::new("oat", "Oat Milk", usd(350), "dairy"),
                Product::new("bread", "Bread", usd(250), "bakery"),
            ],
        )
        .unwrap()
        .with_locations(vec![
            (ProductId::new("milk"), AisleId::new("a2")),
            (ProductId::new("oat"), AisleId::new("a2")),
            (ProductId::new("bread"), AisleId::new("a1")),
        ])
        .unwrap();
        let catalog = Arc::new(catalog);
        let graph = StoreGraph::new(
            vec![
                AisleNode::new("entry", "Entrance", "front"),
                AisleNode::new("a1", "Aisle 1", "bakery"),
                AisleNode::new("a2", "Aisle 2", "dairy"),
            ],
            vec![
                AisleEdge::new("entry", "a1", 5.0),
                AisleEdge::new("a1", "a2", 5.0),
            ],
            AisleId::new("entry"),
            AisleId::new("entry"),
            None,
        )
        .unwrap();
        let deals = DealBook::new(vec![DealRule::new(
            "d1",
            "Dairy week",
            DealPredicate::Category {
                category: "dairy".into(),
            },
            DiscountKind::Percentage { basis_points: 1000 },
            "weekly",
        )]);
        let substitutions = SubstitutionTable::new(
            &catalog,
            vec![(
                ProductId::new("milk"),
                SubstituteCandidate {
                    product_id: ProductId::new("oat"),
                    similarity: 0.8,
                    tag: "milk".into(),
                },
            )],
        )
        .unwrap();
        let context = Arc::new(StoreContext {
            store_id: StoreId::new(STORE),
            catalog,
            graph: Arc::new(graph),
            deals: Arc::new(deals),
            substitutions: Arc::new(substitutions),
            history: Arc::new(PurchaseHistory::default()),
        });

        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = Arc::new(InMemoryLedger::new(clock.clone()));
        for (product, qty) in stock {
            ledger
                .set_stock(&ProductId::new(*product), &StoreId::new(STORE), *qty, None)
                .unwrap();
        }
        let coordinator = CheckoutCoordinator::new(
            context,
            ledger.clone(),
            Arc::new(InMemoryOrderStore::new()),
            clock,
        )
        .with_settings(CheckoutSettings {
            retry: RetryPolicy::none(),
            ..CheckoutSettings::default()
        });
        (coordinator, ledger)
    }

    fn quantity(ledger: &InMemoryLedger, product: &str) -> i64 {
        ledger
            .get_stock(&ProductId::new(product), &StoreId::new(STORE))
            .unwrap()
            .map(|r| r.quantity)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_session_proposes_substitute_and_commits_after_confirm() {
        let (coordinator, ledger) = fixture(&[("milk", 2), ("oat", 9), ("bread", 4)]);
        let mut session = coordinator
            .enrich_cart(
                UserId::new("u1"),
                &[CartLine::new("milk", 5), CartLine::new("bread", 1)],
            )
            .await
            .unwrap();
        assert_eq!(session.state(), CheckoutState::Priced);
        assert_eq!(session.lines()[0].product_id.as_str(), "oat");
        assert_eq!(
            session.lines()[0].substitute_of,
            Some(ProductId::new("milk"))
        );

        let err = coordinator.commit(&mut session).unwrap_err();
        assert!(matches!(err, FulfillmentError::UnconfirmedSubstitution(_)));
        assert_eq!(quantity(&ledger, "oat"), 9);

        session.confirm_substitution(&ProductId::new("milk")).unwrap();
        coordinator.plan(&mut session).unwrap();
        let receipt = coordinator.commit(&mut session).unwrap();
        assert_eq!(receipt.status, OrderStatus::Committed);
        // 5 x 3.50 at 10% off, plus bread
        assert_eq!(receipt.total_amount, usd(5 * 315 + 250));
        assert_eq!(quantity(&ledger, "oat"), 4);
        assert_eq!(quantity(&ledger, "milk"), 2);
    }

    #[tokio::test]
    async fn test_commit_order_insufficient_names_product() {
        let (coordinator, ledger) = fixture(&[("milk", 2), ("bread", 4)]);
        let err = coordinator
            .commit_order(
                UserId::new("u1"),
                &[CartLine::new("bread", 1), CartLine::new("milk", 5)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.problem_products(), vec![ProductId::new("milk")]);
        assert_eq!(quantity(&ledger, "milk"), 2);
        assert_eq!(quantity(&ledger, "bread"), 4);
    }

    #[tokio::test]
    async fn test_repeat_commit_replays() {
        let (coordinator, ledger) = fixture(&[("bread", 4)]);
        let lines = [CartLine::new("bread", 2)];
        let first = coordinator
            .commit_order_with_id(OrderId::new("o-1"), UserId::new("u1"), &lines)
            .await
            .unwrap();
        let second = coordinator
            .commit_order_with_id(OrderId::new("o-1"), UserId::new("u1"), &lines)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(quantity(&ledger, "bread"), 2);
    }

    #[tokio::test]
    async fn test_hold_then_cancel_leaves_stock() {
        let (coordinator, ledger) = fixture(&[("bread", 4)]);
        let mut session = coordinator
            .enrich_cart(UserId::new("u1"), &[CartLine::new("bread", 3)])
            .await
            .unwrap();
        coordinator.hold(&mut session).unwrap();
        let record = ledger
            .get_stock(&ProductId::new("bread"), &StoreId::new(STORE))
            .unwrap()
            .unwrap();
        assert_eq!(record.available(), 1);

        coordinator.cancel(session).unwrap();
        let record = ledger
            .get_stock(&ProductId::new("bread"), &StoreId::new(STORE))
            .unwrap()
            .unwrap();
        assert_eq!(record.available(), 4);
        assert_eq!(record.quantity, 4);
    }

    #[tokio::test]
    async fn test_held_session_commits_through_reservation() {
        let (coordinator, ledger) = fixture(&[("bread", 4)]);
        let mut session = coordinator
            .enrich_cart(UserId::new("u1"), &[CartLine::new("bread", 3)])
            .await
            .unwrap();
        coordinator.hold(&mut session).unwrap();
        coordinator.commit(&mut session).unwrap();
        let record = ledger
            .get_stock(&ProductId::new("bread"), &StoreId::new(STORE))
            .unwrap()
            .unwrap();
        assert_eq!(record.quantity, 1);
        assert_eq!(record.reserved, 0);
    }

    #[test]
    fn test_decrement_stock_all_or_nothing() {
        let (coordinator, ledger) = fixture(&[("bread", 4), ("milk", 1)]);
        let result = coordinator
            .decrement_stock(&[
                StockLine {
                    product_id: ProductId::new("bread"),
                    quantity: 2,
                },
                StockLine {
                    product_id: ProductId::new("milk"),
                    quantity: 3,
                },
            ])
            .unwrap();
        let failures = result.unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].product_id.as_str(), "milk");
        assert_eq!(quantity(&ledger, "bread"), 4);
    }

    #[test]
    fn test_decrement_stock_restores_before_rejecting_quantity() {
        let (coordinator, ledger) = fixture(&[("bread", 4), ("milk", 1)]);
        let err = coordinator
            .decrement_stock(&[
                StockLine {
                    product_id: ProductId::new("bread"),
                    quantity: 2,
                },
                StockLine {
                    product_id: ProductId::new("milk"),
                    quantity: 0,
                },
            ])
            .unwrap_err();
        assert_eq!(err, FulfillmentError::InvalidQuantity(0));
        assert_eq!(quantity(&ledger, "bread"), 4);
        assert_eq!(quantity(&ledger, "milk"), 1);
    }

    #[test]
    fn test_stock_status_unknown_for_unstocked() {
        let (coordinator, _) = fixture(&[("bread", 2)]);
        assert_eq!(
            coordinator.stock_status(&ProductId::new("oat")).unwrap(),
            StockStatus::Unknown
        );
        assert!(matches!(
            coordinator.stock_status(&ProductId::new("bread")).unwrap(),
            StockStatus::LowStock { quantity: 2, .. }
        ));
    }
}

//! Checkout command - price, plan and commit an order.

use aisle_commerce::checkout::CommitReceipt;
use aisle_commerce::store::RoutePlan;
use aisle_commerce::{FulfillmentError, OrderId, UserId};
use serde_json::{json, Value};
use anyhow::{bail, Context as _, Result};

use super::enrich::print_pricing;
use super::route::print_route;
use super::{parse_lines, CheckoutArgs};
use crate::context::Context;
use crate::output::status_badge;

/// Run the checkout command.
pub async fn run(args: CheckoutArgs, ctx: &Context) -> Result<()> {
    let lines = parse_lines(&args.lines)?;
    let coordinator = &ctx.coordinator;
    let user = UserId::new(args.user);

    let mut session = match args.order_id {
        Some(id) => coordinator.build_session_with_id(OrderId::new(id), user, &lines)?,
        None => coordinator.build_session(user, &lines)?,
    };

    // A finished order replays its stored result whatever the cart now needs.
    let replaying = coordinator
        .order(session.order_id())?
        .is_some_and(|order| order.status.is_terminal());
    let pending: Vec<_> = session.unconfirmed();
    if !pending.is_empty() && !replaying {
        if !args.accept_substitutes {
            for proposal in session.proposals() {
                ctx.output.warn(&format!(
                    "{} is short; {} is proposed ({})",
                    proposal.original.product_id, proposal.substitute, proposal.reason
                ));
            }
            bail!("Substitutes need confirmation; rerun with --accept-substitutes");
        }
        for original in &pending {
            session.confirm_substitution(original)?;
        }
    }

    coordinator
        .price(&mut session)
        .await
        .context("Failed to price cart")?;
    coordinator.plan(&mut session)?;
    if args.hold && !replaying {
        coordinator
            .hold(&mut session)
            .context("Failed to hold stock")?;
    }

    let result = coordinator.commit(&mut session);

    if ctx.output.is_json() {
        ctx.output
            .json(&commit_json(session.order_id(), &result, session.route()));
        return result.map(|_| ()).map_err(Into::into);
    }

    ctx.output.header(&format!("Order {}", session.order_id()));
    if let Some(pricing) = session.pricing() {
        print_pricing(&ctx.output, pricing);
    }

    match result {
        Ok(receipt) => {
            ctx.output.kv("Status", &status_badge(receipt.status.as_str()));
            if let Some(route) = session.route() {
                ctx.output.header("Route");
                print_route(&ctx.output, route);
            }
            ctx.output
                .success(&format!("Charged {}", receipt.total_amount));
            Ok(())
        }
        Err(e) => {
            ctx.output.kv("Status", &status_badge("failed"));
            for product in e.problem_products() {
                ctx.output.list_item(&format!("{} could not be supplied", product));
            }
            Err(e.into())
        }
    }
}

/// JSON body for a commit. Every outcome, including hard failures, is an
/// object carrying the order id.
fn commit_json(
    order_id: &OrderId,
    result: &Result<CommitReceipt, FulfillmentError>,
    route: Option<&RoutePlan>,
) -> Value {
    match result {
        Ok(receipt) => json!({
            "receipt": receipt,
            "route": route,
        }),
        Err(FulfillmentError::CommitFailed { failures, .. }) => json!({
            "order_id": order_id,
            "status": "failed",
            "failures": failures,
        }),
        Err(e) => json!({
            "order_id": order_id,
            "error": e.to_string(),
            "retryable": e.is_retryable(),
            "problem_products": e.problem_products(),
        }),
    }
}

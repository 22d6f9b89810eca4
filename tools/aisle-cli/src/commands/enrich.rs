//! Enrich command - substitute and price a cart without committing.

use aisle_commerce::cart::PricingResult;
use aisle_commerce::UserId;
use anyhow::{Context as _, Result};

use super::{parse_lines, EnrichArgs};
use crate::context::Context;
use crate::output::{status_badge, Output};

/// Run the enrich command.
pub async fn run(args: EnrichArgs, ctx: &Context) -> Result<()> {
    let lines = parse_lines(&args.lines)?;
    let session = ctx
        .coordinator
        .enrich_cart(UserId::new(args.user), &lines)
        .await
        .context("Failed to enrich cart")?;
    let pricing = session
        .pricing()
        .context("Cart was not priced")?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "order_id": session.order_id(),
            "pricing": pricing,
            "proposals": session
                .proposals()
                .map(|p| serde_json::json!({
                    "original": p.original.product_id,
                    "substitute": p.substitute,
                    "similarity": p.similarity,
                    "reason": p.reason,
                }))
                .collect::<Vec<_>>(),
            "shortages": session.shortages().collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    ctx.output.header("Cart");
    print_pricing(&ctx.output, pricing);

    for proposal in session.proposals() {
        ctx.output.warn(&format!(
            "{} is short; proposing {} ({})",
            proposal.original.product_id, proposal.substitute, proposal.reason
        ));
    }
    for product in session.shortages() {
        ctx.output
            .warn(&format!("{} cannot be fully supplied", product));
    }
    Ok(())
}

/// Priced lines and totals.
pub fn print_pricing(output: &Output, pricing: &PricingResult) {
    let rows: Vec<Vec<String>> = pricing
        .lines
        .iter()
        .map(|line| {
            let name = match &line.substitute_of {
                Some(original) => format!("{} (for {})", line.product_name, original),
                None => line.product_name.clone(),
            };
            vec![
                name,
                line.quantity.to_string(),
                line.unit_price.to_string(),
                line.final_unit_price.to_string(),
                status_badge(line.stock_status.as_str()),
            ]
        })
        .collect();
    output.table(&["PRODUCT", "QTY", "UNIT", "FINAL", "STOCK"], &rows);
    for line in &pricing.lines {
        for note in &line.notes {
            output.debug(&format!("{}: {}", line.product_id, note));
        }
    }

    output.kv("Subtotal", &pricing.subtotal.to_string());
    output.kv("Discount", &pricing.total_discount.to_string());
    output.kv("Total", &pricing.total_after_discount.to_string());
    for summary in &pricing.applied_deal_summaries {
        output.list_item(summary);
    }
    for skipped in &pricing.skipped_rules {
        output.debug(&format!("skipped deal: {}", skipped));
    }
}

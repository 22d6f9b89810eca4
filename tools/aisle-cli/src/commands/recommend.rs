//! Recommend command - products frequently bought together.

use anyhow::Result;

use super::{product_ids, RecommendArgs};
use crate::context::Context;

/// Run the recommend command.
pub async fn run(args: RecommendArgs, ctx: &Context) -> Result<()> {
    let recommendations = ctx.coordinator.recommend(&product_ids(&args.products));

    if ctx.output.is_json() {
        ctx.output.json(&recommendations);
        return Ok(());
    }

    if recommendations.is_empty() {
        ctx.output.info("No recommendations for this list");
        return Ok(());
    }

    ctx.output.header("You might also need");
    for rec in &recommendations {
        ctx.output.list_item(&format!(
            "{} ({}, score {})",
            rec.product_name, rec.reason, rec.score
        ));
    }
    Ok(())
}

//! Route command - plan a walking route through the store.

use aisle_commerce::store::RoutePlan;
use anyhow::Result;

use super::{product_ids, RouteArgs};
use crate::context::Context;
use crate::output::{format_distance, format_duration, Output};

/// Run the route command.
pub async fn run(args: RouteArgs, ctx: &Context) -> Result<()> {
    let plan = ctx.coordinator.optimize_path(&product_ids(&args.products));

    if ctx.output.is_json() {
        ctx.output.json(&plan);
        return Ok(());
    }

    ctx.output.header("Route");
    print_route(&ctx.output, &plan);
    Ok(())
}

pub fn print_route(output: &Output, plan: &RoutePlan) {
    let rows: Vec<Vec<String>> = plan
        .stops
        .iter()
        .enumerate()
        .map(|(i, stop)| {
            vec![
                format!("{}.", i + 1),
                stop.aisle_label.clone(),
                stop.product_name.clone(),
                format_distance(stop.running_distance),
            ]
        })
        .collect();
    output.table(&["#", "AISLE", "PRODUCT", "WALKED"], &rows);
    if let Some(exit) = &plan.exit {
        output.kv("Exit", exit.as_str());
    }
    output.kv("Distance", &format_distance(plan.total_distance));
    output.kv(
        "Walking time",
        &format_duration(plan.estimated_time_secs.round() as u64),
    );
    for warning in &plan.warnings {
        output.warn(warning);
    }
}

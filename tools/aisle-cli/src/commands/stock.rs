//! Stock command - show levels and restock.

use aisle_commerce::catalog::{StockRecord, StockStatus};
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;

use super::{parse_line, product_ids, StockArgs};
use crate::context::Context;
use crate::output::status_badge;

#[derive(Serialize)]
struct StockRow {
    #[serde(flatten)]
    record: StockRecord,
    status: StockStatus,
}

/// Run the stock command.
pub async fn run(args: StockArgs, ctx: &Context) -> Result<()> {
    let store_id = &ctx.config.store_id;

    for raw in &args.restock {
        let line = parse_line(raw)?;
        if line.quantity <= 0 {
            bail!("Restock quantity must be positive in '{}'", raw);
        }
        ctx.coordinator.context().catalog.require(&line.product_id)?;
        let record = ctx.ledger.increment(&line.product_id, store_id, line.quantity)?;
        info!(product_id = %line.product_id, added = line.quantity, "restocked");
        ctx.output.success(&format!(
            "{} now has {} on hand",
            record.product_id, record.quantity
        ));
    }

    let filter = product_ids(&args.products);
    let rows: Vec<StockRow> = ctx
        .ledger
        .list_stock(store_id)?
        .into_iter()
        .filter(|record| filter.is_empty() || filter.contains(&record.product_id))
        .map(|record| StockRow {
            status: record.status(&ctx.coordinator.settings().thresholds),
            record,
        })
        .collect();

    if ctx.output.is_json() {
        ctx.output.json(&rows);
        return Ok(());
    }

    ctx.output.header(&format!("Stock at {}", store_id));
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                row.record.product_id.to_string(),
                row.record.quantity.to_string(),
                row.record.reserved.to_string(),
                row.record.version.to_string(),
                status_badge(row.status.as_str()),
            ]
        })
        .collect();
    ctx.output
        .table(&["PRODUCT", "ON HAND", "HELD", "VERSION", "STATUS"], &table);
    for product in &filter {
        if !rows.iter().any(|row| &row.record.product_id == product) {
            ctx.output.warn(&format!("{}: {}", product, StockStatus::Unknown.message()));
        }
    }
    Ok(())
}

//! CLI command implementations.

pub mod checkout;
pub mod enrich;
pub mod recommend;
pub mod route;
pub mod stock;

use aisle_commerce::cart::CartLine;
use aisle_commerce::ProductId;
use anyhow::{bail, Context as _, Result};
use clap::Args;

/// Arguments for the enrich command.
#[derive(Args)]
pub struct EnrichArgs {
    /// Cart lines as `product` or `product:quantity`.
    #[arg(required = true)]
    pub lines: Vec<String>,

    /// Shopper id.
    #[arg(short, long, default_value = "guest")]
    pub user: String,
}

/// Arguments for the route command.
#[derive(Args)]
pub struct RouteArgs {
    /// Products to pick up.
    #[arg(required = true)]
    pub products: Vec<String>,
}

/// Arguments for the recommend command.
#[derive(Args)]
pub struct RecommendArgs {
    /// Products already on the list.
    #[arg(required = true)]
    pub products: Vec<String>,
}

/// Arguments for the stock command.
#[derive(Args)]
pub struct StockArgs {
    /// Only show these products.
    pub products: Vec<String>,

    /// Add units to a product, as `product:quantity`. Repeatable.
    #[arg(long, value_name = "PRODUCT:QTY")]
    pub restock: Vec<String>,
}

/// Arguments for the checkout command.
#[derive(Args)]
pub struct CheckoutArgs {
    /// Cart lines as `product` or `product:quantity`.
    #[arg(required = true)]
    pub lines: Vec<String>,

    /// Shopper id.
    #[arg(short, long, default_value = "guest")]
    pub user: String,

    /// Order id; repeating a checkout with the same id replays its result.
    #[arg(long)]
    pub order_id: Option<String>,

    /// Accept every proposed substitute.
    #[arg(short = 'y', long)]
    pub accept_substitutes: bool,

    /// Hold stock while planning the route.
    #[arg(long)]
    pub hold: bool,
}

/// Parse `product[:quantity]` into a cart line.
pub fn parse_line(raw: &str) -> Result<CartLine> {
    let (product, quantity) = match raw.rsplit_once(':') {
        Some((product, quantity)) => {
            let quantity: i64 = quantity
                .trim()
                .parse()
                .with_context(|| format!("Invalid quantity in '{}'", raw))?;
            (product.trim(), quantity)
        }
        None => (raw.trim(), 1),
    };
    if product.is_empty() {
        bail!("Missing product id in '{}'", raw);
    }
    Ok(CartLine::new(product, quantity))
}

pub fn parse_lines(raw: &[String]) -> Result<Vec<CartLine>> {
    raw.iter().map(|line| parse_line(line)).collect()
}

pub fn product_ids(raw: &[String]) -> Vec<ProductId> {
    raw.iter().map(|id| ProductId::new(id.trim())).collect()
}

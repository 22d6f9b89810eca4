//! Aisle CLI - checkout fulfillment from the command line.
//!
//! Commands:
//! - `aisle enrich` - Substitute and price a cart
//! - `aisle route` - Plan a walking route for a list of products
//! - `aisle recommend` - Suggest products bought together with a list
//! - `aisle stock` - Show or restock inventory
//! - `aisle checkout` - Price, plan and commit an order

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckoutArgs, EnrichArgs, RecommendArgs, RouteArgs, StockArgs};

/// Aisle CLI - substitution, deal pricing, routing and checkout for one store
#[derive(Parser)]
#[command(name = "aisle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Store configuration file (TOML or JSON)
    #[arg(short, long, global = true, default_value = "store.toml")]
    config: String,

    /// SQLite database for stock and orders (in-memory when omitted)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve substitutes and price a cart
    Enrich(EnrichArgs),

    /// Plan a walking route through the store
    Route(RouteArgs),

    /// Recommend products frequently bought together
    Recommend(RecommendArgs),

    /// Show stock levels, or restock a product
    Stock(StockArgs),

    /// Commit an order
    Checkout(CheckoutArgs),
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let output = output::Output::new(cli.verbose, cli.json);
    let ctx = match context::Context::load(&cli.config, cli.db.as_deref(), output.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Enrich(args) => commands::enrich::run(args, &ctx).await,
        Commands::Route(args) => commands::route::run(args, &ctx).await,
        Commands::Recommend(args) => commands::recommend::run(args, &ctx).await,
        Commands::Stock(args) => commands::stock::run(args, &ctx).await,
        Commands::Checkout(args) => commands::checkout::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

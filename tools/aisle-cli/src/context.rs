//! CLI execution context.

use std::sync::Arc;

use aisle_commerce::checkout::{
    CheckoutCoordinator, InMemoryOrderStore, OrderStore, SqliteOrderStore,
};
use aisle_commerce::config::StoreConfig;
use aisle_commerce::inventory::{Clock, InMemoryLedger, InventoryLedger, SqliteLedger, SystemClock};
use aisle_db::Db;
use anyhow::{Context as _, Result};
use tracing::{debug, info};

use crate::config;
use crate::output::Output;

/// Execution context for CLI commands.
pub struct Context {
    /// Store configuration.
    pub config: StoreConfig,
    /// Output handler.
    pub output: Output,
    pub ledger: Arc<dyn InventoryLedger>,
    pub coordinator: CheckoutCoordinator,
}

impl Context {
    /// Load the store, open storage and seed opening stock.
    ///
    /// With a database path, stock is only seeded into an empty store so
    /// committed orders survive between runs.
    pub fn load(config_path: &str, db_path: Option<&str>, output: Output) -> Result<Self> {
        let config = config::load(config_path)?;
        let settings = config
            .checkout
            .settings()
            .context("Invalid [checkout] settings")?;
        let store = Arc::new(config.build_context().context("Invalid store layout")?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (ledger, orders): (Arc<dyn InventoryLedger>, Arc<dyn OrderStore>) = match db_path {
            Some(path) => {
                let db = Arc::new(
                    Db::open(path).with_context(|| format!("Failed to open database: {}", path))?,
                );
                debug!(path, "opened sqlite storage");
                (
                    Arc::new(SqliteLedger::new(db.clone(), clock.clone())?),
                    Arc::new(SqliteOrderStore::new(db)?),
                )
            }
            None => (
                Arc::new(InMemoryLedger::new(clock.clone())),
                Arc::new(InMemoryOrderStore::new()),
            ),
        };

        if ledger.list_stock(&config.store_id)?.is_empty() {
            let rows = config.seed_ledger(&store.catalog, ledger.as_ref())?;
            info!(store_id = %config.store_id, rows, "seeded opening stock");
        }

        let coordinator = CheckoutCoordinator::new(store, ledger.clone(), orders, clock)
            .with_settings(settings);

        Ok(Self {
            config,
            output,
            ledger,
            coordinator,
        })
    }
}

//! SQLite storage for the aisle fulfillment pipeline.
//!
//! Wraps a single `rusqlite` connection behind a mutex and exposes typed
//! query helpers. Rows deserialize through serde, so storage structs only
//! need `#[derive(Deserialize)]`.
//!
//! # Example
//!
//! ```rust,ignore
//! use aisle_db::{Db, params};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Stock {
//!     product_id: String,
//!     quantity: i64,
//! }
//!
//! let db = Db::open_in_memory()?;
//! db.execute_batch("CREATE TABLE stock (product_id TEXT, quantity INTEGER)")?;
//! db.execute(
//!     "INSERT INTO stock (product_id, quantity) VALUES (?1, ?2)",
//!     params!["milk", 2],
//! )?;
//!
//! let rows: Vec<Stock> = db.query_as(
//!     "SELECT product_id, quantity FROM stock WHERE quantity > ?1",
//!     params![0],
//! )?;
//! ```

mod db;
mod error;
mod types;

pub use db::{Db, Tx};
pub use error::DbError;
pub use types::{QueryResult, Row, Value};

/// Build a `&[Value]` slice from mixed Rust values.
///
/// ```rust,ignore
/// db.execute("DELETE FROM holds WHERE expires_at <= ?1", params![now])?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[]
    };
    ($($param:expr),+ $(,)?) => {
        &[$($crate::Value::from($param)),+]
    };
}

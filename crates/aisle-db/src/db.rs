//! The shared connection and its query helpers.

use crate::{DbError, QueryResult, Row, Value};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, OpenFlags, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;

/// One SQLite connection.
///
/// The connection is shared behind a mutex, so every statement runs to
/// completion before the next one starts.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (or create) a SQLite database file.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let db = Db::open("fulfillment.db")?;
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| DbError::OpenError(e.to_string()))?;
        // journal_mode answers with a row; a refusal leaves the default journal.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::OpenError(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| DbError::OpenError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::OpenError(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::OpenError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run several `;`-separated statements (schema setup, pragmas).
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Run a statement that returns no rows.
    ///
    /// Returns the number of rows changed, which is how conditional updates
    /// report whether their `WHERE` guard held.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let changed = db.execute(
    ///     "UPDATE stock SET quantity = quantity - ?1 WHERE product_id = ?2",
    ///     params![1, "milk"],
    /// )?;
    /// ```
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        execute_on(&self.conn.lock(), sql, params)
    }

    /// Rows as JSON-shaped maps keyed by column name.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        query_on(&self.conn.lock(), sql, params)
    }

    pub fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<T>, DbError> {
        self.query(sql, params)?.deserialize_all()
    }

    /// First row, or [`DbError::NotFound`].
    pub fn query_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<T, DbError> {
        let result = self.query(sql, params)?;
        result.first().ok_or(DbError::NotFound)?.deserialize()
    }

    /// First row if any.
    pub fn query_optional<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        let result = self.query(sql, params)?;
        match result.first() {
            Some(row) => Ok(Some(row.deserialize()?)),
            None => Ok(None),
        }
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.transaction(|tx| {
    ///     tx.execute("INSERT INTO order_lines ...", params![...])?;
    ///     tx.execute("UPDATE orders SET status = 'committed' ...", params![...])?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Tx<'_>) -> Result<T, DbError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = {
            let handle = Tx { conn: &tx };
            f(&handle)?
        };
        tx.commit()?;
        Ok(result)
    }
}

/// Handle to an open transaction, see [`Db::transaction`].
pub struct Tx<'a> {
    conn: &'a Connection,
}

impl Tx<'_> {
    /// Execute a statement inside the transaction.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        execute_on(self.conn, sql, params)
    }

    /// Query inside the transaction.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        query_on(self.conn, sql, params)
    }

    /// Query an optional single row inside the transaction.
    pub fn query_optional<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        match self.query(sql, params)?.first() {
            Some(row) => Ok(Some(row.deserialize()?)),
            None => Ok(None),
        }
    }
}

fn execute_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize, DbError> {
    Ok(conn.execute(sql, params_from_iter(params.iter()))?)
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = QueryResult::default();
    while let Some(row) = rows.next()? {
        out.rows.push(Row::decode(&columns, row)?);
    }
    Ok(out)
}

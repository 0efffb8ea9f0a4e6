//! Typed statements accepted by the engine client.

use serde::Serialize;

use super::catalog::{Symbol, Trade};

/// A request submitted through an [`EngineClient`](super::EngineClient).
#[derive(Clone, Debug)]
pub enum Statement {
    /// Create a table populated with `rows` generated trades.
    ///
    /// Acknowledged as soon as the table is registered; the rows become
    /// visible after the commit lag, when the table writer is released.
    CreateTableAs {
        table: String,
        rows: usize,
        /// Override the configured WAL default.
        wal: Option<bool>,
    },
    /// Append rows through the ingest pool.
    Insert { table: String, rows: Vec<Trade> },
    /// Read committed rows.
    Select(Query),
    /// Remove a table.
    Drop { table: String },
}

impl Statement {
    pub fn create_table_as(table: impl Into<String>, rows: usize) -> Self {
        Statement::CreateTableAs {
            table: table.into(),
            rows,
            wal: None,
        }
    }

    /// Table the statement targets.
    pub fn table(&self) -> &str {
        match self {
            Statement::CreateTableAs { table, .. }
            | Statement::Insert { table, .. }
            | Statement::Drop { table } => table,
            Statement::Select(query) => &query.table,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateTableAs { .. } => "create_table_as",
            Statement::Insert { .. } => "insert",
            Statement::Select(_) => "select",
            Statement::Drop { .. } => "drop",
        }
    }
}

/// Filter over a trades table. Unset predicates match everything; the
/// timestamp range is inclusive on both ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Query {
    pub table: String,
    pub symbol: Option<Symbol>,
    pub min_price: Option<f64>,
    pub min_amount: Option<f64>,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    /// Strictly greater than.
    pub fn price_above(mut self, price: f64) -> Self {
        self.min_price = Some(price);
        self
    }

    /// Strictly greater than.
    pub fn amount_above(mut self, amount: f64) -> Self {
        self.min_amount = Some(amount);
        self
    }

    /// Timestamps in microseconds.
    pub fn between(mut self, from: i64, to: i64) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, row: &Trade) -> bool {
        self.symbol.map_or(true, |s| row.symbol == s)
            && self.min_price.map_or(true, |p| row.price > p)
            && self.min_amount.map_or(true, |a| row.amount > a)
            && self.from.map_or(true, |from| row.timestamp >= from)
            && self.to.map_or(true, |to| row.timestamp <= to)
    }
}

/// Successful statement result.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Created { table: String },
    Inserted { rows: usize },
    Rows(Vec<Trade>),
    Dropped,
}

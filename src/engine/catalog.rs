//! In-memory table catalog.
//!
//! Rows only become visible to readers once a writer commits them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::statement::Query;
use super::EngineError;

/// 2022-12-30T00:00:00Z in microseconds.
pub const TRADES_EPOCH_MICROS: i64 = 1_672_358_400_000_000;

/// Spacing between generated trades: 60 * 100000 microseconds.
pub const TRADES_STEP_MICROS: i64 = 60 * 100_000;

/// Instrument symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Symbol {
    Euro,
    Usd,
    Other,
}

impl Symbol {
    pub const ALL: [Symbol; 3] = [Symbol::Euro, Symbol::Usd, Symbol::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Euro => "EURO",
            Symbol::Usd => "USD",
            Symbol::Other => "OTHER",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a trades table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub price: f64,
    pub amount: f64,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Synthetic row source. Seeded generators repeat their output.
#[derive(Clone, Debug)]
pub struct TradeGenerator {
    rng: StdRng,
}

impl TradeGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Generate `count` trades: random symbol, price in `[0, 50)`, amount in
    /// `[0, 20)`, timestamps stepping from [`TRADES_EPOCH_MICROS`].
    pub fn trades(&mut self, count: usize) -> Vec<Trade> {
        (1..=count as i64)
            .map(|x| Trade {
                symbol: Symbol::ALL
                    .choose(&mut self.rng)
                    .copied()
                    .unwrap_or(Symbol::Other),
                price: self.rng.gen_range(0.0..50.0),
                amount: self.rng.gen_range(0.0..20.0),
                timestamp: TRADES_EPOCH_MICROS + x * TRADES_STEP_MICROS,
            })
            .collect()
    }
}

#[derive(Debug)]
struct Table {
    wal: bool,
    rows: Vec<Trade>,
}

/// Registry of tables and their committed rows.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<HashMap<Arc<str>, Table>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty table. Fails if the name is taken.
    pub fn create(&self, name: &str, wal: bool) -> Result<Arc<str>, EngineError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.contains_key(name) {
            return Err(EngineError::TableExists(name.to_string()));
        }
        let name: Arc<str> = Arc::from(name);
        tables.insert(
            Arc::clone(&name),
            Table {
                wal,
                rows: Vec::new(),
            },
        );
        Ok(name)
    }

    pub fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }

    /// Interned table name, if the table exists.
    pub fn resolve(&self, name: &str) -> Option<Arc<str>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_key_value(name)
            .map(|(k, _)| Arc::clone(k))
    }

    /// True if `name` is the interned key of a live table, not merely a
    /// table of the same name created after it was dropped.
    pub fn is_current(&self, name: &Arc<str>) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_key_value(name.as_ref())
            .is_some_and(|(k, _)| Arc::ptr_eq(k, name))
    }

    pub fn is_wal(&self, name: &str) -> Result<bool, EngineError> {
        self.with_table(name, |t| t.wal)
    }

    /// Number of committed rows.
    pub fn row_count(&self, name: &str) -> Result<usize, EngineError> {
        self.with_table(name, |t| t.rows.len())
    }

    /// Append rows, making them visible.
    pub fn commit(&self, name: &str, rows: Vec<Trade>) -> Result<usize, EngineError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables
            .get_mut(name)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))?;
        let count = rows.len();
        table.rows.extend(rows);
        Ok(count)
    }

    /// Committed rows matching `query`.
    pub fn select(&self, query: &Query) -> Result<Vec<Trade>, EngineError> {
        self.with_table(&query.table, |t| {
            t.rows
                .iter()
                .filter(|row| query.matches(row))
                .copied()
                .collect()
        })
    }

    fn with_table<T>(&self, name: &str, f: impl FnOnce(&Table) -> T) -> Result<T, EngineError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(name)
            .map(f)
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))
    }
}

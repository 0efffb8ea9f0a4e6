//! Statement execution on engine worker threads.
//!
//! ```text
//!  query-N                               shared-N
//!  ───────                               ────────
//!  CreateTableAs
//!   ├─ catalog.create        metadata:create
//!   ├─ writer lock/unlock    writer:lock, writer:unlock
//!   ├─ [wal] wal append      wal_writer:create/acquire/release
//!   └─ submit ApplyJob ───────────────▶  sleep until commit lag elapsed
//!  reply Created                          ├─ writer acquire   writer:acquire
//!                                         ├─ commit rows
//!                                         └─ writer release   writer:release
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::catalog::{Catalog, Trade, TradeGenerator};
use super::pool::ThreadPool;
use super::resource::{ReaderPool, WriterPool, DEFAULT_MAX_READERS};
use super::statement::{Query, Reply, Statement};
use super::{EngineError, Result};
use crate::config::RuntimeConfig;
use crate::events::{EventDispatcher, EventKind, LifecycleEvent, ResourceCategory};

/// Pause between attempts to take a busy writer.
const WRITER_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Deferred commit of rows into a table.
#[derive(Debug)]
pub struct ApplyJob {
    /// Interned catalog key. Identifies one incarnation of the table, so a
    /// job outliving a drop never lands in a recreated table of that name.
    pub table: Arc<str>,
    pub rows: Vec<Trade>,
    /// Rows stay invisible until this instant.
    pub not_before: Instant,
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub statements: u64,
    pub failed_statements: u64,
    pub apply_jobs: u64,
    pub rows_committed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    statements: AtomicU64,
    failed_statements: AtomicU64,
    apply_jobs: AtomicU64,
    rows_committed: AtomicU64,
}

/// Shared state behind every engine worker.
#[derive(Debug)]
pub struct StatementExecutor {
    config: RuntimeConfig,
    catalog: Catalog,
    writers: Arc<WriterPool>,
    wal_writers: Arc<WriterPool>,
    readers: Arc<ReaderPool>,
    dispatcher: EventDispatcher,
    counters: Counters,
}

impl StatementExecutor {
    pub fn new(config: RuntimeConfig, dispatcher: EventDispatcher) -> Self {
        Self {
            writers: WriterPool::new(ResourceCategory::Writer, dispatcher.clone()),
            wal_writers: WriterPool::new(ResourceCategory::WalWriter, dispatcher.clone()),
            readers: ReaderPool::new(DEFAULT_MAX_READERS, dispatcher.clone()),
            catalog: Catalog::new(),
            config,
            dispatcher,
            counters: Counters::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run one statement. `apply` receives deferred commits.
    pub fn execute(&self, statement: Statement, apply: &ThreadPool<ApplyJob, ()>) -> Result<Reply> {
        let kind = statement.kind();
        let table = statement.table().to_string();

        let result = match statement {
            Statement::CreateTableAs { table, rows, wal } => {
                self.create_table_as(&table, rows, wal.unwrap_or(self.config.wal_enabled_default), apply)
            }
            Statement::Insert { table, rows } => self.insert(&table, rows, apply),
            Statement::Select(query) => self.select(&query),
            Statement::Drop { table } => self.drop_table(&table),
        };

        self.count(&self.counters.statements, 1);
        if let Err(ref e) = result {
            self.count(&self.counters.failed_statements, 1);
            tracing::debug!(statement = kind, table = %table, error = %e, "statement failed");
        }
        result
    }

    fn create_table_as(
        &self,
        table: &str,
        rows: usize,
        wal: bool,
        apply: &ThreadPool<ApplyJob, ()>,
    ) -> Result<Reply> {
        let name = self.catalog.create(table, wal)?;
        self.emit_metadata(EventKind::Create, &name);

        let data = {
            // Structural lock while the table is populated
            let _lock = self.writers.lock(&name)?;
            TradeGenerator::from_entropy().trades(rows)
        };

        let data = if wal { self.wal_append(&name, data)? } else { data };

        let job = ApplyJob {
            table: Arc::clone(&name),
            rows: data,
            not_before: Instant::now() + self.config.commit_lag(),
        };
        if let Err(e) = apply.submit(job) {
            // Undo registration so a retry can create it again
            if let Err(rollback) = self.catalog.remove(&name) {
                tracing::warn!(table = %name, error = %rollback, "rollback of table registration failed");
            }
            self.emit_metadata(EventKind::Remove, &name);
            return Err(e.into());
        }

        tracing::info!(table = %name, rows, wal, "table created, rows pending commit");
        Ok(Reply::Created {
            table: name.to_string(),
        })
    }

    fn insert(&self, table: &str, rows: Vec<Trade>, apply: &ThreadPool<ApplyJob, ()>) -> Result<Reply> {
        let name = self
            .catalog
            .resolve(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;
        let count = rows.len();

        if self.catalog.is_wal(&name)? {
            let rows = self.wal_append(&name, rows)?;
            apply.submit(ApplyJob {
                table: name,
                rows,
                not_before: Instant::now() + self.config.commit_lag(),
            })?;
        } else {
            let mut writer = self.writers.acquire(&name)?;
            writer.append(rows);
            let committed = writer.commit(&self.catalog)?;
            self.count(&self.counters.rows_committed, committed as u64);
        }

        Ok(Reply::Inserted { rows: count })
    }

    fn select(&self, query: &Query) -> Result<Reply> {
        let name = self
            .catalog
            .resolve(&query.table)
            .ok_or_else(|| EngineError::TableNotFound(query.table.clone()))?;

        let _reader = self.readers.acquire(&name)?;
        self.catalog.select(query).map(Reply::Rows)
    }

    fn drop_table(&self, table: &str) -> Result<Reply> {
        let name = self
            .catalog
            .resolve(table)
            .ok_or_else(|| EngineError::TableNotFound(table.to_string()))?;

        {
            let _lock = self.writers.lock(&name)?;
            self.catalog.remove(&name)?;
            self.emit_metadata(EventKind::Remove, &name);
        }
        self.writers.remove(&name)?;
        self.wal_writers.remove(&name)?;

        tracing::info!(table = %name, "table dropped");
        Ok(Reply::Dropped)
    }

    /// Write rows to a WAL segment and hand them back for the apply job.
    fn wal_append(&self, name: &Arc<str>, rows: Vec<Trade>) -> Result<Vec<Trade>> {
        let mut wal = self.wal_writers.acquire(name)?;
        wal.append(rows);
        Ok(wal.take_staged())
    }

    /// Commit a deferred job. Runs on a shared worker.
    pub fn apply(&self, job: ApplyJob) {
        let ApplyJob {
            table,
            rows,
            not_before,
        } = job;

        let now = Instant::now();
        if not_before > now {
            std::thread::sleep(not_before - now);
        }

        let deadline = Instant::now() + self.config.o3_max_lag;
        let mut writer = loop {
            match self.writers.acquire_current(&table, &self.catalog) {
                Ok(writer) => break writer,
                Err(EngineError::WriterBusy(_)) if Instant::now() < deadline => {
                    std::thread::sleep(WRITER_RETRY_INTERVAL);
                }
                Err(EngineError::TableNotFound(_)) => {
                    tracing::debug!(table = %table, rows = rows.len(), "apply job for dropped table discarded");
                    return;
                }
                Err(e) => {
                    tracing::error!(table = %table, rows = rows.len(), error = %e, "apply job abandoned");
                    return;
                }
            }
        };

        writer.append(rows);
        match writer.commit(&self.catalog) {
            Ok(count) => {
                self.count(&self.counters.apply_jobs, 1);
                self.count(&self.counters.rows_committed, count as u64);
                tracing::debug!(table = %table, rows = count, "rows committed");
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "commit failed, table gone");
            }
        }
        // Writer returns to the pool here, emitting Release
    }

    /// Close idle writers at shutdown.
    pub fn close(&self) {
        let closed = self.writers.close_idle() + self.wal_writers.close_idle();
        tracing::debug!(writers = closed, "idle writers closed");
    }

    /// Counter snapshot, `None` when metrics are disabled.
    pub fn stats(&self) -> Option<EngineStats> {
        if !self.config.metrics_enabled {
            return None;
        }
        Some(EngineStats {
            statements: self.counters.statements.load(Ordering::Relaxed),
            failed_statements: self.counters.failed_statements.load(Ordering::Relaxed),
            apply_jobs: self.counters.apply_jobs.load(Ordering::Relaxed),
            rows_committed: self.counters.rows_committed.load(Ordering::Relaxed),
        })
    }

    fn emit_metadata(&self, kind: EventKind, name: &Arc<str>) {
        let event = LifecycleEvent::new(ResourceCategory::Metadata, kind, Some(Arc::clone(name)));
        self.dispatcher.dispatch(&event);
    }

    #[inline]
    fn count(&self, counter: &AtomicU64, n: u64) {
        if self.config.metrics_enabled {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }
}

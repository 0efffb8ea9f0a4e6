//! Table writer and reader pools.
//!
//! Every state change is reported to the engine's [`EventDispatcher`] on the
//! thread that caused it, after the pool's own lock has been released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::catalog::{Catalog, Trade};
use super::EngineError;
use crate::events::{EventDispatcher, EventKind, LifecycleEvent, ResourceCategory};

/// Default cap on concurrent readers per table.
pub const DEFAULT_MAX_READERS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    Idle,
    Acquired,
    Locked,
}

#[derive(Debug)]
struct WriterSlot {
    state: WriterState,
    /// Next WAL segment handed out.
    segment: i32,
}

/// One exclusive writer per table.
///
/// `category` is [`ResourceCategory::Writer`] for table writers and
/// [`ResourceCategory::WalWriter`] for write-ahead log writers.
#[derive(Debug)]
pub struct WriterPool {
    category: ResourceCategory,
    slots: Mutex<HashMap<Arc<str>, WriterSlot>>,
    dispatcher: EventDispatcher,
}

impl WriterPool {
    pub fn new(category: ResourceCategory, dispatcher: EventDispatcher) -> Arc<Self> {
        Arc::new(Self {
            category,
            slots: Mutex::new(HashMap::new()),
            dispatcher,
        })
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    /// Hand out the table's writer. Emits `Create` the first time a table's
    /// writer is opened, then `Acquire`. Emits `LockBusy` if it is in use.
    pub fn acquire(self: &Arc<Self>, table: &Arc<str>) -> Result<TableWriter, EngineError> {
        self.acquire_if(table, || true)
    }

    /// Like [`acquire`](Self::acquire), but only for the incarnation of the
    /// table that `table` was interned from. Fails with `TableNotFound` and
    /// emits nothing once the table has been dropped, even if a table of the
    /// same name exists again.
    pub fn acquire_current(
        self: &Arc<Self>,
        table: &Arc<str>,
        catalog: &Catalog,
    ) -> Result<TableWriter, EngineError> {
        self.acquire_if(table, || catalog.is_current(table))
    }

    fn acquire_if(
        self: &Arc<Self>,
        table: &Arc<str>,
        current: impl FnOnce() -> bool,
    ) -> Result<TableWriter, EngineError> {
        let (created, segment) = {
            let mut slots = self.lock_slots();
            // Checked under the slots lock: drop and create both need this
            // table's writer, so the answer holds while the writer is out.
            if !current() {
                return Err(EngineError::TableNotFound(table.to_string()));
            }

            let created = !slots.contains_key(table);
            let slot = slots.entry(Arc::clone(table)).or_insert(WriterSlot {
                state: WriterState::Idle,
                segment: 0,
            });

            if slot.state != WriterState::Idle {
                drop(slots);
                self.emit(EventKind::LockBusy, table);
                return Err(EngineError::WriterBusy(table.to_string()));
            }

            slot.state = WriterState::Acquired;
            let segment = slot.segment;
            slot.segment += 1;
            (created, segment)
        };

        if created {
            self.emit(EventKind::Create, table);
        }
        self.emit(EventKind::Acquire, table);

        Ok(TableWriter {
            pool: Arc::clone(self),
            table: Arc::clone(table),
            staged: Vec::new(),
            segment,
            position: 0,
        })
    }

    /// Lock the writer for a structural change. Emits `Lock`, and `Unlock`
    /// when the returned guard is dropped.
    pub fn lock(self: &Arc<Self>, table: &Arc<str>) -> Result<WriterLock, EngineError> {
        {
            let mut slots = self.lock_slots();
            let slot = slots.entry(Arc::clone(table)).or_insert(WriterSlot {
                state: WriterState::Idle,
                segment: 0,
            });
            if slot.state != WriterState::Idle {
                drop(slots);
                self.emit(EventKind::LockBusy, table);
                return Err(EngineError::WriterBusy(table.to_string()));
            }
            slot.state = WriterState::Locked;
        }

        self.emit(EventKind::Lock, table);
        Ok(WriterLock {
            pool: Arc::clone(self),
            table: Arc::clone(table),
        })
    }

    /// Drop the table's writer. Fails if it is in use.
    pub fn remove(&self, table: &Arc<str>) -> Result<(), EngineError> {
        {
            let mut slots = self.lock_slots();
            match slots.get(table) {
                Some(slot) if slot.state != WriterState::Idle => {
                    return Err(EngineError::WriterBusy(table.to_string()));
                }
                Some(_) => {
                    slots.remove(table);
                }
                None => return Ok(()),
            }
        }
        self.emit(EventKind::Remove, table);
        Ok(())
    }

    /// Close every idle writer, emitting `Expire` for each. Returns how many
    /// were closed.
    pub fn close_idle(&self) -> usize {
        let expired: Vec<Arc<str>> = {
            let mut slots = self.lock_slots();
            let idle: Vec<_> = slots
                .iter()
                .filter(|(_, slot)| slot.state == WriterState::Idle)
                .map(|(name, _)| Arc::clone(name))
                .collect();
            for name in &idle {
                slots.remove(name);
            }
            idle
        };

        for table in &expired {
            self.emit(EventKind::Expire, table);
        }
        expired.len()
    }

    /// True if the table's writer is currently handed out or locked.
    pub fn is_busy(&self, table: &str) -> bool {
        self.lock_slots()
            .get(table)
            .is_some_and(|slot| slot.state != WriterState::Idle)
    }

    fn set_idle(&self, table: &Arc<str>) {
        if let Some(slot) = self.lock_slots().get_mut(table) {
            slot.state = WriterState::Idle;
        }
    }

    fn emit(&self, kind: EventKind, table: &Arc<str>) {
        let event = LifecycleEvent::new(self.category, kind, Some(Arc::clone(table)));
        self.dispatcher.dispatch(&event);
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<Arc<str>, WriterSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive handle on a table's writer. Returned to the pool on drop,
/// which emits `Release`.
#[derive(Debug)]
pub struct TableWriter {
    pool: Arc<WriterPool>,
    table: Arc<str>,
    staged: Vec<Trade>,
    segment: i32,
    position: i64,
}

impl TableWriter {
    pub fn table(&self) -> &Arc<str> {
        &self.table
    }

    /// Stage rows; they stay invisible until [`commit`](Self::commit).
    pub fn append(&mut self, rows: impl IntoIterator<Item = Trade>) {
        self.staged.extend(rows);
    }

    /// Number of staged rows.
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Publish staged rows to `catalog`. Returns the number committed.
    pub fn commit(&mut self, catalog: &Catalog) -> Result<usize, EngineError> {
        let rows = std::mem::take(&mut self.staged);
        let count = catalog.commit(&self.table, rows)?;
        self.position += count as i64;
        Ok(count)
    }

    /// Hand staged rows over without committing (WAL segment hand-off).
    pub fn take_staged(&mut self) -> Vec<Trade> {
        let rows = std::mem::take(&mut self.staged);
        self.position += rows.len() as i64;
        rows
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            tracing::warn!(
                table = %self.table,
                rows = self.staged.len(),
                "writer released with uncommitted rows"
            );
        }

        self.pool.set_idle(&self.table);

        let mut event =
            LifecycleEvent::new(self.pool.category, EventKind::Release, Some(Arc::clone(&self.table)));
        if self.pool.category == ResourceCategory::WalWriter {
            event = event.with_position(self.segment, self.position);
        }
        self.pool.dispatcher.dispatch(&event);
    }
}

/// Structural lock on a table's writer. Emits `Unlock` on drop.
#[derive(Debug)]
pub struct WriterLock {
    pool: Arc<WriterPool>,
    table: Arc<str>,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        self.pool.set_idle(&self.table);
        self.pool.emit(EventKind::Unlock, &self.table);
    }
}

/// Bounded shared access to tables for queries.
#[derive(Debug)]
pub struct ReaderPool {
    max_per_table: usize,
    active: Mutex<HashMap<Arc<str>, usize>>,
    dispatcher: EventDispatcher,
}

impl ReaderPool {
    pub fn new(max_per_table: usize, dispatcher: EventDispatcher) -> Arc<Self> {
        Arc::new(Self {
            max_per_table,
            active: Mutex::new(HashMap::new()),
            dispatcher,
        })
    }

    /// Take a reader lease. Emits `Acquire`, or `Full` if the table already
    /// has the maximum number of readers.
    pub fn acquire(self: &Arc<Self>, table: &Arc<str>) -> Result<TableReader, EngineError> {
        let admitted = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let count = active.entry(Arc::clone(table)).or_insert(0);
            if *count >= self.max_per_table {
                false
            } else {
                *count += 1;
                true
            }
        };

        if !admitted {
            self.emit(EventKind::Full, table);
            return Err(EngineError::ReaderPoolFull(table.to_string()));
        }

        self.emit(EventKind::Acquire, table);
        Ok(TableReader {
            pool: Arc::clone(self),
            table: Arc::clone(table),
        })
    }

    /// Current number of leases on `table`.
    pub fn active(&self, table: &str) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    fn emit(&self, kind: EventKind, table: &Arc<str>) {
        let event = LifecycleEvent::new(ResourceCategory::Reader, kind, Some(Arc::clone(table)));
        self.dispatcher.dispatch(&event);
    }
}

/// Reader lease. Emits `Release` on drop.
#[derive(Debug)]
pub struct TableReader {
    pool: Arc<ReaderPool>,
    table: Arc<str>,
}

impl Drop for TableReader {
    fn drop(&mut self) {
        {
            let mut active = self.pool.active.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(count) = active.get_mut(&self.table) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    active.remove(&self.table);
                }
            }
        }
        self.pool.emit(EventKind::Release, &self.table);
    }
}

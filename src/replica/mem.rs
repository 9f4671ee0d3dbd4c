//! In-memory database for tests and embedding examples.
//!
//! Tables carry a fixed on-disk size, can be dropped at any time, can be told
//! to fail, and can be paused mid-compaction with a [`CompactionGate`]. Every
//! compaction is recorded in a [`CompactionJournal`] shared across shards.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::Notify;

use super::{Database, NoSuchTable, Table, TableError, TableId, TableStats};
use crate::{sharded::ShardId, task::TaskModule};

/// Compaction start/finish, in the order shards reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionEvent {
    /// A compaction began.
    Started {
        /// Shard that ran it.
        shard: Option<ShardId>,
        /// Table compacted.
        table: TableId,
    },
    /// A compaction ended.
    Finished {
        /// Shard that ran it.
        shard: Option<ShardId>,
        /// Table compacted.
        table: TableId,
        /// Whether it succeeded.
        succeeded: bool,
    },
}

impl CompactionEvent {
    fn shard(&self) -> Option<ShardId> {
        match self {
            CompactionEvent::Started { shard, .. } | CompactionEvent::Finished { shard, .. } => {
                *shard
            }
        }
    }
}

/// Cross-shard log of compactions.
#[derive(Debug, Clone, Default)]
pub struct CompactionJournal {
    events: Arc<Mutex<Vec<CompactionEvent>>>,
}

impl CompactionJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: CompactionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<CompactionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tables whose compaction started on `shard`, in start order.
    #[must_use]
    pub fn started_on(&self, shard: ShardId) -> Vec<TableId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CompactionEvent::Started {
                    shard: Some(on),
                    table,
                } if on == shard => Some(table),
                _ => None,
            })
            .collect()
    }

    /// Tables compacted successfully on `shard`, in completion order.
    #[must_use]
    pub fn completed_on(&self, shard: ShardId) -> Vec<TableId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CompactionEvent::Finished {
                    shard: Some(on),
                    table,
                    succeeded: true,
                } if on == shard => Some(table),
                _ => None,
            })
            .collect()
    }

    /// Largest number of compactions that were in flight at once on `shard`.
    #[must_use]
    pub fn max_concurrency(&self, shard: ShardId) -> usize {
        let mut in_flight = 0usize;
        let mut max = 0usize;
        for event in self.events() {
            if event.shard() != Some(shard) {
                continue;
            }
            match event {
                CompactionEvent::Started { .. } => {
                    in_flight += 1;
                    max = max.max(in_flight);
                }
                CompactionEvent::Finished { .. } => in_flight = in_flight.saturating_sub(1),
            }
        }
        max
    }
}

/// Pauses a table's compaction until released.
#[derive(Debug, Default)]
pub struct CompactionGate {
    entered: Notify,
    release: Notify,
}

impl CompactionGate {
    /// Create a closed gate.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a compaction reaches the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the waiting (or next) compaction through.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// In-memory table.
pub struct MemTable {
    id: TableId,
    live_disk_space_used: Cell<i64>,
    failure: RefCell<Option<TableError>>,
    gate: Option<Arc<CompactionGate>>,
    journal: Option<CompactionJournal>,
    dropped: Cell<bool>,
    compactions: Cell<u64>,
}

impl MemTable {
    /// Table `id` occupying `live_disk_space_used` bytes.
    #[must_use]
    pub fn new(id: TableId, live_disk_space_used: i64) -> Self {
        Self {
            id,
            live_disk_space_used: Cell::new(live_disk_space_used),
            failure: RefCell::new(None),
            gate: None,
            journal: None,
            dropped: Cell::new(false),
            compactions: Cell::new(0),
        }
    }

    /// Make every compaction fail with `err`.
    #[must_use]
    pub fn with_failure(self, err: TableError) -> Self {
        *self.failure.borrow_mut() = Some(err);
        self
    }

    /// Pause compactions at `gate`.
    #[must_use]
    pub fn with_gate(self, gate: Arc<CompactionGate>) -> Self {
        Self {
            gate: Some(gate),
            ..self
        }
    }

    /// Record compactions into `journal`.
    #[must_use]
    pub fn with_journal(self, journal: CompactionJournal) -> Self {
        Self {
            journal: Some(journal),
            ..self
        }
    }

    /// Update the reported on-disk size.
    pub fn set_live_disk_space_used(&self, bytes: i64) {
        self.live_disk_space_used.set(bytes);
    }

    /// Number of successful compactions.
    #[must_use]
    pub fn compactions(&self) -> u64 {
        self.compactions.get()
    }

    fn record(&self, event: CompactionEvent) {
        if let Some(journal) = &self.journal {
            journal.record(event);
        }
    }
}

impl Table for MemTable {
    fn id(&self) -> TableId {
        self.id
    }

    fn stats(&self) -> TableStats {
        TableStats {
            live_disk_space_used: self.live_disk_space_used.get(),
        }
    }

    async fn compact_all_sstables(&self) -> Result<(), TableError> {
        let shard = ShardId::current();
        self.record(CompactionEvent::Started {
            shard,
            table: self.id,
        });
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        let failure = self.failure.borrow().clone();
        let outcome = if self.dropped.get() {
            Err(TableError::NoSuchTable(NoSuchTable { table: self.id }))
        } else if let Some(err) = failure {
            Err(err)
        } else {
            self.compactions.set(self.compactions.get() + 1);
            Ok(())
        };
        self.record(CompactionEvent::Finished {
            shard,
            table: self.id,
            succeeded: outcome.is_ok(),
        });
        outcome
    }
}

/// In-memory shard-local database.
pub struct MemDatabase {
    module: TaskModule,
    tables: RefCell<HashMap<TableId, Rc<MemTable>>>,
}

impl MemDatabase {
    /// Empty database registering its compaction tasks with `module`.
    #[must_use]
    pub fn new(module: TaskModule) -> Self {
        Self {
            module,
            tables: RefCell::new(HashMap::new()),
        }
    }

    /// Add (or replace) a table.
    pub fn add_table(&self, table: MemTable) -> Rc<MemTable> {
        let table = Rc::new(table);
        self.tables.borrow_mut().insert(table.id, Rc::clone(&table));
        table
    }

    /// Drop a table; in-flight operations on it observe the drop.
    pub fn drop_table(&self, id: &TableId) -> Option<Rc<MemTable>> {
        let table = self.tables.borrow_mut().remove(id)?;
        table.dropped.set(true);
        Some(table)
    }

    /// Ids of the tables that currently exist.
    #[must_use]
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<_> = self.tables.borrow().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Database for MemDatabase {
    type Table = MemTable;

    fn find_table(&self, id: &TableId) -> Result<Rc<MemTable>, NoSuchTable> {
        self.tables
            .borrow()
            .get(id)
            .cloned()
            .ok_or(NoSuchTable { table: *id })
    }

    fn compaction_task_module(&self) -> &TaskModule {
        &self.module
    }
}

//! Shard-local view of the database that compaction operates on.
//!
//! The storage engine itself lives elsewhere; compaction only needs to resolve
//! table ids to live handles, read their on-disk footprint and ask them to
//! compact. [`mem`] provides an in-memory implementation.

mod error;
pub mod mem;

use std::{fmt, future::Future, rc::Rc};

use ulid::Ulid;

pub use self::error::{NoSuchTable, TableError};
use crate::{id::generate_id, task::TaskModule};

/// Stable identifier of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(Ulid);

impl TableId {
    /// Create a new identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(generate_id())
    }
}

impl Default for TableId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for TableId {
    fn from(value: Ulid) -> Self {
        Self(value)
    }
}

impl From<TableId> for Ulid {
    fn from(value: TableId) -> Self {
        value.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time statistics of a table on one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Bytes currently occupied on disk by live SSTables.
    pub live_disk_space_used: i64,
}

/// Live handle to a table's shard-local data.
pub trait Table: 'static {
    /// Identifier of the table.
    fn id(&self) -> TableId;

    /// Current statistics.
    fn stats(&self) -> TableStats;

    /// Merge all SSTables of the table into a minimal set.
    fn compact_all_sstables(&self) -> impl Future<Output = Result<(), TableError>>;
}

/// Shard-local database.
pub trait Database: 'static {
    /// Table handle type.
    type Table: Table;

    /// Resolve a table; fails with [`NoSuchTable`] once the table is dropped.
    fn find_table(&self, id: &TableId) -> Result<Rc<Self::Table>, NoSuchTable>;

    /// Task module used to register compaction tasks on this shard.
    fn compaction_task_module(&self) -> &TaskModule;
}

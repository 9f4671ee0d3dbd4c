use thiserror::Error;

use crate::{
    replica::{TableError, TableId},
    sharded::ShardError,
    task::TaskError,
};

/// Errors that terminate a compaction task.
#[derive(Debug, Clone, Error)]
pub enum CompactionError {
    /// A table operation failed for a reason other than the table being dropped.
    #[error("failed {op} of {keyspace}.{table}: {source}")]
    Failed {
        /// Operation label, e.g. "force_keyspace_compaction".
        op: &'static str,
        /// Keyspace of the table.
        keyspace: String,
        /// Table whose operation failed.
        table: TableId,
        /// Underlying table error.
        source: TableError,
    },
    /// The task was aborted before all tables were processed.
    #[error("compaction cancelled")]
    Cancelled,
    /// A shard could not run its share of the work.
    #[error("compaction shard error: {0}")]
    Shard(#[from] ShardError),
    /// The task framework rejected or lost a task.
    #[error("compaction task error: {0}")]
    Task(#[from] TaskError),
}

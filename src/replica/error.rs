use std::{io, sync::Arc};

use thiserror::Error;

use super::TableId;

/// The table no longer exists; it was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no such table: {table}")]
pub struct NoSuchTable {
    /// Table that failed to resolve.
    pub table: TableId,
}

/// Errors reported by a table operation.
#[derive(Debug, Clone, Error)]
pub enum TableError {
    /// The table was dropped while the operation ran.
    #[error(transparent)]
    NoSuchTable(#[from] NoSuchTable),
    /// Storage I/O failed.
    #[error("table io error: {0}")]
    Io(Arc<io::Error>),
    /// The operation was aborted by the storage engine.
    #[error("table operation aborted")]
    Aborted,
    /// An internal invariant was violated.
    #[error("table invariant violated: {0}")]
    Internal(String),
}

impl From<io::Error> for TableError {
    fn from(err: io::Error) -> Self {
        TableError::Io(Arc::new(err))
    }
}

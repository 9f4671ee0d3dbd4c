//! Sequential per-table execution that tolerates dropped tables.

use std::{future::Future, rc::Rc};

use tokio_util::sync::CancellationToken;

use super::error::CompactionError;
use crate::{
    observability::{log_debug, log_error, log_warn},
    replica::{Database, TableError, TableId},
};

/// Run `func` on each table of `tables` in order, skipping dropped tables.
///
/// A table that fails to resolve, or whose operation reports it was dropped,
/// is skipped with a warning. Any other failure stops the iteration and is
/// returned; tables after it are not attempted. `abort` is checked before
/// each table; an operation already in flight is not interrupted.
pub async fn run_on_existing_tables<D, F, Fut>(
    op: &'static str,
    db: &D,
    keyspace: &str,
    tables: &[TableId],
    abort: &CancellationToken,
    mut func: F,
) -> Result<(), CompactionError>
where
    D: Database,
    F: FnMut(Rc<D::Table>) -> Fut,
    Fut: Future<Output = Result<(), TableError>>,
{
    for table in tables {
        if abort.is_cancelled() {
            log_error!(
                component = "compaction",
                event = "table_op_cancelled",
                op,
                keyspace,
                table = %table,
            );
            return Err(CompactionError::Cancelled);
        }
        log_debug!(
            component = "compaction",
            event = "table_op_started",
            op,
            keyspace,
            table = %table,
        );
        let outcome = match db.find_table(table) {
            Ok(handle) => func(handle).await,
            Err(err) => Err(TableError::from(err)),
        };
        match outcome {
            Ok(()) => {}
            Err(TableError::NoSuchTable(err)) => {
                log_warn!(
                    component = "compaction",
                    event = "table_op_skipped",
                    op,
                    keyspace,
                    table = %table,
                    reason = %err,
                );
            }
            Err(source) => {
                log_error!(
                    component = "compaction",
                    event = "table_op_failed",
                    op,
                    keyspace,
                    table = %table,
                    error = %source,
                );
                return Err(CompactionError::Failed {
                    op,
                    keyspace: keyspace.to_owned(),
                    table: *table,
                    source,
                });
            }
        }
    }
    Ok(())
}

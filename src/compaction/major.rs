//! Keyspace-wide major compaction.
//!
//! [`MajorKeyspaceCompactionTask`] is the user-visible, cluster-wide task. It
//! fans out to every shard and starts one [`ShardMajorKeyspaceCompactionTask`]
//! child per shard, which major-compacts the keyspace's tables on that shard
//! one at a time, smallest first.

use std::{collections::HashSet, rc::Rc};

use super::{error::CompactionError, runner::run_on_existing_tables};
use crate::{
    observability::{log_debug, log_info},
    replica::{Database, Table, TableError, TableId},
    sharded::{ShardId, Sharded},
    task::{TaskContext, TaskHandle, TaskId, TaskImpl, TaskInfo},
};

/// Operation label used in per-table logs.
pub const FORCE_KEYSPACE_COMPACTION: &str = "force_keyspace_compaction";

/// Task type name reported for both the coordinator and its shard children.
pub const MAJOR_COMPACTION: &str = "major compaction";

/// Shard the coordinator task is registered on.
const COORDINATOR_SHARD: ShardId = ShardId::new(0);

/// Sort `tables` by live on-disk size, smallest first.
///
/// Sizes are read once. Tables that no longer resolve get key -1 and sort to
/// the front. The sort is stable.
pub fn sort_by_live_disk_space<D: Database>(db: &D, tables: &mut Vec<TableId>) {
    let mut keyed: Vec<(i64, TableId)> = tables
        .drain(..)
        .map(|id| {
            let size = db
                .find_table(&id)
                .map(|table| table.stats().live_disk_space_used)
                .unwrap_or(-1);
            (size, id)
        })
        .collect();
    keyed.sort_by_key(|(size, _)| *size);
    tables.extend(keyed.into_iter().map(|(_, id)| id));
}

/// Remove repeated table ids, keeping the first occurrence of each.
pub(crate) fn dedup_tables(tables: &mut Vec<TableId>) {
    let mut seen = HashSet::with_capacity(tables.len());
    tables.retain(|table| seen.insert(*table));
}

/// Major compaction of a keyspace's tables on one shard.
pub struct ShardMajorKeyspaceCompactionTask<D> {
    db: Rc<D>,
    keyspace: String,
    correlation_id: TaskId,
    local_tables: Vec<TableId>,
}

impl<D: Database> ShardMajorKeyspaceCompactionTask<D> {
    /// Compact `local_tables` of `keyspace` in `db` on behalf of `correlation_id`.
    pub fn new(
        db: Rc<D>,
        keyspace: impl Into<String>,
        correlation_id: TaskId,
        local_tables: Vec<TableId>,
    ) -> Self {
        Self {
            db,
            keyspace: keyspace.into(),
            correlation_id,
            local_tables,
        }
    }
}

impl<D: Database> TaskImpl for ShardMajorKeyspaceCompactionTask<D> {
    type Error = CompactionError;

    fn type_name(&self) -> &'static str {
        MAJOR_COMPACTION
    }

    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn is_internal(&self) -> bool {
        true
    }

    fn correlation_id(&self) -> Option<TaskId> {
        Some(self.correlation_id)
    }

    async fn run(mut self, ctx: TaskContext) -> Result<(), CompactionError> {
        // Smaller tables first: each success frees space for the larger ones.
        sort_by_live_disk_space(self.db.as_ref(), &mut self.local_tables);
        ctx.set_total(self.local_tables.len() as u64);
        log_debug!(
            component = "compaction",
            event = "shard_major_compaction_started",
            task_id = %ctx.id(),
            correlation_id = %self.correlation_id,
            keyspace = %self.keyspace,
            tables = self.local_tables.len(),
        );

        run_on_existing_tables(
            FORCE_KEYSPACE_COMPACTION,
            self.db.as_ref(),
            &self.keyspace,
            &self.local_tables,
            ctx.abort_token(),
            |table| {
                let ctx = &ctx;
                async move {
                    table.compact_all_sstables().await?;
                    ctx.advance(1);
                    Ok::<(), TableError>(())
                }
            },
        )
        .await?;
        ctx.complete();
        Ok(())
    }
}

/// Major compaction of a keyspace across every shard of the process.
pub struct MajorKeyspaceCompactionTask<D> {
    sharded: Sharded<D>,
    keyspace: String,
    tables: Vec<TableId>,
}

impl<D: Database> MajorKeyspaceCompactionTask<D> {
    /// Compact `tables` of `keyspace` on every shard of `sharded`.
    ///
    /// Repeated table ids are compacted once.
    pub fn new(sharded: Sharded<D>, keyspace: impl Into<String>, mut tables: Vec<TableId>) -> Self {
        dedup_tables(&mut tables);
        Self {
            sharded,
            keyspace: keyspace.into(),
            tables,
        }
    }
}

impl<D: Database> TaskImpl for MajorKeyspaceCompactionTask<D> {
    type Error = CompactionError;

    fn type_name(&self) -> &'static str {
        MAJOR_COMPACTION
    }

    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn is_cluster_wide(&self) -> bool {
        true
    }

    async fn run(self, ctx: TaskContext) -> Result<(), CompactionError> {
        let parent: TaskInfo = ctx.info();
        let keyspace = self.keyspace;
        let tables = self.tables;
        log_info!(
            component = "compaction",
            event = "major_keyspace_compaction_started",
            task_id = %parent.id,
            keyspace = %keyspace,
            tables = tables.len(),
            shards = self.sharded.shard_count(),
        );

        // Siblings keep running when one shard fails.
        self.sharded
            .invoke_on_all(move |db: Rc<D>| async move {
                let task = ShardMajorKeyspaceCompactionTask::new(
                    Rc::clone(&db),
                    keyspace,
                    parent.id,
                    tables,
                );
                let child = db
                    .compaction_task_module()
                    .make_and_start_task(Some(parent), task)?;
                child.done().await
            })
            .await?;
        // Children with nothing left to do after the abort still succeed.
        if ctx.abort_token().is_cancelled() {
            return Err(CompactionError::Cancelled);
        }
        Ok(())
    }
}

/// Start a keyspace-wide major compaction of `tables`.
///
/// The coordinator is registered on the first shard's compaction module as a
/// top-level task; await [`TaskHandle::done`] for the outcome or call
/// [`TaskHandle::abort`] to cancel.
pub async fn force_keyspace_compaction<D: Database>(
    sharded: &Sharded<D>,
    keyspace: impl Into<String>,
    tables: Vec<TableId>,
) -> Result<TaskHandle<CompactionError>, CompactionError> {
    let keyspace = keyspace.into();
    let coordinator_sharded = sharded.clone();
    let handle = sharded
        .invoke_on(COORDINATOR_SHARD, move |db: Rc<D>| async move {
            let task = MajorKeyspaceCompactionTask::new(coordinator_sharded, keyspace, tables);
            db.compaction_task_module().make_and_start_task(None, task)
        })
        .await??;
    Ok(handle)
}

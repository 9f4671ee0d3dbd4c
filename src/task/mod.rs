//! Task framework for long-running, observable, cancellable operations.
//!
//! A [`TaskManager`] is shared by every shard of the process. Each shard reaches
//! it through a named [`TaskModule`], which registers tasks, links children to
//! their parents and spawns `run()` on the shard's executor. Cancellation is
//! cooperative: aborting a task cancels its token, and every child's token is
//! derived from its parent's.

mod error;
mod manager;
mod status;

use std::{future::Future, sync::Arc};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use self::{
    error::TaskError,
    manager::TaskManager,
    status::{TaskId, TaskInfo, TaskProgress, TaskState, TaskStatus},
};
use self::manager::TaskEntry;
use crate::{
    observability::{log_debug, log_info},
    sharded::ShardId,
};

/// Behaviour of a concrete task kind.
pub trait TaskImpl: 'static {
    /// Error the task terminates with.
    type Error: std::error::Error + Clone + From<TaskError> + Send + Sync + 'static;

    /// Kind of work, e.g. "major compaction".
    fn type_name(&self) -> &'static str;

    /// Keyspace the task operates on.
    fn keyspace(&self) -> &str;

    /// Internal tasks are children started on behalf of another task.
    fn is_internal(&self) -> bool {
        false
    }

    /// Cluster-wide tasks are not owned by the shard that runs them.
    fn is_cluster_wide(&self) -> bool {
        false
    }

    /// Id of the operation this task is part of.
    fn correlation_id(&self) -> Option<TaskId> {
        None
    }

    /// Perform the work.
    fn run(self, ctx: TaskContext) -> impl Future<Output = Result<(), Self::Error>>;
}

/// What a running task may observe about itself.
pub struct TaskContext {
    info: TaskInfo,
    entry: Arc<TaskEntry>,
}

impl TaskContext {
    /// `(id, shard)` of the running task, to be handed to children as their parent.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        self.info
    }

    /// Id of the running task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.info.id
    }

    /// Token cancelled when the task or one of its ancestors is aborted.
    #[must_use]
    pub fn abort_token(&self) -> &CancellationToken {
        self.entry.abort_token()
    }

    /// Announce the number of work units this task will process.
    pub fn set_total(&self, total: u64) {
        self.entry.update_progress(|progress| progress.total = total);
    }

    /// Record `units` more completed work units.
    pub fn advance(&self, units: u64) {
        self.entry
            .update_progress(|progress| progress.completed += units);
    }

    /// Mark every announced unit as completed.
    pub fn complete(&self) {
        self.entry
            .update_progress(|progress| progress.completed = progress.total);
    }
}

/// Per-shard entry point into the [`TaskManager`].
#[derive(Clone)]
pub struct TaskModule {
    name: &'static str,
    shard: ShardId,
    manager: Arc<TaskManager>,
}

impl TaskModule {
    pub(crate) fn new(name: &'static str, shard: ShardId, manager: Arc<TaskManager>) -> Self {
        Self {
            name,
            shard,
            manager,
        }
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Shard the module belongs to.
    #[must_use]
    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Registry shared by all modules.
    #[must_use]
    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// Register `task` as a child of `parent` (or as a top-level task) and start it.
    ///
    /// Must be called on the module's shard; `run()` is spawned on that shard's
    /// executor and begins once the caller yields.
    pub fn make_and_start_task<T>(
        &self,
        parent: Option<TaskInfo>,
        task: T,
    ) -> Result<TaskHandle<T::Error>, TaskError>
    where
        T: TaskImpl,
    {
        let current = ShardId::current();
        if current != Some(self.shard) {
            return Err(TaskError::WrongShard {
                module: self.shard,
                current,
            });
        }

        let id = TaskId::new();
        let parent_entry = match parent {
            Some(parent) => Some(
                self.manager
                    .entry(parent.id)
                    .ok_or(TaskError::UnknownParent(parent.id))?,
            ),
            None => None,
        };
        let (abort, sequence_number) = match &parent_entry {
            Some(entry) => (entry.abort_token().child_token(), entry.sequence_number()),
            None => (CancellationToken::new(), self.manager.next_sequence()),
        };
        let shard = if task.is_cluster_wide() {
            None
        } else {
            Some(self.shard)
        };
        let info = TaskInfo { id, shard };
        let is_internal = task.is_internal();
        let status = TaskStatus {
            id,
            type_name: task.type_name(),
            module: self.name,
            state: TaskState::Created,
            keyspace: task.keyspace().to_owned(),
            shard,
            parent_id: parent.map(|parent| parent.id),
            correlation_id: task.correlation_id(),
            sequence_number,
            is_internal,
            start_time: None,
            end_time: None,
            error: None,
        };

        let parent_id = status.parent_id;
        let entry = Arc::new(TaskEntry::new(status, abort));
        self.manager.register(Arc::clone(&entry));
        if let Some(parent_entry) = parent_entry {
            parent_entry.add_child(info);
        }
        log_debug!(
            component = "task",
            event = "task_created",
            module = self.name,
            task_id = %id,
            parent_id = ?parent_id,
            shard = ?shard,
            type_name = task.type_name(),
        );

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let ctx = TaskContext {
            info,
            entry: Arc::clone(&entry),
        };
        let running = Arc::clone(&entry);
        tokio::task::spawn_local(async move {
            running.mark_running();
            let result = task.run(ctx).await;
            let error = result.as_ref().err().map(ToString::to_string);
            match &error {
                None if is_internal => {
                    log_debug!(component = "task", event = "task_done", task_id = %id)
                }
                None => log_info!(component = "task", event = "task_done", task_id = %id),
                Some(error) => log_info!(
                    component = "task",
                    event = "task_failed",
                    task_id = %id,
                    error = %error,
                ),
            }
            running.finish(error);
            let _ = outcome_tx.send(Some(result));
        });

        Ok(TaskHandle {
            entry,
            outcome: outcome_rx,
        })
    }
}

/// Handle to a started task, usable from any thread.
pub struct TaskHandle<E> {
    entry: Arc<TaskEntry>,
    outcome: watch::Receiver<Option<Result<(), E>>>,
}

impl<E> Clone for TaskHandle<E> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            outcome: self.outcome.clone(),
        }
    }
}

impl<E> TaskHandle<E>
where
    E: Clone + From<TaskError>,
{
    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.entry.info().id
    }

    /// `(id, shard)` of the task.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        self.entry.info()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.entry.status()
    }

    /// Request cooperative cancellation of the task and its children.
    pub fn abort(&self) {
        self.entry.abort_token().cancel();
    }

    /// Wait for the task to reach a terminal state and return its outcome.
    pub async fn done(&self) -> Result<(), E> {
        let mut outcome = self.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(current) => (*current).clone(),
            Err(_) => None,
        };
        result.unwrap_or_else(|| Err(E::from(TaskError::Dropped(self.id()))))
    }
}

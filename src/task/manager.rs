//! Process-wide task registry.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::SystemTime,
};

use tokio_util::sync::CancellationToken;

use super::{
    error::TaskError,
    status::{TaskId, TaskInfo, TaskProgress, TaskState, TaskStatus},
    TaskModule,
};
use crate::sharded::ShardId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry entry shared by the running task, its handles and the manager.
pub(crate) struct TaskEntry {
    status: Mutex<TaskStatus>,
    children: Mutex<Vec<TaskInfo>>,
    progress: Mutex<Option<TaskProgress>>,
    abort: CancellationToken,
}

impl TaskEntry {
    pub(crate) fn new(status: TaskStatus, abort: CancellationToken) -> Self {
        Self {
            status: Mutex::new(status),
            children: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            abort,
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        lock(&self.status).clone()
    }

    pub(crate) fn info(&self) -> TaskInfo {
        lock(&self.status).info()
    }

    pub(crate) fn sequence_number(&self) -> u64 {
        lock(&self.status).sequence_number
    }

    pub(crate) fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    pub(crate) fn add_child(&self, child: TaskInfo) {
        lock(&self.children).push(child);
    }

    pub(crate) fn children(&self) -> Vec<TaskInfo> {
        lock(&self.children).clone()
    }

    pub(crate) fn progress(&self) -> Option<TaskProgress> {
        *lock(&self.progress)
    }

    pub(crate) fn update_progress(&self, update: impl FnOnce(&mut TaskProgress)) {
        let mut guard = lock(&self.progress);
        update(guard.get_or_insert_with(TaskProgress::default));
    }

    pub(crate) fn mark_running(&self) {
        let mut status = lock(&self.status);
        status.state = TaskState::Running;
        status.start_time = Some(SystemTime::now());
    }

    pub(crate) fn finish(&self, error: Option<String>) {
        let mut status = lock(&self.status);
        status.state = if error.is_some() {
            TaskState::Failed
        } else {
            TaskState::Done
        };
        status.end_time = Some(SystemTime::now());
        status.error = error;
    }
}

/// Registry of every task started on any shard of the process.
///
/// Finished tasks stay queryable until [`TaskManager::release`] forgets them.
#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<HashMap<TaskId, Arc<TaskEntry>>>,
    sequence: AtomicU64,
}

impl TaskManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Per-shard view named `name`, used to start tasks on `shard`.
    #[must_use]
    pub fn module(self: &Arc<Self>, name: &'static str, shard: ShardId) -> TaskModule {
        TaskModule::new(name, shard, Arc::clone(self))
    }

    /// Current status of a task.
    pub fn status(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        self.entry(id)
            .map(|entry| entry.status())
            .ok_or(TaskError::NotFound(id))
    }

    /// Statuses of registered tasks ordered by submission.
    ///
    /// Internal tasks are included only when `include_internal` is set.
    pub fn list(&self, include_internal: bool) -> Vec<TaskStatus> {
        let entries: Vec<_> = lock(&self.tasks).values().cloned().collect();
        let mut statuses: Vec<_> = entries
            .iter()
            .map(|entry| entry.status())
            .filter(|status| include_internal || !status.is_internal)
            .collect();
        statuses.sort_by_key(|status| (status.sequence_number, status.id));
        statuses
    }

    /// Children created with `id` as their parent, in creation order.
    pub fn children(&self, id: TaskId) -> Result<Vec<TaskInfo>, TaskError> {
        self.entry(id)
            .map(|entry| entry.children())
            .ok_or(TaskError::NotFound(id))
    }

    /// Progress of a task.
    ///
    /// Tasks that report no progress of their own aggregate their children.
    pub fn progress(&self, id: TaskId) -> Result<TaskProgress, TaskError> {
        let entry = self.entry(id).ok_or(TaskError::NotFound(id))?;
        if let Some(progress) = entry.progress() {
            return Ok(progress);
        }
        Ok(entry
            .children()
            .into_iter()
            .filter_map(|child| self.progress(child.id).ok())
            .fold(TaskProgress::default(), |acc, progress| acc + progress))
    }

    /// Request cancellation of a task and, transitively, all of its children.
    pub fn abort(&self, id: TaskId) -> Result<(), TaskError> {
        let entry = self.entry(id).ok_or(TaskError::NotFound(id))?;
        entry.abort_token().cancel();
        Ok(())
    }

    /// Forget a finished task and its descendants, returning its final status.
    pub fn release(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        let entry = self.entry(id).ok_or(TaskError::NotFound(id))?;
        let status = entry.status();
        if !status.state.is_terminal() {
            return Err(TaskError::NotFinished(id));
        }
        let mut pending = vec![id];
        let mut tasks = lock(&self.tasks);
        while let Some(next) = pending.pop() {
            if let Some(removed) = tasks.remove(&next) {
                pending.extend(removed.children().into_iter().map(|child| child.id));
            }
        }
        Ok(status)
    }

    pub(crate) fn register(&self, entry: Arc<TaskEntry>) {
        let id = entry.info().id;
        lock(&self.tasks).insert(id, entry);
    }

    pub(crate) fn entry(&self, id: TaskId) -> Option<Arc<TaskEntry>> {
        lock(&self.tasks).get(&id).cloned()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

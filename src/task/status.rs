use std::{fmt, ops::Add, time::SystemTime};

use ulid::Ulid;

use crate::{id::generate_id, sharded::ShardId};

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(Ulid);

impl TaskId {
    /// Allocate a fresh, time-ordered task id.
    #[must_use]
    pub fn new() -> Self {
        Self(generate_id())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for TaskId {
    fn from(value: Ulid) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a task as seen by its children.
///
/// `shard` is `None` for cluster-wide tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskInfo {
    /// Task identifier.
    pub id: TaskId,
    /// Owning shard, `None` when the task spans the cluster.
    pub shard: Option<ShardId>,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered, not yet polled.
    Created,
    /// `run()` is in progress.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl TaskState {
    /// Whether the task has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// Snapshot of a task's bookkeeping.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    /// Task identifier.
    pub id: TaskId,
    /// Kind of work, e.g. "major compaction".
    pub type_name: &'static str,
    /// Name of the module that created the task.
    pub module: &'static str,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Keyspace operated on.
    pub keyspace: String,
    /// Owning shard, `None` for cluster-wide tasks.
    pub shard: Option<ShardId>,
    /// Parent task, `None` for top-level tasks.
    pub parent_id: Option<TaskId>,
    /// Id of the operation this task belongs to, when it is part of a larger one.
    pub correlation_id: Option<TaskId>,
    /// Submission order of the top-level task; children inherit it.
    pub sequence_number: u64,
    /// Internal tasks are children spawned on behalf of a user-visible task.
    pub is_internal: bool,
    /// When `run()` started.
    pub start_time: Option<SystemTime>,
    /// When the task reached a terminal state.
    pub end_time: Option<SystemTime>,
    /// Rendered error for failed tasks.
    pub error: Option<String>,
}

impl TaskStatus {
    /// `(id, shard)` pair used to parent children on this task.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            shard: self.shard,
        }
    }
}

/// Units of work done out of the units known so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskProgress {
    /// Completed units.
    pub completed: u64,
    /// Total units.
    pub total: u64,
}

impl Add for TaskProgress {
    type Output = TaskProgress;

    fn add(self, rhs: Self) -> Self::Output {
        TaskProgress {
            completed: self.completed + rhs.completed,
            total: self.total + rhs.total,
        }
    }
}

use thiserror::Error;

use super::TaskId;
use crate::sharded::ShardId;

/// Errors raised by the task framework itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The parent named when creating a child is not registered.
    #[error("unknown parent task {0}")]
    UnknownParent(TaskId),
    /// No task with this id is registered.
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// The task has not reached a terminal state yet.
    #[error("task {0} has not finished")]
    NotFinished(TaskId),
    /// The task was dropped by its shard before reporting an outcome.
    #[error("task {0} was dropped before completing")]
    Dropped(TaskId),
    /// A module was asked to start a task from outside its own shard.
    #[error("task module of {module} used from {current:?}")]
    WrongShard {
        /// Shard owning the module.
        module: ShardId,
        /// Shard of the calling thread, `None` when off-shard.
        current: Option<ShardId>,
    },
}

//! Structured events emitted by the sharded runtime, the task framework and
//! the compaction orchestrator.
//!
//! Every event goes to the `keyspace_compaction` tracing target and carries a
//! `component` ("sharded", "task" or "compaction") and a snake_case `event`.
//! Subscribers are installed by the embedding application, never here.
//!
//! ## Compaction events
//!
//! | event | level | fields |
//! |---|---|---|
//! | `table_op_started` | debug | `op`, `keyspace`, `table` |
//! | `table_op_skipped` | warn | `op`, `keyspace`, `table`, `reason` |
//! | `table_op_failed` | error | `op`, `keyspace`, `table`, `error` |
//! | `table_op_cancelled` | error | `op`, `keyspace`, `table` |
//! | `shard_major_compaction_started` | debug | `task_id`, `correlation_id`, `keyspace`, `tables` |
//! | `major_keyspace_compaction_started` | info | `task_id`, `keyspace`, `tables`, `shards` |
//!
//! One `table_op_started` is emitted per table attempted, including tables
//! that turn out to be dropped.
//!
//! ## Task and shard events
//!
//! `task_created` (debug), `task_done` (info, debug for internal tasks) and
//! `task_failed` (info) carry `task_id`. The runtime reports
//! `sharded_started`/`sharded_stopped` at info, per-shard lifecycle at debug,
//! `shard_invocation_failed` at debug and `shard_panicked` at error.

/// Target for all crate log events.
pub(crate) const TARGET: &str = "keyspace_compaction";

/// Macro for info-level log events.
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;

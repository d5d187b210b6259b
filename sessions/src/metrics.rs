//! Metrics emitted by the session layer.
//!
//! Counters are recorded through the `metrics` facade; install any recorder (for
//! example a Prometheus exporter) in the host application to collect them. Without
//! a recorder every call is a no-op.

use metrics::{Unit, describe_counter};

/// Sessions written by create or update.
pub const SESSIONS_WRITTEN_TOTAL: &str = "sessions_written_total";

/// Sessions explicitly deleted, individually or per user.
pub const SESSIONS_DELETED_TOTAL: &str = "sessions_deleted_total";

/// Session reads, labelled `result = hit | miss`.
pub const SESSION_READS_TOTAL: &str = "session_reads_total";

/// Stale members removed from user session indexes.
pub const INDEX_MEMBERS_PRUNED_TOTAL: &str = "session_index_members_pruned_total";

/// Background index-maintenance failures, labelled by `task`.
pub const BACKGROUND_TASK_FAILURES_TOTAL: &str = "session_background_task_failures_total";

/// Register metric descriptions with the installed recorder.
///
/// Call once after installing the recorder.
pub fn register_metrics() {
    describe_counter!(
        SESSIONS_WRITTEN_TOTAL,
        Unit::Count,
        "Session records written by create or update"
    );
    describe_counter!(
        SESSIONS_DELETED_TOTAL,
        Unit::Count,
        "Session records explicitly deleted"
    );
    describe_counter!(
        SESSION_READS_TOTAL,
        Unit::Count,
        "Session reads by result (hit, miss)"
    );
    describe_counter!(
        INDEX_MEMBERS_PRUNED_TOTAL,
        Unit::Count,
        "Expired members removed from user session indexes"
    );
    describe_counter!(
        BACKGROUND_TASK_FAILURES_TOTAL,
        Unit::Count,
        "Failed background index-maintenance tasks by task"
    );
}

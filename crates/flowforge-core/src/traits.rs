//! Collaborator traits the engine is parameterized over.
//!
//! Everything outside the core (dataset materialization, job persistence,
//! progress streaming, plugin catalogs) is consumed through one of these
//! narrow interfaces and injected at construction time. No global state.

use uuid::Uuid;

use crate::error::EngineResult;
use crate::types::{Job, JobNode, JobStatus, NodeRunStatus, TabularData, WorkflowGraph, WorkflowResult};

/// Fetches a versioned, already-materialized dataset by reference.
pub trait DatasetProvider: Send + Sync {
    fn load(&self, reference: &str) -> EngineResult<TabularData>;
}

/// Synchronous observer invoked at every node state change.
///
/// Delivery to an external progress stream is out of scope; implementations
/// must be cheap and must not fail.
pub trait StatusSink: Send + Sync {
    fn on_transition(&self, node_id: &str, status: NodeRunStatus, error: Option<&str>);
}

/// A sink that drops all transitions.
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn on_transition(&self, _node_id: &str, _status: NodeRunStatus, _error: Option<&str>) {}
}

/// Read-only view of the plugin catalogs, used by the validator to resolve
/// slugs without depending on the engine crate.
pub trait RegistryLookup {
    fn has_algorithm(&self, slug: &str) -> bool;
    fn has_operation(&self, slug: &str) -> bool;
    fn has_metric(&self, key: &str) -> bool;
    fn has_plot(&self, key: &str) -> bool;
}

/// Persistence for jobs, per-node records, snapshots, and results.
///
/// Implementations enforce two invariants: job status transitions are
/// append-only (guarded by [`JobStatus::can_transition_to`]) and
/// `(job_id, node_id)` is unique.
pub trait JobStore: Send + Sync {
    /// Persists an immutable workflow snapshot and returns its id.
    fn put_snapshot(&self, graph: &WorkflowGraph) -> EngineResult<Uuid>;

    /// Loads a workflow snapshot.
    fn snapshot(&self, id: Uuid) -> EngineResult<WorkflowGraph>;

    /// Inserts a new job row.
    fn insert_job(&self, job: &Job) -> EngineResult<()>;

    /// Fetches one job.
    fn job(&self, id: Uuid) -> EngineResult<Job>;

    /// All jobs, newest first.
    fn list_jobs(&self) -> EngineResult<Vec<Job>>;

    /// Applies an append-only status transition and returns the updated job.
    /// Sets `started_at` on Running and `completed_at` on terminal statuses.
    fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> EngineResult<Job>;

    /// Atomically claims the next queued job by `(priority desc, created_at
    /// asc)` and transitions it to Running.
    fn claim_next_queued(&self) -> EngineResult<Option<Job>>;

    /// Inserts the initial Pending node records for a job.
    fn insert_job_nodes(&self, nodes: &[JobNode]) -> EngineResult<()>;

    /// Records a node state change, stamping timestamps and duration.
    fn update_node_status(
        &self,
        job_id: Uuid,
        node_id: &str,
        status: NodeRunStatus,
        error_message: Option<&str>,
    ) -> EngineResult<()>;

    /// All node records of a job, in insertion order.
    fn job_nodes(&self, job_id: Uuid) -> EngineResult<Vec<JobNode>>;

    /// Persists the terminal result of a successful job.
    fn put_result(&self, job_id: Uuid, result: &WorkflowResult) -> EngineResult<()>;

    /// Fetches the terminal result of a job, if any.
    fn result(&self, job_id: Uuid) -> EngineResult<Option<WorkflowResult>>;
}

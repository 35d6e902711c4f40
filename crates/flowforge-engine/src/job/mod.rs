//! Job lifecycle orchestration.
//!
//! A job is one execution attempt of an immutable workflow snapshot. The
//! orchestrator owns submission, execution, cooperative cancellation, and
//! whole-job retry; per-node progress is persisted through the job store on
//! every state transition.

mod memory;
mod worker;

pub use memory::MemoryJobStore;
pub use worker::WorkerPool;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use flowforge_core::{
    DatasetProvider, EngineError, EngineResult, Job, JobNode, JobStatus, JobStore, NodeRunStatus,
    StatusSink, WorkflowGraph, WorkflowResult,
};
use flowforge_artifact::ArtifactStore;
use flowforge_graph::Validator;

use crate::executor::Executor;
use crate::registry::Registries;

/// Outcome of asking a job to execute.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// The run finished and produced its result.
    Completed(WorkflowResult),
    /// The job had already completed; nothing was touched.
    AlreadyCompleted,
}

/// Wakes idle workers when new jobs are queued.
pub(crate) struct QueueSignal {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl QueueSignal {
    fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn notify(&self) {
        self.condvar.notify_all();
    }

    pub(crate) fn wait(&self, timeout: Duration) {
        let mut guard = self.mutex.lock();
        self.condvar.wait_for(&mut guard, timeout);
    }
}

/// Persists node transitions as they happen.
struct StoreStatusSink {
    store: Arc<dyn JobStore>,
    job_id: Uuid,
}

impl StatusSink for StoreStatusSink {
    fn on_transition(&self, node_id: &str, status: NodeRunStatus, error: Option<&str>) {
        if let Err(e) = self
            .store
            .update_node_status(self.job_id, node_id, status, error)
        {
            // The sink contract forbids failing the run.
            tracing::error!(
                job_id = %self.job_id,
                node_id = %node_id,
                error = %e,
                "Failed to persist node transition"
            );
        }
    }
}

/// Owns one executor configuration and drives jobs through their lifecycle.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    registries: Arc<Registries>,
    executor: Executor,
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
    queue_signal: Arc<QueueSignal>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        registries: Arc<Registries>,
        datasets: Arc<dyn DatasetProvider>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        let executor = Executor::new(Arc::clone(&registries), datasets, artifacts);
        Self {
            store,
            registries,
            executor,
            cancel_flags: DashMap::new(),
            queue_signal: Arc::new(QueueSignal::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub(crate) fn queue_signal(&self) -> Arc<QueueSignal> {
        Arc::clone(&self.queue_signal)
    }

    /// Validates the graph, persists it as an immutable snapshot, creates
    /// the job with one Pending node record per graph node, and queues it.
    pub fn submit(&self, graph: &WorkflowGraph, priority: i64) -> EngineResult<Job> {
        let report = Validator::new(self.registries.as_ref()).validate(graph);
        if !report.valid {
            return Err(EngineError::Validation {
                messages: report.error_messages(),
            });
        }
        for warning in &report.warnings {
            tracing::warn!(
                node_id = warning.node_id.as_deref().unwrap_or("-"),
                message = %warning.message,
                "Workflow warning"
            );
        }

        let snapshot_id = self.store.put_snapshot(graph)?;
        let job = Job::new(snapshot_id, priority);
        self.store.insert_job(&job)?;

        let node_records: Vec<JobNode> = graph
            .nodes
            .iter()
            .map(|n| JobNode::pending(job.id, &n.id, n.node_type))
            .collect();
        self.store.insert_job_nodes(&node_records)?;

        let job = self.store.update_job_status(job.id, JobStatus::Queued, None)?;
        tracing::info!(
            job_id = %job.id,
            snapshot_id = %snapshot_id,
            priority,
            nodes = node_records.len(),
            "Job submitted"
        );

        self.queue_signal.notify();
        Ok(job)
    }

    /// Executes a job in the calling thread.
    ///
    /// Re-invoking on a completed job is an idempotent no-op: it returns
    /// [`ExecuteOutcome::AlreadyCompleted`] without touching any node.
    pub fn execute(&self, job_id: Uuid) -> EngineResult<ExecuteOutcome> {
        let job = self.store.job(job_id)?;
        match job.status {
            JobStatus::Completed => {
                tracing::info!(job_id = %job_id, "Job already completed, nothing to do");
                return Ok(ExecuteOutcome::AlreadyCompleted);
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                return Err(EngineError::InvalidJobState {
                    job_id,
                    status: job.status,
                    message: "terminal jobs cannot be re-executed; retry creates a new job".into(),
                });
            }
            JobStatus::Running => {
                return Err(EngineError::InvalidJobState {
                    job_id,
                    status: job.status,
                    message: "job is already running".into(),
                });
            }
            JobStatus::Pending | JobStatus::Queued => {}
        }

        let job = self.store.update_job_status(job_id, JobStatus::Running, None)?;
        self.run(job)
    }

    /// Runs a job that is already in Running state (claimed by a worker).
    pub(crate) fn run(&self, job: Job) -> EngineResult<ExecuteOutcome> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(job.id, Arc::clone(&cancel));

        let outcome = self.run_inner(&job, cancel);
        self.cancel_flags.remove(&job.id);
        outcome
    }

    fn run_inner(&self, job: &Job, cancel: Arc<AtomicBool>) -> EngineResult<ExecuteOutcome> {
        let graph = self.store.snapshot(job.snapshot_id)?;
        let sink = StoreStatusSink {
            store: Arc::clone(&self.store),
            job_id: job.id,
        };

        match self
            .executor
            .execute(&graph, &sink, cancel, job.id.to_string())
        {
            Ok(result) => {
                self.store.put_result(job.id, &result)?;
                self.store
                    .update_job_status(job.id, JobStatus::Completed, None)?;
                Ok(ExecuteOutcome::Completed(result))
            }
            Err(EngineError::Cancelled) => {
                self.store.update_job_status(
                    job.id,
                    JobStatus::Cancelled,
                    Some("cancelled before completion".to_string()),
                )?;
                Err(EngineError::Cancelled)
            }
            Err(e) => {
                // The full chain goes to the log; the persisted message
                // stays terse for end users.
                tracing::error!(job_id = %job.id, error = %e, "Job failed");
                self.store
                    .update_job_status(job.id, JobStatus::Failed, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Requests cancellation.
    ///
    /// Pending and Queued jobs are cancelled immediately. Running jobs are
    /// flagged and stop cooperatively before their next node dispatch; a
    /// node already running is never interrupted. Terminal jobs reject the
    /// request.
    pub fn cancel(&self, job_id: Uuid) -> EngineResult<Job> {
        let job = self.store.job(job_id)?;
        match job.status {
            JobStatus::Pending | JobStatus::Queued => {
                self.store
                    .update_job_status(job_id, JobStatus::Cancelled, None)
            }
            JobStatus::Running => {
                if let Some(flag) = self.cancel_flags.get(&job_id) {
                    flag.store(true, Ordering::Relaxed);
                    tracing::info!(job_id = %job_id, "Cancellation requested for running job");
                } else {
                    tracing::warn!(
                        job_id = %job_id,
                        "Running job has no cancellation token in this process"
                    );
                }
                self.store.job(job_id)
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                Err(EngineError::InvalidJobState {
                    job_id,
                    status: job.status,
                    message: "terminal jobs cannot be cancelled".into(),
                })
            }
        }
    }

    /// Creates a new job for the same snapshot, copying priority. The
    /// original terminal job is never mutated, preserving its audit history.
    pub fn retry(&self, job_id: Uuid) -> EngineResult<Job> {
        let original = self.store.job(job_id)?;
        match original.status {
            JobStatus::Failed | JobStatus::Cancelled => {}
            JobStatus::Completed => {
                return Err(EngineError::InvalidJobState {
                    job_id,
                    status: original.status,
                    message: "completed jobs are not retried".into(),
                });
            }
            status => {
                return Err(EngineError::InvalidJobState {
                    job_id,
                    status,
                    message: "only terminal jobs can be retried".into(),
                });
            }
        }

        let graph = self.store.snapshot(original.snapshot_id)?;
        let job = Job::new(original.snapshot_id, original.priority);
        self.store.insert_job(&job)?;

        let node_records: Vec<JobNode> = graph
            .nodes
            .iter()
            .map(|n| JobNode::pending(job.id, &n.id, n.node_type))
            .collect();
        self.store.insert_job_nodes(&node_records)?;

        let job = self.store.update_job_status(job.id, JobStatus::Queued, None)?;
        tracing::info!(
            job_id = %job.id,
            original_job_id = %job_id,
            "Retry job created"
        );

        self.queue_signal.notify();
        Ok(job)
    }

    /// Claims and runs the next queued job, if any. Used by workers.
    pub(crate) fn claim_and_run(&self) -> EngineResult<Option<Uuid>> {
        let Some(job) = self.store.claim_next_queued()? else {
            return Ok(None);
        };
        let id = job.id;
        // Job-level failures are already persisted; the worker loop only
        // needs to know whether it did work.
        if let Err(e) = self.run(job) {
            tracing::debug!(job_id = %id, error = %e, "Claimed job did not complete");
        }
        Ok(Some(id))
    }
}

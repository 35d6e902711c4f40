//! In-memory job store for tests and embedded callers.
//!
//! Mirrors the semantics of the persistent store: append-only job status
//! transitions, `(job_id, node_id)` uniqueness, and the
//! `(priority desc, created_at asc)` claim order.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use flowforge_core::{
    EngineError, EngineResult, Job, JobNode, JobStatus, JobStore, NodeRunStatus, WorkflowGraph,
    WorkflowResult,
};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    /// Insertion-ordered node records.
    nodes: Vec<JobNode>,
    snapshots: HashMap<Uuid, WorkflowGraph>,
    results: HashMap<Uuid, WorkflowResult>,
}

/// Process-local [`JobStore`] implementation.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_transition(job: &mut Job, status: JobStatus, error_message: Option<String>) {
    job.status = status;
    let now = chrono::Utc::now();
    match status {
        JobStatus::Running => {
            if job.started_at.is_none() {
                job.started_at = Some(now);
            }
        }
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
            job.completed_at = Some(now);
        }
        _ => {}
    }
    if error_message.is_some() {
        job.error_message = error_message;
    }
}

impl JobStore for MemoryJobStore {
    fn put_snapshot(&self, graph: &WorkflowGraph) -> EngineResult<Uuid> {
        let id = Uuid::now_v7();
        self.inner.lock().snapshots.insert(id, graph.clone());
        Ok(id)
    }

    fn snapshot(&self, id: Uuid) -> EngineResult<WorkflowGraph> {
        self.inner
            .lock()
            .snapshots
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("unknown snapshot {}", id)))
    }

    fn insert_job(&self, job: &Job) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.id) {
            return Err(EngineError::Storage(format!("job {} already exists", job.id)));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn job(&self, id: Uuid) -> EngineResult<Job> {
        self.inner
            .lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("unknown job {}", id)))
    }

    fn list_jobs(&self) -> EngineResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.inner.lock().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> EngineResult<Job> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| EngineError::Storage(format!("unknown job {}", id)))?;
        if !job.status.can_transition_to(status) {
            return Err(EngineError::InvalidJobState {
                job_id: id,
                status: job.status,
                message: format!("cannot transition to {:?}", status),
            });
        }
        apply_transition(job, status, error_message);
        Ok(job.clone())
    }

    fn claim_next_queued(&self) -> EngineResult<Option<Job>> {
        let mut inner = self.inner.lock();
        let best_id = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .map(|j| j.id);
        let Some(id) = best_id else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&id).expect("selected job exists");
        apply_transition(job, JobStatus::Running, None);
        Ok(Some(job.clone()))
    }

    fn insert_job_nodes(&self, nodes: &[JobNode]) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        for node in nodes {
            let exists = inner
                .nodes
                .iter()
                .any(|n| n.job_id == node.job_id && n.node_id == node.node_id);
            if exists {
                return Err(EngineError::Storage(format!(
                    "job node ({}, {}) already exists",
                    node.job_id, node.node_id
                )));
            }
            inner.nodes.push(node.clone());
        }
        Ok(())
    }

    fn update_node_status(
        &self,
        job_id: Uuid,
        node_id: &str,
        status: NodeRunStatus,
        error_message: Option<&str>,
    ) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .iter_mut()
            .find(|n| n.job_id == job_id && n.node_id == node_id)
            .ok_or_else(|| {
                EngineError::Storage(format!("unknown job node ({}, {})", job_id, node_id))
            })?;

        let now = chrono::Utc::now();
        node.status = status;
        match status {
            NodeRunStatus::Running => node.started_at = Some(now),
            NodeRunStatus::Completed | NodeRunStatus::Failed | NodeRunStatus::Skipped => {
                node.completed_at = Some(now);
                if let Some(started) = node.started_at {
                    node.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
                }
            }
            NodeRunStatus::Pending => {}
        }
        node.error_message = error_message.map(str::to_string);
        Ok(())
    }

    fn job_nodes(&self, job_id: Uuid) -> EngineResult<Vec<JobNode>> {
        Ok(self
            .inner
            .lock()
            .nodes
            .iter()
            .filter(|n| n.job_id == job_id)
            .cloned()
            .collect())
    }

    fn put_result(&self, job_id: Uuid, result: &WorkflowResult) -> EngineResult<()> {
        self.inner.lock().results.insert(job_id, result.clone());
        Ok(())
    }

    fn result(&self, job_id: Uuid) -> EngineResult<Option<WorkflowResult>> {
        Ok(self.inner.lock().results.get(&job_id).cloned())
    }
}

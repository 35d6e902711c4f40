//! redb-backed job store (pure Rust, embedded, ACID).
//!
//! Four tables: jobs, job nodes, workflow snapshots, and results. Rows are
//! JSON-encoded. redb supports many concurrent readers and a single writer;
//! write transactions serialize, which is exactly what the append-only job
//! status guard and the atomic queue claim need.
//!
//! The job queue is ordered by `(priority desc, created_at asc)`. Queue
//! selection is a single-transaction scan; job counts are small enough that
//! an index would buy nothing.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use flowforge_core::{
    EngineError, EngineResult, Job, JobNode, JobStatus, JobStore, NodeRunStatus, WorkflowGraph,
    WorkflowResult,
};

const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");
const JOB_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("job_nodes");
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");
const RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("results");

#[inline]
fn store_err(context: &'static str, e: impl Display) -> EngineError {
    EngineError::Storage(format!("redb {context}: {e}"))
}

#[inline]
fn ser_err(context: &'static str, e: impl Display) -> EngineError {
    EngineError::Storage(format!("{context}: {e}"))
}

fn node_key(job_id: Uuid, node_id: &str) -> String {
    format!("{}/{}", job_id, node_id)
}

/// Embedded job store over a single redb file.
pub struct RedbJobStore {
    db: Database,
    path: PathBuf,
}

impl RedbJobStore {
    /// Creates or opens the store at `path`. Tables are warm-created so
    /// first reads never see a missing table.
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| store_err("create_dir_all", e))?;
        }

        let db = Database::create(&path).map_err(|e| store_err("create/open", e))?;
        let write_txn = db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            write_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;
            write_txn
                .open_table(JOB_NODES)
                .map_err(|e| store_err("open_table", e))?;
            write_txn
                .open_table(SNAPSHOTS)
                .map_err(|e| store_err("open_table", e))?;
            write_txn
                .open_table(RESULTS)
                .map_err(|e| store_err("open_table", e))?;
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;

        tracing::debug!(path = %path.display(), "Job store opened");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all_jobs(&self) -> EngineResult<Vec<Job>> {
        let read_txn = self.db.begin_read().map_err(|e| store_err("begin_read", e))?;
        let table = read_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;
        let mut jobs = Vec::new();
        for entry in table.iter().map_err(|e| store_err("iter", e))? {
            let (_, value) = entry.map_err(|e| store_err("iter entry", e))?;
            let job: Job =
                serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job", e))?;
            jobs.push(job);
        }
        Ok(jobs)
    }
}

/// Applies the lifecycle timestamps for a transition.
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

impl JobStore for RedbJobStore {
    fn put_snapshot(&self, graph: &WorkflowGraph) -> EngineResult<Uuid> {
        let id = Uuid::now_v7();
        let encoded = serde_json::to_vec(graph).map_err(|e| ser_err("encode snapshot", e))?;

        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOTS)
                .map_err(|e| store_err("open_table", e))?;
            table
                .insert(id.to_string().as_str(), encoded.as_slice())
                .map_err(|e| store_err("insert snapshot", e))?;
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(id)
    }

    fn snapshot(&self, id: Uuid) -> EngineResult<WorkflowGraph> {
        let read_txn = self.db.begin_read().map_err(|e| store_err("begin_read", e))?;
        let table = read_txn
            .open_table(SNAPSHOTS)
            .map_err(|e| store_err("open_table", e))?;
        let value = table
            .get(id.to_string().as_str())
            .map_err(|e| store_err("get snapshot", e))?
            .ok_or_else(|| EngineError::Storage(format!("unknown snapshot {}", id)))?;
        serde_json::from_slice(value.value()).map_err(|e| ser_err("decode snapshot", e))
    }

    fn insert_job(&self, job: &Job) -> EngineResult<()> {
        let encoded = serde_json::to_vec(job).map_err(|e| ser_err("encode job", e))?;
        let key = job.id.to_string();

        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            let mut table = write_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;
            let exists = table
                .get(key.as_str())
                .map_err(|e| store_err("get job", e))?
                .is_some();
            if exists {
                return Err(EngineError::Storage(format!("job {} already exists", job.id)));
            }
            table
                .insert(key.as_str(), encoded.as_slice())
                .map_err(|e| store_err("insert job", e))?;
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(())
    }

    fn job(&self, id: Uuid) -> EngineResult<Job> {
        let read_txn = self.db.begin_read().map_err(|e| store_err("begin_read", e))?;
        let table = read_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;
        let value = table
            .get(id.to_string().as_str())
            .map_err(|e| store_err("get job", e))?
            .ok_or_else(|| EngineError::Storage(format!("unknown job {}", id)))?;
        serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job", e))
    }

    fn list_jobs(&self) -> EngineResult<Vec<Job>> {
        let mut jobs = self.read_all_jobs()?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> EngineResult<Job> {
        let key = id.to_string();
        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        let updated = {
            let mut table = write_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;
            let mut job: Job = {
                let value = table
                    .get(key.as_str())
                    .map_err(|e| store_err("get job", e))?
                    .ok_or_else(|| EngineError::Storage(format!("unknown job {}", id)))?;
                serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job", e))?
            };

            if !job.status.can_transition_to(status) {
                return Err(EngineError::InvalidJobState {
                    job_id: id,
                    status: job.status,
                    message: format!("cannot transition to {:?}", status),
                });
            }

            apply_transition(&mut job, status, error_message);
            let encoded = serde_json::to_vec(&job).map_err(|e| ser_err("encode job", e))?;
            table
                .insert(key.as_str(), encoded.as_slice())
                .map_err(|e| store_err("insert job", e))?;
            job
        };
        write_txn.commit().map_err(|e| store_err("commit", e))?;

        tracing::debug!(job_id = %id, status = ?updated.status, "Job status updated");
        Ok(updated)
    }

    fn claim_next_queued(&self) -> EngineResult<Option<Job>> {
        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        let claimed = {
            let mut table = write_txn.open_table(JOBS).map_err(|e| store_err("open_table", e))?;

            let mut best: Option<Job> = None;
            for entry in table.iter().map_err(|e| store_err("iter", e))? {
                let (_, value) = entry.map_err(|e| store_err("iter entry", e))?;
                let job: Job =
                    serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job", e))?;
                if job.status != JobStatus::Queued {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some(current) => {
                        job.priority > current.priority
                            || (job.priority == current.priority
                                && job.created_at < current.created_at)
                    }
                };
                if better {
                    best = Some(job);
                }
            }

            match best {
                Some(mut job) => {
                    apply_transition(&mut job, JobStatus::Running, None);
                    let encoded =
                        serde_json::to_vec(&job).map_err(|e| ser_err("encode job", e))?;
                    table
                        .insert(job.id.to_string().as_str(), encoded.as_slice())
                        .map_err(|e| store_err("insert job", e))?;
                    Some(job)
                }
                None => None,
            }
        };
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(claimed)
    }

    fn insert_job_nodes(&self, nodes: &[JobNode]) -> EngineResult<()> {
        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            let mut table = write_txn
                .open_table(JOB_NODES)
                .map_err(|e| store_err("open_table", e))?;
            for node in nodes {
                let key = node_key(node.job_id, &node.node_id);
                let exists = table
                    .get(key.as_str())
                    .map_err(|e| store_err("get job node", e))?
                    .is_some();
                if exists {
                    return Err(EngineError::Storage(format!(
                        "job node ({}, {}) already exists",
                        node.job_id, node.node_id
                    )));
                }
                let encoded = serde_json::to_vec(node).map_err(|e| ser_err("encode job node", e))?;
                table
                    .insert(key.as_str(), encoded.as_slice())
                    .map_err(|e| store_err("insert job node", e))?;
            }
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(())
    }

    fn update_node_status(
        &self,
        job_id: Uuid,
        node_id: &str,
        status: NodeRunStatus,
        error_message: Option<&str>,
    ) -> EngineResult<()> {
        let key = node_key(job_id, node_id);
        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            let mut table = write_txn
                .open_table(JOB_NODES)
                .map_err(|e| store_err("open_table", e))?;
            let mut node: JobNode = {
                let value = table
                    .get(key.as_str())
                    .map_err(|e| store_err("get job node", e))?
                    .ok_or_else(|| {
                        EngineError::Storage(format!("unknown job node ({}, {})", job_id, node_id))
                    })?;
                serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job node", e))?
            };

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

            let encoded = serde_json::to_vec(&node).map_err(|e| ser_err("encode job node", e))?;
            table
                .insert(key.as_str(), encoded.as_slice())
                .map_err(|e| store_err("insert job node", e))?;
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(())
    }

    fn job_nodes(&self, job_id: Uuid) -> EngineResult<Vec<JobNode>> {
        let prefix = format!("{}/", job_id);
        let read_txn = self.db.begin_read().map_err(|e| store_err("begin_read", e))?;
        let table = read_txn
            .open_table(JOB_NODES)
            .map_err(|e| store_err("open_table", e))?;
        let mut nodes = Vec::new();
        for entry in table.iter().map_err(|e| store_err("iter", e))? {
            let (key, value) = entry.map_err(|e| store_err("iter entry", e))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let node: JobNode =
                serde_json::from_slice(value.value()).map_err(|e| ser_err("decode job node", e))?;
            nodes.push(node);
        }
        Ok(nodes)
    }

    fn put_result(&self, job_id: Uuid, result: &WorkflowResult) -> EngineResult<()> {
        let encoded = serde_json::to_vec(result).map_err(|e| ser_err("encode result", e))?;
        let write_txn = self.db.begin_write().map_err(|e| store_err("begin_write", e))?;
        {
            let mut table = write_txn
                .open_table(RESULTS)
                .map_err(|e| store_err("open_table", e))?;
            table
                .insert(job_id.to_string().as_str(), encoded.as_slice())
                .map_err(|e| store_err("insert result", e))?;
        }
        write_txn.commit().map_err(|e| store_err("commit", e))?;
        Ok(())
    }

    fn result(&self, job_id: Uuid) -> EngineResult<Option<WorkflowResult>> {
        let read_txn = self.db.begin_read().map_err(|e| store_err("begin_read", e))?;
        let table = read_txn
            .open_table(RESULTS)
            .map_err(|e| store_err("open_table", e))?;
        let Some(value) = table
            .get(job_id.to_string().as_str())
            .map_err(|e| store_err("get result", e))?
        else {
            return Ok(None);
        };
        let result =
            serde_json::from_slice(value.value()).map_err(|e| ser_err("decode result", e))?;
        Ok(Some(result))
    }
}

//! Job and node lifecycle types.
//!
//! A job is one orchestrated execution attempt of a workflow snapshot. Job
//! status is append-only: it moves forward through the lifecycle and is never
//! rewound. Node records track the per-node state machine inside one job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::NodeType;

/// Job lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, Failed, and Cancelled are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Queued => 1,
            JobStatus::Running => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    /// Append-only transition guard. A status never moves backwards, a
    /// terminal status never changes, and Cancelled is reachable only from
    /// Pending, Queued, or Running.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        next.rank() > self.rank()
    }
}

/// Per-node execution status inside one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeRunStatus::Completed | NodeRunStatus::Failed | NodeRunStatus::Skipped
        )
    }
}

/// One orchestrated execution attempt of a workflow snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Scheduling priority; higher runs first.
    pub priority: i64,
    /// Reference to the immutable workflow snapshot this job executes.
    pub snapshot_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Job {
    /// Creates a Pending job for a stored snapshot.
    pub fn new(snapshot_id: Uuid, priority: i64) -> Self {
        Self {
            id: Uuid::now_v7(),
            status: JobStatus::Pending,
            priority,
            snapshot_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Persisted execution record of one node within one job.
///
/// Uniqueness invariant: `(job_id, node_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
    pub job_id: Uuid,
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JobNode {
    /// Creates the initial Pending record for a node.
    pub fn pending(job_id: Uuid, node_id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            job_id,
            node_id: node_id.into(),
            node_type,
            status: NodeRunStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error_message: None,
            result: None,
        }
    }
}

//! Job worker pool.
//!
//! Each worker thread owns at most one job at a time and runs it to a
//! terminal status before claiming the next. Nodes inside a job stay
//! strictly sequential; the pool is the only source of parallelism.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use flowforge_core::{EngineError, EngineResult};

use crate::job::JobOrchestrator;

const IDLE_WAIT: Duration = Duration::from_millis(200);

/// A fixed-size pool of job worker threads.
pub struct WorkerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads polling the orchestrator's queue.
    pub fn start(orchestrator: Arc<JobOrchestrator>, workers: usize) -> EngineResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(workers.max(1));
        for worker_id in 0..workers.max(1) {
            let orchestrator = Arc::clone(&orchestrator);
            let shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("flowforge-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, orchestrator, shutdown))
                .map_err(|e| EngineError::State(format!("failed to spawn worker thread: {e}")))?;
            handles.push(handle);
        }

        Ok(Self { shutdown, handles })
    }

    /// Signals all workers and waits for them to exit. Jobs already running
    /// finish their current node dispatch loop normally.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(worker_id: usize, orchestrator: Arc<JobOrchestrator>, shutdown: Arc<AtomicBool>) {
    tracing::debug!(worker = worker_id, "Worker started");
    let signal = orchestrator.queue_signal();

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match orchestrator.claim_and_run() {
            Ok(Some(job_id)) => {
                tracing::debug!(worker = worker_id, job_id = %job_id, "Worker finished job");
                // Immediately look for more work.
            }
            Ok(None) => {
                signal.wait(IDLE_WAIT);
            }
            Err(e) => {
                tracing::error!(worker = worker_id, error = %e, "Worker claim failed");
                signal.wait(IDLE_WAIT);
            }
        }
    }

    tracing::debug!(worker = worker_id, "Worker stopped");
}

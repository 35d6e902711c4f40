//! Workflow execution engine.
//!
//! The engine is deliberately synchronous: one run owns one thread, nodes
//! execute strictly sequentially in the validated topological order, and the
//! execution context is never shared across runs. Horizontal scale happens
//! one level up, in the job worker pool.

pub mod context;
pub mod dataset;
pub mod executor;
pub mod handlers;
pub mod job;
pub mod registry;

pub use context::ExecutionContext;
pub use dataset::{JsonFileDatasetProvider, MemoryDatasetProvider};
pub use executor::Executor;
pub use job::{ExecuteOutcome, JobOrchestrator, MemoryJobStore, WorkerPool};
pub use registry::Registries;

//! Core types for the flowforge workflow engine.
//!
//! This crate contains the shared vocabulary of the workspace: the workflow
//! graph model, tabular data, job and node lifecycle types, the workflow
//! result, the runtime error taxonomy, and the collaborator traits the
//! engine is parameterized over.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use traits::{DatasetProvider, JobStore, RegistryLookup, StatusSink};
pub use types::{
    Job, JobNode, JobStatus, Metric, NodeRunStatus, NodeType, ProblemType, RenderedPlot,
    TabularData, WorkflowEdge, WorkflowGraph, WorkflowNode, WorkflowResult,
};

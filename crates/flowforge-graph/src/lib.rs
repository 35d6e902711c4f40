//! Workflow graph validation and ordering.
//!
//! The validator applies every check independently and accumulates issues;
//! it never short-circuits on the first problem. When the graph is acyclic
//! it also computes the stable topological order the executor will follow.

mod order;
mod validator;

pub use order::topological_order;
pub use validator::{Issue, ValidationReport, Validator};

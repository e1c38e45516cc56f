//! Weft Workflow
//!
//! This crate provides the resolved workflow representation for weft.
//! A [`Graph`] is built from the rows of one workflow by the [`GraphFactory`]
//! and is the unit the bundle service compiles and the engine executes.
//!
//! Key differences from `weft-config`:
//! - Edge references are wired into labelled edges (`success`, `failure`, `default`)
//! - The entry point is identified
//! - Structural problems are reported as [`StructuralWarning`]s, never as failures
//! - Nodes carry a context with a runtime slot for the live agent instance

mod context;
mod edge;
mod error;
mod factory;
mod graph;
mod node;

pub use context::{NodeContext, RUNTIME_INSTANCE_KEY, RuntimeHandle};
pub use edge::{EdgeLabel, EdgeTarget, FUNCTION_PREFIX};
pub use error::WorkflowError;
pub use factory::{GraphFactory, StructuralWarning};
pub use graph::Graph;
pub use node::Node;

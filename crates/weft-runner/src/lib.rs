//! Weft Runner
//!
//! Runs a named graph with the cheapest strategy available:
//!
//! - **Precompiled**: a compiled artifact exists in the store and is executed
//!   as-is, after reconciling it against the current registry.
//! - **Autocompiled**: with autocompile on, the graph is compiled through a
//!   [`GraphCompiler`] (by default the [`CompilationService`]) and executed.
//! - **Memory**: the workflow table is parsed and the graph is built and run
//!   without persisting anything.
//!
//! [`GraphRunner::run`] never returns an error. Every failure ends up in the
//! returned [`weft_engine::ExecutionResult`] together with the initial state.

mod compiler;
mod config;
mod error;
mod runner;

pub use compiler::{CompilationService, GraphCompiler};
pub use config::{RunOptions, RunnerConfig};
pub use error::{CompileError, RunnerError};
pub use runner::GraphRunner;

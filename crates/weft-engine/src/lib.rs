//! Weft Engine
//!
//! Binds live agents and services to a [`weft_workflow::Graph`] and walks it.
//!
//! - [`GraphInstantiator`] creates agents through the [`AgentFactory`] and
//!   services through the [`ServiceFactory`] in the registry's load order,
//!   and stores an [`AgentInstance`] in each node's runtime slot.
//! - [`ExecutionEngine`] runs the graph from its entry point, following
//!   success, failure and default edges and `func:` routes, recording every
//!   node run with the [`ExecutionTrackingService`].
//! - [`SuccessPolicy`] decides whether a finished run succeeded.

mod agent;
mod builtin;
mod engine;
mod error;
mod factory;
mod instantiate;
mod policy;
mod result;
mod routing;
mod services;
mod tracking;

pub use agent::{Agent, AgentInput, AgentInstance, AgentOutcome};
pub use builtin::{BranchingAgent, DefaultAgent, EchoAgent, FailureAgent, SuccessAgent};
pub use engine::{DEFAULT_MAX_STEPS, ExecutionConfig, ExecutionEngine, LAST_ACTION_SUCCESS_KEY};
pub use error::EngineError;
pub use factory::{AgentConstructor, AgentFactory};
pub use instantiate::{GraphInstantiator, InstantiationSummary};
pub use policy::SuccessPolicy;
pub use result::{CompiledFrom, ExecutionResult, State};
pub use routing::{RouteContext, RouteFunction, RouteTable};
pub use services::{ServiceConstructor, ServiceContainer, ServiceFactory, ServiceHandle};
pub use tracking::{
  ExecutionStatus, ExecutionSummary, ExecutionTracker, ExecutionTrackingService, NodeExecution,
  TrackingConfig,
};

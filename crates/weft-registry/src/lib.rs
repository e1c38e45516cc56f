//! Weft Registry
//!
//! The declaration registry records which agent types and services exist,
//! where their implementations live, and which services each of them needs.
//! It is built once at startup, shared behind an `Arc`, and queried by the
//! bundle services and the runner.

mod declaration;
mod error;
mod fs_source;
mod registry;

pub use declaration::{AgentDeclaration, DeclarationSource, ServiceDeclaration};
pub use error::RegistryError;
pub use fs_source::{DeclarationManifest, FsDeclarationSource};
pub use registry::{BUILTIN_AGENT_TYPES, DeclarationRegistry, Requirements};

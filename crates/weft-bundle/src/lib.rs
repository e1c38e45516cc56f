//! Weft Bundle
//!
//! A [`GraphBundle`] is the metadata-only compilation of one workflow: the
//! stripped node map plus everything the registry said the graph needs. It
//! is addressed by the sha256 of the source table and can be executed
//! without re-parsing that source.
//!
//! The [`BundleService`] builds, saves and loads bundles. The
//! [`BundleUpdateService`] repairs a stored bundle when the registry has
//! changed since it was built.

mod bundle;
mod error;
mod hash;
mod keys;
mod service;
mod update;

pub use bundle::{BUNDLE_FORMAT, GraphBundle};
pub use error::BundleError;
pub use hash::{csv_hash, find_workflow, synthetic_graph_name, version_hash};
pub use keys::{bundle_key, compiled_key};
pub use service::BundleService;
pub use update::{BundleUpdateService, ImplementationChange, UpdateOutcome, UpdatePreview};

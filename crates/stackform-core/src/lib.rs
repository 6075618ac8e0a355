//! Deployment driver for Stackform stacks.
//!
//! This crate ties the schema and provider layers together: the stack
//! locator (`find`), the convergence driver (`converge`) that creates or
//! updates a stack and polls it to a terminal status, the teardown driver
//! (`destroy`), provider-backed lookups for stack definitions, and the
//! `Deployer` facade used by the CLI.

pub mod converge;
pub mod engine;
pub mod event;
pub mod locator;
pub mod lookup;
pub mod poll;
pub mod teardown;

pub use converge::{converge, Action, ConvergeOptions, Outcome};
pub use engine::{ApplyReport, Deployer, Rendered, TeardownReport};
pub use event::Event;
pub use locator::{find, StackHandle};
pub use lookup::{OfflineLookup, ProviderLookup};
pub use poll::PollSettings;
pub use teardown::destroy;

use stackform_provider::{ProviderError, StackStatus};
use stackform_schema::{CompositionError, ManifestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("stack definition error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("composition error: {0}")]
    Composition(#[from] CompositionError),
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lookup error: {0}")]
    Lookup(String),
    #[error("ambiguous stack '{name}': found in regions {}", regions.join(", "))]
    AmbiguousStack { name: String, regions: Vec<String> },
    #[error("stack not found: {0}")]
    StackNotFound(String),
    #[error("configuration error: stack '{0}' already exists and create-only was requested")]
    CreateOnly(String),
    #[error("configuration error: no region given for stack '{0}'")]
    NoRegion(String),
    #[error("convergence failed for stack '{stack}': expected {expected}, got {actual}")]
    ConvergenceFailed {
        stack: String,
        expected: StackStatus,
        actual: StackStatus,
    },
}

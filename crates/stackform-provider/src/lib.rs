//! Boundary to the cloud provider's stack-management API.
//!
//! This crate defines the consumed API as traits (`Cloud`, `StackApi`,
//! `ImageApi`), the closed status model, fault classification, and two
//! implementations: an HTTP adapter speaking the gateway protocol, and an
//! in-memory `MockCloud` used by tests and the reference server.

pub mod config;
pub mod http;
pub mod mock;
pub mod status;

pub use config::ProviderConfig;
pub use http::HttpCloud;
pub use mock::{MockCall, MockCloud};
pub use status::{Phase, StackOperation, StackStatus};

use serde::{Deserialize, Serialize};
use stackform_schema::RegionName;
use thiserror::Error;

/// Protocol version sent as `X-Stackform-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message fragment the provider uses when an update changes nothing.
pub const NO_UPDATES_MARKER: &str = "No updates are to be performed";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("{message}")]
    NoUpdates { message: String },
    #[error("provider fault {code}: {message}")]
    Fault { code: String, message: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unknown stack status '{0}'")]
    UnknownStatus(String),
    #[error("provider config error: {0}")]
    Config(String),
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Classify a provider-shaped fault. This is the only place fault codes
    /// and messages are inspected.
    pub fn from_fault(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if code == "NotFound" || code == "ResourceNotFound" || message.contains("does not exist") {
            Self::NotFound { message }
        } else if message.contains(NO_UPDATES_MARKER) {
            Self::NoUpdates { message }
        } else {
            Self::Fault { code, message }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Wire form of this error, as sent by the gateway.
    pub fn to_fault(&self) -> Fault {
        let (code, message) = match self {
            Self::NotFound { message } => ("NotFound", message.clone()),
            Self::NoUpdates { message } => ("ValidationError", message.clone()),
            Self::Fault { code, message } => (code.as_str(), message.clone()),
            other => ("InternalFailure", other.to_string()),
        };
        Fault {
            code: code.to_owned(),
            message,
        }
    }
}

/// Error body exchanged over the gateway protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSummary {
    pub name: String,
    pub stack_id: String,
    pub region: String,
    pub status: StackStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub logical_id: String,
    pub physical_id: String,
    pub resource_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub name: String,
}

/// Stack operations against one region.
pub trait StackApi: Send + Sync {
    fn region(&self) -> &RegionName;

    /// Live stacks, optionally filtered by exact name.
    fn list_stacks(&self, name: Option<&str>) -> Result<Vec<StackSummary>, ProviderError>;

    fn describe_stack(&self, name: &str) -> Result<StackSummary, ProviderError>;

    fn describe_stack_resource(
        &self,
        stack: &str,
        resource: &str,
    ) -> Result<ResourceSummary, ProviderError>;

    /// Submit a new stack. Returns the provider's stack id.
    fn create_stack(&self, name: &str, document: &str) -> Result<String, ProviderError>;

    /// Submit a new document for an existing stack. An unchanged document
    /// yields `ProviderError::NoUpdates`.
    fn update_stack(&self, name: &str, document: &str) -> Result<String, ProviderError>;

    fn delete_stack(&self, name: &str) -> Result<(), ProviderError>;

    /// Fresh status read for polling.
    fn stack_status(&self, name: &str) -> Result<StackStatus, ProviderError>;
}

/// Machine image queries against one region.
pub trait ImageApi: Send + Sync {
    fn find_images_by_tag(&self, key: &str, value: &str)
        -> Result<Vec<ImageSummary>, ProviderError>;
}

/// A region-scoped connection.
pub trait Connection: StackApi + ImageApi {}

impl<T: StackApi + ImageApi> Connection for T {}

/// Entry point: region enumeration and per-region connections.
pub trait Cloud: Send + Sync {
    fn regions(&self) -> Result<Vec<RegionName>, ProviderError>;

    fn connect(&self, region: &RegionName) -> Result<Box<dyn Connection>, ProviderError>;
}

//! Desired-state model for Stackform templates.
//!
//! This crate defines the schema layer: a small recursive property value type
//! (`Value`), provider resources (`Resource`), whole templates (`Template`) with
//! their canonical, byte-stable JSON encoding, the volume/attachment/server
//! composition rules (`TemplateBuilder`), and TOML stack definitions
//! (`StackManifest`) that compose into a `StackDefinition`.

pub mod compose;
pub mod manifest;
pub mod resource;
pub mod template;
pub mod types;
pub mod value;

pub use compose::{Attachment, CompositionError, Device, ServerOptions, Volume};
pub use manifest::{
    load_manifest, parse_manifest_file, parse_manifest_str, AttachmentSection, DeviceSection,
    Lookup, ManifestError, ReplicaLabel, ResourceSection, ServerSection, Source, StackManifest,
    VolumeSection, DEFINITION_FILE,
};
pub use resource::{DeletionPolicy, Resource};
pub use template::{StackDefinition, Template, TemplateBuilder};
pub use types::{RegionName, StackName};
pub use value::Value;

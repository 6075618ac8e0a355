use crate::compose::{
    replicated_server_names, Attachment, CompositionError, Device, ServerOptions, Volume,
};
use crate::resource::{DeletionPolicy, Resource};
use crate::template::{StackDefinition, TemplateBuilder};
use crate::types::RegionName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up when a definition source is a directory.
pub const DEFINITION_FILE: &str = "stack.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read stack definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse stack definition: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("{0}")]
    Composition(#[from] CompositionError),
    #[error("stack name must not be empty")]
    EmptyName,
    #[error("attachment refers to undeclared volume '{0}'")]
    UnknownVolume(String),
    #[error("no stack.toml in directory {}", .0.display())]
    MissingDefinition(PathBuf),
}

/// Resolves the non-literal `Source` forms against a live provider.
pub trait Lookup {
    type Error: From<ManifestError>;

    /// Id of the single image whose `Name` tag equals `name`.
    fn image_id(&mut self, name: &str) -> Result<String, Self::Error>;

    /// Physical id of `resource` in another stack.
    fn stack_resource(&mut self, stack: &str, resource: &str) -> Result<String, Self::Error>;
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StackManifest {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeSection>,
    #[serde(default)]
    pub servers: Vec<ServerSection>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VolumeSection {
    pub name: String,
    pub zone: String,
    pub size: u64,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_replicas")]
    pub replicas: Vec<ReplicaLabel>,
}

/// Replica labels may be written as strings or bare integers.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReplicaLabel {
    Text(String),
    Number(i64),
}

impl fmt::Display for ReplicaLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AttachmentSection {
    pub volume: String,
    pub mount_point: String,
    pub device: DeviceSection,
    #[serde(default)]
    pub replica: Option<ReplicaLabel>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DeviceSection {
    Stem(String),
    Paths(Vec<String>),
}

impl From<&DeviceSection> for Device {
    fn from(d: &DeviceSection) -> Self {
        match d {
            DeviceSection::Stem(s) => Self::Stem(s.clone()),
            DeviceSection::Paths(p) => Self::Paths(p.clone()),
        }
    }
}

/// A value given literally or resolved at compose time.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Source {
    Literal(String),
    Image { image_name: String },
    StackResource { stack: String, resource: String },
}

impl Source {
    fn resolve<L: Lookup>(&self, lookup: &mut L) -> Result<String, L::Error> {
        match self {
            Self::Literal(s) => Ok(s.clone()),
            Self::Image { image_name } => lookup.image_id(image_name),
            Self::StackResource { stack, resource } => lookup.stack_resource(stack, resource),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_server_name")]
    pub name: String,
    pub image: Source,
    pub attachments: Vec<AttachmentSection>,
    /// One instance per replica when set; otherwise a single instance that
    /// may pin attachment replicas.
    #[serde(default = "default_true")]
    pub replicated: bool,
    #[serde(default, rename = "type")]
    pub instance_type: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub subnet: Option<Source>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub security_groups: Vec<Source>,
    #[serde(default)]
    pub instance_profile: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceSection {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default)]
    pub metadata: BTreeMap<String, toml::Value>,
}

fn default_count() -> usize {
    1
}

fn default_replicas() -> Vec<ReplicaLabel> {
    vec![ReplicaLabel::Text(String::new())]
}

fn default_server_name() -> String {
    crate::compose::DEFAULT_SERVER_NAME.to_owned()
}

fn default_true() -> bool {
    true
}

impl StackManifest {
    /// Compose the definition into a template.
    ///
    /// Volumes are declared and every server is validated before the first
    /// lookup, so a malformed definition never reaches the provider.
    pub fn compose<L: Lookup>(&self, lookup: &mut L) -> Result<StackDefinition, L::Error> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyName.into());
        }
        let mut builder = TemplateBuilder::new(self.name.as_str());
        if let Some(ref d) = self.description {
            builder.set_description(d.as_str());
        }

        let mut volumes: BTreeMap<&str, Volume> = BTreeMap::new();
        for v in &self.volumes {
            let labels: Vec<String> = v.replicas.iter().map(ToString::to_string).collect();
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            let volume = builder
                .volume(&v.name, &v.zone, v.size, v.count, &labels)
                .map_err(ManifestError::from)?;
            volumes.insert(v.name.as_str(), volume);
        }

        let mut wired = Vec::with_capacity(self.servers.len());
        for s in &self.servers {
            let attachments = s
                .attachments
                .iter()
                .map(|a| attachment(&volumes, a))
                .collect::<Result<Vec<_>, _>>()?;
            let subnet_given = s.subnet.as_ref().map(|_| "");
            let check = if s.replicated {
                builder.validate_servers(&attachments, s.zone.as_deref(), subnet_given)
            } else {
                builder.validate_server(&attachments, s.zone.as_deref(), subnet_given)
            };
            check.map_err(ManifestError::from)?;
            wired.push((s, attachments));
        }

        let mut planned = Vec::new();
        for (s, attachments) in &wired {
            if s.replicated {
                planned.extend(replicated_server_names(&s.name, attachments));
            } else {
                planned.push(s.name.clone());
            }
        }
        planned.extend(self.resources.keys().cloned());
        builder
            .check_free(planned.iter().map(String::as_str))
            .map_err(ManifestError::from)?;

        for (s, attachments) in wired {
            let options = ServerOptions {
                name: s.name.clone(),
                image: s.image.resolve(lookup)?,
                zone: s.zone.clone(),
                subnet: s.subnet.as_ref().map(|x| x.resolve(lookup)).transpose()?,
                instance_type: s
                    .instance_type
                    .clone()
                    .unwrap_or_else(|| crate::compose::DEFAULT_INSTANCE_TYPE.to_owned()),
                domain: s.domain.clone(),
                role: s.role.clone(),
                security_groups: s
                    .security_groups
                    .iter()
                    .map(|g| g.resolve(lookup))
                    .collect::<Result<_, _>>()?,
                instance_profile: s.instance_profile.clone(),
                tags: s.tags.clone(),
            };
            if s.replicated {
                builder
                    .servers(&attachments, &options)
                    .map_err(ManifestError::from)?;
            } else {
                builder
                    .server(&attachments, &options)
                    .map_err(ManifestError::from)?;
            }
        }

        for (name, section) in &self.resources {
            let mut resource = Resource::new(section.resource_type.as_str()).with_properties(
                section
                    .properties
                    .iter()
                    .map(|(k, v)| (k.as_str(), crate::value::Value::from(v.clone()))),
            );
            for dep in &section.depends_on {
                resource = resource.depends_on(dep.as_str());
            }
            if let Some(policy) = section.deletion_policy {
                resource = resource.with_deletion_policy(policy);
            }
            resource = resource.with_metadata(
                section
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), crate::value::Value::from(v.clone())))
                    .collect(),
            );
            builder
                .insert(name.as_str(), resource)
                .map_err(ManifestError::from)?;
        }

        Ok(StackDefinition {
            name: builder.stack().clone(),
            region: self.region.as_deref().map(RegionName::from),
            template: builder.finish(),
        })
    }
}

fn attachment(
    volumes: &BTreeMap<&str, Volume>,
    a: &AttachmentSection,
) -> Result<Attachment, ManifestError> {
    let volume = volumes
        .get(a.volume.as_str())
        .ok_or_else(|| ManifestError::UnknownVolume(a.volume.clone()))?;
    let device = Device::from(&a.device);
    Ok(match a.replica {
        Some(ref r) => volume.attach_replica(a.mount_point.as_str(), device, r.to_string()),
        None => volume.attach(a.mount_point.as_str(), device),
    })
}

pub fn parse_manifest_str(input: &str) -> Result<StackManifest, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<StackManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

/// Load a definition from a file, or from `stack.toml` inside a directory.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<StackManifest, ManifestError> {
    let path = path.as_ref();
    if path.is_dir() {
        let file = path.join(DEFINITION_FILE);
        if !file.is_file() {
            return Err(ManifestError::MissingDefinition(path.to_path_buf()));
        }
        return parse_manifest_file(file);
    }
    parse_manifest_file(path)
}

//! Storage-oriented composition: replicated volumes, attachments, and the
//! servers that mount them.
//!
//! Every check here is local and runs before any provider call, so a
//! composition error never leaves remote state behind.

use crate::resource::{DeletionPolicy, Resource};
use crate::template::TemplateBuilder;
use crate::types::StackName;
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;
use thiserror::Error;

pub const VOLUME_TYPE: &str = "AWS::EC2::Volume";
pub const INSTANCE_TYPE: &str = "AWS::EC2::Instance";
pub const DEFAULT_SERVER_NAME: &str = "storage";
pub const DEFAULT_INSTANCE_TYPE: &str = "m1.small";

const USER_DATA_PREAMBLE: &str = "#!/bin/sh -vex\nmkdir -p /etc/stackform\n";
const ROLE_PATH: &str = "/etc/stackform/role";
const VOLUMES_PATH: &str = "/etc/stackform/volumes";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error("inconsistent attachments: {0}")]
    InconsistentAttachments(String),
    #[error("a server needs at least one attachment")]
    NoAttachments,
    #[error("attachment replica overrides cannot be used with replicated servers (volume '{0}')")]
    ReplicaOverride(String),
    #[error("volume '{volume}' has no replica '{replica}'")]
    UnknownReplica { volume: String, replica: String },
    #[error("attachments span zones '{first}' and '{other}'")]
    AmbiguousZone { first: String, other: String },
    #[error("server zone '{server}' differs from volume zone '{volume}'")]
    ZoneMismatch { server: String, volume: String },
    #[error("zone and subnet are mutually exclusive")]
    ZoneAndSubnet,
    #[error("volume '{volume}' has {expected} pieces but {actual} devices were given")]
    DeviceCount {
        volume: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate resource name '{0}'")]
    DuplicateResource(String),
    #[error("invalid volume '{volume}': {reason}")]
    InvalidVolume { volume: String, reason: String },
}

/// A logical storage unit, replicated across labelled replica slots and split
/// into `count` physical pieces per replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    stack: StackName,
    name: String,
    zone: String,
    size: u64,
    count: usize,
    replicas: Vec<String>,
}

impl Volume {
    pub fn stack(&self) -> &StackName {
        &self.stack
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn replicas(&self) -> &[String] {
        &self.replicas
    }

    /// Logical resource name of piece `index` in `replica`.
    ///
    /// `R<replica>` is appended for a non-empty label and `N<index + 1>` when
    /// the volume has more than one piece, so names are distinct across all
    /// (replica, index) pairs.
    pub fn resource_name(&self, replica: &str, index: usize) -> String {
        let mut name = self.name.clone();
        if !replica.is_empty() {
            name.push('R');
            name.push_str(replica);
        }
        if self.count > 1 {
            name.push_str(&format!("N{}", index + 1));
        }
        name
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.replicas
            .iter()
            .flat_map(|r| (0..self.count).map(move |i| self.resource_name(r, i)))
            .collect()
    }

    pub fn attach(&self, mount_point: impl Into<String>, device: impl Into<Device>) -> Attachment {
        Attachment {
            volume: self.clone(),
            mount_point: mount_point.into(),
            device: device.into(),
            replica: None,
        }
    }

    /// Attach a specific replica regardless of the server's own replica.
    pub fn attach_replica(
        &self,
        mount_point: impl Into<String>,
        device: impl Into<Device>,
        replica: impl Into<String>,
    ) -> Attachment {
        Attachment {
            replica: Some(replica.into()),
            ..self.attach(mount_point, device)
        }
    }
}

/// Device naming for the pieces of an attached volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    /// Stem expanded to `<stem>1 .. <stem>N`.
    Stem(String),
    /// One explicit path per piece.
    Paths(Vec<String>),
}

impl Device {
    fn paths(&self, volume: &Volume) -> Result<Vec<String>, CompositionError> {
        match self {
            Self::Stem(stem) => Ok((1..=volume.count).map(|n| format!("{stem}{n}")).collect()),
            Self::Paths(paths) if paths.len() == volume.count => Ok(paths.clone()),
            Self::Paths(paths) => Err(CompositionError::DeviceCount {
                volume: volume.name.clone(),
                expected: volume.count,
                actual: paths.len(),
            }),
        }
    }
}

impl From<&str> for Device {
    fn from(stem: &str) -> Self {
        Self::Stem(stem.to_owned())
    }
}

impl From<String> for Device {
    fn from(stem: String) -> Self {
        Self::Stem(stem)
    }
}

impl From<Vec<String>> for Device {
    fn from(paths: Vec<String>) -> Self {
        Self::Paths(paths)
    }
}

impl From<Vec<&str>> for Device {
    fn from(paths: Vec<&str>) -> Self {
        Self::Paths(paths.into_iter().map(str::to_owned).collect())
    }
}

/// Intended wiring of a volume into a future server. Pure value; nothing is
/// added to the template until a server is built from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    volume: Volume,
    mount_point: String,
    device: Device,
    replica: Option<String>,
}

impl Attachment {
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn replica(&self) -> Option<&str> {
        self.replica.as_deref()
    }
}

/// Instance parameters shared by every replica of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub name: String,
    pub image: String,
    pub zone: Option<String>,
    pub subnet: Option<String>,
    pub instance_type: String,
    pub domain: Option<String>,
    pub role: Option<String>,
    pub security_groups: Vec<String>,
    pub instance_profile: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ServerOptions {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_owned(),
            image: image.into(),
            zone: None,
            subnet: None,
            instance_type: DEFAULT_INSTANCE_TYPE.to_owned(),
            domain: None,
            role: None,
            security_groups: Vec::new(),
            instance_profile: None,
            tags: BTreeMap::new(),
        }
    }
}

impl TemplateBuilder {
    /// Declare a volume: one retained storage resource per replica and piece.
    pub fn volume(
        &mut self,
        name: &str,
        zone: &str,
        size: u64,
        count: usize,
        replicas: &[&str],
    ) -> Result<Volume, CompositionError> {
        let invalid = |reason: &str| CompositionError::InvalidVolume {
            volume: name.to_owned(),
            reason: reason.to_owned(),
        };
        if name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if count == 0 {
            return Err(invalid("count must be at least 1"));
        }
        if replicas.is_empty() {
            return Err(invalid("at least one replica label is required"));
        }
        let mut labels: Vec<String> = replicas.iter().map(|r| (*r).to_owned()).collect();
        labels.sort();
        labels.dedup();
        if labels.len() != replicas.len() {
            return Err(invalid("replica labels must be distinct"));
        }

        let volume = Volume {
            stack: self.stack().clone(),
            name: name.to_owned(),
            zone: zone.to_owned(),
            size,
            count,
            replicas: replicas.iter().map(|r| (*r).to_owned()).collect(),
        };

        let pieces = volume
            .resource_names()
            .into_iter()
            .map(|rname| {
                let resource = Resource::new(VOLUME_TYPE)
                    .with_property("Size", size)
                    .with_property("AvailabilityZone", zone)
                    .with_property(
                        "Tags",
                        Value::map([("Name", format!("{} {rname}", self.stack()))]),
                    )
                    .with_deletion_policy(DeletionPolicy::Retain);
                (rname, resource)
            })
            .collect();
        self.insert_all(pieces)?;
        Ok(volume)
    }

    /// Check a replicated server set without touching the template.
    pub fn validate_servers(
        &self,
        attachments: &[Attachment],
        zone: Option<&str>,
        subnet: Option<&str>,
    ) -> Result<(), CompositionError> {
        let driving = check_stack(self.stack(), attachments)?;
        for a in attachments {
            if a.replica.is_some() {
                return Err(CompositionError::ReplicaOverride(a.volume.name.clone()));
            }
            if a.volume.replicas != driving.replicas {
                return Err(CompositionError::InconsistentAttachments(format!(
                    "volume '{}' replicas {:?} differ from '{}' replicas {:?}",
                    a.volume.name, a.volume.replicas, driving.name, driving.replicas
                )));
            }
        }
        check_placement(attachments, zone, subnet)
    }

    /// Check a single server, where attachments may pin explicit replicas.
    pub fn validate_server(
        &self,
        attachments: &[Attachment],
        zone: Option<&str>,
        subnet: Option<&str>,
    ) -> Result<(), CompositionError> {
        check_stack(self.stack(), attachments)?;
        for a in attachments {
            let replica = a.replica.as_deref().unwrap_or("");
            if !a.volume.replicas.iter().any(|r| r == replica) {
                return Err(CompositionError::UnknownReplica {
                    volume: a.volume.name.clone(),
                    replica: replica.to_owned(),
                });
            }
        }
        check_placement(attachments, zone, subnet)
    }

    /// Build one instance per replica of the driving volume, named
    /// `<options.name><replica>`. Returns the logical names added.
    pub fn servers(
        &mut self,
        attachments: &[Attachment],
        options: &ServerOptions,
    ) -> Result<Vec<String>, CompositionError> {
        self.validate_servers(
            attachments,
            options.zone.as_deref(),
            options.subnet.as_deref(),
        )?;
        let names = replicated_server_names(&options.name, attachments);
        let built = names
            .iter()
            .zip(&attachments[0].volume.replicas)
            .map(|(rname, replica)| {
                server_resource(rname, replica, attachments, options).map(|r| (rname.clone(), r))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_all(built)?;
        Ok(names)
    }

    /// Build a single, unreplicated instance named `options.name`.
    pub fn server(
        &mut self,
        attachments: &[Attachment],
        options: &ServerOptions,
    ) -> Result<String, CompositionError> {
        self.validate_server(
            attachments,
            options.zone.as_deref(),
            options.subnet.as_deref(),
        )?;
        let resource = server_resource(&options.name, "", attachments, options)?;
        self.insert(options.name.clone(), resource)?;
        Ok(options.name.clone())
    }
}

/// Logical names `servers` gives its instances: `<name><replica>` for each
/// replica of the driving (first) attachment's volume.
pub fn replicated_server_names(name: &str, attachments: &[Attachment]) -> Vec<String> {
    attachments.first().map_or_else(Vec::new, |a| {
        a.volume
            .replicas
            .iter()
            .map(|replica| format!("{name}{replica}"))
            .collect()
    })
}

fn check_stack<'a>(
    stack: &StackName,
    attachments: &'a [Attachment],
) -> Result<&'a Volume, CompositionError> {
    let Some(first) = attachments.first() else {
        return Err(CompositionError::NoAttachments);
    };
    for a in attachments {
        if a.volume.stack != *stack {
            return Err(CompositionError::InconsistentAttachments(format!(
                "volume '{}' belongs to stack '{}', not '{stack}'",
                a.volume.name, a.volume.stack
            )));
        }
    }
    Ok(&first.volume)
}

fn check_placement(
    attachments: &[Attachment],
    zone: Option<&str>,
    subnet: Option<&str>,
) -> Result<(), CompositionError> {
    let vzone = attachments[0].volume.zone.as_str();
    for a in &attachments[1..] {
        if a.volume.zone != vzone {
            return Err(CompositionError::AmbiguousZone {
                first: vzone.to_owned(),
                other: a.volume.zone.clone(),
            });
        }
    }
    if let Some(zone) = zone {
        if zone != vzone {
            return Err(CompositionError::ZoneMismatch {
                server: zone.to_owned(),
                volume: vzone.to_owned(),
            });
        }
        if subnet.is_some() {
            return Err(CompositionError::ZoneAndSubnet);
        }
    }
    for a in attachments {
        a.device.paths(&a.volume)?;
    }
    Ok(())
}

/// Instance resource for one replica. Attachments must already be validated.
fn server_resource(
    rname: &str,
    replica: &str,
    attachments: &[Attachment],
    options: &ServerOptions,
) -> Result<Resource, CompositionError> {
    let mut tags = options.tags.clone();
    let hostname = options.domain.as_ref().map(|d| format!("{rname}.{d}"));
    tags.insert(
        "Name".to_owned(),
        hostname.clone().unwrap_or_else(|| rname.to_owned()),
    );

    let mut script = String::from(USER_DATA_PREAMBLE);
    if let Some(ref hostname) = hostname {
        script.push_str(&format!("hostname {hostname}\n"));
    }
    if let Some(ref role) = options.role {
        script.push_str(&format!("echo {} > {ROLE_PATH}\n", shell_quote(role)));
    }

    let mut volumes = Vec::new();
    for a in attachments {
        let areplica = a.replica.as_deref().unwrap_or(replica);
        let devices = a.device.paths(&a.volume)?;
        for (index, device) in devices.iter().enumerate() {
            volumes.push(Value::map([
                ("Device", Value::from(device)),
                (
                    "VolumeId",
                    Value::reference(a.volume.resource_name(areplica, index)),
                ),
            ]));
        }
        let line = format!("{} {}", a.mount_point, devices.join(" "));
        script.push_str(&format!("echo {} >> {VOLUMES_PATH}\n", shell_quote(&line)));
    }

    let vzone = attachments[0].volume.zone.as_str();
    let mut resource = Resource::new(INSTANCE_TYPE)
        .with_property("ImageId", options.image.as_str())
        .with_property("InstanceType", options.instance_type.as_str())
        .with_property("Tags", Value::map(tags))
        .with_property("Volumes", Value::List(volumes))
        .with_property("UserData", STANDARD.encode(script));

    match (&options.zone, &options.subnet) {
        (None, Some(subnet)) => resource.set_property("SubnetId", subnet.as_str()),
        (Some(zone), _) => resource.set_property("AvailabilityZone", zone.as_str()),
        (None, None) => resource.set_property("AvailabilityZone", vzone),
    }

    if !options.security_groups.is_empty() {
        let key = if options.subnet.is_some() {
            "SecurityGroups"
        } else {
            "SecurityGroupIds"
        };
        resource.set_property(key, options.security_groups.clone());
    }
    if let Some(ref profile) = options.instance_profile {
        resource.set_property("IamInstanceProfile", profile.as_str());
    }
    Ok(resource)
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn decode_user_data(resource: &Resource) -> String {
        let encoded = resource.property("UserData").unwrap().as_str().unwrap();
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn volume_names_cover_every_replica_and_piece() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("data", "us-east-1a", 100, 3, &["1", "2"]).unwrap();
        let names = v.resource_names();
        assert_eq!(names.len(), 6);
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 6);
        assert!(names.contains(&"dataR1N1".to_owned()));
        assert!(names.contains(&"dataR2N3".to_owned()));
        let t = b.finish();
        assert_eq!(t.resources().len(), 6);
    }

    #[test]
    fn clashing_volume_piece_leaves_builder_unchanged() {
        let mut b = TemplateBuilder::new("db");
        b.insert("vN2", Resource::new("AWS::S3::Bucket")).unwrap();
        let err = b.volume("v", "z", 1, 3, &[""]).unwrap_err();
        assert_eq!(err, CompositionError::DuplicateResource("vN2".to_owned()));
        let t = b.finish();
        assert_eq!(t.resources().keys().collect::<Vec<_>>(), vec!["vN2"]);
    }

    #[test]
    fn clashing_server_replica_leaves_builder_unchanged() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("data", "z", 1, 1, &["1", "2"]).unwrap();
        b.insert("storage2", Resource::new("AWS::S3::Bucket")).unwrap();
        let err = b
            .servers(&[v.attach("/data", "/dev/sdf")], &ServerOptions::new("ami-1"))
            .unwrap_err();
        assert_eq!(err, CompositionError::DuplicateResource("storage2".to_owned()));
        assert!(!b.contains("storage1"));
    }

    #[test]
    fn single_piece_unreplicated_volume_keeps_base_name() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("logs", "z", 5, 1, &[""]).unwrap();
        assert_eq!(v.resource_names(), vec!["logs"]);
        let t = b.finish();
        let r = t.resource("logs").unwrap();
        assert_eq!(r.resource_type(), VOLUME_TYPE);
        assert_eq!(r.deletion_policy(), Some(DeletionPolicy::Retain));
        assert_eq!(r.tag("Name"), Some(&Value::from("db logs")));
        assert_eq!(r.property("Size"), Some(&Value::Int(5)));
    }

    #[test]
    fn volume_rejects_zero_count_and_duplicate_labels() {
        let mut b = TemplateBuilder::new("db");
        assert!(matches!(
            b.volume("v", "z", 1, 0, &[""]),
            Err(CompositionError::InvalidVolume { .. })
        ));
        assert!(matches!(
            b.volume("v", "z", 1, 1, &["a", "a"]),
            Err(CompositionError::InvalidVolume { .. })
        ));
    }

    #[test]
    fn servers_build_one_instance_per_replica() {
        let t = Template::build("db", |b| {
            let data = b.volume("data", "us-east-1a", 100, 2, &["1", "2"])?;
            let mut opts = ServerOptions::new("ami-42");
            opts.role = Some("primary".to_owned());
            b.servers(&[data.attach("/data", "/dev/sdf")], &opts)?;
            Ok(())
        })
        .unwrap();

        let s1 = t.resource("storage1").unwrap();
        assert_eq!(s1.resource_type(), INSTANCE_TYPE);
        assert_eq!(s1.tag("Name"), Some(&Value::from("storage1")));
        assert_eq!(
            s1.property("AvailabilityZone"),
            Some(&Value::from("us-east-1a"))
        );
        let volumes = s1.property("Volumes").unwrap().as_list().unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[1].as_map().unwrap()["VolumeId"],
            Value::reference("dataR1N2")
        );
        assert_eq!(
            volumes[1].as_map().unwrap()["Device"],
            Value::from("/dev/sdf2")
        );

        let script = decode_user_data(t.resource("storage2").unwrap());
        assert!(script.starts_with(USER_DATA_PREAMBLE));
        assert!(script.contains("echo 'primary' > /etc/stackform/role\n"));
        assert!(script.contains("echo '/data /dev/sdf1 /dev/sdf2' >> /etc/stackform/volumes\n"));
        assert!(!script.contains("hostname"));
    }

    #[test]
    fn domain_sets_hostname_and_name_tag() {
        let t = Template::build("db", |b| {
            let data = b.volume("data", "z", 1, 1, &["a"])?;
            let mut opts = ServerOptions::new("ami-1");
            opts.domain = Some("example.com".to_owned());
            b.servers(&[data.attach("/d", "/dev/sdg")], &opts)?;
            Ok(())
        })
        .unwrap();
        let s = t.resource("storagea").unwrap();
        assert_eq!(s.tag("Name"), Some(&Value::from("storagea.example.com")));
        assert!(decode_user_data(s).contains("hostname storagea.example.com\n"));
    }

    #[test]
    fn attachments_from_another_stack_are_inconsistent() {
        let mut other = TemplateBuilder::new("other");
        let foreign = other.volume("ext", "z", 1, 1, &[""]).unwrap();

        let mut b = TemplateBuilder::new("db");
        let local = b.volume("data", "z", 1, 1, &[""]).unwrap();
        let before = b.clone().finish();
        let err = b
            .servers(
                &[local.attach("/a", "/dev/sdf"), foreign.attach("/b", "/dev/sdg")],
                &ServerOptions::new("ami"),
            )
            .unwrap_err();
        assert!(matches!(err, CompositionError::InconsistentAttachments(_)));
        assert_eq!(b.finish(), before);
    }

    #[test]
    fn mismatched_replica_sets_are_inconsistent() {
        let mut b = TemplateBuilder::new("db");
        let a = b.volume("a", "z", 1, 1, &["1", "2"]).unwrap();
        let c = b.volume("c", "z", 1, 1, &["1"]).unwrap();
        let err = b
            .servers(
                &[a.attach("/a", "/dev/sdf"), c.attach("/c", "/dev/sdg")],
                &ServerOptions::new("ami"),
            )
            .unwrap_err();
        assert!(matches!(err, CompositionError::InconsistentAttachments(_)));
    }

    #[test]
    fn attachment_zones_must_agree() {
        let mut b = TemplateBuilder::new("db");
        let a = b.volume("a", "z1", 1, 1, &[""]).unwrap();
        let c = b.volume("c", "z2", 1, 1, &[""]).unwrap();
        let err = b
            .servers(
                &[a.attach("/a", "/dev/sdf"), c.attach("/c", "/dev/sdg")],
                &ServerOptions::new("ami"),
            )
            .unwrap_err();
        assert!(matches!(err, CompositionError::AmbiguousZone { .. }));
    }

    #[test]
    fn explicit_zone_must_match_and_excludes_subnet() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("v", "z1", 1, 1, &[""]).unwrap();
        let att = [v.attach("/v", "/dev/sdf")];

        let mut opts = ServerOptions::new("ami");
        opts.zone = Some("z2".to_owned());
        assert!(matches!(
            b.servers(&att, &opts),
            Err(CompositionError::ZoneMismatch { .. })
        ));

        opts.zone = Some("z1".to_owned());
        opts.subnet = Some("subnet-1".to_owned());
        assert_eq!(b.servers(&att, &opts), Err(CompositionError::ZoneAndSubnet));
    }

    #[test]
    fn subnet_attaches_security_groups_by_name() {
        let t = Template::build("db", |b| {
            let v = b.volume("v", "z1", 1, 1, &[""])?;
            let mut opts = ServerOptions::new("ami");
            opts.subnet = Some("subnet-9".to_owned());
            opts.security_groups = vec!["web".to_owned()];
            opts.instance_profile = Some("storage-role".to_owned());
            b.servers(&[v.attach("/v", "/dev/sdf")], &opts)?;
            Ok(())
        })
        .unwrap();
        let s = t.resource("storage").unwrap();
        assert_eq!(s.property("SubnetId"), Some(&Value::from("subnet-9")));
        assert!(s.property("AvailabilityZone").is_none());
        assert_eq!(
            s.property("SecurityGroups"),
            Some(&Value::from(vec!["web"]))
        );
        assert!(s.property("SecurityGroupIds").is_none());
        assert_eq!(
            s.property("IamInstanceProfile"),
            Some(&Value::from("storage-role"))
        );
    }

    #[test]
    fn zone_placement_attaches_security_groups_by_id() {
        let t = Template::build("db", |b| {
            let v = b.volume("v", "z1", 1, 1, &[""])?;
            let mut opts = ServerOptions::new("ami");
            opts.security_groups = vec!["sg-1".to_owned()];
            b.servers(&[v.attach("/v", "/dev/sdf")], &opts)?;
            Ok(())
        })
        .unwrap();
        let s = t.resource("storage").unwrap();
        assert!(s.property("SecurityGroupIds").is_some());
        assert!(s.property("SecurityGroups").is_none());
    }

    #[test]
    fn explicit_device_list_length_must_match_count() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("v", "z", 1, 2, &[""]).unwrap();
        let err = b
            .servers(&[v.attach("/v", vec!["/dev/xvdf"])], &ServerOptions::new("ami"))
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::DeviceCount {
                volume: "v".to_owned(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn replicated_servers_reject_replica_overrides() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("v", "z", 1, 1, &["1", "2"]).unwrap();
        let err = b
            .servers(
                &[v.attach_replica("/v", "/dev/sdf", "2")],
                &ServerOptions::new("ami"),
            )
            .unwrap_err();
        assert!(matches!(err, CompositionError::ReplicaOverride(_)));
    }

    #[test]
    fn single_server_can_pin_replicas() {
        let t = Template::build("db", |b| {
            let v = b.volume("v", "z", 1, 1, &["1", "2"])?;
            let mut opts = ServerOptions::new("ami");
            opts.name = "backup".to_owned();
            b.server(&[v.attach_replica("/v", "/dev/sdf", "2")], &opts)?;
            Ok(())
        })
        .unwrap();
        let s = t.resource("backup").unwrap();
        let volumes = s.property("Volumes").unwrap().as_list().unwrap();
        assert_eq!(
            volumes[0].as_map().unwrap()["VolumeId"],
            Value::reference("vR2")
        );
    }

    #[test]
    fn single_server_rejects_unknown_replica() {
        let mut b = TemplateBuilder::new("db");
        let v = b.volume("v", "z", 1, 1, &["1"]).unwrap();
        let err = b
            .server(&[v.attach("/v", "/dev/sdf")], &ServerOptions::new("ami"))
            .unwrap_err();
        assert!(matches!(err, CompositionError::UnknownReplica { .. }));
    }

    #[test]
    fn role_is_shell_quoted() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

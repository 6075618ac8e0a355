use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the provider does with a resource's physical object when the
/// resource leaves the template or the stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// One infrastructure object's declaration within a template.
///
/// A `Tags` property given as a map is normalized on insertion into a list of
/// `{Key, Value}` entries sorted by key; no other tag form reaches the encoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    // Fields are declared in encoded-key order.
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    #[serde(rename = "Metadata", skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, Value>>,
    #[serde(rename = "Properties")]
    properties: BTreeMap<String, Value>,
    #[serde(rename = "Type")]
    resource_type: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_property(key, value);
        self
    }

    #[must_use]
    pub fn with_properties<K, V, I>(mut self, properties: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in properties {
            self.set_property(k, v);
        }
        self
    }

    /// Add a dependency. Dependencies keep first-insertion order and are
    /// never duplicated.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.depends_on.contains(&name) {
            self.depends_on.push(name);
        }
        self
    }

    #[must_use]
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let mut value = value.into();
        if key == "Tags" {
            value = normalize_tags(value);
        }
        self.properties.insert(key, value);
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.deletion_policy
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, Value>> {
        self.metadata.as_ref()
    }

    /// Look up a tag value by key on a normalized `Tags` property.
    pub fn tag(&self, key: &str) -> Option<&Value> {
        self.properties
            .get("Tags")?
            .as_list()?
            .iter()
            .filter_map(Value::as_map)
            .find(|entry| entry.get("Key").and_then(Value::as_str) == Some(key))
            .and_then(|entry| entry.get("Value"))
    }
}

fn normalize_tags(value: Value) -> Value {
    match value {
        // BTreeMap iteration is already key-ordered.
        Value::Map(tags) => Value::List(
            tags.into_iter()
                .map(|(k, v)| Value::map([("Key", Value::String(k)), ("Value", v)]))
                .collect(),
        ),
        other => other,
    }
}

use crate::compose::CompositionError;
use crate::resource::Resource;
use crate::types::{RegionName, StackName};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The complete desired-state document for one stack.
///
/// Encoding is canonical: every map is key-sorted, so identical logical
/// content always produces byte-identical output. The provider's "no updates"
/// detection relies on this.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,
}

impl Template {
    /// Build a template by handing a fresh builder for `stack` to `define`.
    pub fn build<F>(stack: impl Into<StackName>, define: F) -> Result<Self, CompositionError>
    where
        F: FnOnce(&mut TemplateBuilder) -> Result<(), CompositionError>,
    {
        let mut builder = TemplateBuilder::new(stack);
        define(&mut builder)?;
        Ok(builder.finish())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Canonical document: two-space indented JSON with sorted keys.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Blake3 hex digest of the canonical document.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let json = self.canonical_json()?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// A template under construction for a named stack.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    stack: StackName,
    template: Template,
}

impl TemplateBuilder {
    pub fn new(stack: impl Into<StackName>) -> Self {
        Self {
            stack: stack.into(),
            template: Template::default(),
        }
    }

    pub fn stack(&self) -> &StackName {
        &self.stack
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        let description = description.into();
        self.template.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
    }

    /// Add a resource under `name`. Logical names are unique per template.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        resource: Resource,
    ) -> Result<(), CompositionError> {
        let name = name.into();
        if self.template.resources.contains_key(&name) {
            return Err(CompositionError::DuplicateResource(name));
        }
        self.template.resources.insert(name, resource);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.template.resources.contains_key(name)
    }

    /// Fail on the first name that is already taken, or repeated in `names`.
    pub fn check_free<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), CompositionError> {
        let mut seen = BTreeSet::new();
        for name in names {
            if self.contains(name) || !seen.insert(name) {
                return Err(CompositionError::DuplicateResource(name.to_owned()));
            }
        }
        Ok(())
    }

    /// Add every resource or none of them.
    pub fn insert_all(&mut self, resources: Vec<(String, Resource)>) -> Result<(), CompositionError> {
        self.check_free(resources.iter().map(|(name, _)| name.as_str()))?;
        self.template.resources.extend(resources);
        Ok(())
    }

    pub fn finish(self) -> Template {
        self.template
    }
}

/// A composed template together with the stack it converges.
#[derive(Debug, Clone, PartialEq)]
pub struct StackDefinition {
    pub name: StackName,
    pub region: Option<RegionName>,
    pub template: Template,
}

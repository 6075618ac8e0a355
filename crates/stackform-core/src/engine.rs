use crate::converge::{converge, ConvergeOptions, Outcome};
use crate::event::Event;
use crate::lookup::ProviderLookup;
use crate::poll::PollSettings;
use crate::teardown::destroy;
use crate::CoreError;
use serde::Serialize;
use stackform_provider::{Cloud, StackStatus};
use stackform_schema::{load_manifest, Lookup, RegionName, StackDefinition, StackManifest};
use std::path::Path;
use tracing::info;

/// Result of converging one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub stack: String,
    pub region: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub stack: String,
    pub region: String,
    pub status: StackStatus,
}

/// A composed definition with its canonical document.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub definition: StackDefinition,
    pub document: String,
    pub digest: String,
}

impl Rendered {
    /// Compose `manifest` with `lookup` and serialize the result.
    pub fn compose<L>(manifest: &StackManifest, lookup: &mut L) -> Result<Self, CoreError>
    where
        L: Lookup<Error = CoreError>,
    {
        let definition = manifest.compose(lookup)?;
        let document = definition.template.canonical_json()?;
        let digest = definition.template.digest()?;
        Ok(Self {
            definition,
            document,
            digest,
        })
    }
}

/// Facade over a provider: load, compose, converge, and tear down stacks.
pub struct Deployer<C: Cloud> {
    cloud: C,
    poll: PollSettings,
    default_region: Option<RegionName>,
}

impl<C: Cloud> Deployer<C> {
    pub fn new(cloud: C) -> Self {
        Self {
            cloud,
            poll: PollSettings::default(),
            default_region: None,
        }
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_default_region(mut self, region: Option<RegionName>) -> Self {
        self.default_region = region;
        self
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Region a definition converges in: the override, then the definition's
    /// own region, then the configured default.
    fn target_region(
        &self,
        manifest: &StackManifest,
        region: Option<&RegionName>,
    ) -> Option<RegionName> {
        region
            .cloned()
            .or_else(|| manifest.region.as_deref().map(RegionName::from))
            .or_else(|| self.default_region.clone())
    }

    /// Compose a definition, resolving lookups in its target region.
    pub fn render(
        &self,
        manifest: &StackManifest,
        region: Option<&RegionName>,
    ) -> Result<Rendered, CoreError> {
        let target = self.target_region(manifest, region);
        let mut lookup = ProviderLookup::new(&self.cloud, target.clone());
        let mut rendered = Rendered::compose(manifest, &mut lookup)?;
        rendered.definition.region = target;
        Ok(rendered)
    }

    /// Load a definition from `path` and converge it.
    pub fn apply(
        &self,
        path: &Path,
        region: Option<&RegionName>,
        options: ConvergeOptions,
        observer: &mut dyn FnMut(&Event),
    ) -> Result<ApplyReport, CoreError> {
        info!("loading stack definition from {}", path.display());
        let manifest = load_manifest(path)?;
        self.apply_manifest(&manifest, region, options, observer)
    }

    pub fn apply_manifest(
        &self,
        manifest: &StackManifest,
        region: Option<&RegionName>,
        options: ConvergeOptions,
        observer: &mut dyn FnMut(&Event),
    ) -> Result<ApplyReport, CoreError> {
        let rendered = self.render(manifest, region)?;
        let stack = rendered.definition.name.to_string();
        let region = rendered
            .definition
            .region
            .clone()
            .ok_or_else(|| CoreError::NoRegion(stack.clone()))?;

        let conn = self.cloud.connect(&region)?;
        let outcome = converge(
            conn.as_ref(),
            &stack,
            &rendered.definition.template,
            options,
            &self.poll,
            observer,
        )?;
        Ok(ApplyReport {
            stack,
            region: region.to_string(),
            outcome,
            digest: rendered.digest,
        })
    }

    pub fn destroy(
        &self,
        stack: &str,
        region: Option<&RegionName>,
        observer: &mut dyn FnMut(&Event),
    ) -> Result<TeardownReport, CoreError> {
        let (handle, status) = destroy(&self.cloud, stack, region, &self.poll, observer)?;
        Ok(TeardownReport {
            stack: stack.to_owned(),
            region: handle.region.to_string(),
            status,
        })
    }

    /// Tear down stacks one after another, stopping at the first failure.
    /// Reports for stacks already deleted are returned alongside the error.
    pub fn destroy_all(
        &self,
        stacks: &[String],
        region: Option<&RegionName>,
        observer: &mut dyn FnMut(&Event),
    ) -> (Vec<TeardownReport>, Result<(), CoreError>) {
        let mut reports = Vec::with_capacity(stacks.len());
        for stack in stacks {
            match self.destroy(stack, region, observer) {
                Ok(report) => reports.push(report),
                Err(e) => return (reports, Err(e)),
            }
        }
        (reports, Ok(()))
    }
}

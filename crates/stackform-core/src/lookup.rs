use crate::CoreError;
use stackform_provider::{Cloud, Connection};
use stackform_schema::{Lookup, RegionName};
use tracing::debug;

/// Resolves definition lookups against one region, connecting on first use.
pub struct ProviderLookup<'a> {
    cloud: &'a dyn Cloud,
    region: Option<RegionName>,
    connection: Option<Box<dyn Connection>>,
}

impl<'a> ProviderLookup<'a> {
    pub fn new(cloud: &'a dyn Cloud, region: Option<RegionName>) -> Self {
        Self {
            cloud,
            region,
            connection: None,
        }
    }

    fn connection(&mut self) -> Result<&dyn Connection, CoreError> {
        if self.connection.is_none() {
            let region = self.region.as_ref().ok_or_else(|| {
                CoreError::Lookup("a region is required to resolve lookups".to_owned())
            })?;
            self.connection = Some(self.cloud.connect(region)?);
        }
        self.connection
            .as_deref()
            .ok_or_else(|| CoreError::Lookup("no provider connection".to_owned()))
    }
}

impl Lookup for ProviderLookup<'_> {
    type Error = CoreError;

    fn image_id(&mut self, name: &str) -> Result<String, CoreError> {
        let images = self.connection()?.find_images_by_tag("Name", name)?;
        debug!("image lookup {name}: {} match(es)", images.len());
        match images.as_slice() {
            [image] => Ok(image.id.clone()),
            _ => Err(CoreError::Lookup(format!(
                "expected exactly one image named '{name}', found {}",
                images.len()
            ))),
        }
    }

    fn stack_resource(&mut self, stack: &str, resource: &str) -> Result<String, CoreError> {
        let summary = self
            .connection()?
            .describe_stack_resource(stack, resource)?;
        debug!("{stack}/{resource} -> {}", summary.physical_id);
        Ok(summary.physical_id)
    }
}

/// Lookup for rendering without a provider. Literal values compose normally;
/// any lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLookup;

impl Lookup for OfflineLookup {
    type Error = CoreError;

    fn image_id(&mut self, name: &str) -> Result<String, CoreError> {
        Err(CoreError::Lookup(format!(
            "image '{name}' needs a provider connection to resolve"
        )))
    }

    fn stack_resource(&mut self, stack: &str, resource: &str) -> Result<String, CoreError> {
        Err(CoreError::Lookup(format!(
            "{stack}/{resource} needs a provider connection to resolve"
        )))
    }
}

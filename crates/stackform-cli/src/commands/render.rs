use super::{json_pretty, ProviderArgs, EXIT_SUCCESS};
use stackform_core::{OfflineLookup, Rendered};
use stackform_schema::{load_manifest, RegionName};
use std::path::Path;

/// Print the canonical document. Lookups go to the provider when one is
/// configured; otherwise only literal values can be rendered.
pub fn run(
    provider: &ProviderArgs,
    source: &Path,
    region: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(source).map_err(|e| format!("stack definition error: {e}"))?;
    let region = region.map(RegionName::from);

    let rendered = if provider.is_configured() {
        let deployer = provider.deployer(0)?;
        deployer
            .render(&manifest, region.as_ref())
            .map_err(|e| e.to_string())?
    } else {
        let mut rendered =
            Rendered::compose(&manifest, &mut OfflineLookup).map_err(|e| e.to_string())?;
        if region.is_some() {
            rendered.definition.region = region;
        }
        rendered
    };

    if json {
        let template: serde_json::Value = serde_json::from_str(&rendered.document)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        let payload = serde_json::json!({
            "stack": rendered.definition.name,
            "region": rendered.definition.region,
            "digest": rendered.digest,
            "template": template,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", rendered.document);
        eprintln!("digest: {}", rendered.digest);
    }
    Ok(EXIT_SUCCESS)
}

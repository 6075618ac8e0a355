use super::{json_pretty, progress, spin_fail, spin_ok, spinner, ProviderArgs, EXIT_SUCCESS};
use stackform_schema::RegionName;

pub fn run(
    provider: &ProviderArgs,
    stacks: &[String],
    region: Option<&str>,
    poll_interval: u64,
    json: bool,
) -> Result<u8, String> {
    let deployer = provider.deployer(poll_interval)?;
    let region = region.map(RegionName::from);

    let pb = if json {
        None
    } else {
        Some(spinner("tearing down..."))
    };
    let mut observer = progress(pb.as_ref());
    let (reports, result) = deployer.destroy_all(stacks, region.as_ref(), &mut observer);

    if let Some(ref pb) = pb {
        if result.is_ok() {
            spin_ok(pb, &format!("{} stack(s) deleted", reports.len()));
        } else {
            spin_fail(pb, "teardown failed");
        }
    }

    if json {
        println!("{}", json_pretty(&reports)?);
    } else {
        for r in &reports {
            println!("deleted stack {} in {} ({})", r.stack, r.region, r.status);
        }
    }
    result.map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}

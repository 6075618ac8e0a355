use super::{json_pretty, progress, spin_fail, spin_ok, spinner, ProviderArgs, EXIT_SUCCESS};
use stackform_core::{Action, ApplyReport, ConvergeOptions, Outcome};
use stackform_schema::RegionName;
use std::path::Path;

pub fn run(
    provider: &ProviderArgs,
    source: &Path,
    region: Option<&str>,
    create_only: bool,
    poll_interval: u64,
    json: bool,
) -> Result<u8, String> {
    let deployer = provider.deployer(poll_interval)?;
    let region = region.map(RegionName::from);

    let pb = if json {
        None
    } else {
        Some(spinner("converging stack..."))
    };
    let mut observer = progress(pb.as_ref());
    let result = deployer.apply(
        source,
        region.as_ref(),
        ConvergeOptions { create_only },
        &mut observer,
    );

    let report = match result {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &summary(&r));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "apply failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("{}", summary(&report));
        println!("digest: {}", report.digest);
    }
    Ok(EXIT_SUCCESS)
}

fn summary(report: &ApplyReport) -> String {
    match report.outcome {
        Outcome::Converged { action, status } => {
            let verb = match action {
                Action::Create => "created",
                Action::Update => "updated",
                Action::Delete => "deleted",
            };
            format!("{verb} stack {} in {} ({status})", report.stack, report.region)
        }
        Outcome::Unchanged => format!("stack {} in {} is up to date", report.stack, report.region),
    }
}

pub mod apply;
pub mod completions;
pub mod render;
pub mod teardown;

use indicatif::{ProgressBar, ProgressStyle};
use stackform_core::{Deployer, Event, PollSettings};
use stackform_provider::{HttpCloud, Phase, ProviderConfig, StackStatus};
use stackform_schema::RegionName;
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DEFINITION_ERROR: u8 = 2;
pub const EXIT_PROVIDER_ERROR: u8 = 3;
pub const EXIT_CONVERGENCE_FAILED: u8 = 4;

/// Provider settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ProviderArgs {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub config: Option<PathBuf>,
}

impl ProviderArgs {
    /// Flags override the config file. An explicit `--config` must load; the
    /// default location is optional when `--endpoint` is given.
    pub fn resolve(&self) -> Result<ProviderConfig, String> {
        let file = match self.config {
            Some(ref path) => Some(
                ProviderConfig::load(path)
                    .map_err(|e| format!("cannot load {}: {e}", path.display()))?,
            ),
            None => ProviderConfig::load_default().ok(),
        };
        let mut config = match (self.endpoint.as_deref(), file) {
            (Some(url), file) => {
                let mut c = ProviderConfig::new(url);
                if let Some(f) = file {
                    c.auth_token = f.auth_token;
                    c.default_region = f.default_region;
                }
                c
            }
            (None, Some(f)) => f,
            (None, None) => {
                return Err(
                    "no provider endpoint: pass --endpoint, set STACKFORM_ENDPOINT, or create ~/.config/stackform/provider.json"
                        .to_owned(),
                )
            }
        };
        if let Some(ref token) = self.token {
            config.auth_token = Some(token.clone());
        }
        Ok(config)
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
            || self.config.is_some()
            || ProviderConfig::load_default().is_ok()
    }

    pub fn deployer(&self, poll_interval: u64) -> Result<Deployer<HttpCloud>, String> {
        let config = self.resolve()?;
        let default_region = config.default_region.as_deref().map(RegionName::from);
        Ok(Deployer::new(HttpCloud::new(&config))
            .with_poll(PollSettings::new(Duration::from_secs(poll_interval)))
            .with_default_region(default_region))
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: StackStatus) -> String {
    use console::Style;
    let text = status.to_string();
    let style = match status.phase {
        Phase::Complete if text.contains("ROLLBACK") => Style::new().red(),
        Phase::Complete => Style::new().green(),
        Phase::Failed => Style::new().red().bold(),
        Phase::InProgress | Phase::CleanupInProgress => Style::new().yellow(),
    };
    style.apply_to(text).to_string()
}

/// Observer that prints one status line per event above the spinner.
/// Silent in JSON mode, where no spinner exists.
pub fn progress(pb: Option<&ProgressBar>) -> impl FnMut(&Event) + '_ {
    move |event: &Event| {
        let Some(pb) = pb else { return };
        let line = match event {
            Event::Located { stack, region } => format!("found {stack} in {region}"),
            Event::Submitted {
                stack,
                region,
                action,
            } => format!("{action} of {stack} submitted in {region}"),
            Event::Status { stack, status } => format!("{stack}: {}", colorize_status(*status)),
            Event::Unchanged { stack } => format!("{stack}: no updates to perform"),
        };
        pb.suspend(|| println!("{line}"));
    }
}

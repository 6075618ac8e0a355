use clap::Parser;
use stackform_provider::MockCloud;
use stackform_server::Gateway;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "stackform-server",
    about = "In-memory provider gateway for the Stackform protocol v1"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8340)]
    port: u16,

    /// Region to simulate (repeatable).
    #[arg(long = "region", default_value = "us-east-1")]
    regions: Vec<String>,

    /// Image registered in every region, as NAME=ID (repeatable).
    #[arg(long = "image", value_parser = parse_image)]
    images: Vec<(String, String)>,

    /// Require this bearer token on every request.
    #[arg(long, env = "STACKFORM_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

fn parse_image(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, id)) if !name.is_empty() && !id.is_empty() => {
            Ok((name.to_owned(), id.to_owned()))
        }
        _ => Err(format!("expected NAME=ID, got '{s}'")),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let cloud = MockCloud::new(cli.regions.iter().map(String::as_str));
    for region in &cli.regions {
        for (name, id) in &cli.images {
            if let Err(e) = cloud.add_image(region, id, name) {
                error!("cannot register image {name}: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    let mut gateway = Gateway::new(cloud);
    if let Some(token) = cli.token {
        gateway = gateway.with_token(token);
    }

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting stackform-server on {addr}");
    info!("regions: {}", cli.regions.join(", "));

    match stackform_server::run_server(&gateway, &addr) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

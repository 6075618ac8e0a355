mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    ProviderArgs, EXIT_CONVERGENCE_FAILED, EXIT_DEFINITION_ERROR, EXIT_FAILURE,
    EXIT_PROVIDER_ERROR,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stackform",
    version,
    about = "Declarative infrastructure stacks, converged to a cloud provider"
)]
struct Cli {
    /// Provider gateway URL (overrides the config file).
    #[arg(long, env = "STACKFORM_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token for the provider gateway.
    #[arg(long, env = "STACKFORM_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Provider config file [default: ~/.config/stackform/provider.json].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update a stack from its definition and wait for completion.
    Apply {
        /// Definition file, or a directory containing stack.toml.
        #[arg(default_value = ".")]
        source: PathBuf,
        /// Region to converge in (overrides the definition).
        #[arg(short, long)]
        region: Option<String>,
        /// Fail instead of updating a stack that already exists.
        #[arg(long, default_value_t = false)]
        create_only: bool,
        /// Seconds between status reads while waiting.
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        poll_interval: u64,
    },
    /// Delete stacks one after another, stopping at the first failure.
    Teardown {
        /// Stack names.
        #[arg(required = true)]
        stacks: Vec<String>,
        /// Only look for the stacks in this region.
        #[arg(short, long)]
        region: Option<String>,
        /// Seconds between status reads while waiting.
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        poll_interval: u64,
    },
    /// Print the canonical template document for a definition.
    Render {
        /// Definition file, or a directory containing stack.toml.
        #[arg(default_value = ".")]
        source: PathBuf,
        /// Region for lookups (overrides the definition).
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STACKFORM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let provider = ProviderArgs {
        endpoint: cli.endpoint,
        token: cli.token,
        config: cli.config,
    };
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Apply {
            source,
            region,
            create_only,
            poll_interval,
        } => commands::apply::run(
            &provider,
            &source,
            region.as_deref(),
            create_only,
            poll_interval,
            json_output,
        ),
        Commands::Teardown {
            stacks,
            region,
            poll_interval,
        } => commands::teardown::run(
            &provider,
            &stacks,
            region.as_deref(),
            poll_interval,
            json_output,
        ),
        Commands::Render { source, region } => {
            commands::render::run(&provider, &source, region.as_deref(), json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("stack definition error:") || msg.starts_with("composition error:") {
        EXIT_DEFINITION_ERROR
    } else if msg.starts_with("provider error:") || msg.starts_with("lookup error:") {
        EXIT_PROVIDER_ERROR
    } else if msg.starts_with("convergence failed") {
        EXIT_CONVERGENCE_FAILED
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn error_prefixes_map_to_exit_codes() {
        assert_eq!(
            exit_code_for("stack definition error: inconsistent attachments: x"),
            EXIT_DEFINITION_ERROR
        );
        assert_eq!(
            exit_code_for("provider error: provider fault Throttling: Rate exceeded"),
            EXIT_PROVIDER_ERROR
        );
        assert_eq!(
            exit_code_for("convergence failed for stack 'web': expected UPDATE_COMPLETE, got ROLLBACK_COMPLETE"),
            EXIT_CONVERGENCE_FAILED
        );
        assert_eq!(exit_code_for("stack not found: web"), EXIT_FAILURE);
    }

    #[test]
    fn teardown_requires_a_stack_name() {
        assert!(Cli::try_parse_from(["stackform", "teardown"]).is_err());
        let cli = Cli::try_parse_from(["stackform", "teardown", "a", "b", "-r", "us-east-1"]).unwrap();
        match cli.command {
            Commands::Teardown { stacks, region, poll_interval } => {
                assert_eq!(stacks, vec!["a", "b"]);
                assert_eq!(region.as_deref(), Some("us-east-1"));
                assert_eq!(poll_interval, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

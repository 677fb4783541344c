use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod workflow;

use config::{deployment_active, env_lookup, Settings};

#[derive(Parser)]
#[command(name = "evo")]
#[command(about = "Evolve versioned automation workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ./evo.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, package and record the next version
    Run {
        /// Version to produce (defaults to one past the latest stored)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        version: Option<u32>,
    },

    /// Delete broken archives from a version on and rewind the ledger
    Cleanup {
        /// First version to scan
        #[arg(long)]
        from: u32,
    },

    /// Show the version ledger
    Ledger,

    /// List versions held in the staging bucket
    Versions,

    /// List buckets of the configured storage backend
    Buckets,

    /// Check a workflow file against milestones, node types and rules
    Validate {
        /// Workflow JSON file
        file: PathBuf,

        /// Version whose milestones apply
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        version: u32,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("evo=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let json = cli.json;

    // A disabled deployment does nothing, not even config loading.
    if matches!(cli.command, Commands::Run { .. }) && !deployment_active(env_lookup) {
        if json {
            println!("{}", serde_json::json!({ "status": "disabled" }));
        } else {
            println!("Deployment inactive (set DEPLOYMENT_ACTIVE=true); nothing to do.");
        }
        return 0;
    }

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return commands::report_error(&e.into(), json),
    };
    settings.apply_env(env_lookup);

    match cli.command {
        Commands::Run { version } => {
            if let Err(e) = settings.check_env(env_lookup) {
                return commands::report_error(&e.into(), json);
            }
            commands::run_cmd::cmd_run(&settings, version, json)
        }
        Commands::Cleanup { from } => commands::cleanup::cmd_cleanup(&settings, from, json),
        Commands::Ledger => commands::ledger_cmd::cmd_ledger(&settings, json),
        Commands::Versions => commands::versions::cmd_versions(&settings, json),
        Commands::Buckets => commands::versions::cmd_buckets(&settings, json),
        Commands::Validate { file, version } => {
            commands::validate_cmd::cmd_validate(&settings, &file, version, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_version_must_be_positive() {
        assert!(Cli::try_parse_from(["evo", "run", "--version", "0"]).is_err());
        let cli = Cli::try_parse_from(["evo", "run", "--version", "4"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { version: Some(4) }));
    }

    #[test]
    fn test_validate_version_must_be_positive() {
        assert!(Cli::try_parse_from(["evo", "validate", "w.json", "--version", "0"]).is_err());
        let cli = Cli::try_parse_from(["evo", "validate", "w.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate { version: 1, .. }));
    }
}

//! `equicalc` command line tool
//!
//! - `calculate` runs the three-stage pipeline once for a scenario file
//! - `simulate` streams a Monte Carlo run and prints progress

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

const DEFAULT_LOG_FILTER: &str = "equicalc=info";

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("Client configuration file (TOML)");

    Command::new("equicalc")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Startup offer calculations against the equicalc service")
        .arg_required_else_help(true)
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("calculate")
                .about("Run monthly projection, opportunity cost and startup scenario")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario file (TOML)"),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the result as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Stream a Monte Carlo simulation")
                .arg(
                    Arg::new("simulation")
                        .long("simulation")
                        .short('s')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Simulation configuration file (TOML)"),
                )
                .arg(config_arg)
                .arg(
                    Arg::new("url")
                        .long("url")
                        .help("Override the simulation WebSocket URL"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match matches.subcommand() {
        Some(("calculate", args)) => {
            let options = commands::calculate::Options {
                input: args.get_one::<PathBuf>("input").cloned().unwrap_or_default(),
                config: args.get_one::<PathBuf>("config").cloned(),
                json: args.get_flag("json"),
            };
            commands::calculate::run(options).await
        }
        Some(("simulate", args)) => {
            let options = commands::simulate::Options {
                simulation: args
                    .get_one::<PathBuf>("simulation")
                    .cloned()
                    .unwrap_or_default(),
                config: args.get_one::<PathBuf>("config").cloned(),
                url: args.get_one::<String>("url").cloned(),
            };
            commands::simulate::run(options).await
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn calculate_requires_input() {
        let result = cli().try_get_matches_from(["equicalc", "calculate"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flag_after_subcommand() {
        let matches = cli()
            .try_get_matches_from(["equicalc", "simulate", "-s", "sim.toml", "--json-logs"])
            .unwrap();
        assert!(matches.get_flag("json-logs"));
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(
            args.get_one::<PathBuf>("simulation"),
            Some(&PathBuf::from("sim.toml"))
        );
    }
}

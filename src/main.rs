use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use pfsim::AppCommand;
use pfsim::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Simulate the portfolio over its historical period
    History {
        /// Write the daily frame and summary as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },
    /// Project the portfolio into the future with Monte Carlo paths
    Forecast {
        /// Forecast horizon in years, overriding the configuration
        #[arg(short, long)]
        years: Option<u32>,
        /// Write the forecast bands and summary as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },
    /// List the available model portfolios
    Templates,
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::History { json } => AppCommand::History { export: json },
            Commands::Forecast { years, json } => AppCommand::Forecast {
                horizon_years: years,
                export: json,
            },
            Commands::Templates => AppCommand::Templates,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match &cli.config_path {
            Some(path) => pfsim::cli::setup::setup_at_path(path),
            None => pfsim::cli::setup::setup(),
        },
        Some(cmd) => pfsim::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use anyhow::Result;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::core::config::AppConfig;
use crate::providers::YahooFinanceProvider;
use crate::store::KeyValueStore;

const DEFAULT_YAHOO_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    History {
        export: Option<PathBuf>,
    },
    Forecast {
        horizon_years: Option<u32>,
        export: Option<PathBuf>,
    },
    Templates,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    if command == AppCommand::Templates {
        return cli::templates::run();
    }

    info!("Portfolio simulator starting...");
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    config.validate()?;
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path().ok();
    let store = KeyValueStore::open(data_path.as_deref());
    let base_url = config
        .providers
        .yahoo
        .as_ref()
        .map_or(DEFAULT_YAHOO_URL, |p| &p.base_url);
    let provider = YahooFinanceProvider::new(base_url, &store);

    match command {
        AppCommand::History { export } => cli::history::run(&config, &provider, export.as_deref()).await,
        AppCommand::Forecast {
            horizon_years,
            export,
        } => cli::forecast::run(&config, &provider, horizon_years, export.as_deref()).await,
        AppCommand::Templates => cli::templates::run(),
    }
}

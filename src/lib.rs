pub mod backfill;
pub mod cli;
pub mod core;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod store;

use crate::core::config::AppConfig;
use crate::service::RateService;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Commands the binary dispatches after parsing its arguments.
pub enum AppCommand {
    Rate {
        source: String,
        target: String,
        date: Option<NaiveDate>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Convert {
        amount: Decimal,
        source: String,
        target: String,
        date: Option<NaiveDate>,
    },
    Backfill {
        source: String,
        target: String,
        from: NaiveDate,
        to: NaiveDate,
        wait: bool,
    },
    Refresh {
        base: Option<String>,
        date: Option<NaiveDate>,
    },
}

/// Opens the rate store and wires the resolution stack on top of it.
pub fn build_service(config: &AppConfig) -> Result<RateService> {
    let data_path = config.default_data_path()?;
    let store = store::FjallRateStore::open(data_path.join("rates"))
        .with_context(|| format!("Failed to open rate store at {}", data_path.display()))?;
    Ok(RateService::build(config, Arc::new(store)))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Exchange rate resolver starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let service = build_service(&config)?;
    let today = chrono::Utc::now().date_naive();

    match command {
        AppCommand::Rate {
            source,
            target,
            date,
            from,
            to,
        } => match (from, to) {
            (Some(from), Some(to)) => {
                cli::rate::run_range(&service, &source, &target, from, to).await
            }
            (None, None) => {
                cli::rate::run(&service, &source, &target, date.unwrap_or(today)).await
            }
            _ => anyhow::bail!("--from and --to must be used together"),
        },
        AppCommand::Convert {
            amount,
            source,
            target,
            date,
        } => cli::convert::run(&service, amount, &source, &target, date.unwrap_or(today)).await,
        AppCommand::Backfill {
            source,
            target,
            from,
            to,
            wait,
        } => cli::backfill::run(&service, &source, &target, from, to, wait).await,
        AppCommand::Refresh { base, date } => {
            cli::refresh::run(&service, base.as_deref(), date.unwrap_or(today)).await
        }
    }
}

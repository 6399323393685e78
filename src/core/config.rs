use crate::core::currency::{Currency, CurrencyCode};
use crate::registry::{ProviderKind, ProviderSettings};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateOptions {
    /// Decimal places kept for derived rates and converted amounts.
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Store derived inverse rates instead of recomputing them.
    #[serde(default)]
    pub materialize_inverse: bool,
}

impl Default for RateOptions {
    fn default() -> Self {
        RateOptions {
            scale: default_scale(),
            materialize_inverse: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackfillOptions {
    /// Largest gap (days) a range request fills inline; wider gaps go
    /// to a background job.
    #[serde(default = "default_inline_gap_limit")]
    pub inline_gap_limit: usize,
    /// Upper bound on a single backfill window.
    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        BackfillOptions {
            inline_gap_limit: default_inline_gap_limit(),
            max_window_days: default_max_window_days(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: CurrencyCode,
    #[serde(default = "default_currencies")]
    pub currencies: Vec<Currency>,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub rates: RateOptions,
    #[serde(default)]
    pub backfill: BackfillOptions,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            base_currency: default_base_currency(),
            currencies: default_currencies(),
            providers: default_providers(),
            rates: RateOptions::default(),
            backfill: BackfillOptions::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "fxr")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "fxr")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

fn default_scale() -> u32 {
    6
}

fn default_inline_gap_limit() -> usize {
    7
}

fn default_max_window_days() -> u32 {
    3650
}

fn default_base_currency() -> CurrencyCode {
    CurrencyCode::parse("USD").expect("static currency code")
}

fn default_currencies() -> Vec<Currency> {
    vec![
        currency("USD", "US Dollar", "$"),
        currency("EUR", "Euro", "€"),
        currency("GBP", "Pound Sterling", "£"),
        currency("CHF", "Swiss Franc", "Fr"),
    ]
}

fn default_providers() -> Vec<ProviderSettings> {
    vec![
        ProviderSettings {
            name: "frankfurter".to_string(),
            kind: ProviderKind::Frankfurter,
            priority: 1,
            enabled: true,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            retries: 2,
            rate: None,
        },
        ProviderSettings {
            name: "beacon".to_string(),
            kind: ProviderKind::Beacon,
            priority: 2,
            enabled: false,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            retries: 2,
            rate: None,
        },
        ProviderSettings {
            name: "fixed".to_string(),
            kind: ProviderKind::Fixed,
            priority: 99,
            enabled: false,
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            retries: 0,
            rate: None,
        },
    ]
}

fn currency(code: &str, name: &str, symbol: &str) -> Currency {
    Currency {
        code: CurrencyCode::parse(code).expect("static currency code"),
        name: name.to_string(),
        symbol: symbol.to_string(),
    }
}

/// Configuration loading from a TOML file layered under `KIS_*` environment variables
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{KisError, Result};
use crate::types::Environment;

/// Client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KisConfig {
    // Broker Credentials
    pub app_key: String,
    pub app_secret: String,
    /// `XXXXXXXX-XX`
    pub account_no: String,
    #[serde(default = "default_environment")]
    pub environment: Environment,

    // Token Management
    /// Directory for the token cache (default `~/.kis`)
    #[serde(default)]
    pub token_dir: Option<PathBuf>,
    #[serde(default = "default_safety_margin_secs")]
    pub token_safety_margin_secs: i64,

    // Transport
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional client-side throttle
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    #[serde(default)]
    pub rest_base_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default)]
    pub history: HistoryConfig,
}

/// Range aggregation settings
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Calendar days per daily-candle window
    #[serde(default = "default_daily_window_days")]
    pub daily_window_days: i64,
    /// Minutes per intraday window
    #[serde(default = "default_minute_window_minutes")]
    pub minute_window_minutes: i64,
    /// Delay between windows; defaults depend on the environment
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            daily_window_days: default_daily_window_days(),
            minute_window_minutes: default_minute_window_minutes(),
            request_delay_ms: None,
        }
    }
}

impl HistoryConfig {
    /// Paper trading allows ~2 req/s, live ~20 req/s
    pub fn request_delay(&self, environment: Environment) -> Duration {
        let ms = self.request_delay_ms.unwrap_or(match environment {
            Environment::Paper => 600,
            Environment::Live => 60,
        });
        Duration::from_millis(ms)
    }
}

fn default_environment() -> Environment {
    Environment::Paper
}

fn default_safety_margin_secs() -> i64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_daily_window_days() -> i64 {
    140
}

fn default_minute_window_minutes() -> i64 {
    100
}

impl KisConfig {
    /// Minimal config for the given credentials; everything else defaulted
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        account_no: impl Into<String>,
        environment: Environment,
    ) -> Self {
        KisConfig {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            account_no: account_no.into(),
            environment,
            token_dir: None,
            token_safety_margin_secs: default_safety_margin_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            requests_per_second: None,
            rest_base_url: None,
            ws_url: None,
            history: HistoryConfig::default(),
        }
    }

    /// Split the account number into `(CANO, ACNT_PRDT_CD)`
    pub fn account_parts(&self) -> (String, String) {
        split_account_no(&self.account_no)
    }

    pub fn safety_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_safety_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub(crate) fn split_account_no(account_no: &str) -> (String, String) {
    match account_no.split_once('-') {
        Some((cano, product)) => (cano.to_string(), product.to_string()),
        None if account_no.len() == 10 => (account_no[..8].to_string(), account_no[8..].to_string()),
        None => (account_no.to_string(), "01".to_string()),
    }
}

/// Load from an optional TOML file, then `KIS_*` environment variables on top.
///
/// Nested keys use `__`, e.g. `KIS_HISTORY__DAILY_WINDOW_DAYS=120`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<KisConfig> {
    let config: KisConfig = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(env_source())
        .build()
        .map_err(|e| KisError::Config(format!("Failed to read config: {}", e)))?
        .try_deserialize()
        .map_err(|e| KisError::Config(format!("Failed to parse config: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load from `KIS_*` environment variables only
pub fn load_config_from_env() -> Result<KisConfig> {
    let config: KisConfig = config::Config::builder()
        .add_source(env_source())
        .build()
        .map_err(|e| KisError::Config(format!("Failed to read environment: {}", e)))?
        .try_deserialize()
        .map_err(|e| KisError::Config(format!("Failed to parse config: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("KIS")
        .prefix_separator("_")
        .separator("__")
}

/// Largest accepted `daily_window_days` / `minute_window_minutes`
pub const MAX_HISTORY_WINDOW: i64 = 10_000;

pub fn validate_config(config: &KisConfig) -> Result<()> {
    if config.app_key.trim().is_empty() {
        return Err(KisError::Config("app_key is empty".to_string()));
    }

    if config.app_secret.trim().is_empty() {
        return Err(KisError::Config("app_secret is empty".to_string()));
    }

    let (cano, product) = config.account_parts();
    let well_formed = cano.len() == 8
        && product.len() == 2
        && cano.chars().chain(product.chars()).all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(KisError::Config(format!(
            "Invalid account_no: {} (expected XXXXXXXX-XX)",
            config.account_no
        )));
    }

    if config.token_safety_margin_secs < 0 {
        return Err(KisError::Config(format!(
            "Invalid token_safety_margin_secs: {}",
            config.token_safety_margin_secs
        )));
    }

    let windows = [config.history.daily_window_days, config.history.minute_window_minutes];
    if windows.iter().any(|w| !(1..=MAX_HISTORY_WINDOW).contains(w)) {
        return Err(KisError::Config(format!(
            "History window sizes must be within 1..={}",
            MAX_HISTORY_WINDOW
        )));
    }

    Ok(())
}

//! Application configuration.
//!
//! Sources are layered in this order:
//! 1. `config/default.toml`
//! 2. `config/{RUN_ENV}.toml`
//! 3. Environment variables (`APP__*`, `__` as separator)

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Currency facts for the single deployment currency. Read-only after
/// startup; injected through constructors, never read from a global.
#[derive(Clone, Debug, Deserialize)]
pub struct CurrencyConfig {
    #[serde(default = "default_currency_code")]
    pub code: String,
    #[serde(default = "default_currency_symbol")]
    pub symbol: String,
    #[serde(default = "default_currency_decimals")]
    pub decimals: u32,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: default_currency_code(),
            symbol: default_currency_symbol(),
            decimals: default_currency_decimals(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuoteConfig {
    /// How long an issued quote stays usable.
    #[serde(default = "default_quote_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval for the expired-quote sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_quote_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl QuoteConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TaxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub prices_include_tax: bool,
    /// Fallback lookup address when a quote has no destination.
    #[serde(default = "default_base_country")]
    pub base_country: String,
    #[serde(default)]
    pub base_state: String,
}

/// One API key pair with its scope (`read` or `write`).
#[derive(Clone, Debug, Deserialize)]
pub struct ApiKeyEntry {
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default = "default_key_scope")]
    pub scope: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1024))]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Public base URL of the storefront, used for payment links.
    #[serde(default = "default_public_url")]
    #[validate(url)]
    pub public_url: String,

    #[serde(default)]
    pub currency: CurrencyConfig,

    #[serde(default)]
    pub quote: QuoteConfig,

    #[serde(default)]
    pub tax: TaxConfig,

    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            public_url: default_public_url(),
            currency: CurrencyConfig::default(),
            quote: QuoteConfig::default(),
            tax: TaxConfig::default(),
            api_keys: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_public_url() -> String {
    "https://shop.example.com".to_string()
}
fn default_currency_code() -> String {
    "USD".to_string()
}
fn default_currency_symbol() -> String {
    "$".to_string()
}
fn default_currency_decimals() -> u32 {
    2
}
fn default_quote_ttl_secs() -> u64 {
    900
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_base_country() -> String {
    "US".to_string()
}
fn default_key_scope() -> String {
    "read".to_string()
}

/// Initializes tracing with the configured level as the default filter.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("checkout_api={level},tower_http=info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt().with_env_filter(filter).try_init();
}

/// Loads and validates the application configuration.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(environment = %run_env, "loading configuration");

    let config = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.currency.decimals, 2);
        assert_eq!(config.quote.ttl_secs, 900);
        assert!(!config.tax.enabled);
        assert!(!config.is_production());
    }

    #[test]
    fn quote_ttl_converts_to_duration() {
        let quote = QuoteConfig {
            ttl_secs: 900,
            sweep_interval_secs: 0,
        };
        assert_eq!(quote.ttl(), Duration::from_secs(900));
        // Sweeper interval never collapses to a busy loop.
        assert_eq!(quote.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn validation_rejects_privileged_ports() {
        let config = AppConfig {
            port: 80,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_bad_public_url() {
        let config = AppConfig {
            public_url: "not a url".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

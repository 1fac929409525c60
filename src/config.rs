use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_PAYMENT_WINDOW_MINS: i64 = 30;
const DEFAULT_SWEEPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Fee percentages applied to every checkout. Each fee amount is
/// `round(subtotal * percent / 100)`, rounded to whole currency units.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FeeConfig {
    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub admin_fee_percent: f64,

    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub service_fee_percent: f64,

    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub tax_percent: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            admin_fee_percent: 0.0,
            service_fee_percent: 0.0,
            tax_percent: 0.0,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Payment gateway server key (Basic auth credential for the Snap API)
    pub midtrans_server_key: String,

    /// Use the production gateway endpoint instead of the sandbox
    #[serde(default)]
    pub midtrans_is_production: bool,

    /// Gateway base URL override (tests point this at a local mock)
    #[serde(default)]
    pub midtrans_base_url: Option<String>,

    /// Webhook secret for verifying payment gateway callbacks.
    /// Unset disables verification (sandbox only; logged loudly).
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default)]
    pub payment_webhook_tolerance_secs: Option<u64>,

    /// Minutes a pending order may await payment before the sweeper cancels it
    #[serde(default = "default_payment_window_mins")]
    #[validate(custom = "validate_payment_window")]
    pub payment_window_mins: i64,

    /// Interval between background expiry sweeps (seconds)
    #[serde(default = "default_sweeper_interval_secs")]
    pub sweeper_interval_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Checkout fee configuration
    #[serde(default)]
    #[validate]
    pub fees: FeeConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_idle_timeout_secs() -> u64 {
    600
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_payment_window_mins() -> i64 {
    DEFAULT_PAYMENT_WINDOW_MINS
}

fn default_sweeper_interval_secs() -> u64 {
    DEFAULT_SWEEPER_INTERVAL_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn validate_percent(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        let mut err = ValidationError::new("percent_out_of_range");
        err.message = Some("fee percent must be a finite value between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn validate_payment_window(value: i64) -> Result<(), ValidationError> {
    if !(1..=24 * 60).contains(&value) {
        let mut err = ValidationError::new("payment_window_out_of_range");
        err.message = Some("payment_window_mins must be between 1 and 1440".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling; everything else takes
    /// the documented defaults.
    pub fn new(
        database_url: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            midtrans_server_key: "SB-Mid-server-test".to_string(),
            midtrans_is_production: false,
            midtrans_base_url: None,
            payment_webhook_secret: None,
            payment_webhook_tolerance_secs: None,
            payment_window_mins: default_payment_window_mins(),
            sweeper_interval_secs: default_sweeper_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            fees: FeeConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.cors_allow_any_origin || self.is_development()
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/` files and `APP__`-prefixed environment
/// variables. The gateway server key has no default outside development.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://digistore.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check for the server key before deserialization to give a clear error
    if config.get_string("midtrans_server_key").is_err() {
        if run_env == DEFAULT_ENV || run_env == "test" {
            info!("midtrans_server_key not configured; using sandbox placeholder");
        } else {
            error!("Payment gateway server key is not configured. Set APP__MIDTRANS_SERVER_KEY.");
            return Err(AppConfigError::Load(ConfigError::NotFound(
                "midtrans_server_key is required but not configured".into(),
            )));
        }
    }

    let config = Config::builder()
        .add_source(config)
        .set_default("midtrans_server_key", "SB-Mid-server-test")?
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("digistore_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}

use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use tracing_subscriber::EnvFilter;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_CAPACITY: usize = 1000;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_RECONCILE_GRACE_SECS: u64 = 120;

/// Cache configuration for the order-listing query cache.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TTL for cached list results in seconds
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,

    /// Maximum number of cached entries
    #[serde(default = "default_cache_capacity")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_cache_ttl(),
            max_entries: default_cache_capacity(),
        }
    }
}

/// Payment gateway connection settings. Credentials come from the
/// environment in real deployments (`APP_GATEWAY__API_KEY` etc.).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub merchant_id: String,

    #[serde(default)]
    pub api_key: String,

    /// Bounded timeout for intent creation requests
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,

    /// URL the provider redirects the customer back to
    #[serde(default = "default_return_url")]
    pub return_url: String,

    /// Shared secret for webhook HMAC verification; verification is
    /// skipped when unset (local development only)
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Maximum accepted age of a signed webhook timestamp
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            merchant_id: String::new(),
            api_key: String::new(),
            timeout_secs: default_gateway_timeout(),
            return_url: default_return_url(),
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

/// Role-based meal prices in the smallest currency unit.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_guardian_lunch")]
    pub guardian_lunch: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_guardian_snack")]
    pub guardian_snack: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_staff_lunch")]
    pub staff_lunch: i64,

    #[validate(range(min = 1))]
    #[serde(default = "default_staff_snack")]
    pub staff_snack: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            guardian_lunch: default_guardian_lunch(),
            guardian_snack: default_guardian_snack(),
            staff_lunch: default_staff_lunch(),
            staff_snack: default_staff_snack(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// ISO-4217 code every order is denominated in
    #[validate(length(min = 3, max = 3))]
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Create tables from entities on startup (SQLite/dev deployments)
    #[serde(default)]
    pub auto_create_schema: bool,

    /// Per-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds an order must sit in processing_payment without a webhook
    /// before manual confirmation is allowed
    #[serde(default = "default_reconcile_grace")]
    pub reconcile_grace_secs: u64,

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

    #[validate]
    #[serde(default)]
    pub cache: CacheConfig,

    #[validate]
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[validate]
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            auto_create_schema: false,
            request_timeout_secs: default_request_timeout(),
            reconcile_grace_secs: default_reconcile_grace(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            cache: CacheConfig::default(),
            gateway: GatewayConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn default_true() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn default_gateway_base_url() -> String {
    "http://localhost:9000".to_string()
}
fn default_gateway_timeout() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}
fn default_return_url() -> String {
    "http://localhost:3000/payment/return".to_string()
}
fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_guardian_lunch() -> i64 {
    450
}
fn default_guardian_snack() -> i64 {
    250
}
fn default_staff_lunch() -> i64 {
    400
}
fn default_staff_snack() -> i64 {
    200
}
fn default_database_url() -> String {
    "sqlite::memory:".to_string()
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
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_reconcile_grace() -> u64 {
    DEFAULT_RECONCILE_GRACE_SECS
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

/// Loads configuration from `config/default`, `config/{environment}` and
/// `APP_`-prefixed environment variables (e.g. `APP_GATEWAY__API_KEY`),
/// later sources overriding earlier ones.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    Ok(cfg)
}

/// Initializes the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

const DEFAULT_OTP_CODE_LENGTH: u8 = 6;
const DEFAULT_OTP_TTL_MINUTES: i64 = 10;
const DEFAULT_OTP_RESEND_COOLDOWN_SECS: i64 = 60;
const DEFAULT_OTP_MAX_ATTEMPTS: i32 = 5;

const DEFAULT_GATEWAY_API_BASE: &str = "https://api.razorpay.com";
const DEFAULT_GATEWAY_CURRENCY: &str = "INR";

/// One-time-code tuning knobs.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OtpConfig {
    /// Number of digits in a generated code
    #[serde(default = "default_otp_code_length")]
    #[validate(range(min = 4, max = 10))]
    pub code_length: u8,

    /// Minutes before an issued code expires
    #[serde(default = "default_otp_ttl_minutes")]
    #[validate(range(min = 1))]
    pub ttl_minutes: i64,

    /// Seconds during which a re-send request is silently ignored
    #[serde(default = "default_otp_resend_cooldown_secs")]
    #[validate(range(min = 0))]
    pub resend_cooldown_secs: i64,

    /// Wrong-code attempts allowed before the record is purged
    #[serde(default = "default_otp_max_attempts")]
    #[validate(range(min = 1))]
    pub max_attempts: i32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_OTP_CODE_LENGTH,
            ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
            resend_cooldown_secs: DEFAULT_OTP_RESEND_COOLDOWN_SECS,
            max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
        }
    }
}

/// Payment gateway credentials and endpoint.
///
/// Empty credentials are a legal configuration: the payment service
/// reports `ServiceUnavailable` before attempting any remote call.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub key_id: String,

    #[serde(default)]
    pub key_secret: String,

    #[serde(default = "default_gateway_api_base")]
    pub api_base: String,

    /// ISO currency code used for all charges
    #[serde(default = "default_gateway_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        !self.key_id.trim().is_empty() && !self.key_secret.trim().is_empty()
    }
}

/// Transactional mail API endpoint.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    /// From address stamped on outgoing verification mail
    #[serde(default)]
    pub from: String,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    #[validate]
    pub otp: OtpConfig,

    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub mail: MailConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_otp_code_length() -> u8 {
    DEFAULT_OTP_CODE_LENGTH
}

fn default_otp_ttl_minutes() -> i64 {
    DEFAULT_OTP_TTL_MINUTES
}

fn default_otp_resend_cooldown_secs() -> i64 {
    DEFAULT_OTP_RESEND_COOLDOWN_SECS
}

fn default_otp_max_attempts() -> i32 {
    DEFAULT_OTP_MAX_ATTEMPTS
}

fn default_gateway_api_base() -> String {
    DEFAULT_GATEWAY_API_BASE.to_string()
}

fn default_gateway_currency() -> String {
    DEFAULT_GATEWAY_CURRENCY.to_string()
}

impl AppConfig {
    /// Loads configuration from `config/{default,<env>}.toml` plus
    /// `APP__`-prefixed environment variables, then validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let cfg: AppConfig = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
        Ok(cfg)
    }

    /// Minimal configuration for tests and embedded use.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: "test".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            otp: OtpConfig::default(),
            gateway: GatewayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "rzp_test_secret".to_string(),
                api_base: DEFAULT_GATEWAY_API_BASE.to_string(),
                currency: DEFAULT_GATEWAY_CURRENCY.to_string(),
            },
            mail: MailConfig::default(),
        }
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG`, when set and non-empty, overrides the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("agrimarket_core={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

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

use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing::{error, info};

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,

    pub database_url: String,
    pub auto_migrate: bool,

    // JWT secret has no default; it must come from the environment or a
    // config file.
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiration: u64,

    pub cors_allowed_origins: Option<String>,
    pub cors_allow_any_origin: bool,

    /// Base URL of the external checkout-preference processor.
    pub payment_api_url: String,
    /// Access token for the processor; checkout fails without it.
    pub payment_access_token: Option<String>,
    /// Hard timeout on every processor call, in seconds.
    pub payment_timeout_secs: u64,
    /// Public URL the processor should deliver webhook notifications to.
    pub payment_notification_url: Option<String>,
    /// Shared secret for webhook signature verification. When set, the
    /// x-signature header is mandatory on every notification.
    pub payment_webhook_secret: Option<String>,
    /// Accepted clock skew for signed webhook timestamps, in seconds.
    pub payment_webhook_tolerance_secs: u64,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be non-zero".to_string());
        }
        if self.jwt_secret.len() < 32 {
            return Err("jwt_secret must be at least 32 characters".to_string());
        }
        if self.payment_timeout_secs == 0 || self.payment_timeout_secs > 120 {
            return Err("payment_timeout_secs must be between 1 and 120".to_string());
        }
        if self.payment_api_url.is_empty() {
            return Err("payment_api_url must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting a config profile
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

    let builder = Config::builder()
        .set_default("environment", DEFAULT_ENV)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("database_url", "sqlite://quitanda.db?mode=rwc")?
        .set_default("auto_migrate", true)?
        .set_default("jwt_issuer", "quitanda-api")?
        .set_default("jwt_expiration", 3600)?
        .set_default("cors_allow_any_origin", false)?
        .set_default("payment_api_url", "https://api.mercadopago.com")?
        .set_default("payment_timeout_secs", 10)?
        .set_default("payment_webhook_tolerance_secs", 300)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check for jwt_secret before deserialization to provide a clear error
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET with a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("quitanda_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

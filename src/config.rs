use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Restaurant read-cache configuration. TTL bounds cross-instance
/// staleness; writes invalidate the local entry immediately.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Split-payment gateway settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// API credentials issued by the gateway.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,

    /// Shared secret for webhook signature verification.
    #[serde(default)]
    pub webhook_secret: String,

    /// Platform commission retained from every payment (fraction).
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,

    /// Vendor settlement schedule: 1 = next business day (default),
    /// 2 = instant.
    #[serde(default = "default_settlement_schedule")]
    pub settlement_schedule: u8,

    /// Outbound call timeout. Calls that exceed it are treated as failed
    /// and never retried within the same request.
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            webhook_secret: String::new(),
            commission_rate: default_commission_rate(),
            settlement_schedule: default_settlement_schedule(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL. Postgres in production; tests run against
    /// `sqlite::memory:` so the whole engine works on an ephemeral store
    /// without any call-site branching.
    pub database_url: String,

    /// Redis connection URL (realtime fan-out transport).
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Realtime broadcast backend: "in-process" or "redis".
    #[serde(default = "default_broadcaster")]
    pub broadcaster: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate]
    pub gateway: GatewayConfig,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool tuning
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    900
}
fn default_gateway_base_url() -> String {
    "https://sandbox.gateway.dineline.io".to_string()
}
fn default_commission_rate() -> Decimal {
    dec!(0.01)
}
fn default_settlement_schedule() -> u8 {
    1
}
fn default_gateway_timeout_secs() -> u64 {
    5
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_broadcaster() -> String {
    "in-process".to_string()
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

impl AppConfig {
    /// Loads configuration from layered sources: `config/default`, an
    /// environment-specific file, and `APP_`-prefixed env vars (highest
    /// precedence, `__` as section separator).
    pub fn load() -> Result<Self, ConfigError> {
        let run_env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("environment", run_env.clone())?
            .set_default("host", "127.0.0.1")?;

        let default_file = Path::new(CONFIG_DIR).join("default");
        let env_file = Path::new(CONFIG_DIR).join(&run_env);
        builder = builder
            .add_source(File::from(default_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        info!(environment = %cfg.environment, port = cfg.port, "Configuration loaded");
        Ok(cfg)
    }

    /// Minimal constructor used by tests.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            redis_url: default_redis_url(),
            broadcaster: default_broadcaster(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            log_json: false,
            cache: CacheConfig::default(),
            gateway: GatewayConfig {
                webhook_secret: "test-webhook-secret".to_string(),
                ..GatewayConfig::default()
            },
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 5,
            db_idle_timeout_secs: 60,
            db_acquire_timeout_secs: 5,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg = AppConfig::for_tests("sqlite::memory:");
        assert_eq!(cfg.gateway.commission_rate, dec!(0.01));
        assert_eq!(cfg.gateway.settlement_schedule, 1);
        assert_eq!(cfg.cache.ttl_secs, 900);
        assert!(!cfg.is_production());
    }
}

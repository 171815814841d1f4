use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Absent disables rate limiting and Redis event publishing.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BusinessRules {
    #[serde(default = "default_notice_minutes")]
    pub cancellation_notice_minutes: i64,
    #[serde(default = "default_code_length")]
    pub boarding_code_length: usize,
    #[serde(default = "default_code_validity_minutes")]
    pub boarding_code_validity_minutes: i64,
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u64,
}

fn default_notice_minutes() -> i64 { 120 }
fn default_code_length() -> usize { 6 }
fn default_code_validity_minutes() -> i64 { 120 }
fn default_rate_limit() -> u64 { 120 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            cancellation_notice_minutes: default_notice_minutes(),
            boarding_code_length: default_code_length(),
            boarding_code_validity_minutes: default_code_validity_minutes(),
            tax_rate: 0.0,
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Mounts the unauthenticated booking route used for operational testing.
    #[serde(default)]
    pub enable_test_routes: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Per-transaction `lock_timeout`; 0 waits indefinitely.
    #[serde(default)]
    pub lock_timeout_ms: u64,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SHUTTLE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("SHUTTLE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Build from an inline TOML document, without files or environment.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

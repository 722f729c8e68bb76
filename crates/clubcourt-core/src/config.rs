//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub settings: SettingsCacheConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Redis configuration
///
/// Without a URL the settings cache stays in process.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: Option<String>,
}

/// Settings cache behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsCacheConfig {
    /// How long a club's settings stay cached
    #[serde(default = "default_settings_ttl")]
    pub cache_ttl_secs: u64,

    /// Serve built-in defaults when the store fails and nothing is cached
    #[serde(default = "default_true")]
    pub fallback_to_default: bool,
}

fn default_settings_ttl() -> u64 {
    300
}

impl Default for SettingsCacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_settings_ttl(),
            fallback_to_default: true,
        }
    }
}

/// Ledger policy
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LedgerConfig {
    /// Let admin debit adjustments take a balance below zero
    #[serde(default)]
    pub allow_admin_overdraft: bool,
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("settings.cache_ttl_secs", 300)?
            .set_default("settings.fallback_to_default", true)?
            .set_default("ledger.allow_admin_overdraft", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CLUBCOURT__ prefix
            .add_source(
                Environment::with_prefix("CLUBCOURT")
                    .separator("__")
                    .try_parsing(true),
            );

        // Conventional variables used by sqlx tooling and container setups
        if let Ok(url) = env::var("DATABASE_URL") {
            builder = builder.set_default("database.url", url)?;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            builder = builder.set_default("redis.url", url)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CLUBCOURT").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_default() {
        let config: AppConfig = Config::builder()
            .set_default("server.port", 9090)
            .unwrap()
            .set_default("database.url", "postgres://localhost/clubcourt")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server_addr(), "0.0.0.0:9090");
        assert!(config.redis.url.is_none());
        assert_eq!(config.settings.cache_ttl_secs, 300);
        assert!(config.settings.fallback_to_default);
        assert!(!config.ledger.allow_admin_overdraft);
        assert!(config.database.run_migrations);
    }
}

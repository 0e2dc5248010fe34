// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layered configuration: `AppConfig::default()` gives every key a sane
// value, an optional TOML file overrides it, and `PRINTBROKER_*` environment
// variables override the file. Only the file/env loading lives in the
// server binary; this module owns the shape and the defaults.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_deadline_secs: u64,
    pub max_message_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9100,
            read_deadline_secs: 30,
            max_message_bytes: 200 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub tls_enabled: bool,
    pub certfile: Option<String>,
    pub keyfile: Option<String>,
    pub cafile: Option<String>,
    pub jwt_secret_key: Option<String>,
    pub token_expiration_hours: i64,
    pub requests_per_minute: u32,
    pub burst_size: Option<u32>,
    pub max_file_size_mb: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tls_enabled: true,
            certfile: None,
            keyfile: None,
            cafile: None,
            jwt_secret_key: None,
            token_expiration_hours: 24,
            requests_per_minute: 60,
            burst_size: None,
            max_file_size_mb: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub name: Option<String>,
    pub use_mock: bool,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            name: None,
            use_mock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "./data/printbroker.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_idle_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_idle_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cleanup_retention_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub printer: PrinterConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub temp_folder: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            printer: PrinterConfig::default(),
            database: DatabaseConfig::default(),
            rate_limit: RateLimitConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
            temp_folder: "./data/incoming".to_string(),
        }
    }
}

impl SecurityConfig {
    /// Burst capacity for the rate limiter: the configured value, or twice
    /// `requests_per_minute` when unset.
    pub fn effective_burst_size(&self) -> u32 {
        self.burst_size.unwrap_or(self.requests_per_minute * 2)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 9100);
        assert!(cfg.security.tls_enabled);
        assert_eq!(cfg.security.token_expiration_hours, 24);
        assert_eq!(cfg.security.requests_per_minute, 60);
        assert_eq!(cfg.security.max_file_size_mb, 100);
        assert_eq!(cfg.server.max_message_bytes, 200 * 1024 * 1024);
        assert_eq!(cfg.rate_limit.max_idle_secs, 600);
        assert_eq!(cfg.rate_limit.sweep_interval_secs, 300);
        assert_eq!(cfg.store.cleanup_retention_days, 30);
    }

    #[test]
    fn burst_size_defaults_to_double_rpm() {
        let mut sec = SecurityConfig::default();
        sec.requests_per_minute = 30;
        assert_eq!(sec.effective_burst_size(), 60);
        sec.burst_size = Some(10);
        assert_eq!(sec.effective_burst_size(), 10);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = AppConfig::default();
        let encoded = serde_json::to_string(&cfg).expect("serialize");
        let decoded: AppConfig = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded.server.port, cfg.server.port);
        assert_eq!(decoded.security.requests_per_minute, cfg.security.requests_per_minute);
    }
}

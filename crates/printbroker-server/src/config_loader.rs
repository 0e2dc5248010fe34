// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layers an `AppConfig` three ways: built-in defaults, an optional TOML
// file, then `PRINTBROKER_*` environment variables, in that order. Each
// layer only needs to mention the keys it changes.

use printbroker_core::{AppConfig, PrintBrokerError};
use std::path::Path;

pub fn load(config_path: Option<&Path>) -> Result<AppConfig, PrintBrokerError> {
    let mut config = AppConfig::default();

    if let Some(path) = config_path {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PrintBrokerError::Internal(format!("reading config file: {e}")))?;
        config = toml::from_str(&contents)
            .map_err(|e| PrintBrokerError::Internal(format!("parsing config file: {e}")))?;
    }

    apply_env_overrides(&mut config);
    Ok(config)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Some(v) = env_var("PRINTBROKER_SERVER_HOST") {
        config.server.host = v;
    }
    if let Some(v) = env_var("PRINTBROKER_SERVER_PORT") {
        if let Ok(port) = v.parse() {
            config.server.port = port;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_TLS_ENABLED") {
        if let Ok(enabled) = v.parse() {
            config.security.tls_enabled = enabled;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_CERTFILE") {
        config.security.certfile = Some(v);
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_KEYFILE") {
        config.security.keyfile = Some(v);
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_CAFILE") {
        config.security.cafile = Some(v);
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_JWT_SECRET_KEY") {
        config.security.jwt_secret_key = Some(v);
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_TOKEN_EXPIRATION_HOURS") {
        if let Ok(hours) = v.parse() {
            config.security.token_expiration_hours = hours;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_REQUESTS_PER_MINUTE") {
        if let Ok(rpm) = v.parse() {
            config.security.requests_per_minute = rpm;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_BURST_SIZE") {
        if let Ok(burst) = v.parse() {
            config.security.burst_size = Some(burst);
        }
    }
    if let Some(v) = env_var("PRINTBROKER_SECURITY_MAX_FILE_SIZE_MB") {
        if let Ok(mb) = v.parse() {
            config.security.max_file_size_mb = mb;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_PRINTER_NAME") {
        config.printer.name = Some(v);
    }
    if let Some(v) = env_var("PRINTBROKER_PRINTER_USE_MOCK") {
        if let Ok(use_mock) = v.parse() {
            config.printer.use_mock = use_mock;
        }
    }
    if let Some(v) = env_var("PRINTBROKER_DATABASE_URL") {
        config.database.url = v;
    }
    if let Some(v) = env_var("PRINTBROKER_TEMP_FOLDER") {
        config.temp_folder = v;
    }
    if let Some(v) = env_var("PRINTBROKER_LOGGING_LEVEL") {
        config.logging.level = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_file_and_no_env() {
        let config = load(None).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printbroker.toml");
        std::fs::write(&path, "[server]\nport = 9200\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9200);
        // Untouched keys keep their defaults.
        assert_eq!(config.security.requests_per_minute, 60);
    }

    #[test]
    fn env_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printbroker.toml");
        std::fs::write(&path, "[server]\nport = 9200\n").unwrap();
        // SAFETY: test-local env var, no other test in this process reads it.
        unsafe {
            std::env::set_var("PRINTBROKER_SERVER_PORT", "9300");
        }
        let config = load(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("PRINTBROKER_SERVER_PORT");
        }
        assert_eq!(config.server.port, 9300);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/printbroker.toml"))).unwrap_err();
        assert!(matches!(err, PrintBrokerError::Internal(_)));
    }
}

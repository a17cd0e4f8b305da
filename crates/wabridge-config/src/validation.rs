// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Invalid configuration terminates the process at start, so
//! validation collects every error instead of failing fast.

use thiserror::Error;

use crate::model::{BridgeConfig, RuntimeEnv};

/// Recognized log levels, in severity order. `fatal` is accepted for
/// compatibility with the previous deployment and maps to `error`.
pub const LOG_LEVELS: &[&str] = &["fatal", "error", "warn", "info", "debug", "trace"];

/// A configuration validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation error: {message}")]
    Validation { message: String },
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(validation("PORT must be non-zero"));
    }

    if config.server.host.trim().is_empty() {
        errors.push(validation("HOST must not be empty"));
    }

    if !LOG_LEVELS.contains(&config.runtime.log_level.as_str()) {
        errors.push(validation(format!(
            "LOG_LEVEL `{}` is not one of {}",
            config.runtime.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.auth.require_auth {
        let min_jwt = match config.runtime.env {
            RuntimeEnv::Production => 64,
            _ => 32,
        };
        if config.auth.jwt_secret.len() < min_jwt {
            errors.push(validation(format!(
                "JWT_SECRET must be at least {min_jwt} characters ({} environment), got {}",
                config.runtime.env,
                config.auth.jwt_secret.len()
            )));
        }
        if config.auth.api_key.len() < 16 {
            errors.push(validation(format!(
                "API_KEY must be at least 16 characters, got {}",
                config.auth.api_key.len()
            )));
        }
    } else if config.runtime.env == RuntimeEnv::Production {
        errors.push(validation(
            "REQUIRE_AUTH must not be disabled in production",
        ));
    }

    if config.upstream.session_dir.trim().is_empty() {
        errors.push(validation("WHATSAPP_SESSION_DIR must not be empty"));
    }

    if config.upstream.timeout_ms == 0 {
        errors.push(validation("WHATSAPP_TIMEOUT must be positive"));
    }

    if config.upstream.qr_timeout_ms == 0 {
        errors.push(validation("QR_TIMEOUT must be positive"));
    }

    if config.upstream.max_reconnect_attempts == 0 {
        errors.push(validation("MAX_RECONNECT_ATTEMPTS must be at least 1"));
    }

    if let Some(ref url) = config.default_sink.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(validation(format!(
                "LOCAI_WEBHOOK_URL must be an http(s) URL, got `{url}`"
            )));
        }
    }

    if config.cors.allowed_origins.trim().is_empty() {
        errors.push(validation(
            "ALLOWED_ORIGINS must be `*` or a comma-separated origin list",
        ));
    }

    if config.uploads.max_file_size == 0 {
        errors.push(validation("MAX_FILE_SIZE must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

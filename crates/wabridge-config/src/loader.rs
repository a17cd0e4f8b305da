// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered merging.
//!
//! The deployment contract is environment-variable driven: compiled
//! defaults are overridden by the exact variable names recognized below.
//! Variable names are historical (the service replaced a Node deployment)
//! and must not change.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BridgeConfig;

/// Recognized environment variables, lowercased as Figment presents them.
///
/// Anything not in this list is ignored so unrelated process environment
/// (PATH, HOME, ...) never collides with config keys.
const RECOGNIZED_VARS: &[&str] = &[
    "node_env",
    "port",
    "host",
    "base_url",
    "jwt_secret",
    "api_key",
    "require_auth",
    "allowed_origins",
    "log_level",
    "whatsapp_session_dir",
    "whatsapp_timeout",
    "qr_timeout",
    "max_reconnect_attempts",
    "locai_webhook_url",
    "locai_webhook_secret",
    "rate_limit_window",
    "rate_limit_max",
    "max_file_size",
    "upload_dir",
    "cache_ttl",
];

/// Load configuration from compiled defaults plus the process environment.
pub fn load_config() -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML snippet (tests and tooling only; the
/// deployment path is environment-only).
pub fn load_config_from_str(toml_content: &str) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Create the environment provider mapping the flat historical variable
/// names onto the sectioned config model.
fn env_provider() -> Env {
    Env::raw()
        .filter(|key| {
            RECOGNIZED_VARS
                .iter()
                .any(|v| key.as_str().eq_ignore_ascii_case(v))
        })
        .map(|key| {
            // `key` is the lowercased variable name.
            let mapped: String = match key.as_str() {
                "node_env" => "runtime.env".into(),
                "log_level" => "runtime.log_level".into(),
                "cache_ttl" => "runtime.cache_ttl_secs".into(),
                "port" => "server.port".into(),
                "host" => "server.host".into(),
                "base_url" => "server.base_url".into(),
                "jwt_secret" => "auth.jwt_secret".into(),
                "api_key" => "auth.api_key".into(),
                "require_auth" => "auth.require_auth".into(),
                "allowed_origins" => "cors.allowed_origins".into(),
                "whatsapp_session_dir" => "upstream.session_dir".into(),
                "whatsapp_timeout" => "upstream.timeout_ms".into(),
                "qr_timeout" => "upstream.qr_timeout_ms".into(),
                "max_reconnect_attempts" => "upstream.max_reconnect_attempts".into(),
                "locai_webhook_url" => "default_sink.url".into(),
                "locai_webhook_secret" => "default_sink.secret".into(),
                "rate_limit_window" => "rate_limit.window_ms".into(),
                "rate_limit_max" => "rate_limit.max_requests".into(),
                "max_file_size" => "uploads.max_file_size".into(),
                "upload_dir" => "uploads.dir".into(),
                other => other.into(),
            };
            mapped.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuntimeEnv;

    #[test]
    fn defaults_load_without_environment() {
        figment::Jail::expect_with(|_jail| {
            let config = load_config().expect("defaults should load");
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.runtime.env, RuntimeEnv::Development);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PORT", "8080");
            jail.set_env("NODE_ENV", "production");
            jail.set_env("WHATSAPP_SESSION_DIR", "/var/lib/wabridge/sessions");
            jail.set_env("MAX_RECONNECT_ATTEMPTS", "3");
            jail.set_env("LOCAI_WEBHOOK_URL", "https://sink.local/wh");

            let config = load_config().expect("env config should load");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.runtime.env, RuntimeEnv::Production);
            assert_eq!(config.upstream.session_dir, "/var/lib/wabridge/sessions");
            assert_eq!(config.upstream.max_reconnect_attempts, 3);
            assert_eq!(config.default_sink.url.as_deref(), Some("https://sink.local/wh"));
            Ok(())
        });
    }

    #[test]
    fn unrelated_environment_is_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SERVER", "should-not-bind");
            jail.set_env("RUNTIME", "should-not-bind");
            let config = load_config().expect("unrelated vars must not break loading");
            assert_eq!(config.server.host, "0.0.0.0");
            Ok(())
        });
    }

    #[test]
    fn toml_snippet_loads_for_tests() {
        let config = load_config_from_str(
            r#"
[server]
port = 4000

[auth]
api_key = "test-key-0123456789"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.auth.api_key, "test-key-0123456789");
    }

    #[test]
    fn unknown_toml_key_is_rejected() {
        let result = load_config_from_str(
            r#"
[server]
prot = 4000
"#,
        );
        assert!(result.is_err());
    }
}

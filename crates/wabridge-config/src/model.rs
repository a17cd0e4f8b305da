// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wabridge gateway.
//!
//! Every field is backed by an environment variable (see `loader`); the
//! section layout exists so related settings travel together. All structs
//! use `#[serde(deny_unknown_fields)]` to reject unrecognized keys at
//! startup.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Wabridge configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Process environment and logging.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP server bind settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// API authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Cross-origin settings for the HTTP API.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Upstream chat network session settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Webhook sink auto-registered for every newly created session.
    #[serde(default)]
    pub default_sink: DefaultSinkConfig,

    /// Rate limit settings (enforced by the fronting middleware).
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upload limits for multipart message routes.
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Deployment environment, from `NODE_ENV`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnv {
    #[default]
    Development,
    Production,
    Test,
}

/// Process environment and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Deployment environment (`NODE_ENV`).
    #[serde(default)]
    pub env: RuntimeEnv,

    /// Logging level (`LOG_LEVEL`): fatal, error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Generic cache TTL in seconds (`CACHE_TTL`).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            env: RuntimeEnv::Development,
            log_level: default_log_level(),
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_ttl() -> u64 {
    300
}

/// HTTP server bind configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Port to bind (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host address to bind (`HOST`).
    #[serde(default = "default_host")]
    pub host: String,

    /// Externally visible base URL (`BASE_URL`). Empty means derived from
    /// host and port.
    #[serde(default)]
    pub base_url: String,
}

impl ServerConfig {
    /// The externally visible base URL, deriving a localhost default when
    /// `BASE_URL` is unset.
    pub fn public_base_url(&self) -> String {
        if self.base_url.is_empty() {
            format!("http://localhost:{}", self.port)
        } else {
            self.base_url.clone()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_url: String::new(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// API authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Secret for signing/verifying tenant access tokens (`JWT_SECRET`).
    #[serde(default)]
    pub jwt_secret: String,

    /// Shared API key (`API_KEY`).
    #[serde(default)]
    pub api_key: String,

    /// Whether the API requires authentication (`REQUIRE_AUTH`).
    #[serde(default = "default_require_auth")]
    pub require_auth: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            api_key: String::new(),
            require_auth: default_require_auth(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "jwt_secret",
                &if self.jwt_secret.is_empty() { "[unset]" } else { "[redacted]" },
            )
            .field(
                "api_key",
                &if self.api_key.is_empty() { "[unset]" } else { "[redacted]" },
            )
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

fn default_require_auth() -> bool {
    true
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// `ALLOWED_ORIGINS`: `*` or a comma-separated list of origins.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
}

impl CorsConfig {
    /// Whether any origin is allowed.
    pub fn allow_any(&self) -> bool {
        self.allowed_origins.trim() == "*"
    }

    /// The configured origin list (empty when `*`).
    pub fn origin_list(&self) -> Vec<String> {
        if self.allow_any() {
            return Vec::new();
        }
        self.allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> String {
    "*".to_string()
}

/// Upstream chat network session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Base directory for per-tenant credential bundles
    /// (`WHATSAPP_SESSION_DIR`).
    #[serde(default = "default_session_dir")]
    pub session_dir: String,

    /// Upstream connect/query timeout in milliseconds (`WHATSAPP_TIMEOUT`).
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,

    /// Overall QR pairing window in milliseconds (`QR_TIMEOUT`).
    #[serde(default = "default_qr_timeout_ms")]
    pub qr_timeout_ms: u64,

    /// Reconnect budget per session (`MAX_RECONNECT_ATTEMPTS`).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            session_dir: default_session_dir(),
            timeout_ms: default_upstream_timeout_ms(),
            qr_timeout_ms: default_qr_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_session_dir() -> String {
    "./sessions".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    60_000
}

fn default_qr_timeout_ms() -> u64 {
    120_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

/// Webhook sink auto-registered on session creation.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultSinkConfig {
    /// Sink URL (`LOCAI_WEBHOOK_URL`). `None` disables auto-registration.
    #[serde(default)]
    pub url: Option<String>,

    /// Sink signing secret (`LOCAI_WEBHOOK_SECRET`).
    #[serde(default)]
    pub secret: Option<String>,
}

impl std::fmt::Debug for DefaultSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSinkConfig")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Rate limit configuration, recognized for deployment parity; enforcement
/// lives in the fronting middleware.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Window length in milliseconds (`RATE_LIMIT_WINDOW`).
    #[serde(default = "default_rate_limit_window")]
    pub window_ms: u64,

    /// Max requests per window (`RATE_LIMIT_MAX`).
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_rate_limit_window(),
            max_requests: default_rate_limit_max(),
        }
    }
}

fn default_rate_limit_window() -> u64 {
    60_000
}

fn default_rate_limit_max() -> u32 {
    100
}

/// Upload configuration for multipart message routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum accepted body size in bytes (`MAX_FILE_SIZE`).
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Scratch directory for uploads (`UPLOAD_DIR`).
    #[serde(default = "default_upload_dir")]
    pub dir: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            dir: default_upload_dir(),
        }
    }
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

fn default_upload_dir() -> String {
    "./uploads".to_string()
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Wabridge gateway.
//!
//! The deployment contract is environment-variable driven with the exact
//! historical names (`PORT`, `JWT_SECRET`, `WHATSAPP_SESSION_DIR`, ...);
//! see `loader` for the full mapping and `validation` for the constraints
//! enforced at process start.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_str};
pub use model::{
    AuthConfig, BridgeConfig, CorsConfig, DefaultSinkConfig, RateLimitConfig, RuntimeConfig,
    RuntimeEnv, ServerConfig, UploadConfig, UpstreamConfig,
};
pub use validation::{validate_config, ConfigError};

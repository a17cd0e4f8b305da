// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wabridge gateway.

use thiserror::Error;

/// The primary error type used across the Wabridge workspace.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors (missing required values, constraint violations).
    #[error("configuration error: {0}")]
    Config(String),

    /// A tenant identifier failed validation (too short, path separators, ...).
    #[error("invalid tenant id `{tenant_id}`: {reason}")]
    InvalidTenantId { tenant_id: String, reason: String },

    /// Credential store errors (directory creation, read/write failure).
    #[error("credential store error: {message}")]
    Credential {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Upstream chat network errors (connect failure, send failure, protocol).
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A send was attempted while the tenant's session is not connected.
    #[error("session for tenant `{tenant_id}` is not connected")]
    NotConnected { tenant_id: String },

    /// A media URL could not be fetched before sending.
    #[error("media fetch failed for `{url}`: {detail}")]
    MediaFetchFailed { url: String, detail: String },

    /// Webhook delivery machinery errors (sink registry, payload encoding).
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_fetch_error_mentions_fetch() {
        let err = BridgeError::MediaFetchFailed {
            url: "https://example.invalid/x.jpg".into(),
            detail: "status 502".into(),
        };
        assert!(err.to_string().contains("fetch"));
    }

    #[test]
    fn not_connected_names_the_tenant() {
        let err = BridgeError::NotConnected {
            tenant_id: "t-1".into(),
        };
        assert!(err.to_string().contains("t-1"));
    }

    #[test]
    fn credential_error_carries_io_source() {
        let err = BridgeError::Credential {
            message: "write failed".into(),
            source: Some(std::io::Error::other("disk full")),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}

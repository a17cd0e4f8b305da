// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Wabridge workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::BridgeError;

/// Opaque customer identity; the isolation boundary for sessions,
/// credentials, sinks, and stats.
///
/// Tenant ids double as filesystem directory names for the credential
/// store, so construction rejects anything that could escape the
/// per-tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Validates and wraps a raw tenant identifier.
    ///
    /// Rules: at least 3 characters, no path separators, no `.` or `..`
    /// components, no NUL bytes.
    pub fn new(raw: impl Into<String>) -> Result<Self, BridgeError> {
        let raw = raw.into();
        let reject = |reason: &str| {
            Err(BridgeError::InvalidTenantId {
                tenant_id: raw.clone(),
                reason: reason.to_string(),
            })
        };

        if raw.chars().count() < 3 {
            return reject("must be at least 3 characters");
        }
        if raw.contains('/') || raw.contains('\\') {
            return reject("must not contain path separators");
        }
        if raw == "." || raw == ".." || raw.starts_with("..") {
            return reject("must not be a relative path component");
        }
        if raw.contains('\0') {
            return reject("must not contain NUL bytes");
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a tenant's session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Qr,
    Connected,
}

/// Kind of an inbound or outbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Unknown,
}

/// Phone identity reported by the upstream once a session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneIdentity {
    pub phone_number: String,
    pub business_name: Option<String>,
}

/// Opaque long-term auth material for one tenant's upstream session.
///
/// The contents are produced and consumed only by the upstream adapter;
/// the rest of the system treats the bundle as a blob to persist.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle(pub Vec<u8>);

impl CredentialBundle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Auth material never goes to logs; show only the size.
        write!(f, "CredentialBundle({} bytes)", self.0.len())
    }
}

/// An inbound message after tenant-side filtering, ready for webhook fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub tenant_id: TenantId,
    pub from: String,
    pub to: String,
    pub text: String,
    pub message_id: String,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub caption: Option<String>,
}

/// Outbound content handed to the upstream adapter.
///
/// Media and documents arrive here as raw bytes; URL resolution happens
/// before the adapter is involved.
#[derive(Debug, Clone)]
pub enum OutboundContent {
    Text {
        body: String,
    },
    Media {
        bytes: Vec<u8>,
        mime: String,
        caption: Option<String>,
    },
    Document {
        bytes: Vec<u8>,
        filename: String,
        caption: Option<String>,
    },
}

/// A send request as accepted from callers (HTTP layer, bulk sender).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageData {
    pub to: String,
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageKind>,
    #[serde(default, rename = "mediaUrl")]
    pub media_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, rename = "fileName")]
    pub file_name: Option<String>,
}

/// Domain events emitted by a session manager, consumed by the webhook
/// dispatcher and the pairing-code service.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Qr {
        tenant_id: TenantId,
        qr_code: String,
    },
    Connecting {
        tenant_id: TenantId,
    },
    Connected {
        tenant_id: TenantId,
        phone_number: String,
        business_name: Option<String>,
    },
    Disconnected {
        tenant_id: TenantId,
        reason: String,
    },
    Message(InboundMessage),
}

impl SessionEvent {
    /// The tenant this event belongs to.
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            SessionEvent::Qr { tenant_id, .. }
            | SessionEvent::Connecting { tenant_id }
            | SessionEvent::Connected { tenant_id, .. }
            | SessionEvent::Disconnected { tenant_id, .. } => tenant_id,
            SessionEvent::Message(msg) => &msg.tenant_id,
        }
    }
}

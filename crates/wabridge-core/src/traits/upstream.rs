// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits onto the upstream chat network library.
//!
//! The adapter owns every protocol detail. A session manager calls
//! [`UpstreamAdapter::connect`] and then consumes the returned update
//! stream; the stream is the single source of truth for session state and
//! the manager never polls the adapter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeError;
use crate::types::{CredentialBundle, MessageKind, OutboundContent, PhoneIdentity, TenantId};

/// Connection-level state reported by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Close {
        reason: String,
        /// True when the upstream invalidated the credentials (the account
        /// was unlinked); resuming is impossible and the bundle must be purged.
        logged_out: bool,
    },
}

/// A raw inbound message batch entry, before tenant-side filtering.
#[derive(Debug, Clone)]
pub struct RawInbound {
    pub id: String,
    pub from: String,
    pub to: String,
    pub text: String,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// Messages sent by the tenant's own device echo back with this set.
    pub from_me: bool,
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub caption: Option<String>,
}

/// One update from the upstream event stream.
#[derive(Debug, Clone)]
pub enum UpstreamUpdate {
    /// A fresh pairing artifact (rendered image bytes) for the QR flow.
    Pairing(Vec<u8>),
    /// Connection state change.
    State(ConnectionState),
    /// The credential bundle changed and should be persisted.
    CredsUpdated(CredentialBundle),
    /// A batch of inbound messages, in upstream delivery order.
    Inbound(Vec<RawInbound>),
}

/// An established upstream session: a handle for outbound operations plus
/// the serial update stream.
pub struct UpstreamSession {
    pub handle: Arc<dyn UpstreamHandle>,
    pub updates: mpsc::Receiver<UpstreamUpdate>,
}

/// Factory for upstream sessions.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    /// Establishes a session for `tenant`, resuming from `credentials` when
    /// provided. A first-time connect (no credentials) yields a
    /// [`UpstreamUpdate::Pairing`] on the stream before the session opens.
    async fn connect(
        &self,
        tenant: &TenantId,
        credentials: Option<CredentialBundle>,
    ) -> Result<UpstreamSession, BridgeError>;
}

/// Outbound operations on a live upstream session.
#[async_trait]
pub trait UpstreamHandle: Send + Sync {
    /// Sends `content` to `jid`; returns the server-assigned message id.
    async fn send(&self, jid: &str, content: OutboundContent) -> Result<String, BridgeError>;

    /// Phone identity, available once the connection is open.
    fn identity(&self) -> Option<PhoneIdentity>;

    /// Best-effort network close. Never fails; errors are swallowed by the
    /// adapter.
    async fn logout(&self);
}

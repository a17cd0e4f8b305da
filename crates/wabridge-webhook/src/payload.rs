// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire shapes for payloads forwarded to tenant sinks.
//!
//! Every delivery is `{event, timestamp, tenantId, data}` with `timestamp`
//! in unix milliseconds. The payload is serialized to bytes exactly once;
//! the signature is computed over those same bytes.

use serde::Serialize;

use wabridge_core::{InboundMessage, MessageKind};

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_STATUS: &str = "status_change";
pub const EVENT_TEST: &str = "test";

/// Envelope for every sink delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload<T: Serialize> {
    pub event: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub tenant_id: String,
    pub data: T,
}

/// `data` for `event: "message"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEventData {
    pub from: String,
    pub to: String,
    pub message: String,
    pub message_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl From<&InboundMessage> for MessageEventData {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            from: msg.from.clone(),
            to: msg.to.clone(),
            message: msg.text.clone(),
            message_id: msg.message_id.clone(),
            kind: msg.kind,
            media_url: msg.media_url.clone(),
            caption: msg.caption.clone(),
        }
    }
}

/// `data` for `event: "status_change"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEventData {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// The underlying state-machine transition name.
    pub event: String,
}

/// `data` for `event: "test"`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEventData {
    pub message: String,
}

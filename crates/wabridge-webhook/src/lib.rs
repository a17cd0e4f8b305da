// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook fan-out for the Wabridge gateway.
//!
//! Inbound events become signed JSON deliveries to tenant-owned sinks:
//! at-least-once with a 10-minute dedup window per `(tenant, messageId)`,
//! bounded retries with exponential backoff, per-tenant statistics, and
//! automatic deactivation of persistently failing sinks.

pub mod dedup;
pub mod dispatcher;
pub mod payload;
pub mod signature;
pub mod stats;

pub use dispatcher::{
    RegisterSink, SinkEvent, SinkView, TestDelivery, WebhookDispatcher, WebhookSink,
    EVENT_HEADER, SIGNATURE_HEADER, TENANT_HEADER, USER_AGENT_VALUE,
};
pub use payload::{
    MessageEventData, StatusEventData, TestEventData, WebhookPayload, EVENT_MESSAGE, EVENT_STATUS,
    EVENT_TEST,
};
pub use signature::{sign, verify};
pub use stats::TenantStats;

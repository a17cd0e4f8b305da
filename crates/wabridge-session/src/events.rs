// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumption of per-tenant session events.
//!
//! Every session manager writes to its own channel and the registry spawns
//! one pump task per tenant, so one tenant's slow consumer never delays
//! another's. The handler sees a single tenant's events in emission order.

use async_trait::async_trait;

use wabridge_core::SessionEvent;

/// Consumer of one tenant's ordered session events.
#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn handle(&self, event: SessionEvent);
}

/// Discards every event; used by tests and tools that only exercise the
/// session lifecycle.
pub struct NoopEventHandler;

#[async_trait]
impl SessionEventHandler for NoopEventHandler {
    async fn handle(&self, _event: SessionEvent) {}
}

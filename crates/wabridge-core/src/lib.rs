// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wabridge multi-tenant gateway.
//!
//! This crate provides the foundational error type, the shared domain
//! types (tenants, sessions, messages, events), and the capability traits
//! through which the rest of the workspace talks to the upstream chat
//! network.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BridgeError;
pub use traits::{
    ConnectionState, RawInbound, UpstreamAdapter, UpstreamHandle, UpstreamSession, UpstreamUpdate,
};
pub use types::{
    CredentialBundle, InboundMessage, MessageData, MessageKind, OutboundContent, PhoneIdentity,
    SessionEvent, SessionStatus, TenantId,
};

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant session lifecycle for the Wabridge gateway.
//!
//! Four pieces, composed by the binary:
//! - [`creds::CredentialStore`]: durable per-tenant credential bundles.
//! - [`manager::SessionManager`]: the per-tenant state machine over the
//!   upstream connection (pairing, reconnect with backoff, inbound fan-in).
//! - [`pairing::PairingService`]: keeps a current pairing artifact visible
//!   to pollers across the whole pairing window.
//! - [`registry::SessionRegistry`]: process-wide tenant -> manager map with
//!   idle cleanup and graceful shutdown.

pub mod creds;
pub mod events;
pub mod manager;
pub mod pairing;
pub mod registry;

pub use creds::CredentialStore;
pub use events::{NoopEventHandler, SessionEventHandler};
pub use manager::{SessionManager, SessionSettings, SessionSnapshot};
pub use pairing::{PairingService, PairingStatus, PairingView};
pub use registry::{SessionCreatedHook, SessionRegistry, StartedSession};

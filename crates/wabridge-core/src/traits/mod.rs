// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability trait definitions.

pub mod upstream;

pub use upstream::{
    ConnectionState, RawInbound, UpstreamAdapter, UpstreamHandle, UpstreamSession, UpstreamUpdate,
};

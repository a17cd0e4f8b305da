// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for the Wabridge workspace.
//!
//! Provides a scriptable mock upstream adapter so session-lifecycle tests
//! run without a real chat network connection.

pub mod mock_upstream;

pub use mock_upstream::{ConnectRecord, MockConnection, MockUpstream, SentRecord};

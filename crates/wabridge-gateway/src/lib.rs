// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP control API for the Wabridge gateway.
//!
//! Routes under `/api/v1` cover session lifecycle, message sending, and
//! webhook sink management; `/health` is public. Authentication accepts the
//! shared API key or HMAC-signed tenant access tokens.

pub mod auth;
pub mod health;
pub mod messages;
pub mod responses;
pub mod server;
pub mod sessions;
pub mod webhooks;

pub use auth::{AuthContext, AuthState, TenantClaims};
pub use responses::{ApiError, ApiResponse};
pub use server::{build_router, start_server, AppState};

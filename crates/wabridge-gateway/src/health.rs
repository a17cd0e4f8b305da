// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unauthenticated health endpoint.
//!
//! Reports 200 while serving; once shutdown begins the endpoint flips to
//! `unhealthy`/503 so load balancers drain the instance.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub services: ServicesHealth,
    pub system: SystemHealth,
    pub uptime_secs: u64,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct ServicesHealth {
    pub gateway: String,
    pub sessions: SessionsHealth,
    pub webhooks: String,
}

#[derive(Debug, Serialize)]
pub struct SessionsHealth {
    pub status: String,
    pub active: usize,
}

#[derive(Debug, Serialize)]
pub struct SystemHealth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_rss_mb: Option<u64>,
    pub cpus: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let draining = state.shutdown.is_cancelled();
    let status = if draining { "unhealthy" } else { "healthy" };

    let data = HealthData {
        status: status.to_string(),
        services: ServicesHealth {
            gateway: if draining { "draining" } else { "up" }.to_string(),
            sessions: SessionsHealth {
                status: "up".to_string(),
                active: state.registry.len(),
            },
            webhooks: "up".to_string(),
        },
        system: SystemHealth {
            memory_rss_mb: read_rss_bytes().map(|bytes| bytes / (1024 * 1024)),
            cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        },
        uptime_secs: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
    };

    let code = if draining {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(data))
}

/// Read the process RSS in bytes from /proc/self/statm (Linux only).
///
/// Returns None on non-Linux platforms or if the file cannot be read.
fn read_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let rss_pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        Some(rss_pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

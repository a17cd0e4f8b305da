// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session routes: start, status, qr, delete, restart, admin listing, poll.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use wabridge_core::{SessionStatus, TenantId};
use wabridge_session::SessionSnapshot;

use crate::auth::AuthContext;
use crate::responses::{ok, ok_empty, ok_with_message, ApiError, ApiResponse};
use crate::server::AppState;

/// Longest allowed long-poll wait.
const POLL_TIMEOUT_CAP_MS: u64 = 60_000;
const POLL_TIMEOUT_DEFAULT_MS: u64 = 30_000;

pub(crate) fn parse_tenant(raw: &str) -> Result<TenantId, ApiError> {
    TenantId::new(raw).map_err(|e| ApiError::Validation(e.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    pub session_id: String,
    /// Always present in the JSON, null until the first artifact arrives.
    pub qr_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub connected: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<chrono::DateTime<chrono::Utc>>,
}

impl StatusData {
    fn disconnected() -> Self {
        Self {
            connected: false,
            status: SessionStatus::Disconnected.to_string(),
            phone_number: None,
            business_name: None,
            qr_code: None,
            session_id: None,
            last_activity: None,
        }
    }
}

impl From<SessionSnapshot> for StatusData {
    fn from(snap: SessionSnapshot) -> Self {
        Self {
            connected: snap.status == SessionStatus::Connected,
            status: snap.status.to_string(),
            phone_number: snap.phone_number,
            business_name: snap.business_name,
            qr_code: snap.qr_code,
            session_id: Some(snap.session_id),
            last_activity: Some(snap.last_activity),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrData {
    /// Null when no artifact is currently available.
    pub qr_code: Option<String>,
    pub status: String,
    pub has_qr: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionData {
    pub tenant_id: String,
    pub session_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// POST /api/v1/sessions/{tenantId}/start
pub async fn start(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let started = state.registry.start(&tenant).await;
    if started.already_connected {
        return Ok(ok_with_message(
            StartData {
                session_id: started.session_id,
                qr_code: None,
            },
            "session already connected",
        ));
    }

    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::Internal("session disappeared during start".into()))?;
    let qr_code = state.pairing.start(&manager).await;
    let message = if qr_code.is_some() {
        "session starting; scan the pairing code"
    } else {
        "session starting"
    };

    Ok(ok_with_message(
        StartData {
            session_id: started.session_id,
            qr_code,
        },
        message,
    ))
}

/// GET /api/v1/sessions/{tenantId}/status
pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<Json<ApiResponse<StatusData>>, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let data = match state.registry.get(&tenant) {
        Some(manager) => StatusData::from(manager.snapshot()),
        None => StatusData::disconnected(),
    };
    Ok(ok(data))
}

/// GET /api/v1/sessions/{tenantId}/qr
pub async fn qr(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<Json<ApiResponse<QrData>>, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let data = match state.pairing.current(&tenant) {
        Some(view) => QrData {
            has_qr: view.qr_code.is_some(),
            status: view.status.to_string(),
            qr_code: view.qr_code,
        },
        None => QrData {
            qr_code: None,
            status: SessionStatus::Disconnected.to_string(),
            has_qr: false,
        },
    };
    Ok(ok(data))
}

/// DELETE /api/v1/sessions/{tenantId}
pub async fn stop(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    state.pairing.stop(&tenant);
    if !state.registry.stop(&tenant).await {
        return Err(ApiError::NotFound("no active session for tenant".into()));
    }
    Ok(ok_empty("session stopped and credentials removed"))
}

/// POST /api/v1/sessions/{tenantId}/restart
pub async fn restart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    state.pairing.stop(&tenant);
    let started = state.registry.restart(&tenant).await;
    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::Internal("session disappeared during restart".into()))?;
    let qr_code = state.pairing.start(&manager).await;

    Ok(ok_with_message(
        StartData {
            session_id: started.session_id,
            qr_code,
        },
        "session restarted",
    ))
}

/// GET /api/v1/sessions/active (admin)
pub async fn active(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    auth.authorize_admin()?;

    let sessions: Vec<ActiveSessionData> = state
        .registry
        .list()
        .into_iter()
        .map(|snap| ActiveSessionData {
            tenant_id: snap.tenant_id.to_string(),
            session_id: snap.session_id,
            status: snap.status.to_string(),
            phone_number: snap.phone_number,
            last_activity: snap.last_activity,
        })
        .collect();
    Ok(ok(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// GET /api/v1/sessions/{tenantId}/poll?timeout=<ms>
///
/// Blocks until the session reaches `qr` or `connected`, or the timeout
/// (capped at 60 s) elapses; then answers like the status route.
pub async fn poll(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
    Query(query): Query<PollQuery>,
) -> Result<Json<ApiResponse<StatusData>>, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::NotFound("no active session for tenant".into()))?;

    let timeout_ms = query
        .timeout
        .unwrap_or(POLL_TIMEOUT_DEFAULT_MS)
        .min(POLL_TIMEOUT_CAP_MS);

    let mut status_rx = manager.watch_status();
    let wait = async {
        loop {
            let status = *status_rx.borrow_and_update();
            if matches!(status, SessionStatus::Qr | SessionStatus::Connected) {
                return;
            }
            if status_rx.changed().await.is_err() {
                return;
            }
        }
    };
    let _ = tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), wait).await;

    Ok(ok(StatusData::from(manager.snapshot())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_data_reflects_connection() {
        let data = StatusData::disconnected();
        assert!(!data.connected);
        assert_eq!(data.status, "disconnected");
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("phoneNumber").is_none());
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn start_data_serializes_null_qr() {
        let json = serde_json::to_value(StartData {
            session_id: "t-1_123".into(),
            qr_code: None,
        })
        .unwrap();
        assert_eq!(json["sessionId"], "t-1_123");
        assert!(json["qrCode"].is_null());
    }

    #[test]
    fn tenant_parse_rejects_bad_ids() {
        assert!(parse_tenant("ab").is_err());
        assert!(parse_tenant("a/b/c").is_err());
        assert!(parse_tenant("t-1").is_ok());
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook routes: register, list, delete, test, stats.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use wabridge_webhook::{RegisterSink, SinkEvent, TenantStats};

use crate::auth::AuthContext;
use crate::responses::{ok, ok_empty, ApiError};
use crate::server::AppState;
use crate::sessions::parse_tenant;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

fn parse_events(raw: Option<Vec<String>>) -> Result<Vec<SinkEvent>, ApiError> {
    let Some(raw) = raw else {
        return Ok(vec![SinkEvent::Message]);
    };
    raw.iter()
        .map(|name| {
            name.parse::<SinkEvent>()
                .map_err(|_| ApiError::Validation(format!("unknown event `{name}`")))
        })
        .collect()
}

/// POST /api/v1/webhooks/register/{tenantId}
pub async fn register(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return Err(ApiError::Validation("`url` must be an http(s) URL".into()));
    }
    let events = parse_events(body.events)?;

    let sink = state.dispatcher.register(
        &tenant,
        RegisterSink {
            url: body.url,
            secret: body.secret,
            events,
        },
    );
    Ok(ok(sink))
}

/// GET /api/v1/webhooks/list/{tenantId}
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let webhooks = state.dispatcher.list(&tenant);
    Ok(ok(serde_json::json!({ "webhooks": webhooks })))
}

/// DELETE /api/v1/webhooks/{tenantId}/{webhookId}
pub async fn remove(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((tenant_id, webhook_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    if !state.dispatcher.remove(&tenant, &webhook_id) {
        return Err(ApiError::NotFound(format!("unknown webhook `{webhook_id}`")));
    }
    Ok(ok_empty("webhook removed"))
}

/// POST /api/v1/webhooks/test/{tenantId}/{webhookId}
pub async fn test(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((tenant_id, webhook_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let outcome = state
        .dispatcher
        .test_sink(&tenant, &webhook_id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(ok(outcome))
}

/// GET /api/v1/webhooks/stats/{tenantId}
pub async fn stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let stats = state.dispatcher.stats(&tenant).unwrap_or_else(TenantStats::default);
    Ok(ok(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subscription_is_message_only() {
        assert_eq!(parse_events(None).unwrap(), vec![SinkEvent::Message]);
    }

    #[test]
    fn event_names_parse() {
        let events =
            parse_events(Some(vec!["message".into(), "status".into()])).unwrap();
        assert_eq!(events, vec![SinkEvent::Message, SinkEvent::Status]);
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(parse_events(Some(vec!["presence".into()])).is_err());
    }

    #[test]
    fn register_body_accepts_minimal_payload() {
        let body: RegisterBody =
            serde_json::from_str(r#"{"url": "https://sink.local/wh"}"#).unwrap();
        assert_eq!(body.url, "https://sink.local/wh");
        assert!(body.secret.is_none());
        assert!(body.events.is_none());
    }
}

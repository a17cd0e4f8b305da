// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message routes: send, send-media (multipart), send-bulk.

use std::sync::OnceLock;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use wabridge_core::{MessageData, MessageKind, OutboundContent};

use crate::auth::AuthContext;
use crate::responses::{ok, ApiError};
use crate::server::AppState;
use crate::sessions::parse_tenant;

/// Recipients must be international phone numbers.
const RECIPIENT_PATTERN: &str = r"^\+?[1-9]\d{10,14}$";
const MAX_MESSAGE_LENGTH: usize = 4096;
const MAX_BULK_MESSAGES: usize = 50;
/// Pause between bulk items unless the item overrides it.
const BULK_DELAY_DEFAULT: Duration = Duration::from_secs(2);

fn recipient_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RECIPIENT_PATTERN).expect("recipient pattern is valid"))
}

fn validate_message(data: &MessageData) -> Result<(), ApiError> {
    if !recipient_regex().is_match(&data.to) {
        return Err(ApiError::Validation(format!(
            "`to` must match {RECIPIENT_PATTERN}"
        )));
    }
    if data.message.is_empty() {
        return Err(ApiError::Validation("`message` must not be empty".into()));
    }
    if data.message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::Validation(format!(
            "`message` must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    if data.kind.map_or(false, requires_media) && data.media_url.is_none() {
        return Err(ApiError::Validation(
            "`mediaUrl` is required for media messages".into(),
        ));
    }
    Ok(())
}

fn requires_media(kind: MessageKind) -> bool {
    !matches!(kind, MessageKind::Text | MessageKind::Unknown)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendData {
    pub message_id: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// POST /api/v1/messages/{tenantId}/send
pub async fn send(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
    Json(body): Json<MessageData>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;
    validate_message(&body)?;

    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::NotConnected("no active session for tenant".into()))?;
    let message_id = manager.send(&body).await?;

    Ok(ok(SendData {
        message_id,
        to: body.to,
        kind: body.kind.unwrap_or(MessageKind::Text),
        timestamp: Utc::now().timestamp_millis(),
    }))
}

/// Fields accepted in the send-media multipart form.
#[derive(Default)]
struct MediaForm {
    to: Option<String>,
    message: Option<String>,
    caption: Option<String>,
    kind: Option<MessageKind>,
    media: Option<MediaPart>,
}

struct MediaPart {
    bytes: Vec<u8>,
    mime: String,
    file_name: Option<String>,
}

/// POST /api/v1/messages/{tenantId}/send-media (multipart)
///
/// The uploaded bytes go straight to the upstream; nothing touches disk.
pub async fn send_media(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    let mut form = MediaForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "media" => {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("media upload failed: {e}")))?;
                form.media = Some(MediaPart {
                    bytes: bytes.to_vec(),
                    mime,
                    file_name,
                });
            }
            "to" => form.to = Some(text_field(field).await?),
            "message" => form.message = Some(text_field(field).await?),
            "caption" => form.caption = Some(text_field(field).await?),
            "type" => {
                let raw = text_field(field).await?;
                form.kind = Some(
                    raw.parse()
                        .map_err(|_| ApiError::Validation(format!("unknown type `{raw}`")))?,
                );
            }
            other => {
                return Err(ApiError::Validation(format!(
                    "unexpected multipart field `{other}`"
                )));
            }
        }
    }

    let to = form
        .to
        .ok_or_else(|| ApiError::Validation("`to` is required".into()))?;
    if !recipient_regex().is_match(&to) {
        return Err(ApiError::Validation(format!(
            "`to` must match {RECIPIENT_PATTERN}"
        )));
    }
    let media = form
        .media
        .ok_or_else(|| ApiError::Validation("`media` file is required".into()))?;

    let caption = form.caption.or(form.message);
    let kind = form.kind.unwrap_or(MessageKind::Image);
    let content = match kind {
        MessageKind::Document => OutboundContent::Document {
            filename: media
                .file_name
                .clone()
                .unwrap_or_else(|| "document".to_string()),
            bytes: media.bytes,
            caption,
        },
        _ => OutboundContent::Media {
            bytes: media.bytes,
            mime: media.mime,
            caption,
        },
    };

    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::NotConnected("no active session for tenant".into()))?;
    let message_id = manager.send_content(&to, content).await?;

    Ok(ok(SendData {
        message_id,
        to,
        kind,
        timestamp: Utc::now().timestamp_millis(),
    }))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart field: {e}")))
}

#[derive(Debug, Deserialize)]
pub struct BulkMessage {
    #[serde(flatten)]
    pub data: MessageData,
    /// Delay before this item, overriding the 2 s default.
    #[serde(default, rename = "delayMs")]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub messages: Vec<BulkMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkItemOutcome {
    pub index: usize,
    pub to: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct BulkData {
    pub results: Vec<BulkItemOutcome>,
    pub summary: BulkSummary,
}

/// POST /api/v1/messages/{tenantId}/send-bulk
///
/// Items are sent sequentially with a pause between them; one failing item
/// does not abort the rest.
pub async fn send_bulk(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(tenant_id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = parse_tenant(&tenant_id)?;
    auth.authorize_tenant(&tenant)?;

    if body.messages.is_empty() {
        return Err(ApiError::Validation("`messages` must not be empty".into()));
    }
    if body.messages.len() > MAX_BULK_MESSAGES {
        return Err(ApiError::Validation(format!(
            "`messages` must contain at most {MAX_BULK_MESSAGES} items"
        )));
    }

    let manager = state
        .registry
        .get(&tenant)
        .ok_or_else(|| ApiError::NotConnected("no active session for tenant".into()))?;

    let mut results = Vec::with_capacity(body.messages.len());
    let mut sent = 0usize;
    for (index, item) in body.messages.into_iter().enumerate() {
        if index > 0 {
            let delay = item
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(BULK_DELAY_DEFAULT);
            tokio::time::sleep(delay).await;
        }

        let outcome = match validate_message(&item.data) {
            Err(e) => Err(e.to_string()),
            Ok(()) => manager
                .send(&item.data)
                .await
                .map_err(|e| e.to_string()),
        };
        match outcome {
            Ok(message_id) => {
                sent += 1;
                results.push(BulkItemOutcome {
                    index,
                    to: item.data.to,
                    success: true,
                    message_id: Some(message_id),
                    error: None,
                });
            }
            Err(error) => results.push(BulkItemOutcome {
                index,
                to: item.data.to,
                success: false,
                message_id: None,
                error: Some(error),
            }),
        }
    }

    let total = results.len();
    Ok(ok(BulkData {
        summary: BulkSummary {
            total,
            sent,
            failed: total - sent,
        },
        results,
    }))
}

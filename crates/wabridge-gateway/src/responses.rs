// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response envelope and error taxonomy for the HTTP API.
//!
//! Every response is `{success, data?, error?, message?, timestamp}`.
//! Failures carry a short machine code in `error` plus a human-readable
//! `message`; send failures instead surface the concrete error text in
//! `error` so callers can branch on it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use wabridge_core::BridgeError;

/// The JSON envelope shared by every API response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// 200 with data.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        message: None,
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// 200 with data and a human-readable note.
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        error: None,
        message: Some(message.into()),
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// 200 with only a human-readable note.
pub fn ok_empty(message: impl Into<String>) -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse {
        success: true,
        data: None,
        error: None,
        message: Some(message.into()),
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// Client-visible error taxonomy.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    RateLimited,
    NotConnected(String),
    /// A send failed with a concrete reason; surfaced verbatim in `error`.
    SendFailed(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotConnected(_) => StatusCode::BAD_REQUEST,
            ApiError::SendFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::RateLimited => "RATE_LIMIT_EXCEEDED",
            ApiError::NotConnected(_) => "NOT_CONNECTED",
            ApiError::SendFailed(_) => "SEND_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            ApiError::Validation(detail)
            | ApiError::Forbidden(detail)
            | ApiError::NotFound(detail)
            | ApiError::Conflict(detail)
            | ApiError::NotConnected(detail)
            | ApiError::SendFailed(detail)
            | ApiError::Internal(detail) => Some(detail.clone()),
            ApiError::Unauthorized | ApiError::RateLimited => None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.code()),
            None => f.write_str(self.code()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Send failures expose their concrete reason in `error`; everything
        // else uses the short machine code.
        let error = match &self {
            ApiError::SendFailed(detail) => detail.clone(),
            _ => self.code().to_string(),
        };
        let body = ApiResponse::<serde_json::Value> {
            success: false,
            data: None,
            error: Some(error),
            message: self.detail(),
            timestamp: Utc::now().timestamp_millis(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotConnected { .. } => ApiError::NotConnected(err.to_string()),
            BridgeError::MediaFetchFailed { .. } => ApiError::SendFailed(err.to_string()),
            BridgeError::InvalidTenantId { .. } => ApiError::Validation(err.to_string()),
            BridgeError::Timeout { .. } => ApiError::SendFailed(err.to_string()),
            BridgeError::Upstream { .. } => ApiError::SendFailed(err.to_string()),
            other => {
                tracing::error!(error = %other, "internal error surfaced to API");
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication middleware for the HTTP API.
//!
//! Exactly two modes are accepted on `Authorization: Bearer <token>`:
//! 1. The shared API key: full access, tenant taken from the request path
//!    (or the `X-Tenant-ID` header on tenant-less routes).
//! 2. A tenant access token: HMAC-SHA256-signed JWT with claims
//!    `{tenantId, permissions, type: "tenant_access"}`, scoped to its own
//!    tenant.
//!
//! Identity tokens without signature verification are rejected; so is any
//! algorithm other than HS256.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use wabridge_core::TenantId;

use crate::responses::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration shared with every request.
#[derive(Clone)]
pub struct AuthState {
    pub api_key: String,
    pub jwt_secret: String,
    pub require_auth: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("api_key", &"[redacted]")
            .field("jwt_secret", &"[redacted]")
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

/// The caller's verified identity, inserted as a request extension.
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// Shared API key: full access across tenants.
    ApiKey { tenant_hint: Option<String> },
    /// Tenant access token: scoped to one tenant.
    Tenant {
        tenant_id: String,
        permissions: Vec<String>,
    },
}

impl AuthContext {
    /// Checks the caller may act on `tenant`.
    pub fn authorize_tenant(&self, tenant: &TenantId) -> Result<(), ApiError> {
        match self {
            AuthContext::ApiKey { .. } => Ok(()),
            AuthContext::Tenant { tenant_id, .. } => {
                if tenant_id == tenant.as_str() {
                    Ok(())
                } else {
                    Err(ApiError::Forbidden(
                        "token is not valid for this tenant".into(),
                    ))
                }
            }
        }
    }

    /// Checks the caller holds the shared API key (admin routes).
    pub fn authorize_admin(&self) -> Result<(), ApiError> {
        match self {
            AuthContext::ApiKey { .. } => Ok(()),
            AuthContext::Tenant { .. } => Err(ApiError::Forbidden(
                "admin access requires the API key".into(),
            )),
        }
    }
}

/// Claims carried by a tenant access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantClaims {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Middleware validating the bearer token and stamping an [`AuthContext`].
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth.require_auth {
        let tenant_hint = tenant_header(&request);
        request
            .extensions_mut()
            .insert(AuthContext::ApiKey { tenant_hint });
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    // Mode 1: shared API key (fast path, plain comparison).
    if !auth.api_key.is_empty() && token == auth.api_key {
        let context = AuthContext::ApiKey {
            tenant_hint: tenant_header(&request),
        };
        request.extensions_mut().insert(context);
        return Ok(next.run(request).await);
    }

    // Mode 2: signed tenant access token.
    if let Some(claims) = verify_tenant_token(token, &auth.jwt_secret) {
        request.extensions_mut().insert(AuthContext::Tenant {
            tenant_id: claims.tenant_id,
            permissions: claims.permissions,
        });
        return Ok(next.run(request).await);
    }

    Err(ApiError::Unauthorized)
}

fn tenant_header(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Verifies a compact HS256 token and returns its claims.
///
/// Rejects any token whose header names a different algorithm, whose
/// signature does not verify (constant-time), whose `type` is not
/// `tenant_access`, or whose `exp` has passed.
pub fn verify_tenant_token(token: &str, secret: &str) -> Option<TenantClaims> {
    let mut parts = token.split('.');
    let (header_b64, claims_b64, sig_b64) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let header: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
    if header.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
        return None;
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    let signature = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
    mac.verify_slice(&signature).ok()?;

    let claims: TenantClaims =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims_b64).ok()?).ok()?;
    if claims.token_type != "tenant_access" {
        return None;
    }
    if let Some(exp) = claims.exp {
        if exp < chrono::Utc::now().timestamp() {
            return None;
        }
    }
    Some(claims)
}

/// Issues a tenant access token (the tenant registry normally does this;
/// kept here so the verifier has a symmetric counterpart for tests and
/// tooling).
pub fn issue_tenant_token(claims: &TenantClaims, secret: &str) -> Option<String> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).ok()?);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Some(format!("{header}.{body}.{signature}"))
}

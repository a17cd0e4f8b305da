// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 payload signatures.
//!
//! Outbound deliveries carry a bare-hex signature of the exact payload
//! bytes. Verification accepts both historically observed formats, bare
//! hex and `sha256=<hex>`, and always compares in constant time so it can
//! be used symmetrically by external validators.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use wabridge_core::BridgeError;

type HmacSha256 = Hmac<Sha256>;

/// Signs `payload` with `secret`, returning the lowercase hex digest.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, BridgeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BridgeError::Webhook(format!("failed to initialize hmac signer: {e}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a signature over `payload`.
///
/// Accepts bare hex or the `sha256=<hex>` prefix form. Malformed
/// signatures verify as false rather than erroring, and the digest
/// comparison is constant-time.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let hex_digest = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&digest).is_ok()
}

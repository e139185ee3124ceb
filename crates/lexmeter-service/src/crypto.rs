//! Cryptographic utilities for webhook verification.
//!
//! Payment webhooks carry an `x-signature` header of the form
//! `t=<unix seconds>,v1=<hex>`, where the hex digest is
//! `HMAC-SHA256(secret, "<t>.<body>")`. Several `v1` entries may be present
//! while a secret is being rotated.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No `t=` component.
    #[error("missing signature timestamp")]
    MissingTimestamp,

    /// No `v1=` component.
    #[error("missing signature")]
    MissingSignature,

    /// The timestamp is outside the accepted window.
    #[error("signature timestamp outside tolerance")]
    Stale,

    /// No signature matches the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Compute HMAC-SHA256 and return the hex-encoded result.
///
/// Returns `None` only if the HMAC implementation rejects the key, which
/// HMAC-SHA256 never does.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Build a signature header for `payload` at `timestamp`.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Option<String> {
    let digest = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))?;
    Some(format!("t={timestamp},v1={digest}"))
}

/// Verify a webhook signature header.
///
/// # Errors
///
/// Returns a `SignatureError` describing the first check that failed.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &str,
    now: DateTime<Utc>,
    tolerance_seconds: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let seconds: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MissingTimestamp)?;
    if (now.timestamp() - seconds).abs() > tolerance_seconds {
        return Err(SignatureError::Stale);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"))
        .ok_or(SignatureError::Mismatch)?;

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

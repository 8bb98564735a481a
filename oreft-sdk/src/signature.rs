//! Signature verification for inbound payment-gateway events.
//!
//! The gateway delivers transfer and account notifications over HTTP and
//! signs every delivery with HMAC-SHA256.  The wire format for the header
//! is:
//!
//! ```text
//! Oreft-Gateway-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! where the signature covers `"{timestamp}.{raw_body}"`.

use serde::{Deserialize, Serialize};

/// Header name for the gateway HMAC signature.
pub const SIGNATURE_HEADER: &str = "Oreft-Gateway-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Gateway event payloads
// ---------------------------------------------------------------------------

/// Payload of a transfer-level gateway event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEventData {
    pub transfer_id: String,
    pub failure_message: Option<String>,
}

/// Payload of an account-level gateway event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEventData {
    pub account_id: String,
}

/// An authenticated inbound gateway event.
///
/// Event kinds this service does not act on deserialize as
/// [`GatewayEvent::Unknown`] so that new gateway event types never break
/// signature-verified intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    #[serde(rename = "transfer.failed")]
    TransferFailed(TransferEventData),
    #[serde(rename = "transfer.reversed")]
    TransferReversed(TransferEventData),
    #[serde(rename = "account.updated")]
    AccountUpdated(AccountEventData),
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a raw gateway delivery and deserialize its event.
///
/// Checks `HMAC-SHA256("{timestamp}.{raw_payload}", secret)` against the
/// header signature and rejects stale timestamps, then parses the payload
/// into a [`GatewayEvent`].
pub fn verify_inbound_event(
    raw_payload: &str,
    header_value: &str,
    secret: &[u8],
) -> Result<GatewayEvent, SignatureError> {
    let (timestamp, signature) = parse_signature_header(header_value)?;
    let data = format!("{timestamp}.{raw_payload}");
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
        data.as_bytes(),
        signature.as_ref(),
    )?;
    check_timestamp(timestamp)?;
    Ok(serde_json::from_str(raw_payload)?)
}

/// Sign a raw payload, returning the full header value
/// (`{timestamp}.{base64}`).
///
/// The counterpart of [`verify_inbound_event`]; used by gateway simulators
/// in tests and local tooling.
pub fn sign_payload(raw_payload: &str, secret: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_payload_at(raw_payload, secret, timestamp)
}

/// Sign a raw payload with an explicit timestamp.
pub fn sign_payload_at(raw_payload: &str, secret: &[u8], timestamp: i64) -> String {
    let data = format!("{timestamp}.{raw_payload}");
    let sig = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
        data.as_bytes(),
    );
    format_signature_header(timestamp, sig.as_ref())
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a signature header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let dot_pos = value.find('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = value[..dot_pos]
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(&value[dot_pos + 1..])
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const SECRET: &[u8] = b"whsec_test_secret";

    #[test]
    fn signed_payload_verifies_and_parses() {
        let payload = r#"{"type":"transfer.failed","data":{"transfer_id":"tr_123","failure_message":"insufficient funds"}}"#;
        let header = sign_payload(payload, SECRET);
        let event = verify_inbound_event(payload, &header, SECRET).unwrap();
        assert_eq!(
            event,
            GatewayEvent::TransferFailed(TransferEventData {
                transfer_id: "tr_123".to_string(),
                failure_message: Some("insufficient funds".to_string()),
            })
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = r#"{"type":"transfer.reversed","data":{"transfer_id":"tr_123","failure_message":null}}"#;
        let header = sign_payload(payload, SECRET);
        let tampered = payload.replace("tr_123", "tr_999");
        let err = verify_inbound_event(&tampered, &header, SECRET).unwrap_err();
        assert!(matches!(err, SignatureError::SignatureMismatch));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"type":"account.updated","data":{"account_id":"acct_1"}}"#;
        let header = sign_payload(payload, SECRET);
        let err = verify_inbound_event(payload, &header, b"other_secret").unwrap_err();
        assert!(matches!(err, SignatureError::SignatureMismatch));
    }

    #[test]
    fn stale_signature_is_rejected() {
        let payload = r#"{"type":"account.updated","data":{"account_id":"acct_1"}}"#;
        let stale = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 1;
        let header = sign_payload_at(payload, SECRET, stale);
        let err = verify_inbound_event(payload, &header, SECRET).unwrap_err();
        assert!(matches!(err, SignatureError::Expired));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = parse_signature_header("no-dot-here").unwrap_err();
        assert!(matches!(err, SignatureError::InvalidFormat));
        let err = parse_signature_header("123.!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, SignatureError::InvalidBase64));
    }

    #[test]
    fn unrecognized_event_type_parses_as_unknown() {
        let payload = r#"{"type":"balance.available","data":{"amount":5}}"#;
        let header = sign_payload(payload, SECRET);
        let event = verify_inbound_event(payload, &header, SECRET).unwrap();
        assert_eq!(event, GatewayEvent::Unknown);
    }
}

//! `Stripe-Signature` verification.
//!
//! ```text
//! Stripe-Signature: t=1700000000,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! `v1` is the hex HMAC-SHA256 of `"{t}.{payload}"` keyed with the endpoint
//! secret. Several `v1` entries may be present while a secret is rotated.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = vec![];

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::MalformedHeader("timestamp".to_string()))?,
                )
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        Some(_) => Err(WebhookError::MalformedHeader("no v1 signature".to_string())),
        None => Err(WebhookError::MalformedHeader("no timestamp".to_string())),
    }
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::NotConfigured)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `header` against the payload. `now` is unix seconds.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), WebhookError> {
    let parsed = parse_signature_header(header)?;
    if now.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(WebhookError::OutsideTolerance {
            timestamp: parsed.timestamp,
            tolerance_secs,
        });
    }

    let expected = compute_signature(payload, secret, parsed.timestamp)?;
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Header value for `payload` signed at `timestamp`, as the processor sends it.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(payload, secret, timestamp)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_parse_header() {
        let parsed = parse_signature_header("t=1609459200,v1=abc,v0=zzz,v1=def").unwrap();
        assert_eq!(parsed.timestamp, 1609459200);
        assert_eq!(parsed.signatures, vec!["abc", "def"]);

        assert!(parse_signature_header("invalid").is_err());
        assert!(parse_signature_header("t=abc,v1=def").is_err());
        assert!(parse_signature_header("t=1609459200").is_err());
    }

    #[test]
    fn test_signed_payload_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(payload, SECRET, NOW).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn test_rotated_secret_still_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let fresh = compute_signature(payload, SECRET, NOW).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "0".repeat(64), fresh);
        assert!(verify_signature(payload, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = sign_payload(br#"{"amount":100}"#, SECRET, NOW).unwrap();
        assert!(matches!(
            verify_signature(br#"{"amount":999}"#, &header, SECRET, 300, NOW),
            Err(WebhookError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_signature(br#"{"amount":100}"#, &header, "whsec_other", 300, NOW),
            Err(WebhookError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let payload = b"{}";
        let header = sign_payload(payload, SECRET, NOW).unwrap();
        assert!(matches!(
            verify_signature(payload, &header, SECRET, 300, NOW + 301),
            Err(WebhookError::OutsideTolerance { .. })
        ));
    }

    #[test]
    fn test_extreme_timestamps_are_outside_tolerance() {
        for timestamp in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1=00", timestamp);
            let err = verify_signature(b"{}", &header, SECRET, 300, NOW).unwrap_err();
            assert!(matches!(err, WebhookError::OutsideTolerance { .. }));
            assert!(matches!(
                crate::error::ServiceError::from(err),
                crate::error::ServiceError::InvalidSignature(_)
            ));
        }
    }
}

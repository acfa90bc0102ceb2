//! Webhook signature verification. Signatures are checked against the raw
//! request body before any JSON parsing happens; unverified content is
//! never interpreted.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
const SIGNATURE_VERSION: &str = "v1";
const DEFAULT_TIMESTAMP_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Missing,
    Invalid,
    Expired,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    timestamp_tolerance: Duration,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self {
            timestamp_tolerance: Duration::seconds(DEFAULT_TIMESTAMP_TOLERANCE_SECONDS),
        }
    }
}

impl SignatureVerifier {
    pub fn with_tolerance_seconds(seconds: i64) -> Self {
        Self {
            timestamp_tolerance: Duration::seconds(seconds),
        }
    }

    /// HMAC-SHA256 over "<unix timestamp>.<raw payload>", hex encoded and
    /// versioned as "v1=<hex>".
    pub fn sign(&self, payload: &[u8], secret: &str, timestamp: DateTime<Utc>) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(timestamp.timestamp().to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        timestamp_header: &str,
        secret: &str,
    ) -> SignatureCheck {
        if signature_header.is_empty() || timestamp_header.is_empty() {
            return SignatureCheck::Missing;
        }

        let timestamp: i64 = match timestamp_header.parse() {
            Ok(t) => t,
            Err(_) => return SignatureCheck::Invalid,
        };
        let request_time = match DateTime::from_timestamp(timestamp, 0) {
            Some(t) => t,
            None => return SignatureCheck::Invalid,
        };

        let skew = Utc::now() - request_time;
        if skew > self.timestamp_tolerance || -skew > self.timestamp_tolerance {
            return SignatureCheck::Expired;
        }

        let expected = self.sign(payload, secret, request_time);
        if constant_time_compare(signature_header, &expected) {
            SignatureCheck::Valid
        } else {
            SignatureCheck::Invalid
        }
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_shape() {
        let verifier = SignatureVerifier::default();
        let signature = verifier.sign(br#"{"id":"evt_1"}"#, "whsec_test", Utc::now());
        assert!(signature.starts_with("v1="));
        assert_eq!(signature.len(), 3 + 64);
    }

    #[test]
    fn test_verify_round_trip() {
        let verifier = SignatureVerifier::default();
        let payload = br#"{"id":"evt_1","type":"subscription.updated"}"#;
        let timestamp = Utc::now();
        let signature = verifier.sign(payload, "whsec_test", timestamp);

        let result = verifier.verify(
            payload,
            &signature,
            &timestamp.timestamp().to_string(),
            "whsec_test",
        );
        assert!(result.is_valid());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = SignatureVerifier::default();
        let payload = br#"{"id":"evt_1"}"#;
        let timestamp = Utc::now();
        let signature = verifier.sign(payload, "whsec_test", timestamp);

        let result = verifier.verify(
            payload,
            &signature,
            &timestamp.timestamp().to_string(),
            "whsec_other",
        );
        assert_eq!(result, SignatureCheck::Invalid);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let verifier = SignatureVerifier::default();
        let timestamp = Utc::now();
        let signature = verifier.sign(br#"{"id":"evt_1"}"#, "whsec_test", timestamp);

        let result = verifier.verify(
            br#"{"id":"evt_2"}"#,
            &signature,
            &timestamp.timestamp().to_string(),
            "whsec_test",
        );
        assert_eq!(result, SignatureCheck::Invalid);
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let verifier = SignatureVerifier::with_tolerance_seconds(60);
        let payload = br#"{"id":"evt_1"}"#;
        let old = Utc::now() - Duration::seconds(120);
        let signature = verifier.sign(payload, "whsec_test", old);

        let result = verifier.verify(
            payload,
            &signature,
            &old.timestamp().to_string(),
            "whsec_test",
        );
        assert_eq!(result, SignatureCheck::Expired);
    }

    #[test]
    fn test_missing_headers() {
        let verifier = SignatureVerifier::default();
        assert_eq!(
            verifier.verify(b"{}", "", "123", "whsec_test"),
            SignatureCheck::Missing
        );
        assert_eq!(
            verifier.verify(b"{}", "v1=abc", "", "whsec_test"),
            SignatureCheck::Missing
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc123", "abc123"));
        assert!(!constant_time_compare("abc123", "abc124"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}

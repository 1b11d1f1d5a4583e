//! RFC 6238 time-based one-time codes (HMAC-SHA1, 6 digits, 30 s step),
//! backed by `totp-rs`.

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use totp_rs::{Algorithm, Secret, TOTP};

use super::MfaError;

pub const DIGITS: usize = 6;
pub const STEP_SECS: i64 = 30;
/// Adjacent steps accepted on either side of the current one.
pub const SKEW_STEPS: u8 = 1;
/// 160-bit shared secret, the RFC 4226 recommendation.
pub const SECRET_BYTES: usize = 20;

pub fn generate_secret() -> Vec<u8> {
    let mut secret = vec![0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);
    secret
}

fn totp(secret: &[u8], issuer: Option<&str>, account: &str) -> Result<TOTP, MfaError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW_STEPS,
        STEP_SECS as u64,
        secret.to_vec(),
        issuer.map(str::to_string),
        account.to_string(),
    )
    .map_err(|e| MfaError::Crypto(e.to_string()))
}

fn unix_seconds(at: DateTime<Utc>) -> Result<u64, MfaError> {
    u64::try_from(at.timestamp()).map_err(|_| MfaError::Crypto(format!("time before epoch: {at}")))
}

/// Code for the time step containing `at`.
pub fn code_at(secret: &[u8], at: DateTime<Utc>) -> Result<String, MfaError> {
    Ok(totp(secret, None, "")?.generate(unix_seconds(at)?))
}

/// Accepts the current step and `SKEW_STEPS` on either side.
pub fn verify(secret: &[u8], code: &str, now: DateTime<Utc>) -> Result<bool, MfaError> {
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    Ok(totp(secret, None, "")?.check(code, unix_seconds(now)?))
}

/// Unpadded RFC 4648 base32, the form authenticator apps expect.
pub fn encode_secret(secret: &[u8]) -> Result<String, MfaError> {
    Ok(totp(secret, None, "")?.get_secret_base32())
}

pub fn decode_secret(encoded: &str) -> Result<Vec<u8>, MfaError> {
    Secret::Encoded(encoded.trim().to_string())
        .to_bytes()
        .map_err(|e| MfaError::Crypto(format!("malformed base32 secret: {e:?}")))
}

/// `otpauth://` URI understood by authenticator apps.
pub fn provisioning_uri(secret: &[u8], issuer: &str, account: &str) -> Result<String, MfaError> {
    Ok(totp(secret, Some(issuer), account)?.get_url())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RFC_SECRET: &[u8] = b"12345678901234567890";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn matches_rfc6238_sha1_vectors() {
        // Reference values are 8 digits; the low 6 digits are the 6-digit code.
        assert_eq!(code_at(RFC_SECRET, at(59)).unwrap(), "287082");
        assert_eq!(code_at(RFC_SECRET, at(1_111_111_109)).unwrap(), "081804");
        assert_eq!(code_at(RFC_SECRET, at(1_234_567_890)).unwrap(), "005924");
        assert_eq!(code_at(RFC_SECRET, at(2_000_000_000)).unwrap(), "279037");
    }

    #[test]
    fn accepts_adjacent_steps_only() {
        let now = at(1_700_000_000);
        let previous = code_at(RFC_SECRET, now - chrono::Duration::seconds(STEP_SECS)).unwrap();
        let next = code_at(RFC_SECRET, now + chrono::Duration::seconds(STEP_SECS)).unwrap();
        let stale = code_at(RFC_SECRET, now - chrono::Duration::seconds(3 * STEP_SECS)).unwrap();

        assert!(verify(RFC_SECRET, &previous, now).unwrap());
        assert!(verify(RFC_SECRET, &next, now).unwrap());
        assert!(!verify(RFC_SECRET, &stale, now).unwrap());
    }

    #[test]
    fn rejects_malformed_codes() {
        let now = at(1_700_000_000);
        assert!(!verify(RFC_SECRET, "", now).unwrap());
        assert!(!verify(RFC_SECRET, "12345", now).unwrap());
        assert!(!verify(RFC_SECRET, "12a456", now).unwrap());
        assert!(!verify(RFC_SECRET, "1234567", now).unwrap());
    }

    #[test]
    fn secret_encoding_is_rfc4648_base32() {
        let encoded = encode_secret(RFC_SECRET).unwrap();
        assert_eq!(encoded, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ");
        assert_eq!(decode_secret(&encoded).unwrap(), RFC_SECRET);
        assert!(decode_secret("not base32!").is_err());
    }

    #[test]
    fn provisioning_uri_carries_issuer_and_secret() {
        let uri = provisioning_uri(RFC_SECRET, "Acme Store", "ops@acme.test").unwrap();
        assert!(uri.starts_with("otpauth://totp/Acme%20Store:ops%40acme.test?"));
        assert!(uri.contains("secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"));
        assert!(uri.contains("issuer=Acme%20Store"));
    }

    #[test]
    fn short_secrets_are_rejected() {
        assert!(matches!(code_at(b"too-short", at(59)), Err(MfaError::Crypto(_))));
    }

    #[test]
    fn generated_secrets_differ() {
        assert_ne!(generate_secret(), generate_secret());
    }
}

//! Per-session anti-forgery tokens.

use std::collections::HashMap;
use std::sync::RwLock;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::{DenyReason, StoreError};

/// 256 bits of entropy per token.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    pub value: String,
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Issues and validates CSRF tokens, one live token per session.
///
/// Re-issuing replaces the previous token (last writer wins). With a TTL,
/// expired tokens are evicted on issue and when presented.
#[derive(Debug, Default)]
pub struct CsrfValidator {
    tokens: RwLock<HashMap<String, CsrfToken>>,
    ttl: Option<Duration>,
}

impl CsrfValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens older than `ttl` stop validating.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Only state-changing methods are subject to CSRF validation.
    pub fn applies_to(method: &str) -> bool {
        matches!(
            method.to_ascii_uppercase().as_str(),
            "POST" | "PUT" | "PATCH" | "DELETE"
        )
    }

    pub fn issue_token(&self, session_id: &str, now: DateTime<Utc>) -> Result<CsrfToken, StoreError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let token = CsrfToken {
            value: URL_SAFE_NO_PAD.encode(bytes),
            session_id: session_id.to_string(),
            issued_at: now,
        };

        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| StoreError::poisoned("csrf token"))?;
        if self.ttl.is_some() {
            tokens.retain(|_, issued| !self.is_expired(issued, now));
        }
        tokens.insert(session_id.to_string(), token.clone());
        Ok(token)
    }

    fn is_expired(&self, issued: &CsrfToken, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - issued.issued_at > ttl)
    }

    pub fn validate(
        &self,
        session_id: &str,
        supplied: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DenyReason> {
        let supplied = match supplied.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => return Err(DenyReason::CsrfMissing),
        };

        {
            let tokens = self
                .tokens
                .read()
                .map_err(|_| DenyReason::InternalGuardFault)?;
            let Some(issued) = tokens.get(session_id) else {
                return Err(DenyReason::CsrfInvalid);
            };

            if !self.is_expired(issued, now) {
                return if bool::from(issued.value.as_bytes().ct_eq(supplied.as_bytes())) {
                    Ok(())
                } else {
                    Err(DenyReason::CsrfInvalid)
                };
            }
        }

        // Expired: drop it unless a fresh token was issued in the meantime.
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| DenyReason::InternalGuardFault)?;
        if tokens.get(session_id).is_some_and(|t| self.is_expired(t, now)) {
            tokens.remove(session_id);
        }
        Err(DenyReason::CsrfInvalid)
    }

    #[cfg(test)]
    fn live_len(&self) -> usize {
        self.tokens.read().map(|t| t.len()).unwrap_or_default()
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use qrcode::QrCode;
use qrcode::render::svg;
use serde::Serialize;

use storefront_core::PrincipalId;

use super::{EnrollmentStore, MfaEnrollment, MfaError, SecretCipher, totp};
use crate::StoreError;

/// Result of starting MFA setup: what the principal needs to configure an
/// authenticator app.
#[derive(Debug, Clone, Serialize)]
pub struct MfaSetup {
    /// Base32 shared secret, for manual entry.
    pub secret: String,
    pub provisioning_uri: String,
    /// QR code of the provisioning URI, as an SVG document.
    pub qr_svg: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingSetup {
    secret: Vec<u8>,
    started_at: DateTime<Utc>,
}

/// TOTP enrollment and per-request second-factor verification.
pub struct MfaGate {
    enrollments: Arc<dyn EnrollmentStore>,
    cipher: SecretCipher,
    issuer: String,
    setup_ttl: Duration,
    pending: RwLock<HashMap<PrincipalId, PendingSetup>>,
}

impl MfaGate {
    pub fn new(
        enrollments: Arc<dyn EnrollmentStore>,
        cipher: SecretCipher,
        issuer: impl Into<String>,
        setup_ttl: Duration,
    ) -> Self {
        Self {
            enrollments,
            cipher,
            issuer: issuer.into(),
            setup_ttl,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Start (or restart) setup with a fresh secret.
    ///
    /// Replaces any earlier pending setup; durable state is untouched.
    pub fn begin_setup(&self, principal_id: PrincipalId, now: DateTime<Utc>) -> Result<MfaSetup, MfaError> {
        let secret = totp::generate_secret();
        let encoded = totp::encode_secret(&secret)?;
        let provisioning_uri = totp::provisioning_uri(&secret, &self.issuer, &principal_id.to_string())?;

        let qr = QrCode::new(provisioning_uri.as_bytes()).map_err(|e| MfaError::Render(e.to_string()))?;
        let qr_svg = qr
            .render::<svg::Color>()
            .min_dimensions(200, 200)
            .build();

        let mut pending = self
            .pending
            .write()
            .map_err(|_| StoreError::poisoned("mfa pending setup"))?;
        evict_expired(&mut pending, now, self.setup_ttl);
        pending.insert(
            principal_id,
            PendingSetup {
                secret,
                started_at: now,
            },
        );

        tracing::info!(%principal_id, "mfa setup started");
        Ok(MfaSetup {
            secret: encoded,
            provisioning_uri,
            qr_svg,
            expires_at: now + self.setup_ttl,
        })
    }

    /// Verify `code` against the pending secret and, on success, persist the
    /// encrypted secret with `enabled = true`.
    ///
    /// A wrong code leaves the pending setup in place so the user can retry
    /// until it expires.
    pub async fn confirm_setup(
        &self,
        principal_id: PrincipalId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), MfaError> {
        if self.is_required(principal_id).await? {
            return Err(MfaError::AlreadyEnrolled);
        }

        let Some(pending) = self.live_pending(principal_id, now)? else {
            tracing::info!(%principal_id, "no live mfa setup to confirm");
            return Err(MfaError::SetupExpired);
        };

        if !totp::verify(&pending.secret, code, now)? {
            tracing::warn!(%principal_id, "mfa setup code rejected");
            return Err(MfaError::InvalidCode);
        }

        let enrollment = MfaEnrollment {
            principal_id,
            secret: self.cipher.encrypt(&pending.secret)?,
            enabled: true,
            enrolled_at: now,
        };
        let stored = self.enrollments.enable(enrollment).await?;
        self.clear_pending(principal_id)?;

        if !stored {
            return Err(MfaError::AlreadyEnrolled);
        }
        tracing::info!(%principal_id, "mfa enrolled");
        Ok(())
    }

    /// `true` iff the principal has an enabled enrollment.
    pub async fn is_required(&self, principal_id: PrincipalId) -> Result<bool, StoreError> {
        Ok(self
            .enrollments
            .get(principal_id)
            .await?
            .is_some_and(|e| e.enabled))
    }

    /// Second-factor check for a single request.
    ///
    /// Principals without an enabled enrollment pass unconditionally.
    pub async fn verify_for_request(
        &self,
        principal_id: PrincipalId,
        code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), MfaError> {
        let Some(enrollment) = self.enrollments.get(principal_id).await? else {
            return Ok(());
        };
        if !enrollment.enabled {
            return Ok(());
        }

        let code = match code.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return Err(MfaError::CodeRequired),
        };

        let secret = self.cipher.decrypt(&enrollment.secret)?;
        if totp::verify(&secret, code, now)? {
            Ok(())
        } else {
            Err(MfaError::InvalidCode)
        }
    }

    /// Evicts every expired pending setup, then returns `principal_id`'s if it is still live.
    fn live_pending(&self, principal_id: PrincipalId, now: DateTime<Utc>) -> Result<Option<PendingSetup>, StoreError> {
        let mut pending = self
            .pending
            .write()
            .map_err(|_| StoreError::poisoned("mfa pending setup"))?;
        evict_expired(&mut pending, now, self.setup_ttl);
        Ok(pending.get(&principal_id).cloned())
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.read().map(|p| p.len()).unwrap_or_default()
    }

    fn clear_pending(&self, principal_id: PrincipalId) -> Result<(), StoreError> {
        let mut pending = self
            .pending
            .write()
            .map_err(|_| StoreError::poisoned("mfa pending setup"))?;
        pending.remove(&principal_id);
        Ok(())
    }
}

fn evict_expired(pending: &mut HashMap<PrincipalId, PendingSetup>, now: DateTime<Utc>, ttl: Duration) {
    let before = pending.len();
    pending.retain(|_, setup| now - setup.started_at <= ttl);
    let evicted = before - pending.len();
    if evicted > 0 {
        tracing::debug!(evicted, "expired mfa setups evicted");
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_core::PrincipalId;

use crate::StoreError;

/// Durable MFA enrollment. `secret` is the encrypted shared secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaEnrollment {
    pub principal_id: PrincipalId,
    pub secret: Vec<u8>,
    pub enabled: bool,
    pub enrolled_at: DateTime<Utc>,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn get(&self, principal_id: PrincipalId) -> Result<Option<MfaEnrollment>, StoreError>;

    /// Persist an enabled enrollment.
    ///
    /// Returns `false` and leaves the stored row untouched when the principal
    /// already has an enabled enrollment.
    async fn enable(&self, enrollment: MfaEnrollment) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> EnrollmentStore for Arc<S>
where
    S: EnrollmentStore + ?Sized,
{
    async fn get(&self, principal_id: PrincipalId) -> Result<Option<MfaEnrollment>, StoreError> {
        (**self).get(principal_id).await
    }

    async fn enable(&self, enrollment: MfaEnrollment) -> Result<bool, StoreError> {
        (**self).enable(enrollment).await
    }
}

/// In-memory enrollment store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEnrollmentStore {
    inner: RwLock<HashMap<PrincipalId, MfaEnrollment>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn get(&self, principal_id: PrincipalId) -> Result<Option<MfaEnrollment>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::poisoned("mfa enrollment"))?;
        Ok(map.get(&principal_id).cloned())
    }

    async fn enable(&self, enrollment: MfaEnrollment) -> Result<bool, StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::poisoned("mfa enrollment"))?;
        if map.get(&enrollment.principal_id).is_some_and(|e| e.enabled) {
            return Ok(false);
        }
        map.insert(enrollment.principal_id, enrollment);
        Ok(true)
    }
}

//! Identity resolution: verified bearer credential → active principal.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use storefront_core::{PrincipalId, RequestId};

use crate::{Denial, DenyReason, JwtClaims, Principal, Role, StoreError};

/// Read path into registered principals.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find(&self, principal_id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Insert or replace a principal. Account registration lives elsewhere;
    /// this serves bootstrap and tests.
    async fn register(&self, principal: Principal) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> PrincipalDirectory for Arc<S>
where
    S: PrincipalDirectory + ?Sized,
{
    async fn find(&self, principal_id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        (**self).find(principal_id).await
    }

    async fn register(&self, principal: Principal) -> Result<(), StoreError> {
        (**self).register(principal).await
    }
}

/// In-memory principal directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    inner: RwLock<HashMap<PrincipalId, Principal>>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a principal (registration happens outside this crate).
    pub fn upsert(&self, principal: Principal) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::poisoned("principal directory"))?;
        map.insert(principal.id, principal);
        Ok(())
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn find(&self, principal_id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::poisoned("principal directory"))?;
        Ok(map.get(&principal_id).cloned())
    }

    async fn register(&self, principal: Principal) -> Result<(), StoreError> {
        self.upsert(principal)
    }
}

/// Per-request identity produced by a successful guard pass.
///
/// Handlers read it from request extensions; the audit emitter uses it to
/// attribute business actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityContext {
    pub principal: Principal,
    pub roles: BTreeSet<Role>,
    pub session_id: String,
    pub request_id: RequestId,
    pub endpoint: String,
    pub ip: Option<String>,
}

impl IdentityContext {
    pub fn principal_id(&self) -> PrincipalId {
        self.principal.id
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}

pub struct IdentityResolver {
    directory: Arc<dyn PrincipalDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn PrincipalDirectory>) -> Self {
        Self { directory }
    }

    /// Load the principal named by the verified token's subject.
    pub async fn resolve(&self, claims: &JwtClaims) -> Result<Principal, Denial> {
        let principal = self
            .directory
            .find(claims.sub)
            .await?
            .ok_or_else(|| Denial::with_detail(DenyReason::Unauthenticated, "unknown subject"))?;

        if !principal.active {
            return Err(Denial::new(DenyReason::AccountInactive));
        }
        Ok(principal)
    }
}

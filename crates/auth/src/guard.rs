//! Authorization guard composer.
//!
//! A protected operation declares a [`Requirement`] at registration time.
//! Each request then runs through an explicit, ordered list of [`Stage`]s:
//!
//! 1. Identity: verified bearer credential → active principal.
//! 2. CSRF: mutating methods only.
//! 3. MFA: second factor for enrolled principals.
//! 4. Requirement: role / permission evaluation.
//!
//! The first failing stage short-circuits. Every denial and every full pass
//! is written to the audit log.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;

use storefront_core::{AuditRecordId, PrincipalId, RequestId};

use crate::audit::{ACTION_ALLOW, ACTION_DENY};
use crate::{
    AuditEmitter, AuditRecord, CatalogError, CsrfValidator, Denial, DenyReason, IdentityContext,
    IdentityResolver, JwtClaims, MfaGate, Outcome, Permission, Principal, Role, RoleCatalog,
    RoleStore,
};

/// Access requirement attached to a protected operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Requirement {
    /// Any active, authenticated principal.
    Authenticated,
    AnyRole(Vec<Role>),
    AllPermissions(Vec<Permission>),
    AdminOnly,
    /// `Staff` or `Admin`.
    StaffOnly,
    B2BOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Identity,
    Csrf,
    Mfa,
    Requirement,
}

impl Requirement {
    pub fn any_role(roles: impl IntoIterator<Item = Role>) -> Self {
        Self::AnyRole(roles.into_iter().collect())
    }

    pub fn all_permissions(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::AllPermissions(permissions.into_iter().collect())
    }

    /// Ordered stages evaluated for this requirement.
    ///
    /// The B2B path has no MFA stage.
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Requirement::Authenticated => &[Stage::Identity, Stage::Csrf],
            Requirement::B2BOnly => &[Stage::Identity, Stage::Csrf, Stage::Requirement],
            Requirement::AnyRole(_)
            | Requirement::AllPermissions(_)
            | Requirement::AdminOnly
            | Requirement::StaffOnly => {
                &[Stage::Identity, Stage::Csrf, Stage::Mfa, Stage::Requirement]
            }
        }
    }

    /// Reject requirements that name roles or permissions the catalog does
    /// not define. Called when routes are registered.
    pub fn validate(&self, catalog: &RoleCatalog) -> Result<(), CatalogError> {
        match self {
            Requirement::AnyRole(roles) => {
                if roles.is_empty() {
                    return Err(CatalogError::EmptyRequirement);
                }
                if let Some(role) = roles.iter().find(|r| !catalog.contains_role(r)) {
                    return Err(CatalogError::UnknownRequiredRole(role.to_string()));
                }
                Ok(())
            }
            Requirement::AllPermissions(perms) => {
                if perms.is_empty() {
                    return Err(CatalogError::EmptyRequirement);
                }
                if let Some(p) = perms.iter().find(|p| !catalog.contains_permission(p)) {
                    return Err(CatalogError::UnknownRequiredPermission(p.to_string()));
                }
                Ok(())
            }
            Requirement::AdminOnly => require_role(catalog, &Role::ADMIN),
            Requirement::StaffOnly => {
                require_role(catalog, &Role::STAFF)?;
                require_role(catalog, &Role::ADMIN)
            }
            Requirement::B2BOnly => require_role(catalog, &Role::B2B),
            Requirement::Authenticated => Ok(()),
        }
    }

    /// Pure decision over the principal's current roles.
    pub fn evaluate(&self, roles: &BTreeSet<Role>, catalog: &RoleCatalog) -> Result<(), Denial> {
        let granted = match self {
            Requirement::Authenticated => true,
            Requirement::AdminOnly => roles.contains(&Role::ADMIN),
            Requirement::StaffOnly => roles.contains(&Role::STAFF) || roles.contains(&Role::ADMIN),
            Requirement::B2BOnly => roles.contains(&Role::B2B),
            Requirement::AnyRole(required) => required.iter().any(|r| roles.contains(r)),
            Requirement::AllPermissions(required) => {
                if catalog.grants_all(roles, required) {
                    return Ok(());
                }
                let effective = catalog.effective_permissions(roles);
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|p| !effective.contains(*p))
                    .map(Permission::as_str)
                    .collect();
                return Err(Denial::with_detail(
                    DenyReason::InsufficientPermissions,
                    format!("missing permissions: {}", missing.join(", ")),
                ));
            }
        };

        if granted {
            Ok(())
        } else {
            Err(Denial::with_detail(
                DenyReason::InsufficientRole,
                format!("requirement {self:?} not met by roles {roles:?}"),
            ))
        }
    }
}

fn require_role(catalog: &RoleCatalog, role: &Role) -> Result<(), CatalogError> {
    if catalog.contains_role(role) {
        Ok(())
    } else {
        Err(CatalogError::UnknownRequiredRole(role.to_string()))
    }
}

/// Bearer credential as seen by the guard.
///
/// Signature and claim checks happen at the transport edge; the guard only
/// distinguishes "absent", "rejected" and "verified".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Missing,
    Invalid(String),
    Verified(JwtClaims),
}

impl Credential {
    fn subject(&self) -> Option<PrincipalId> {
        match self {
            Credential::Verified(claims) => Some(claims.sub),
            Credential::Missing | Credential::Invalid(_) => None,
        }
    }
}

/// Everything the guard needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct GuardRequest {
    pub credential: Credential,
    pub method: String,
    pub path: String,
    pub csrf_token: Option<String>,
    pub mfa_code: Option<String>,
    pub ip: Option<String>,
    pub request_id: RequestId,
    pub received_at: DateTime<Utc>,
}

impl GuardRequest {
    /// `"METHOD /path"`, as recorded in audit entries.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Runs the stage pipeline and records the outcome.
#[derive(Clone)]
pub struct GuardComposer {
    identity: Arc<IdentityResolver>,
    roles: Arc<dyn RoleStore>,
    csrf: Arc<CsrfValidator>,
    mfa: Arc<MfaGate>,
    audit: AuditEmitter,
}

impl GuardComposer {
    pub fn new(
        identity: Arc<IdentityResolver>,
        roles: Arc<dyn RoleStore>,
        csrf: Arc<CsrfValidator>,
        mfa: Arc<MfaGate>,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            identity,
            roles,
            csrf,
            mfa,
            audit,
        }
    }

    pub fn catalog(&self) -> &RoleCatalog {
        self.roles.catalog()
    }

    /// Evaluate `requirement` for `request`.
    ///
    /// On success the returned context is what the wrapped operation sees.
    /// Store failures and panics inside a stage become
    /// [`DenyReason::InternalGuardFault`].
    pub async fn authorize(
        &self,
        request: &GuardRequest,
        requirement: &Requirement,
    ) -> Result<IdentityContext, Denial> {
        let outcome = AssertUnwindSafe(self.run_stages(request, requirement))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "stage panicked".to_string());
                Err(Denial::fault(detail))
            });

        match outcome {
            Ok(identity) => {
                let record = self.decision_record(request, Some(identity.principal_id()), Outcome::Allow, None);
                if let Err(err) = self.audit.emit(record).await {
                    tracing::error!(error = %err, endpoint = %identity.endpoint, "allow audit write failed; denying");
                    let denial = Denial::fault(format!("audit write failed: {err}"));
                    self.record_denial(request, &denial).await;
                    return Err(denial);
                }
                Ok(identity)
            }
            Err(denial) => {
                self.record_denial(request, &denial).await;
                Err(denial)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &GuardRequest,
        requirement: &Requirement,
    ) -> Result<IdentityContext, Denial> {
        let now = request.received_at;
        let mut principal: Option<Principal> = None;
        let mut session_id = String::new();
        let mut roles: Option<BTreeSet<Role>> = None;

        for stage in requirement.stages() {
            match stage {
                Stage::Identity => {
                    let claims = match &request.credential {
                        Credential::Missing => {
                            return Err(Denial::with_detail(DenyReason::Unauthenticated, "missing bearer token"));
                        }
                        Credential::Invalid(reason) => {
                            return Err(Denial::with_detail(DenyReason::Unauthenticated, reason.clone()));
                        }
                        Credential::Verified(claims) => claims,
                    };
                    principal = Some(self.identity.resolve(claims).await?);
                    session_id = claims.sid.clone();
                }
                Stage::Csrf => {
                    if CsrfValidator::applies_to(&request.method) {
                        self.csrf
                            .validate(&session_id, request.csrf_token.as_deref(), now)
                            .map_err(Denial::new)?;
                    }
                }
                Stage::Mfa => {
                    let id = resolved(&principal)?.id;
                    self.mfa
                        .verify_for_request(id, request.mfa_code.as_deref(), now)
                        .await
                        .map_err(|e| Denial::with_detail(e.deny_reason(), e.to_string()))?;
                }
                Stage::Requirement => {
                    let id = resolved(&principal)?.id;
                    let assigned = self.roles.roles_of(id).await?;
                    requirement.evaluate(&assigned, self.roles.catalog())?;
                    roles = Some(assigned);
                }
            }
        }

        let principal = principal.ok_or_else(|| Denial::fault("pipeline has no identity stage"))?;
        let roles = match roles {
            Some(roles) => roles,
            None => self.roles.roles_of(principal.id).await?,
        };

        Ok(IdentityContext {
            principal,
            roles,
            session_id,
            request_id: request.request_id,
            endpoint: request.endpoint(),
            ip: request.ip.clone(),
        })
    }

    async fn record_denial(&self, request: &GuardRequest, denial: &Denial) {
        match denial.reason {
            DenyReason::InternalGuardFault => {
                tracing::error!(endpoint = %request.endpoint(), request_id = %request.request_id, denial = %denial, "guard fault")
            }
            _ => tracing::debug!(endpoint = %request.endpoint(), denial = %denial, "request denied"),
        }

        let mut record = self.decision_record(
            request,
            request.credential.subject(),
            Outcome::Deny,
            Some(denial.reason),
        );
        record.details = denial
            .detail
            .as_ref()
            .map(|d| serde_json::json!({ "detail": d }));

        if let Err(err) = self.audit.emit(record).await {
            tracing::error!(error = %err, endpoint = %request.endpoint(), "deny audit write failed");
        }
    }

    fn decision_record(
        &self,
        request: &GuardRequest,
        actor_id: Option<PrincipalId>,
        outcome: Outcome,
        reason: Option<DenyReason>,
    ) -> AuditRecord {
        AuditRecord {
            id: AuditRecordId::new(),
            actor_id,
            action: match outcome {
                Outcome::Allow => ACTION_ALLOW,
                Outcome::Deny => ACTION_DENY,
            }
            .to_string(),
            endpoint: request.endpoint(),
            outcome,
            reason,
            target: None,
            details: None,
            ip: request.ip.clone(),
            request_id: request.request_id,
            timestamp: Utc::now(),
        }
    }
}

fn resolved(principal: &Option<Principal>) -> Result<&Principal, Denial> {
    principal
        .as_ref()
        .ok_or_else(|| Denial::fault("stage requires a resolved identity"))
}

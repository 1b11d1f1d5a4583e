use std::collections::BTreeSet;

use serde::Serialize;

use storefront_core::PrincipalId;

use crate::{Permission, Principal, Role, RoleCatalog};

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an `AllPermissions` decision.
///
/// Used by admin tooling to answer "why would this principal be allowed or
/// denied?" without running a request through the guard.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    /// The permissions that were being checked.
    pub required_permissions: Vec<String>,

    /// Whether the authorization would be granted.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Details about the principal's state.
    pub principal: PrincipalState,

    /// If denied, this explains what was missing.
    pub denial_reason: Option<DenialReason>,
}

/// Current state of the principal being checked.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub active: bool,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    pub admin_bypass: bool,
}

/// Detailed reason why authorization was denied.
#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub missing_permissions: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    AccountInactive,
    MissingPermission,
}

/// Explain the decision the permission stage would make for `principal`.
///
/// - No IO
/// - No panics
/// - Mirrors [`RoleCatalog::grants_all`], including the `Admin` bypass
pub fn explain_authorization(
    principal: &Principal,
    roles: &BTreeSet<Role>,
    catalog: &RoleCatalog,
    required: &[Permission],
) -> AuthorizationExplanation {
    let required_permissions: Vec<String> = required.iter().map(|p| p.as_str().to_string()).collect();
    let effective = catalog.effective_permissions(roles);
    let admin_bypass = roles.iter().any(Role::is_admin);

    let state = PrincipalState {
        principal_id: principal.id,
        active: principal.active,
        roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
        effective_permissions: effective.iter().map(|p| p.as_str().to_string()).collect(),
        admin_bypass,
    };

    if !principal.active {
        return AuthorizationExplanation {
            required_permissions,
            granted: false,
            reason: format!("Principal {} is inactive", principal.id),
            principal: state,
            denial_reason: Some(DenialReason {
                kind: DenialKind::AccountInactive,
                message: "Inactive principals are denied before any permission check".to_string(),
                missing_permissions: Vec::new(),
                suggestions: vec!["Reactivate the account in the principal directory".to_string()],
            }),
        };
    }

    if catalog.grants_all(roles, required) {
        let reason = if admin_bypass {
            "Principal has the Admin role, which bypasses permission checks".to_string()
        } else {
            format!("Assigned roles grant every required permission: {required_permissions:?}")
        };
        return AuthorizationExplanation {
            required_permissions,
            granted: true,
            reason,
            principal: state,
            denial_reason: None,
        };
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|p| !effective.contains(*p))
        .map(|p| p.as_str().to_string())
        .collect();

    let mut suggestions: Vec<String> = granting_roles(catalog, &missing)
        .into_iter()
        .map(|role| format!("Assign role '{role}', which grants all missing permissions"))
        .collect();
    if suggestions.is_empty() {
        suggestions.push(format!(
            "No single role grants {missing:?}; assign several roles or the Admin role"
        ));
    }

    AuthorizationExplanation {
        required_permissions,
        granted: false,
        reason: format!(
            "Principal lacks {missing:?}. Current permissions: {:?}",
            state.effective_permissions
        ),
        principal: state,
        denial_reason: Some(DenialReason {
            kind: DenialKind::MissingPermission,
            message: format!("Missing required permissions: {}", missing.join(", ")),
            missing_permissions: missing,
            suggestions,
        }),
    }
}

/// Non-admin roles whose own permission set covers all of `missing`.
fn granting_roles(catalog: &RoleCatalog, missing: &[String]) -> Vec<String> {
    catalog
        .roles()
        .filter(|(role, _)| !role.is_admin())
        .filter(|(_, perms)| {
            missing
                .iter()
                .all(|m| perms.iter().any(|p| p.as_str() == m))
        })
        .map(|(role, _)| role.as_str().to_string())
        .collect()
}

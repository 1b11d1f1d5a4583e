//! Store wiring: in-memory for dev/tests, Postgres when `USE_PERSISTENT_STORES=true`.

use std::sync::Arc;

use storefront_auth::{
    AuditEmitter, AuditLog, CsrfValidator, EnrollmentStore, GuardComposer, Hs256JwtValidator,
    IdentityResolver, InMemoryAuditLog, InMemoryEnrollmentStore, InMemoryPrincipalDirectory,
    InMemoryRoleStore, JwtValidator, MfaGate, Principal, PrincipalDirectory, PrincipalId, Role,
    RoleCatalog, RoleStore, SecretCipher,
};
use storefront_infra::postgres::{
    self, PostgresAuditLog, PostgresEnrollmentStore, PostgresPrincipalDirectory, PostgresRoleStore,
};
use storefront_infra::{AppConfig, StoreBackend};

/// Process-wide services shared by every request.
#[derive(Clone)]
pub struct AppServices {
    pub jwt: Arc<dyn JwtValidator>,
    pub roles: Arc<dyn RoleStore>,
    pub principals: Arc<dyn PrincipalDirectory>,
    pub csrf: Arc<CsrfValidator>,
    pub mfa: Arc<MfaGate>,
    pub audit: AuditEmitter,
    pub guard: GuardComposer,
}

struct Stores {
    roles: Arc<dyn RoleStore>,
    principals: Arc<dyn PrincipalDirectory>,
    enrollments: Arc<dyn EnrollmentStore>,
    audit: Arc<dyn AuditLog>,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let catalog = RoleCatalog::storefront_default();

    let stores = match &config.backend {
        StoreBackend::InMemory => in_memory_stores(catalog),
        StoreBackend::Postgres { database_url } => {
            let pool = postgres::connect(database_url).await?;
            Stores {
                roles: Arc::new(PostgresRoleStore::new(pool.clone(), catalog)),
                principals: Arc::new(PostgresPrincipalDirectory::new(pool.clone())),
                enrollments: Arc::new(PostgresEnrollmentStore::new(pool.clone())),
                audit: Arc::new(PostgresAuditLog::new(pool)),
            }
        }
    };
    tracing::info!(backend = config.backend_name(), "stores initialised");

    let services = assemble(config, stores)?;
    if let Some(admin) = config.bootstrap_admin {
        services.bootstrap_admin(admin).await?;
    }
    Ok(services)
}

/// In-memory services regardless of the configured backend.
pub fn build_in_memory_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    build_in_memory_services_with_catalog(config, RoleCatalog::storefront_default())
}

pub fn build_in_memory_services_with_catalog(
    config: &AppConfig,
    catalog: RoleCatalog,
) -> anyhow::Result<AppServices> {
    assemble(config, in_memory_stores(catalog))
}

fn in_memory_stores(catalog: RoleCatalog) -> Stores {
    Stores {
        roles: Arc::new(InMemoryRoleStore::new(catalog)),
        principals: Arc::new(InMemoryPrincipalDirectory::new()),
        enrollments: Arc::new(InMemoryEnrollmentStore::new()),
        audit: Arc::new(InMemoryAuditLog::new()),
    }
}

fn assemble(config: &AppConfig, stores: Stores) -> anyhow::Result<AppServices> {
    let jwt: Arc<dyn JwtValidator> =
        Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));

    let csrf = Arc::new(match config.csrf_token_ttl {
        Some(ttl) => CsrfValidator::with_ttl(ttl),
        None => CsrfValidator::new(),
    });

    let cipher = SecretCipher::new(config.mfa_encryption_key.as_bytes())?;
    let mfa = Arc::new(MfaGate::new(
        stores.enrollments,
        cipher,
        config.mfa_issuer.clone(),
        config.mfa_setup_ttl,
    ));

    let audit = AuditEmitter::new(stores.audit);
    let identity = Arc::new(IdentityResolver::new(stores.principals.clone()));
    let guard = GuardComposer::new(
        identity,
        stores.roles.clone(),
        csrf.clone(),
        mfa.clone(),
        audit.clone(),
    );

    Ok(AppServices {
        jwt,
        roles: stores.roles,
        principals: stores.principals,
        csrf,
        mfa,
        audit,
        guard,
    })
}

impl AppServices {
    /// Make sure `principal_id` exists, is active and holds `Admin`.
    pub async fn bootstrap_admin(&self, principal_id: PrincipalId) -> anyhow::Result<()> {
        self.principals.register(Principal::active(principal_id)).await?;
        self.roles.assign_role(principal_id, &Role::ADMIN).await?;
        tracing::warn!(%principal_id, "bootstrap admin granted");
        Ok(())
    }
}

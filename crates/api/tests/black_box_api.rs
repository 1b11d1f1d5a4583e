use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use storefront_api::app::{AppServices, build_app, services::build_in_memory_services_with_catalog};
use storefront_auth::mfa::totp;
use storefront_auth::permissions::storefront as perms;
use storefront_auth::{AuditQuery, AuditRecord, DenyReason, JwtClaims, Outcome, Principal, PrincipalId, Role, RoleCatalog};
use storefront_infra::AppConfig;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with_catalog(RoleCatalog::storefront_default()).await
    }

    async fn spawn_with_catalog(catalog: RoleCatalog) -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "MFA_ENCRYPTION_KEY" => Some("black-box-test-key".to_string()),
            _ => None,
        })
        .expect("valid test config");

        // Same router as prod, in-memory stores, ephemeral port.
        let services = Arc::new(build_in_memory_services_with_catalog(&config, catalog).expect("services"));
        let app = build_app(services.clone()).expect("router");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register an active principal with `roles` and return a bearer token for it.
    async fn principal(&self, roles: &[Role]) -> (PrincipalId, String) {
        let id = PrincipalId::new();
        self.services
            .principals
            .register(Principal::active(id))
            .await
            .unwrap();
        for role in roles {
            self.services.roles.assign_role(id, role).await.unwrap();
        }
        (id, mint_jwt(id))
    }

    async fn audit_records(&self, actor: PrincipalId, action: &str) -> Vec<AuditRecord> {
        let mut query = AuditQuery::new(None, Some(100));
        query.actor_id = Some(actor);
        query.action = Some(action.to_string());
        self.services.audit.query(&query).await.unwrap().logs
    }

    async fn csrf_token(&self, token: &str) -> String {
        let res = self
            .client
            .get(self.url("/csrf-token"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = res.json().await.unwrap();
        body["csrf_token"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: PrincipalId) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        sid: format!("sess-{sub}"),
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "UNAUTHENTICATED");

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reflects_roles_and_mfa_state() {
    let srv = TestServer::spawn().await;
    let (id, token) = srv.principal(&[Role::STAFF]).await;

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth(&token)
        .header("x-request-id", "0190a0b1-2c3d-7e4f-8a9b-0c1d2e3f4a5b")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["x-request-id"].to_str().unwrap(),
        "0190a0b1-2c3d-7e4f-8a9b-0c1d2e3f4a5b"
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["principal_id"], id.to_string());
    assert_eq!(body["roles"], json!(["Staff"]));
    assert_eq!(body["mfa_enabled"], false);
}

#[tokio::test]
async fn inactive_principal_is_rejected() {
    let srv = TestServer::spawn().await;
    let id = PrincipalId::new();
    srv.services
        .principals
        .register(Principal::inactive(id))
        .await
        .unwrap();

    let res = srv
        .client
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ACCOUNT_INACTIVE");
}

#[tokio::test]
async fn mutations_require_csrf_token() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.principal(&[Role::ADMIN]).await;
    let target = PrincipalId::new();
    let url = srv.url(&format!("/admin/principals/{target}/roles"));

    let res = srv
        .client
        .post(&url)
        .bearer_auth(&admin)
        .json(&json!({ "role": "Staff" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CSRF_MISSING");

    let _ = srv.csrf_token(&admin).await;
    let res = srv
        .client
        .post(&url)
        .bearer_auth(&admin)
        .header("x-csrf-token", "forged")
        .json(&json!({ "role": "Staff" }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "CSRF_INVALID");
}

#[tokio::test]
async fn admin_assigns_and_removes_roles_with_audit_trail() {
    let srv = TestServer::spawn().await;
    let (admin_id, admin) = srv.principal(&[Role::ADMIN]).await;
    let csrf = srv.csrf_token(&admin).await;
    let target = PrincipalId::new();

    let res = srv
        .client
        .post(srv.url(&format!("/admin/principals/{target}/roles")))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "role": "B2B" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!(["B2B"]));

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/principals/{target}/roles/B2B")))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!([]));

    let res = srv
        .client
        .get(srv.url(&format!("/audit-logs?user_id={admin_id}&action_type=roles.assign")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["current_page"], 1);
    assert_eq!(page["logs"][0]["target"], target.to_string());
    assert_eq!(page["logs"][0]["details"]["role"], "B2B");
}

#[tokio::test]
async fn staff_cannot_manage_users_and_denial_is_audited() {
    let srv = TestServer::spawn().await;
    let (staff_id, staff) = srv.principal(&[Role::STAFF]).await;
    let (_, admin) = srv.principal(&[Role::ADMIN]).await;

    let res = srv
        .client
        .get(srv.url(&format!("/admin/principals/{staff_id}/roles")))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INSUFFICIENT_PERMISSIONS");

    let res = srv
        .client
        .get(srv.url("/audit-logs"))
        .bearer_auth(&staff)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .get(srv.url(&format!(
            "/audit-logs?user_id={staff_id}&action_type=access.deny&sort_direction=asc"
        )))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["logs"][0]["reason"], "INSUFFICIENT_PERMISSIONS");
    assert_eq!(page["logs"][1]["reason"], "INSUFFICIENT_ROLE");
}

#[tokio::test]
async fn audit_log_rejects_bad_parameters() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.principal(&[Role::ADMIN]).await;

    let res = srv
        .client
        .get(srv.url("/audit-logs?sort_by=password"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rbac_explain_describes_missing_permissions() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.principal(&[Role::ADMIN]).await;
    let (customer_id, _) = srv.principal(&[Role::CUSTOMER]).await;

    let res = srv
        .client
        .get(srv.url(&format!(
            "/admin/rbac/explain/{customer_id}?permissions=WRITE_REVIEWS,MANAGE_PRODUCTS"
        )))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["granted"], false);
    assert_eq!(
        body["denial_reason"]["missing_permissions"],
        json!(["MANAGE_PRODUCTS"])
    );

    let res = srv
        .client
        .get(srv.url("/admin/rbac/roles"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["roles"].as_array().unwrap().len(), 4);
    assert_eq!(body["permissions"].as_array().unwrap().len(), 15);
}

#[tokio::test]
async fn mfa_enrollment_then_enforcement() {
    let srv = TestServer::spawn().await;
    let (admin_id, admin) = srv.principal(&[Role::ADMIN]).await;
    let csrf = srv.csrf_token(&admin).await;

    let res = srv
        .client
        .post(srv.url("/mfa/setup"))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/svg+xml");
    let secret = res.headers()["x-mfa-secret"].to_str().unwrap().to_string();
    assert!(res.text().await.unwrap().contains("<svg"));

    let code = totp::code_at(&totp::decode_secret(&secret).unwrap(), Utc::now()).unwrap();
    let res = srv
        .client
        .post(srv.url("/mfa/verify"))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "token": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .client
        .post(srv.url("/mfa/verify"))
        .bearer_auth(&admin)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "token": code }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Admin-only routes now need a second factor.
    let res = srv
        .client
        .get(srv.url("/audit-logs"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "MFA_REQUIRED");

    let code = totp::code_at(&totp::decode_secret(&secret).unwrap(), Utc::now()).unwrap();
    let res = srv
        .client
        .get(srv.url(&format!("/audit-logs?user_id={admin_id}&action_type=mfa.enrolled")))
        .bearer_auth(&admin)
        .header("x-mfa-code", code)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn mfa_verify_without_setup_is_expired() {
    let srv = TestServer::spawn().await;
    let (customer_id, customer) = srv.principal(&[Role::CUSTOMER]).await;
    let csrf = srv.csrf_token(&customer).await;

    let res = srv
        .client
        .post(srv.url("/mfa/verify"))
        .bearer_auth(&customer)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "token": "123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "MFA_SETUP_EXPIRED");

    let records = srv.audit_records(customer_id, "mfa.verify").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Deny);
    assert_eq!(records[0].reason, Some(DenyReason::MfaSetupExpired));
    assert_eq!(records[0].endpoint, "POST /mfa/verify");
}

#[tokio::test]
async fn failed_mfa_confirmation_is_audited() {
    let srv = TestServer::spawn().await;
    let (customer_id, customer) = srv.principal(&[Role::CUSTOMER]).await;
    let csrf = srv.csrf_token(&customer).await;

    let res = srv
        .client
        .post(srv.url("/mfa/setup"))
        .bearer_auth(&customer)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let secret = totp::decode_secret(res.headers()["x-mfa-secret"].to_str().unwrap()).unwrap();

    // Outside every step the server could accept, even across a step boundary.
    let now = Utc::now();
    let nearby: Vec<String> = (-2i64..=2)
        .map(|step| totp::code_at(&secret, now + ChronoDuration::seconds(step * totp::STEP_SECS)).unwrap())
        .collect();
    let wrong = (0..10)
        .map(|d| format!("{d}{d}{d}{d}{d}{d}"))
        .find(|c| !nearby.contains(c))
        .unwrap();

    for _ in 0..3 {
        let res = srv
            .client
            .post(srv.url("/mfa/verify"))
            .bearer_auth(&customer)
            .header("x-csrf-token", &csrf)
            .json(&json!({ "token": wrong }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    let records = srv.audit_records(customer_id, "mfa.verify").await;
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|r| r.outcome == Outcome::Deny && r.reason == Some(DenyReason::MfaInvalidCode)));
    assert!(srv.audit_records(customer_id, "mfa.enrolled").await.is_empty());
}

#[tokio::test]
async fn only_admins_grant_or_revoke_admin() {
    let support = Role::new("Support");
    let catalog = RoleCatalog::builder()
        .permissions(perms::ALL)
        .role(Role::ADMIN, perms::ALL)
        .role(Role::STAFF, [perms::VIEW_REPORTS])
        .role(support.clone(), [perms::MANAGE_USERS])
        .build()
        .unwrap();
    let srv = TestServer::spawn_with_catalog(catalog).await;
    let (support_id, support_token) = srv.principal(&[support.clone()]).await;
    let (admin_id, _) = srv.principal(&[Role::ADMIN]).await;
    let csrf = srv.csrf_token(&support_token).await;

    let res = srv
        .client
        .post(srv.url(&format!("/admin/principals/{support_id}/roles")))
        .bearer_auth(&support_token)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "role": "Admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INSUFFICIENT_ROLE");

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/principals/{admin_id}/roles/Admin")))
        .bearer_auth(&support_token)
        .header("x-csrf-token", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    assert!(!srv.services.roles.has_role(support_id, &Role::ADMIN).await.unwrap());
    assert!(srv.services.roles.has_role(admin_id, &Role::ADMIN).await.unwrap());

    let refused = srv.audit_records(support_id, "roles.assign").await;
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].reason, Some(DenyReason::InsufficientRole));
    assert_eq!(srv.audit_records(support_id, "roles.remove").await.len(), 1);

    // Non-admin roles remain manageable.
    let res = srv
        .client
        .post(srv.url(&format!("/admin/principals/{support_id}/roles")))
        .bearer_auth(&support_token)
        .header("x-csrf-token", &csrf)
        .json(&json!({ "role": "Staff" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use storefront_auth::{Credential, GuardComposer, GuardRequest, JwtValidator, RequestId, Requirement};

use crate::app::errors;
use crate::context::RequestContext;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const MFA_HEADER: &str = "x-mfa-code";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Per-route guard configuration: the shared pipeline plus the route's requirement.
#[derive(Clone)]
pub struct GuardState {
    pub guard: GuardComposer,
    pub jwt: Arc<dyn JwtValidator>,
    pub requirement: Arc<Requirement>,
}

/// Assign (or adopt) the request id and resolve the client address.
///
/// The id is echoed on the response.
pub async fn request_context(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<RequestId>().ok())
        .unwrap_or_default();

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = forwarded_for(req.headers()).or(peer);

    req.extensions_mut()
        .insert(RequestContext::new(request_id, client_ip));

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Run the authorization pipeline; on success expose the identity to the handler.
pub async fn guard(State(state): State<GuardState>, mut req: Request, next: Next) -> Response {
    let received_at = Utc::now();
    let ctx = req
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| RequestContext::new(RequestId::new(), None));

    let credential = match extract_bearer(req.headers()) {
        Ok(None) => Credential::Missing,
        Ok(Some(token)) => match state.jwt.validate(token, received_at) {
            Ok(claims) => Credential::Verified(claims),
            Err(e) => Credential::Invalid(e.to_string()),
        },
        Err(reason) => Credential::Invalid(reason.to_string()),
    };

    let guard_request = GuardRequest {
        credential,
        method: req.method().as_str().to_string(),
        path: req.uri().path().to_string(),
        csrf_token: header_string(req.headers(), CSRF_HEADER),
        mfa_code: header_string(req.headers(), MFA_HEADER),
        ip: ctx.client_ip().map(|ip| ip.to_string()),
        request_id: ctx.request_id(),
        received_at,
    };

    match state.guard.authorize(&guard_request, &state.requirement).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(denial) => errors::denial_response(&denial),
    }
}

/// `Ok(None)` when no `Authorization` header is present.
fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| "authorization header is not ASCII")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("authorization scheme is not Bearer")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("empty bearer token");
    }

    Ok(Some(token))
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First (client-most) address of `X-Forwarded-For`.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(FORWARDED_FOR_HEADER)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

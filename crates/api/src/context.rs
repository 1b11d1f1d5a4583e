use std::net::IpAddr;

use storefront_auth::RequestId;

/// Correlation data attached to every request before any guard runs.
///
/// The authenticated identity is a separate extension
/// ([`storefront_auth::IdentityContext`]) inserted only after a guard pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: RequestId,
    client_ip: Option<IpAddr>,
}

impl RequestContext {
    pub fn new(request_id: RequestId, client_ip: Option<IpAddr>) -> Self {
        Self {
            request_id,
            client_ip,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }
}

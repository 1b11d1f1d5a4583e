//! Process configuration, read from environment variables.

use std::net::SocketAddr;

use storefront_core::PrincipalId;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEV_MFA_KEY: &str = "dev-mfa-encryption-key";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MFA_ISSUER: &str = "Storefront";
const DEFAULT_MFA_SETUP_TTL_SECS: i64 = 600;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

/// Which store implementations to wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub backend: StoreBackend,
    pub mfa_encryption_key: String,
    pub mfa_issuer: String,
    pub mfa_setup_ttl: chrono::Duration,
    /// `None` disables CSRF token expiry.
    pub csrf_token_ttl: Option<chrono::Duration>,
    /// Principal granted `Admin` at startup (dev bootstrap).
    pub bootstrap_admin: Option<PrincipalId>,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("backend", &self.backend_name())
            .field("mfa_issuer", &self.mfa_issuer)
            .field("mfa_setup_ttl", &self.mfa_setup_ttl)
            .field("csrf_token_ttl", &self.csrf_token_ttl)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let mfa_encryption_key = var("MFA_ENCRYPTION_KEY").unwrap_or_else(|| {
            tracing::warn!("MFA_ENCRYPTION_KEY not set; using insecure dev default");
            DEV_MFA_KEY.to_string()
        });

        let persistent = var("USE_PERSISTENT_STORES")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let backend = if persistent {
            StoreBackend::Postgres {
                database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            }
        } else {
            StoreBackend::InMemory
        };

        let mfa_setup_ttl = match var("MFA_SETUP_TTL_SECS") {
            Some(raw) => seconds("MFA_SETUP_TTL_SECS", &raw)?,
            None => chrono::Duration::seconds(DEFAULT_MFA_SETUP_TTL_SECS),
        };

        let csrf_token_ttl = var("CSRF_TOKEN_TTL_SECS")
            .map(|raw| seconds("CSRF_TOKEN_TTL_SECS", &raw))
            .transpose()?;

        let bootstrap_admin = var("BOOTSTRAP_ADMIN_ID")
            .map(|raw| {
                raw.parse::<PrincipalId>().map_err(|e| ConfigError::Invalid {
                    var: "BOOTSTRAP_ADMIN_ID",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            backend,
            mfa_encryption_key,
            mfa_issuer: var("MFA_ISSUER").unwrap_or_else(|| DEFAULT_MFA_ISSUER.to_string()),
            mfa_setup_ttl,
            csrf_token_ttl,
            bootstrap_admin,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            StoreBackend::InMemory => "in-memory",
            StoreBackend::Postgres { .. } => "postgres",
        }
    }
}

fn seconds(var: &'static str, raw: &str) -> Result<chrono::Duration, ConfigError> {
    match raw.parse::<i64>() {
        Ok(secs) if secs > 0 => Ok(chrono::Duration::seconds(secs)),
        Ok(_) => Err(ConfigError::Invalid {
            var,
            reason: "must be a positive number of seconds".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_are_in_memory_dev_settings() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.backend, StoreBackend::InMemory);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.mfa_setup_ttl, chrono::Duration::minutes(10));
        assert_eq!(cfg.csrf_token_ttl, None);
        assert_eq!(cfg.bootstrap_admin, None);
    }

    #[test]
    fn persistent_stores_require_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );

        let cfg = load(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/storefront"),
        ])
        .unwrap();
        assert_eq!(cfg.backend_name(), "postgres");
    }

    #[test]
    fn ttls_and_bootstrap_admin_are_parsed() {
        let admin = PrincipalId::new();
        let cfg = load(&[
            ("CSRF_TOKEN_TTL_SECS", "3600"),
            ("MFA_SETUP_TTL_SECS", "120"),
            ("BOOTSTRAP_ADMIN_ID", &admin.to_string()),
        ])
        .unwrap();
        assert_eq!(cfg.csrf_token_ttl, Some(chrono::Duration::hours(1)));
        assert_eq!(cfg.mfa_setup_ttl, chrono::Duration::minutes(2));
        assert_eq!(cfg.bootstrap_admin, Some(admin));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("CSRF_TOKEN_TTL_SECS", "0")]),
            Err(ConfigError::Invalid { var: "CSRF_TOKEN_TTL_SECS", .. })
        ));
        assert!(matches!(
            load(&[("BIND_ADDR", "not-an-addr")]),
            Err(ConfigError::Invalid { var: "BIND_ADDR", .. })
        ));
        assert!(matches!(
            load(&[("BOOTSTRAP_ADMIN_ID", "nope")]),
            Err(ConfigError::Invalid { var: "BOOTSTRAP_ADMIN_ID", .. })
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = load(&[("JWT_SECRET", "super-secret-value")]).unwrap();
        assert!(!format!("{cfg:?}").contains("super-secret-value"));
    }
}

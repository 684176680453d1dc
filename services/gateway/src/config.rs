use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::signing::ContextSigner;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen host address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// School web application that receives allowed requests
    pub upstream_url: String,

    /// Tenant directory base URL (`GET /resolve/{subdomain}`)
    pub tenant_directory_url: String,

    /// User context provider base URL (`GET /context`)
    pub user_context_url: String,

    /// Timeout for the whole proxied request in seconds
    pub request_timeout_secs: u64,

    /// Timeout for each directory / user context call in milliseconds
    pub collaborator_timeout_ms: u64,

    /// Retries for transient collaborator failures (0 disables retrying)
    pub collaborator_max_retries: u32,

    /// Maximum request body size in bytes
    pub max_body_size_bytes: usize,

    /// Lifetime of a cached tenant configuration in seconds
    pub tenant_cache_ttl_secs: u64,

    /// Interval of the expired-entry sweep in seconds
    pub cache_sweep_interval_secs: u64,

    /// Tenant used for loopback and literal IP hosts (local testing only)
    pub local_tenant_fallback: Option<String>,

    /// Prefer X-Forwarded-Host over Host when extracting the subdomain
    pub trust_forwarded_host: bool,

    /// Cookie carrying the session token
    pub session_cookie_name: String,

    /// Session token algorithm
    pub session_jwt_algorithm: JwtAlgorithm,

    /// Shared secret for HMAC session tokens
    pub session_jwt_secret: Option<String>,

    /// Public key path for RSA/ECDSA session tokens
    pub session_jwt_public_key_path: Option<PathBuf>,

    /// Expected session token issuer
    pub session_jwt_issuer: Option<String>,

    /// Expected session token audience
    pub session_jwt_audience: Option<String>,

    /// Secret for the context-signature header (unsigned when absent)
    pub context_signing_secret: Option<String>,

    /// JSON file replacing the built-in policy tables
    pub policy_tables_path: Option<PathBuf>,

    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum JwtAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
}

impl JwtAlgorithm {
    pub fn is_hmac(&self) -> bool {
        matches!(
            self,
            JwtAlgorithm::HS256 | JwtAlgorithm::HS384 | JwtAlgorithm::HS512
        )
    }
}

impl std::str::FromStr for JwtAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(JwtAlgorithm::HS256),
            "HS384" => Ok(JwtAlgorithm::HS384),
            "HS512" => Ok(JwtAlgorithm::HS512),
            "RS256" => Ok(JwtAlgorithm::RS256),
            "RS384" => Ok(JwtAlgorithm::RS384),
            "RS512" => Ok(JwtAlgorithm::RS512),
            "ES256" => Ok(JwtAlgorithm::ES256),
            "ES384" => Ok(JwtAlgorithm::ES384),
            _ => anyhow::bail!("Unsupported JWT algorithm: {}", s),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("GATE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("GATE_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("Invalid GATE_PORT")?;

        let upstream_url =
            std::env::var("UPSTREAM_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let tenant_directory_url = std::env::var("TENANT_DIRECTORY_URL")
            .unwrap_or_else(|_| "http://localhost:8100".to_string());

        let user_context_url = std::env::var("USER_CONTEXT_URL")
            .unwrap_or_else(|_| "http://localhost:8200".to_string());

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("Invalid REQUEST_TIMEOUT_SECS")?;

        let collaborator_timeout_ms = std::env::var("COLLABORATOR_TIMEOUT_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse()
            .context("Invalid COLLABORATOR_TIMEOUT_MS")?;

        let collaborator_max_retries = std::env::var("COLLABORATOR_MAX_RETRIES")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .context("Invalid COLLABORATOR_MAX_RETRIES")?;

        let max_body_size_bytes = std::env::var("MAX_BODY_SIZE_BYTES")
            .unwrap_or_else(|_| "10485760".to_string()) // 10MB
            .parse()
            .context("Invalid MAX_BODY_SIZE_BYTES")?;

        let tenant_cache_ttl_secs = std::env::var("TENANT_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("Invalid TENANT_CACHE_TTL_SECS")?;

        let cache_sweep_interval_secs = std::env::var("CACHE_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("Invalid CACHE_SWEEP_INTERVAL_SECS")?;

        let local_tenant_fallback = std::env::var("LOCAL_TENANT_FALLBACK")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let trust_forwarded_host = std::env::var("TRUST_FORWARDED_HOST")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("Invalid TRUST_FORWARDED_HOST")?;

        let session_cookie_name =
            std::env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "session".to_string());

        let session_jwt_algorithm = std::env::var("SESSION_JWT_ALGORITHM")
            .unwrap_or_else(|_| "HS256".to_string())
            .parse()?;

        let session_jwt_secret = std::env::var("SESSION_JWT_SECRET").ok();

        let session_jwt_public_key_path = std::env::var("SESSION_JWT_PUBLIC_KEY_PATH")
            .ok()
            .map(PathBuf::from);

        let session_jwt_issuer = std::env::var("SESSION_JWT_ISSUER").ok();

        let session_jwt_audience = std::env::var("SESSION_JWT_AUDIENCE").ok();

        let context_signing_secret = std::env::var("CONTEXT_SIGNING_SECRET").ok();

        let policy_tables_path = std::env::var("POLICY_TABLES_PATH").ok().map(PathBuf::from);

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            host,
            port,
            upstream_url,
            tenant_directory_url,
            user_context_url,
            request_timeout_secs,
            collaborator_timeout_ms,
            collaborator_max_retries,
            max_body_size_bytes,
            tenant_cache_ttl_secs,
            cache_sweep_interval_secs,
            local_tenant_fallback,
            trust_forwarded_host,
            session_cookie_name,
            session_jwt_algorithm,
            session_jwt_secret,
            session_jwt_public_key_path,
            session_jwt_issuer,
            session_jwt_audience,
            context_signing_secret,
            policy_tables_path,
            log_level,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream_url.is_empty() {
            anyhow::bail!("UPSTREAM_URL cannot be empty");
        }

        if self.tenant_directory_url.is_empty() {
            anyhow::bail!("TENANT_DIRECTORY_URL cannot be empty");
        }

        if self.user_context_url.is_empty() {
            anyhow::bail!("USER_CONTEXT_URL cannot be empty");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        if self.collaborator_timeout_ms == 0 {
            anyhow::bail!("COLLABORATOR_TIMEOUT_MS must be greater than 0");
        }

        if self.max_body_size_bytes == 0 {
            anyhow::bail!("MAX_BODY_SIZE_BYTES must be greater than 0");
        }

        if self.tenant_cache_ttl_secs == 0 {
            anyhow::bail!("TENANT_CACHE_TTL_SECS must be greater than 0");
        }

        if self.cache_sweep_interval_secs == 0 {
            anyhow::bail!("CACHE_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        if self.session_cookie_name.trim().is_empty() {
            anyhow::bail!("SESSION_COOKIE_NAME cannot be empty");
        }

        if self.session_jwt_algorithm.is_hmac() {
            if self.session_jwt_secret.is_none() {
                anyhow::bail!(
                    "SESSION_JWT_SECRET is required for HMAC algorithms (HS256/HS384/HS512)"
                );
            }
        } else {
            match &self.session_jwt_public_key_path {
                None => anyhow::bail!(
                    "SESSION_JWT_PUBLIC_KEY_PATH is required for RSA/ECDSA algorithms"
                ),
                Some(path) if !path.exists() => {
                    anyhow::bail!("Session public key file not found: {:?}", path)
                }
                Some(_) => {}
            }
        }

        if let Some(secret) = &self.context_signing_secret {
            ContextSigner::new(secret).context("Invalid CONTEXT_SIGNING_SECRET")?;
        }

        if let Some(path) = &self.policy_tables_path {
            if !path.exists() {
                anyhow::bail!("Policy tables file not found: {:?}", path);
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn tenant_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tenant_cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

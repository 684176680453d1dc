use std::fs;

use anyhow::Context;
use async_trait::async_trait;
use http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::SessionError;
use super::{AUTHORIZATION_HEADER, COOKIE_HEADER};
use crate::config::{GatewayConfig, JwtAlgorithm};

/// A signed-in user, with the token that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Answers "who is signed in on this request", if anyone.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, headers: &HeaderMap) -> Option<Session>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: Option<String>,
    exp: Option<u64>,
}

pub struct JwtSessionProvider {
    cookie_name: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSessionProvider {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let algorithm = match config.session_jwt_algorithm {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
            JwtAlgorithm::RS256 => Algorithm::RS256,
            JwtAlgorithm::RS384 => Algorithm::RS384,
            JwtAlgorithm::RS512 => Algorithm::RS512,
            JwtAlgorithm::ES256 => Algorithm::ES256,
            JwtAlgorithm::ES384 => Algorithm::ES384,
        };

        let decoding_key = match config.session_jwt_algorithm {
            JwtAlgorithm::HS256 | JwtAlgorithm::HS384 | JwtAlgorithm::HS512 => {
                let secret = config
                    .session_jwt_secret
                    .as_ref()
                    .context("Session secret missing for HMAC algorithm")?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            JwtAlgorithm::RS256 | JwtAlgorithm::RS384 | JwtAlgorithm::RS512 => {
                let key_path = config
                    .session_jwt_public_key_path
                    .as_ref()
                    .context("Session public key path missing for RSA algorithm")?;
                let key_data = fs::read(key_path)?;
                DecodingKey::from_rsa_pem(&key_data)?
            }
            JwtAlgorithm::ES256 | JwtAlgorithm::ES384 => {
                let key_path = config
                    .session_jwt_public_key_path
                    .as_ref()
                    .context("Session public key path missing for ECDSA algorithm")?;
                let key_data = fs::read(key_path)?;
                DecodingKey::from_ec_pem(&key_data)?
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];

        if let Some(issuer) = &config.session_jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(audience) = &config.session_jwt_audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            cookie_name: config.session_cookie_name.clone(),
            decoding_key,
            validation,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Session, SessionError> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;

        let user_id = token_data
            .claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(SessionError::MissingSubject)?;

        Ok(Session {
            user_id,
            token: token.to_string(),
        })
    }

    /// Session cookie first, then a bearer token.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        let from_cookie = headers
            .get_all(COOKIE_HEADER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim_matches('"').to_string())
            .filter(|value| !value.is_empty());

        from_cookie.or_else(|| {
            headers
                .get(AUTHORIZATION_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
        })
    }
}

#[async_trait]
impl SessionProvider for JwtSessionProvider {
    async fn session(&self, headers: &HeaderMap) -> Option<Session> {
        let Some(token) = self.token_from_headers(headers) else {
            debug!("No session token on request");
            return None;
        };

        match self.validate_token(&token) {
            Ok(session) => {
                debug!(user_id = %session.user_id, "Session validated");
                Some(session)
            }
            Err(e) => {
                warn!(error = %e, "Rejected session token");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;
    use std::path::PathBuf;

    const SECRET: &str = "session-secret";

    fn config() -> GatewayConfig {
        GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            upstream_url: "http://localhost:3000".to_string(),
            tenant_directory_url: "http://localhost:8100".to_string(),
            user_context_url: "http://localhost:8200".to_string(),
            request_timeout_secs: 30,
            collaborator_timeout_ms: 2000,
            collaborator_max_retries: 0,
            max_body_size_bytes: 1024,
            tenant_cache_ttl_secs: 300,
            cache_sweep_interval_secs: 60,
            local_tenant_fallback: None,
            trust_forwarded_host: false,
            session_cookie_name: "session".to_string(),
            session_jwt_algorithm: JwtAlgorithm::HS256,
            session_jwt_secret: Some(SECRET.to_string()),
            session_jwt_public_key_path: None,
            session_jwt_issuer: None,
            session_jwt_audience: None,
            context_signing_secret: None,
            policy_tables_path: None,
            log_level: "info".to_string(),
        }
    }

    fn token(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_token(sub: &str) -> String {
        token(json!({"sub": sub, "exp": get_current_timestamp() + 600}), SECRET)
    }

    #[tokio::test]
    async fn test_session_from_cookie() {
        let provider = JwtSessionProvider::new(&config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("theme=dark; session={}", valid_token("u-42"))).unwrap(),
        );

        let session = provider.session(&headers).await.unwrap();
        assert_eq!(session.user_id, "u-42");
    }

    #[tokio::test]
    async fn test_session_from_bearer_header() {
        let provider = JwtSessionProvider::new(&config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", valid_token("u-7"))).unwrap(),
        );

        assert_eq!(provider.session(&headers).await.unwrap().user_id, "u-7");
    }

    #[tokio::test]
    async fn test_invalid_tokens_mean_no_session() {
        let provider = JwtSessionProvider::new(&config()).unwrap();

        let expired = token(json!({"sub": "u-1", "exp": get_current_timestamp() - 3600}), SECRET);
        let forged = token(json!({"sub": "u-1", "exp": get_current_timestamp() + 600}), "other");
        let anonymous = token(json!({"exp": get_current_timestamp() + 600}), SECRET);

        for bad in [expired, forged, anonymous, "garbage".to_string()] {
            let mut headers = HeaderMap::new();
            headers.insert(
                "cookie",
                HeaderValue::from_str(&format!("session={}", bad)).unwrap(),
            );
            assert!(provider.session(&headers).await.is_none());
        }

        assert!(provider.session(&HeaderMap::new()).await.is_none());
    }

    #[test]
    fn test_other_cookie_names_are_ignored() {
        let provider = JwtSessionProvider::new(&config()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("session_old=abc; sessionx=def"));

        assert_eq!(provider.token_from_headers(&headers), None);
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let mut config = config();
        config.session_jwt_issuer = Some("https://auth.schoolgate.app".to_string());
        let provider = JwtSessionProvider::new(&config).unwrap();

        assert!(provider.validate_token(&valid_token("u-1")).is_err());

        let issued = token(
            json!({
                "sub": "u-1",
                "iss": "https://auth.schoolgate.app",
                "exp": get_current_timestamp() + 600
            }),
            SECRET,
        );
        assert_eq!(provider.validate_token(&issued).unwrap().user_id, "u-1");
    }

    #[test]
    fn test_missing_key_file_fails_construction() {
        let mut config = config();
        config.session_jwt_algorithm = JwtAlgorithm::RS256;
        config.session_jwt_public_key_path = Some(PathBuf::from("/nonexistent/session.pem"));

        assert!(JwtSessionProvider::new(&config).is_err());
    }
}

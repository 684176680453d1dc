use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use school_gate_policy::UserContext;
use tracing::{debug, info, instrument, warn};

use super::error::UserContextError;
use super::session::Session;
use super::{CONTEXT_PATH, TENANT_ID_HEADER, USER_ID_HEADER};
use crate::retry::RetryPolicy;

/// Resolves a signed-in user's role and permissions within one tenant.
#[async_trait]
pub trait UserContextProvider: Send + Sync {
    async fn user_context(
        &self,
        session: &Session,
        tenant_id: &str,
    ) -> Result<UserContext, UserContextError>;
}

pub struct HttpUserContextProvider {
    http_client: Client,
    provider_base_url: String,
    retry: RetryPolicy,
}

impl HttpUserContextProvider {
    pub fn new(provider_url: String, timeout: Duration, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            http_client,
            provider_base_url: provider_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn fetch(&self, session: &Session, tenant_id: &str) -> Result<UserContext, UserContextError> {
        let url = format!("{}{}", self.provider_base_url, CONTEXT_PATH);

        debug!("Querying user context provider at {}", url);

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&session.token)
            .header(TENANT_ID_HEADER, tenant_id)
            .header(USER_ID_HEADER, &session.user_id)
            .send()
            .await
            .map_err(UserContextError::from)?;
        let latency = start.elapsed();
        let status = response.status();

        if status.is_success() {
            let user: UserContext = response.json().await.map_err(|e| {
                UserContextError::InvalidResponse(format!("Failed to parse user context: {}", e))
            })?;

            if user.user_id != session.user_id {
                return Err(UserContextError::InvalidResponse(format!(
                    "context is for user '{}', session is for '{}'",
                    user.user_id, session.user_id
                )));
            }

            info!(
                tenant_id = %tenant_id,
                user_id = %user.user_id,
                role = %user.role,
                latency_ms = latency.as_millis() as u64,
                "User context resolved"
            );

            Ok(user)
        } else if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            Err(UserContextError::Rejected {
                status: status.as_u16(),
            })
        } else {
            Err(UserContextError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl UserContextProvider for HttpUserContextProvider {
    #[instrument(skip(self, session), fields(tenant_id = %tenant_id, user_id = %session.user_id))]
    async fn user_context(
        &self,
        session: &Session,
        tenant_id: &str,
    ) -> Result<UserContext, UserContextError> {
        let result = self
            .retry
            .run("user_context", || self.fetch(session, tenant_id))
            .await;

        if let Err(e) = &result {
            warn!(error = %e, "User context lookup failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use school_gate_policy::Role;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session() -> Session {
        Session {
            user_id: "u-teacher".to_string(),
            token: "session-token".to_string(),
        }
    }

    fn provider(server: &MockServer) -> HttpUserContextProvider {
        HttpUserContextProvider::new(server.uri(), Duration::from_millis(500), RetryPolicy::none())
            .unwrap()
    }

    #[tokio::test]
    async fn test_context_request_is_tenant_scoped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context"))
            .and(header("authorization", "Bearer session-token"))
            .and(header("x-tenant-id", "t-harare"))
            .and(header("x-user-id", "u-teacher"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "u-teacher",
                "role": "teacher",
                "permissions": ["students.read"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = provider(&server)
            .user_context(&session(), "t-harare")
            .await
            .unwrap();

        assert_eq!(user.role, Role::Teacher);
        assert!(user.permissions.contains("students.read"));
    }

    #[tokio::test]
    async fn test_rejections_and_mismatches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context"))
            .and(header("x-tenant-id", "t-other"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/context"))
            .and(header("x-tenant-id", "t-harare"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "someone-else",
                "role": "schoolAdmin",
                "permissions": []
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert!(matches!(
            provider.user_context(&session(), "t-other").await,
            Err(UserContextError::Rejected { status: 403 })
        ));
        assert!(matches!(
            provider.user_context(&session(), "t-harare").await,
            Err(UserContextError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": "u-teacher",
                "role": "janitor",
                "permissions": []
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            provider(&server).user_context(&session(), "t-harare").await,
            Err(UserContextError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let provider = HttpUserContextProvider::new(
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(200),
            RetryPolicy::none(),
        )
        .unwrap();

        let result = provider.user_context(&session(), "t-harare").await;
        assert!(matches!(
            result,
            Err(UserContextError::Unreachable(_)) | Err(UserContextError::Timeout)
        ));
    }
}

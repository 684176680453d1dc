use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use school_gate_policy::TenantConfig;
use tracing::{debug, info, instrument, warn};

use super::error::DirectoryError;
use super::RESOLVE_PATH;
use crate::retry::RetryPolicy;

/// Source of truth for tenant metadata, keyed by subdomain.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn resolve(&self, subdomain: &str) -> Result<TenantConfig, DirectoryError>;
}

pub struct HttpTenantDirectory {
    http_client: Client,
    directory_base_url: String,
    retry: RetryPolicy,
}

impl HttpTenantDirectory {
    pub fn new(directory_url: String, timeout: Duration, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            http_client,
            directory_base_url: directory_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn fetch(&self, subdomain: &str) -> Result<TenantConfig, DirectoryError> {
        let url = format!("{}{}/{}", self.directory_base_url, RESOLVE_PATH, subdomain);

        debug!("Querying tenant directory at {}", url);

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(DirectoryError::from)?;
        let latency = start.elapsed();
        let status = response.status();

        if status.is_success() {
            let tenant: TenantConfig = response.json().await.map_err(|e| {
                DirectoryError::InvalidResponse(format!("Failed to parse tenant config: {}", e))
            })?;

            if !tenant.subdomain.eq_ignore_ascii_case(subdomain) {
                return Err(DirectoryError::InvalidResponse(format!(
                    "requested '{}' but directory answered '{}'",
                    subdomain, tenant.subdomain
                )));
            }

            info!(
                subdomain = %subdomain,
                tenant_id = %tenant.tenant_id,
                latency_ms = latency.as_millis() as u64,
                "Tenant resolved from directory"
            );

            Ok(tenant)
        } else if status == StatusCode::NOT_FOUND {
            Err(DirectoryError::NotFound(subdomain.to_string()))
        } else {
            Err(DirectoryError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    #[instrument(skip(self), fields(subdomain = %subdomain))]
    async fn resolve(&self, subdomain: &str) -> Result<TenantConfig, DirectoryError> {
        let result = self
            .retry
            .run("tenant_directory", || self.fetch(subdomain))
            .await;

        if let Err(e) = &result {
            warn!(error = %e, "Tenant directory lookup failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant_body(subdomain: &str) -> serde_json::Value {
        json!({
            "subdomain": subdomain,
            "tenantId": "t-harare",
            "displayName": "Harare Primary",
            "subscriptionTier": "premium",
            "enabledModules": ["library-module"],
            "isActive": true
        })
    }

    fn directory(server: &MockServer, retries: u32) -> HttpTenantDirectory {
        HttpTenantDirectory::new(
            server.uri(),
            Duration::from_millis(500),
            RetryPolicy::with_retries(retries),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_tenant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/harare-primary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tenant_body("harare-primary")))
            .expect(1)
            .mount(&server)
            .await;

        let tenant = directory(&server, 0).resolve("harare-primary").await.unwrap();
        assert_eq!(tenant.tenant_id, "t-harare");
        assert!(tenant.has_module("library-module"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let result = directory(&server, 3).resolve("ghost").await;
        assert!(matches!(result, Err(DirectoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/harare-primary"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let result = directory(&server, 2).resolve("harare-primary").await;
        assert!(matches!(result, Err(DirectoryError::Status { status: 503 })));
    }

    #[tokio::test]
    async fn test_mismatched_subdomain_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve/harare-primary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tenant_body("bulawayo-high")))
            .mount(&server)
            .await;

        let result = directory(&server, 0).resolve("harare-primary").await;
        assert!(matches!(result, Err(DirectoryError::InvalidResponse(_))));
    }
}

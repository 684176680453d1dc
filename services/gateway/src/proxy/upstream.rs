use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use http_body_util::{BodyExt, Full};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::{debug, info, instrument};

use super::ProxyError;
use crate::decision::CONTEXT_HEADERS;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Forwards allowed requests to the school web application.
pub struct UpstreamClient {
    http_client: Client,
    upstream_base_url: String,
    max_body_size_bytes: usize,
}

impl UpstreamClient {
    pub fn new(upstream_url: String, timeout: Duration, max_body_size_bytes: usize) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            // the browser follows the application's redirects, not the gateway
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            upstream_base_url: upstream_url.trim_end_matches('/').to_string(),
            max_body_size_bytes,
        })
    }

    #[instrument(skip(self, req, context_headers), fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn forward_request<B>(
        &self,
        req: Request<B>,
        forwarded_host: &str,
        context_headers: &[(&'static str, String)],
    ) -> Result<Response<Full<Bytes>>, ProxyError>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let upstream_url = format!("{}{}", self.upstream_base_url, path_and_query);

        debug!(upstream_url = %upstream_url, "Forwarding request to upstream");

        let body_bytes = body
            .collect()
            .await
            .map_err(|e| ProxyError::Upstream(format!("Failed to read request body: {}", e)))?
            .to_bytes();

        if body_bytes.len() > self.max_body_size_bytes {
            return Err(ProxyError::BodyTooLarge {
                size: body_bytes.len(),
                limit: self.max_body_size_bytes,
            });
        }

        let headers = Self::sanitize_headers(&parts.headers);

        let mut upstream_req = self
            .http_client
            .request(parts.method.clone(), &upstream_url);

        for (name, value) in headers.iter() {
            upstream_req = upstream_req.header(name.as_str(), value.as_bytes());
        }

        for (name, value) in context_headers {
            upstream_req = upstream_req.header(*name, value.as_str());
        }

        upstream_req = upstream_req
            .header("X-Forwarded-Proto", "http")
            .header("X-Forwarded-Host", forwarded_host);

        if !body_bytes.is_empty() {
            upstream_req = upstream_req.body(body_bytes.to_vec());
        }

        let start = std::time::Instant::now();

        let upstream_response = upstream_req
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout
                } else {
                    ProxyError::Upstream(format!("Upstream request failed: {}", e))
                }
            })?;

        let latency = start.elapsed();
        let status = upstream_response.status();

        info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Upstream response received"
        );

        let mut response_builder = Response::builder().status(status);

        for (name, value) in upstream_response.headers().iter() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            response_builder = response_builder.header(name, value);
        }

        let response_body = upstream_response
            .bytes()
            .await
            .map_err(|e| ProxyError::Upstream(format!("Failed to read upstream response: {}", e)))?;

        response_builder
            .body(Full::new(response_body))
            .map_err(|e| ProxyError::Upstream(format!("Failed to build response: {}", e)))
    }

    /// Drops hop-by-hop headers, `Host`, and any client-supplied context headers.
    fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
        let mut sanitized = HeaderMap::new();

        for (name, value) in headers.iter() {
            let name_lower = name.as_str();

            if HOP_BY_HOP.contains(&name_lower) || name_lower == "host" {
                continue;
            }

            if CONTEXT_HEADERS.contains(&name_lower) {
                continue;
            }

            sanitized.append(name.clone(), value.clone());
        }

        sanitized
    }
}

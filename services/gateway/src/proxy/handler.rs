use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, LOCATION};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{GatewayState, ProxyError};
use crate::decision::{Decision, Redirect, CONTEXT_SIGNATURE_HEADER};
use crate::path::{canonicalize, CanonicalTarget, PathError};
use crate::server::PeerInfo;

pub const HEALTH_PATH: &str = "/_gate/health";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

pub struct GatewayHandler {
    state: GatewayState,
}

impl GatewayHandler {
    pub fn new(state: GatewayState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    #[instrument(skip(self, req, peer_info), fields(request_id, method = %req.method(), path = %req.uri().path()))]
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
        peer_info: Option<Arc<PeerInfo>>,
    ) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let request_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let timeout_duration = self.state.config.request_timeout();
        let result = match tokio::time::timeout(
            timeout_duration,
            self.handle_request_inner(req, peer_info),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Timeout),
        };

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, status = e.status_code().as_u16(), "Request failed");
                e.to_response(Some(&request_id))
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }

    async fn handle_request_inner<B>(
        &self,
        req: Request<B>,
        peer_info: Option<Arc<PeerInfo>>,
    ) -> Result<Response<Full<Bytes>>, ProxyError>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let start = std::time::Instant::now();
        let host = request_host(req.headers(), req.uri(), self.state.config.trust_forwarded_host)
            .unwrap_or_default();
        let client_ip = peer_info.as_ref().map(|info| info.client_ip());

        let raw_target = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let target = canonicalize(raw_target)?;
        if target.path_and_query() != raw_target {
            debug!(raw = %raw_target, canonical = %target.path_and_query(), "Canonicalized request path");
        }
        let req = with_target(req, &target)?;
        let path = target.path;

        if path == HEALTH_PATH {
            return Ok(self.health_response());
        }

        debug!(host = %host, client_ip = ?client_ip, "Evaluating access");

        let decision = self.state.gate.evaluate(&host, &path, req.headers()).await;

        let (context, outcome) = match decision {
            Decision::Redirect { target, outcome } => {
                info!(
                    outcome = %outcome,
                    location = %target.location(),
                    client_ip = ?client_ip,
                    "Request redirected"
                );
                return redirect_response(&target);
            }
            Decision::Allow { context, outcome } => (context, outcome),
        };

        let mut headers = context.map(|c| c.header_pairs()).unwrap_or_default();

        if let Some(signer) = &self.state.signer {
            if !headers.is_empty() {
                let signature = signer.sign_headers(&headers)?;
                headers.push((CONTEXT_SIGNATURE_HEADER, signature));
            }
        }

        let mut response = self
            .state
            .upstream_client
            .forward_request(req, &host, &headers)
            .await?;

        for (name, value) in &headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ProxyError::InvalidHeader(format!("{}: {}", name, e)))?;
            response.headers_mut().insert(*name, value);
        }

        info!(
            outcome = %outcome,
            status = response.status().as_u16(),
            client_ip = ?client_ip,
            total_latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );

        Ok(response)
    }

    fn health_response(&self) -> Response<Full<Bytes>> {
        let body = json!({
            "status": "ok",
            "cachedTenants": self.state.gate.resolver().cache().len(),
        });

        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// `X-Forwarded-Host` when trusted, then `Host`, then the URI authority.
pub fn request_host(headers: &HeaderMap, uri: &Uri, trust_forwarded_host: bool) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    if trust_forwarded_host {
        if let Some(host) = header(FORWARDED_HOST_HEADER) {
            return Some(host);
        }
    }

    header(HOST.as_str()).or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
}

/// Replaces the request URI so the forwarded request carries the same path
/// the access decision was made on.
fn with_target<B>(req: Request<B>, target: &CanonicalTarget) -> Result<Request<B>, ProxyError> {
    let (mut parts, body) = req.into_parts();
    parts.uri = target
        .path_and_query()
        .parse()
        .map_err(|e: http::uri::InvalidUri| PathError::Unparseable(e.to_string()))?;
    Ok(Request::from_parts(parts, body))
}

fn redirect_response(target: &Redirect) -> Result<Response<Full<Bytes>>, ProxyError> {
    let location = HeaderValue::from_str(&target.location())
        .map_err(|e| ProxyError::InvalidHeader(format!("location: {}", e)))?;

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
    response.headers_mut().insert(LOCATION, location);
    Ok(response)
}

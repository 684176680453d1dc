use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::HeaderMap;
use school_gate_gateway::cache::TtlCache;
use school_gate_gateway::config::{GatewayConfig, JwtAlgorithm};
use school_gate_gateway::gate::AccessGate;
use school_gate_gateway::identity::{
    IdentityGate, Session, SessionProvider, UserContextError, UserContextProvider,
};
use school_gate_gateway::server::GatewayServer;
use school_gate_gateway::tenant::{
    DirectoryError, LabelSubdomainStrategy, TenantDirectory, TenantResolver,
};
use school_gate_policy::{PolicyEvaluator, Role, SubscriptionTier, TenantConfig, UserContext};
use tokio::task::JoinHandle;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

pub use school_gate_gateway;
pub use school_gate_policy;

/// Header naming the bench user the in-memory session provider signs in.
pub const BENCH_USER_HEADER: &str = "x-bench-user";

/// Tenant directory backed by a fixed map keyed by subdomain.
#[derive(Default)]
pub struct InMemoryDirectory {
    tenants: HashMap<String, TenantConfig>,
}

impl InMemoryDirectory {
    pub fn with_tenant(mut self, tenant: TenantConfig) -> Self {
        self.tenants.insert(tenant.subdomain.clone(), tenant);
        self
    }
}

#[async_trait]
impl TenantDirectory for InMemoryDirectory {
    async fn resolve(&self, subdomain: &str) -> Result<TenantConfig, DirectoryError> {
        self.tenants
            .get(subdomain)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(subdomain.to_string()))
    }
}

/// Signs in whichever user id the bench request names in [`BENCH_USER_HEADER`].
pub struct HeaderSessions;

#[async_trait]
impl SessionProvider for HeaderSessions {
    async fn session(&self, headers: &HeaderMap) -> Option<Session> {
        let user_id = headers.get(BENCH_USER_HEADER)?.to_str().ok()?;
        Some(Session {
            user_id: user_id.to_string(),
            token: format!("bench-{user_id}"),
        })
    }
}

#[derive(Default)]
pub struct InMemoryContexts {
    users: HashMap<String, UserContext>,
}

impl InMemoryContexts {
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.users.insert(user.user_id.clone(), user);
        self
    }
}

#[async_trait]
impl UserContextProvider for InMemoryContexts {
    async fn user_context(
        &self,
        session: &Session,
        _tenant_id: &str,
    ) -> Result<UserContext, UserContextError> {
        self.users
            .get(&session.user_id)
            .cloned()
            .ok_or(UserContextError::Rejected { status: 404 })
    }
}

pub fn bench_tenant(subdomain: &str, modules: &[&str]) -> TenantConfig {
    TenantConfig {
        subdomain: subdomain.to_string(),
        tenant_id: format!("t-{subdomain}"),
        display_name: subdomain.replace('-', " "),
        subscription_tier: SubscriptionTier::Premium,
        enabled_modules: modules.iter().map(|m| m.to_string()).collect(),
        custom_domain: None,
        is_active: true,
    }
}

/// The users every gate fixture knows about, one per role that has a dashboard.
pub fn bench_users() -> Vec<UserContext> {
    vec![
        UserContext::new("admin", Role::SchoolAdmin).with_permissions(["users.manage"]),
        UserContext::new("teacher", Role::Teacher).with_permissions(["students.read"]),
        UserContext::new("student", Role::Student),
        UserContext::new("parent", Role::Parent).with_permissions(["payments.make"]),
    ]
}

/// An [`AccessGate`] wired to in-memory collaborators, so latency covers the
/// decision pipeline and cache rather than the network.
pub struct GateBenchFixture {
    pub gate: Arc<AccessGate>,
    pub host: String,
}

impl GateBenchFixture {
    pub fn new(tenant: TenantConfig) -> Self {
        let host = format!("{}.schoolgate.app", tenant.subdomain);
        Self {
            gate: Arc::new(build_gate(tenant)),
            host,
        }
    }

    pub fn headers_for(user_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = user_id.parse() {
            headers.insert(BENCH_USER_HEADER, value);
        }
        headers
    }
}

fn build_gate(tenant: TenantConfig) -> AccessGate {
    let contexts = bench_users()
        .into_iter()
        .fold(InMemoryContexts::default(), InMemoryContexts::with_user);

    let resolver = TenantResolver::new(
        Arc::new(LabelSubdomainStrategy::new(None)),
        Arc::new(InMemoryDirectory::default().with_tenant(tenant)),
        TtlCache::new(),
        Duration::from_secs(300),
    );
    let identity = IdentityGate::new(Arc::new(HeaderSessions), Arc::new(contexts));

    AccessGate::new(resolver, identity, Arc::new(PolicyEvaluator::builtin()))
}

/// A running gateway in front of a mock school application.
pub struct GatewayHarness {
    pub base_url: String,
    pub host: String,
    _upstream: MockServer,
    server: JoinHandle<Result<()>>,
}

impl GatewayHarness {
    pub async fn start(tenant: TenantConfig) -> Result<Self> {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&upstream)
            .await;

        let port = unused_port()?;
        let config = harness_config(&upstream.uri(), port);
        config.validate()?;

        let host = format!("{}.schoolgate.app", tenant.subdomain);
        let base_url = format!("http://{}", config.listen_addr());
        let listen_addr = config.listen_addr();

        let server = GatewayServer::with_gate(config, build_gate(tenant))?;
        let server = tokio::spawn(server.run());
        wait_for_port(&listen_addr).await?;

        Ok(Self {
            base_url,
            host,
            _upstream: upstream,
            server,
        })
    }

    pub async fn shutdown(self) {
        self.server.abort();
        let _ = self.server.await;
    }
}

fn harness_config(upstream_url: &str, port: u16) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port,
        upstream_url: upstream_url.to_string(),
        // the in-memory gate never calls these
        tenant_directory_url: "http://127.0.0.1:9".to_string(),
        user_context_url: "http://127.0.0.1:9".to_string(),
        request_timeout_secs: 5,
        collaborator_timeout_ms: 1000,
        collaborator_max_retries: 0,
        max_body_size_bytes: 1024 * 1024,
        tenant_cache_ttl_secs: 300,
        cache_sweep_interval_secs: 60,
        local_tenant_fallback: None,
        trust_forwarded_host: true,
        session_cookie_name: "session".to_string(),
        session_jwt_algorithm: JwtAlgorithm::HS256,
        session_jwt_secret: Some("bench-session-secret-bench-session".to_string()),
        session_jwt_public_key_path: None,
        session_jwt_issuer: None,
        session_jwt_audience: None,
        context_signing_secret: Some("bench-context-secret-0123456789abcdef".to_string()),
        policy_tables_path: None,
        log_level: "warn".to_string(),
    }
}

fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

async fn wait_for_port(addr: &str) -> Result<()> {
    for _ in 0..20 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("gateway [{}] did not become ready in time", addr)
}

mod error;
pub(crate) mod handler;
mod upstream;

pub use error::ProxyError;
pub use handler::{request_host, GatewayHandler, HEALTH_PATH, REQUEST_ID_HEADER};
pub use upstream::UpstreamClient;

use std::sync::Arc;

use anyhow::Context;
use school_gate_policy::{PolicyEvaluator, PolicyTables};

use crate::cache::TtlCache;
use crate::config::GatewayConfig;
use crate::gate::AccessGate;
use crate::identity::{HttpUserContextProvider, IdentityGate, JwtSessionProvider};
use crate::retry::RetryPolicy;
use crate::signing::ContextSigner;
use crate::tenant::{HttpTenantDirectory, LabelSubdomainStrategy, TenantResolver};

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub gate: Arc<AccessGate>,
    pub upstream_client: Arc<UpstreamClient>,
    pub signer: Option<Arc<ContextSigner>>,
}

impl GatewayState {
    /// Wires the HTTP collaborators named in the configuration.
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let tables = match &config.policy_tables_path {
            Some(path) => PolicyTables::load_from_path(path)
                .with_context(|| format!("Failed to load policy tables from {:?}", path))?,
            None => PolicyTables::builtin(),
        };

        let retry = RetryPolicy::with_retries(config.collaborator_max_retries);

        let directory = Arc::new(HttpTenantDirectory::new(
            config.tenant_directory_url.clone(),
            config.collaborator_timeout(),
            retry,
        )?);
        let resolver = TenantResolver::new(
            Arc::new(LabelSubdomainStrategy::new(config.local_tenant_fallback.clone())),
            directory,
            TtlCache::new(),
            config.tenant_cache_ttl(),
        );

        let sessions = Arc::new(JwtSessionProvider::new(&config)?);
        let contexts = Arc::new(HttpUserContextProvider::new(
            config.user_context_url.clone(),
            config.collaborator_timeout(),
            retry,
        )?);
        let identity = IdentityGate::new(sessions, contexts);

        let gate = AccessGate::new(resolver, identity, Arc::new(PolicyEvaluator::new(tables)));

        Self::with_gate(config, gate)
    }

    /// Uses an already assembled gate, e.g. one backed by in-memory collaborators.
    pub fn with_gate(config: GatewayConfig, gate: AccessGate) -> anyhow::Result<Self> {
        let upstream_client = Arc::new(UpstreamClient::new(
            config.upstream_url.clone(),
            config.request_timeout(),
            config.max_body_size_bytes,
        )?);

        let signer = config
            .context_signing_secret
            .as_deref()
            .map(ContextSigner::new)
            .transpose()
            .context("Invalid CONTEXT_SIGNING_SECRET")?
            .map(Arc::new);

        Ok(Self {
            config: Arc::new(config),
            gate: Arc::new(gate),
            upstream_client,
            signer,
        })
    }
}

use std::sync::Arc;
use std::time::Instant;

use http::HeaderMap;
use school_gate_policy::PolicyEvaluator;
use tracing::{debug, info, instrument, warn};

use crate::decision::{self, Decision, IdentityOutcome, Outcome, TenantOutcome};
use crate::identity::{Authentication, IdentityGate};
use crate::routes::{is_static_asset, is_system_page};
use crate::tenant::TenantResolver;

/// Runs tenant resolution, identity and policy for one request, in that order,
/// stopping at the first terminal outcome.
pub struct AccessGate {
    resolver: TenantResolver,
    identity: IdentityGate,
    evaluator: Arc<PolicyEvaluator>,
}

impl AccessGate {
    pub fn new(resolver: TenantResolver, identity: IdentityGate, evaluator: Arc<PolicyEvaluator>) -> Self {
        Self {
            resolver,
            identity,
            evaluator,
        }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    #[instrument(skip(self, headers), fields(host = %host, path = %path))]
    pub async fn evaluate(&self, host: &str, path: &str, headers: &HeaderMap) -> Decision {
        let start = Instant::now();
        let (decision, tenant_id) = self.run(host, path, headers).await;

        if decision.outcome() == Outcome::DefaultAllowed {
            warn!(
                tenant_id = ?tenant_id,
                default_allow = true,
                "No route rule covers path, allowing by default"
            );
        }

        info!(
            tenant_id = ?tenant_id,
            outcome = %decision.outcome(),
            allowed = decision.is_allow(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Access decision"
        );

        decision
    }

    async fn run(&self, host: &str, path: &str, headers: &HeaderMap) -> (Decision, Option<String>) {
        // assets never cost a directory call; tenant headers only if already cached
        if is_static_asset(path) {
            let tenant = self.resolver.cached(host);
            let tenant_id = tenant.as_ref().map(|t| t.tenant_id.clone());
            return (decision::allow_system_page(tenant.as_deref()), tenant_id);
        }

        let resolved = self.resolver.resolve(host).await;

        if is_system_page(path) {
            let tenant = resolved.ok();
            let tenant_id = tenant.as_ref().map(|t| t.tenant_id.clone());
            return (decision::allow_system_page(tenant.as_deref()), tenant_id);
        }

        let tenant = match resolved {
            Ok(tenant) => tenant,
            Err(e) => {
                debug!(error = %e, "Tenant not resolved");
                return (decision::decide(path, &TenantOutcome::NotFound), None);
            }
        };
        let tenant_id = Some(tenant.tenant_id.clone());

        if !tenant.is_active {
            return (
                decision::decide(path, &TenantOutcome::Inactive(tenant)),
                tenant_id,
            );
        }

        let identity = match self
            .identity
            .authenticate(headers, path, &tenant.tenant_id)
            .await
        {
            Authentication::NotRequired => IdentityOutcome::PublicRoute,
            Authentication::Unauthenticated => IdentityOutcome::Unauthenticated,
            Authentication::UserContextUnavailable => IdentityOutcome::UserContextUnavailable,
            Authentication::Authenticated(user) => {
                let policy = self.evaluator.evaluate(path, &tenant, &user);
                debug!(role = %user.role, policy = ?policy, "Policy evaluated");
                IdentityOutcome::Resolved(user, policy)
            }
        };

        (
            decision::decide(path, &TenantOutcome::Resolved(tenant, identity)),
            tenant_id,
        )
    }
}

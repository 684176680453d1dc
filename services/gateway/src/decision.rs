//! Folds the tenant, identity and policy outcomes of one request into a single
//! [`Decision`].
//!
//! The input types mirror the order the checks run in: an identity outcome only
//! exists for an active tenant, and a policy result only exists for an
//! identified user. [`decide`] is therefore total and pure.

use std::fmt;
use std::sync::Arc;

use school_gate_policy::{PolicyResult, Role, RoleRuleFailure, TenantConfig, UserContext};
use url::form_urlencoded;

pub const TENANT_ID_HEADER: &str = "tenant-id";
pub const TENANT_SUBDOMAIN_HEADER: &str = "tenant-subdomain";
pub const TENANT_NAME_HEADER: &str = "tenant-name";
pub const USER_ROLE_HEADER: &str = "user-role";
pub const USER_PERMISSIONS_HEADER: &str = "user-permissions";
pub const CONTEXT_SIGNATURE_HEADER: &str = "context-signature";

/// Headers only the gateway may set. Inbound copies are dropped.
pub const CONTEXT_HEADERS: &[&str] = &[
    TENANT_ID_HEADER,
    TENANT_SUBDOMAIN_HEADER,
    TENANT_NAME_HEADER,
    USER_ROLE_HEADER,
    USER_PERMISSIONS_HEADER,
    CONTEXT_SIGNATURE_HEADER,
];

pub const TENANT_NOT_FOUND_PATH: &str = "/tenant-not-found";
pub const TENANT_SUSPENDED_PATH: &str = "/tenant-suspended";
pub const LOGIN_PATH: &str = "/login";
pub const USER_NOT_FOUND_PATH: &str = "/user-not-found";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const UPGRADE_PATH: &str = "/upgrade";

#[derive(Debug)]
pub enum TenantOutcome {
    NotFound,
    Inactive(Arc<TenantConfig>),
    Resolved(Arc<TenantConfig>, IdentityOutcome),
}

#[derive(Debug)]
pub enum IdentityOutcome {
    PublicRoute,
    Unauthenticated,
    UserContextUnavailable,
    Resolved(UserContext, PolicyResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    SystemPage,
    PublicRoute,
    Allowed,
    DefaultAllowed,
    TenantNotFound,
    TenantInactive,
    Unauthenticated,
    UserContextUnavailable,
    FeatureGateFailed,
    TierGateFailed,
    MissingFeature,
    RoleMismatch,
    MissingPermission,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::SystemPage => "system_page",
            Outcome::PublicRoute => "public_route",
            Outcome::Allowed => "allowed",
            Outcome::DefaultAllowed => "default_allowed",
            Outcome::TenantNotFound => "tenant_not_found",
            Outcome::TenantInactive => "tenant_inactive",
            Outcome::Unauthenticated => "unauthenticated",
            Outcome::UserContextUnavailable => "user_context_unavailable",
            Outcome::FeatureGateFailed => "feature_gate_failed",
            Outcome::TierGateFailed => "tier_gate_failed",
            Outcome::MissingFeature => "missing_feature",
            Outcome::RoleMismatch => "role_mismatch",
            Outcome::MissingPermission => "missing_permission",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-scoped context forwarded with an allowed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: String,
    pub subdomain: String,
    pub tenant_name: String,
    pub user: Option<UserHeaders>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserHeaders {
    pub role: Role,
    pub permissions: String,
}

impl RequestContext {
    pub fn for_tenant(tenant: &TenantConfig) -> Self {
        Self {
            tenant_id: tenant.tenant_id.clone(),
            subdomain: tenant.subdomain.clone(),
            tenant_name: tenant.display_name.clone(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: &UserContext) -> Self {
        self.user = Some(UserHeaders {
            role: user.role,
            permissions: user.serialized_permissions(),
        });
        self
    }

    /// Header name/value pairs in a fixed order. The display name is
    /// form-urlencoded.
    pub fn header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (TENANT_ID_HEADER, self.tenant_id.clone()),
            (TENANT_SUBDOMAIN_HEADER, self.subdomain.clone()),
            (
                TENANT_NAME_HEADER,
                form_urlencoded::byte_serialize(self.tenant_name.as_bytes()).collect(),
            ),
        ];

        if let Some(user) = &self.user {
            pairs.push((USER_ROLE_HEADER, user.role.as_str().to_string()));
            pairs.push((USER_PERMISSIONS_HEADER, user.permissions.clone()));
        }

        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub query: Option<(&'static str, String)>,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
        }
    }

    pub fn login(original_path: &str) -> Self {
        Self {
            path: LOGIN_PATH.to_string(),
            query: Some(("redirect", original_path.to_string())),
        }
    }

    /// Relative `Location` value with the query value percent-encoded.
    pub fn location(&self) -> String {
        match &self.query {
            Some((key, value)) => {
                let query: String = form_urlencoded::Serializer::new(String::new())
                    .append_pair(key, value)
                    .finish();
                format!("{}?{}", self.path, query)
            }
            None => self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow {
        context: Option<RequestContext>,
        outcome: Outcome,
    },
    Redirect {
        target: Redirect,
        outcome: Outcome,
    },
}

impl Decision {
    pub fn outcome(&self) -> Outcome {
        match self {
            Decision::Allow { outcome, .. } | Decision::Redirect { outcome, .. } => *outcome,
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    fn redirect(target: Redirect, outcome: Outcome) -> Self {
        Decision::Redirect { target, outcome }
    }
}

/// System pages and static assets pass whatever the tenant state, carrying
/// tenant headers when a tenant was found.
pub fn allow_system_page(tenant: Option<&TenantConfig>) -> Decision {
    Decision::Allow {
        context: tenant.map(RequestContext::for_tenant),
        outcome: Outcome::SystemPage,
    }
}

pub fn decide(path: &str, tenant: &TenantOutcome) -> Decision {
    let (tenant, identity) = match tenant {
        TenantOutcome::NotFound => {
            return Decision::redirect(Redirect::to(TENANT_NOT_FOUND_PATH), Outcome::TenantNotFound)
        }
        TenantOutcome::Inactive(_) => {
            return Decision::redirect(Redirect::to(TENANT_SUSPENDED_PATH), Outcome::TenantInactive)
        }
        TenantOutcome::Resolved(tenant, identity) => (tenant, identity),
    };

    let (user, policy) = match identity {
        IdentityOutcome::PublicRoute => {
            return Decision::Allow {
                context: Some(RequestContext::for_tenant(tenant)),
                outcome: Outcome::PublicRoute,
            }
        }
        IdentityOutcome::Unauthenticated => {
            return Decision::redirect(Redirect::login(path), Outcome::Unauthenticated)
        }
        IdentityOutcome::UserContextUnavailable => {
            return Decision::redirect(
                Redirect::to(USER_NOT_FOUND_PATH),
                Outcome::UserContextUnavailable,
            )
        }
        IdentityOutcome::Resolved(user, policy) => (user, policy),
    };

    match policy {
        PolicyResult::Pass { matched_rule } => Decision::Allow {
            context: Some(RequestContext::for_tenant(tenant).with_user(user)),
            outcome: if matched_rule.is_some() {
                Outcome::Allowed
            } else {
                Outcome::DefaultAllowed
            },
        },
        PolicyResult::FeatureGateFailed { .. } => {
            Decision::redirect(Redirect::to(UPGRADE_PATH), Outcome::FeatureGateFailed)
        }
        PolicyResult::TierGateFailed { .. } => {
            Decision::redirect(Redirect::to(UPGRADE_PATH), Outcome::TierGateFailed)
        }
        PolicyResult::RoleRuleFailed(violation) => match violation.failure {
            RoleRuleFailure::MissingFeature => {
                Decision::redirect(Redirect::to(UPGRADE_PATH), Outcome::MissingFeature)
            }
            RoleRuleFailure::RoleMismatch => Decision::redirect(
                Redirect::to(
                    violation
                        .fallback_path
                        .as_deref()
                        .unwrap_or(user.role.default_dashboard()),
                ),
                Outcome::RoleMismatch,
            ),
            RoleRuleFailure::MissingPermission => Decision::redirect(
                Redirect::to(
                    violation
                        .fallback_path
                        .as_deref()
                        .unwrap_or(UNAUTHORIZED_PATH),
                ),
                Outcome::MissingPermission,
            ),
        },
    }
}

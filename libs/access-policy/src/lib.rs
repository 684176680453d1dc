//! School Gate access policy.
//!
//! This crate holds the tenant and user data model shared by the gateway and the
//! [`PolicyEvaluator`], which checks a request path against three independent
//! tables in a fixed order: feature gates, subscription-tier gates and per-role
//! route rules. Everything here is synchronous and free of network I/O; the only
//! side effect is reading an optional table file through
//! [`PolicyTables::load_from_path`].

use thiserror::Error;

pub mod evaluator;
pub mod gates;
pub mod role;
pub mod rules;
pub mod tables;
pub mod tenant;

pub use evaluator::{PolicyEvaluator, PolicyResult, RoleRuleFailure, RoleRuleViolation};
pub use gates::{FeatureGate, TierGate};
pub use role::Role;
pub use rules::{RouteRule, RouteTables, RuleArea};
pub use tables::PolicyTables;
pub use tenant::{SubscriptionTier, TenantConfig, UserContext};

/// Feature name used by the built-in tables for fee and payment pages.
pub const FINANCE_MODULE: &str = "finance-module";
pub const LIBRARY_MODULE: &str = "library-module";
pub const TRANSPORT_MODULE: &str = "transport-module";

/// Errors emitted while parsing model values or loading policy tables.
#[derive(Debug, Error)]
pub enum AccessPolicyError {
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown subscription tier '{0}'")]
    UnknownTier(String),

    #[error("invalid policy tables: {message}")]
    InvalidTables { message: String },

    #[error("failed to read policy tables: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy tables: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AccessPolicyError>;

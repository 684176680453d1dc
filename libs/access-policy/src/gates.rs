use serde::{Deserialize, Serialize};

use crate::{SubscriptionTier, FINANCE_MODULE, LIBRARY_MODULE, TRANSPORT_MODULE};

/// Paths that require a tenant to have `feature` in its enabled modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGate {
    pub feature: String,
    pub path_prefixes: Vec<String>,
}

/// Paths that require a tenant subscription of at least `tier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierGate {
    pub tier: SubscriptionTier,
    pub path_prefixes: Vec<String>,
}

fn prefixes(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

impl FeatureGate {
    pub fn new(feature: impl Into<String>, paths: &[&str]) -> Self {
        Self {
            feature: feature.into(),
            path_prefixes: prefixes(paths),
        }
    }

    pub fn covers(&self, path: &str) -> bool {
        self.path_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn builtin() -> Vec<FeatureGate> {
        vec![
            FeatureGate::new(
                FINANCE_MODULE,
                &["/admin/finance", "/staff/finance", "/student/fees", "/parent/payments"],
            ),
            FeatureGate::new(LIBRARY_MODULE, &["/staff/library", "/student/library"]),
            FeatureGate::new(TRANSPORT_MODULE, &["/admin/transport", "/parent/transport"]),
        ]
    }
}

impl TierGate {
    pub fn new(tier: SubscriptionTier, paths: &[&str]) -> Self {
        Self {
            tier,
            path_prefixes: prefixes(paths),
        }
    }

    pub fn covers(&self, path: &str) -> bool {
        self.path_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn builtin() -> Vec<TierGate> {
        vec![
            TierGate::new(SubscriptionTier::Basic, &["/admin/reports"]),
            TierGate::new(
                SubscriptionTier::Premium,
                &["/admin/analytics", "/staff/analytics"],
            ),
            TierGate::new(
                SubscriptionTier::Enterprise,
                &["/admin/integrations", "/admin/sso"],
            ),
        ]
    }
}

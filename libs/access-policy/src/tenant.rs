use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{AccessPolicyError, Role};

/// Ordered subscription level. Variant order is the entitlement hierarchy, so
/// `Ord` comparisons answer "is this tier at least that one".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionTier {
    Trial,
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub const HIERARCHY: [SubscriptionTier; 4] = [
        SubscriptionTier::Trial,
        SubscriptionTier::Basic,
        SubscriptionTier::Premium,
        SubscriptionTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Trial => "trial",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    /// Returns true when this tier is not ordered below `required`.
    pub fn satisfies(self, required: SubscriptionTier) -> bool {
        self >= required
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = AccessPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trial" => Ok(SubscriptionTier::Trial),
            "basic" => Ok(SubscriptionTier::Basic),
            "premium" => Ok(SubscriptionTier::Premium),
            "enterprise" => Ok(SubscriptionTier::Enterprise),
            _ => Err(AccessPolicyError::UnknownTier(s.to_string())),
        }
    }
}

/// One school as described by the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    pub subdomain: String,
    pub tenant_id: String,
    pub display_name: String,
    pub subscription_tier: SubscriptionTier,
    #[serde(default)]
    pub enabled_modules: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    pub is_active: bool,
}

impl TenantConfig {
    pub fn has_module(&self, module: &str) -> bool {
        self.enabled_modules.contains(module)
    }

    pub fn has_modules<'a, I>(&self, modules: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        modules.into_iter().all(|m| self.enabled_modules.contains(m))
    }
}

/// The acting user within one tenant, as returned by the user context provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_permissions<'a, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        required.into_iter().all(|p| self.permissions.contains(p))
    }

    /// Sorted, comma separated permission list.
    pub fn serialized_permissions(&self) -> String {
        self.permissions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

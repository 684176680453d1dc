use tracing::trace;

use crate::{PolicyTables, Role, RouteRule, RuleArea, SubscriptionTier, TenantConfig, UserContext};

/// Why a matched route rule rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleRuleFailure {
    RoleMismatch,
    MissingPermission,
    MissingFeature,
}

impl RoleRuleFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            RoleRuleFailure::RoleMismatch => "role mismatch",
            RoleRuleFailure::MissingPermission => "missing permission",
            RoleRuleFailure::MissingFeature => "missing feature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRuleViolation {
    pub failure: RoleRuleFailure,
    pub rule_prefix: String,
    pub fallback_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResult {
    /// `matched_rule` is `None` when no route rule covered the path and the
    /// request passed by default.
    Pass { matched_rule: Option<String> },
    FeatureGateFailed { feature: String },
    TierGateFailed { required: SubscriptionTier },
    RoleRuleFailed(RoleRuleViolation),
}

impl PolicyResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, PolicyResult::Pass { .. })
    }
}

/// Evaluates feature gates, then tier gates, then the role's route rules.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    tables: PolicyTables,
}

impl PolicyEvaluator {
    pub fn new(tables: PolicyTables) -> Self {
        Self { tables }
    }

    pub fn builtin() -> Self {
        Self::new(PolicyTables::builtin())
    }

    pub fn evaluate(&self, path: &str, tenant: &TenantConfig, user: &UserContext) -> PolicyResult {
        if let Some(feature) = self.missing_feature(path, tenant) {
            trace!(path, feature, "feature gate failed");
            return PolicyResult::FeatureGateFailed {
                feature: feature.to_string(),
            };
        }

        if let Some(required) = self.missing_tier(path, tenant) {
            trace!(path, required = %required, "tier gate failed");
            return PolicyResult::TierGateFailed { required };
        }

        self.check_route_rules(path, tenant, user)
    }

    /// First gated feature covering `path` that the tenant has not enabled.
    pub fn missing_feature(&self, path: &str, tenant: &TenantConfig) -> Option<&str> {
        self.tables
            .feature_gates
            .iter()
            .find(|gate| gate.covers(path) && !tenant.has_module(&gate.feature))
            .map(|gate| gate.feature.as_str())
    }

    /// First tier gate covering `path` that the tenant's subscription is below.
    pub fn missing_tier(&self, path: &str, tenant: &TenantConfig) -> Option<SubscriptionTier> {
        self.tables
            .tier_gates
            .iter()
            .find(|gate| gate.covers(path) && !tenant.subscription_tier.satisfies(gate.tier))
            .map(|gate| gate.tier)
    }

    /// The rule governing `path` for `role`.
    ///
    /// Each table in the role's area order contributes its first matching rule.
    /// Among those the longest prefix wins; equal lengths go to the earlier table.
    pub fn matching_rule(&self, role: Role, path: &str) -> Option<(RuleArea, &RouteRule)> {
        let mut best: Option<(RuleArea, &RouteRule)> = None;

        for &area in role.rule_areas() {
            let Some(rule) = self.tables.routes.table(area).iter().find(|r| r.matches(path)) else {
                continue;
            };

            match best {
                Some((_, current)) if current.path_prefix.len() >= rule.path_prefix.len() => {}
                _ => best = Some((area, rule)),
            }
        }

        best
    }

    fn check_route_rules(
        &self,
        path: &str,
        tenant: &TenantConfig,
        user: &UserContext,
    ) -> PolicyResult {
        let Some((area, rule)) = self.matching_rule(user.role, path) else {
            return PolicyResult::Pass { matched_rule: None };
        };

        trace!(path, area = %area, rule = %rule.path_prefix, role = %user.role, "route rule matched");

        let failure = if !rule.allows_role(user.role) {
            Some(RoleRuleFailure::RoleMismatch)
        } else if !user.has_permissions(&rule.required_permissions) {
            Some(RoleRuleFailure::MissingPermission)
        } else if !tenant.has_modules(&rule.required_features) {
            Some(RoleRuleFailure::MissingFeature)
        } else {
            None
        };

        match failure {
            Some(failure) => PolicyResult::RoleRuleFailed(RoleRuleViolation {
                failure,
                rule_prefix: rule.path_prefix.clone(),
                fallback_path: rule.fallback_path.clone(),
            }),
            None => PolicyResult::Pass {
                matched_rule: Some(rule.path_prefix.clone()),
            },
        }
    }
}

impl Default for PolicyEvaluator {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RouteTables, FINANCE_MODULE};
    use std::collections::BTreeSet;

    fn tenant(tier: SubscriptionTier, modules: &[&str]) -> TenantConfig {
        TenantConfig {
            subdomain: "harare-primary".to_string(),
            tenant_id: "t-harare".to_string(),
            display_name: "Harare Primary".to_string(),
            subscription_tier: tier,
            enabled_modules: modules.iter().map(|m| m.to_string()).collect(),
            custom_domain: None,
            is_active: true,
        }
    }

    #[test]
    fn feature_gate_runs_before_role_rules() {
        let evaluator = PolicyEvaluator::builtin();
        let user = UserContext::new("u-1", Role::Teacher);

        // a teacher would fail the admin role rule, but the entitlement check comes first
        let result = evaluator.evaluate(
            "/admin/finance/ledger",
            &tenant(SubscriptionTier::Enterprise, &[]),
            &user,
        );
        assert_eq!(
            result,
            PolicyResult::FeatureGateFailed {
                feature: FINANCE_MODULE.to_string()
            }
        );
    }

    #[test]
    fn tier_gate_compares_hierarchy() {
        let evaluator = PolicyEvaluator::builtin();
        let admin = UserContext::new("u-1", Role::SchoolAdmin);

        let result = evaluator.evaluate(
            "/admin/analytics",
            &tenant(SubscriptionTier::Basic, &[]),
            &admin,
        );
        assert_eq!(
            result,
            PolicyResult::TierGateFailed {
                required: SubscriptionTier::Premium
            }
        );

        let result = evaluator.evaluate(
            "/admin/analytics",
            &tenant(SubscriptionTier::Premium, &[]),
            &admin,
        );
        assert!(result.is_pass());
    }

    #[test]
    fn longest_prefix_wins_across_tables() {
        let mut routes = RouteTables::default();
        routes.staff = vec![RouteRule::new("/reports", &[Role::Teacher])];
        routes.admin = vec![RouteRule::new("/reports/finance", &[Role::SchoolAdmin])];
        let evaluator = PolicyEvaluator::new(PolicyTables {
            routes,
            ..PolicyTables::default()
        });

        let (area, rule) = evaluator
            .matching_rule(Role::Teacher, "/reports/finance/q1")
            .unwrap();
        assert_eq!(area, RuleArea::Admin);
        assert_eq!(rule.path_prefix, "/reports/finance");
    }

    #[test]
    fn equal_prefixes_resolve_to_first_declared_table() {
        let mut routes = RouteTables::default();
        routes.staff = vec![RouteRule::new("/shared", &[Role::Teacher])];
        routes.admin = vec![RouteRule::new("/shared", &[Role::SchoolAdmin])];
        let evaluator = PolicyEvaluator::new(PolicyTables {
            routes,
            ..PolicyTables::default()
        });

        let (area, _) = evaluator.matching_rule(Role::Teacher, "/shared").unwrap();
        assert_eq!(area, RuleArea::Staff);
        let (area, _) = evaluator.matching_rule(Role::SchoolAdmin, "/shared").unwrap();
        assert_eq!(area, RuleArea::Admin);
    }

    #[test]
    fn first_rule_in_a_table_wins() {
        let mut routes = RouteTables::default();
        routes.admin = vec![
            RouteRule::new("/admin", &[Role::SchoolAdmin]),
            RouteRule::new("/admin/users", &[Role::SchoolAdmin]).with_permissions(&["users.manage"]),
        ];
        let evaluator = PolicyEvaluator::new(PolicyTables {
            routes,
            ..PolicyTables::default()
        });

        let admin = UserContext::new("u-1", Role::SchoolAdmin);
        let result = evaluator.evaluate("/admin/users", &tenant(SubscriptionTier::Trial, &[]), &admin);
        assert_eq!(
            result,
            PolicyResult::Pass {
                matched_rule: Some("/admin".to_string())
            }
        );
    }

    #[test]
    fn missing_feature_on_rule_is_reported() {
        let mut routes = RouteTables::default();
        routes.staff = vec![RouteRule::new("/staff/timetable", &[Role::Teacher])
            .with_features(&["timetable-module"])
            .with_fallback("/staff")];
        let evaluator = PolicyEvaluator::new(PolicyTables {
            routes,
            ..PolicyTables::default()
        });

        let result = evaluator.evaluate(
            "/staff/timetable",
            &tenant(SubscriptionTier::Trial, &[]),
            &UserContext::new("u-1", Role::Teacher),
        );
        assert_eq!(
            result,
            PolicyResult::RoleRuleFailed(RoleRuleViolation {
                failure: RoleRuleFailure::MissingFeature,
                rule_prefix: "/staff/timetable".to_string(),
                fallback_path: Some("/staff".to_string()),
            })
        );
    }

    #[test]
    fn unmatched_path_passes_by_default() {
        let evaluator = PolicyEvaluator::builtin();
        let user = UserContext {
            user_id: "u-1".to_string(),
            role: Role::Parent,
            permissions: BTreeSet::new(),
        };
        let result = evaluator.evaluate("/calendar", &tenant(SubscriptionTier::Trial, &[]), &user);
        assert_eq!(result, PolicyResult::Pass { matched_rule: None });
    }
}

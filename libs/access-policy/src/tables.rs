use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{AccessPolicyError, FeatureGate, Result, RouteTables, TierGate};

/// The three gating tables, built once at start-up and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTables {
    #[serde(default)]
    pub feature_gates: Vec<FeatureGate>,
    #[serde(default)]
    pub tier_gates: Vec<TierGate>,
    #[serde(default)]
    pub routes: RouteTables,
}

impl PolicyTables {
    pub fn builtin() -> Self {
        Self {
            feature_gates: FeatureGate::builtin(),
            tier_gates: TierGate::builtin(),
            routes: RouteTables::builtin(),
        }
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let tables: PolicyTables = serde_json::from_str(source)?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading policy tables");
        let source = fs::read_to_string(path)?;
        let tables = Self::from_json_str(&source)?;

        info!(
            path = %path.display(),
            feature_gates = tables.feature_gates.len(),
            tier_gates = tables.tier_gates.len(),
            route_rules = tables.routes.iter().count(),
            "loaded policy tables"
        );

        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        for gate in &self.feature_gates {
            if gate.feature.trim().is_empty() {
                return Err(invalid("feature gate with empty feature name"));
            }
            check_prefixes(&gate.path_prefixes, &format!("feature gate '{}'", gate.feature))?;
        }

        for gate in &self.tier_gates {
            check_prefixes(&gate.path_prefixes, &format!("tier gate '{}'", gate.tier))?;
        }

        for (area, rule) in self.routes.iter() {
            check_prefix(&rule.path_prefix, &format!("{} route rule", area))?;
            if rule.allowed_roles.is_empty() {
                return Err(invalid(format!(
                    "{} route rule '{}' allows no roles",
                    area, rule.path_prefix
                )));
            }
            if let Some(fallback) = &rule.fallback_path {
                check_prefix(fallback, &format!("fallback of '{}'", rule.path_prefix))?;
            }
        }

        Ok(())
    }
}

fn check_prefixes(prefixes: &[String], owner: &str) -> Result<()> {
    if prefixes.is_empty() {
        return Err(invalid(format!("{} has no path prefixes", owner)));
    }
    prefixes.iter().try_for_each(|p| check_prefix(p, owner))
}

fn check_prefix(prefix: &str, owner: &str) -> Result<()> {
    if !prefix.starts_with('/') {
        return Err(invalid(format!(
            "{}: path '{}' must start with '/'",
            owner, prefix
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> AccessPolicyError {
    AccessPolicyError::InvalidTables {
        message: message.into(),
    }
}

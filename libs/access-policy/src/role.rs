use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AccessPolicyError, RuleArea};

/// Functional category of the acting user within a tenant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    SchoolAdmin,
    Teacher,
    Staff,
    Registrar,
    Student,
    Parent,
    PlatformAdmin,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SchoolAdmin,
        Role::Teacher,
        Role::Staff,
        Role::Registrar,
        Role::Student,
        Role::Parent,
        Role::PlatformAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SchoolAdmin => "schoolAdmin",
            Role::Teacher => "teacher",
            Role::Staff => "staff",
            Role::Registrar => "registrar",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::PlatformAdmin => "platformAdmin",
        }
    }

    /// Landing page a user is sent back to after a role mismatch.
    pub fn default_dashboard(&self) -> &'static str {
        match self {
            Role::SchoolAdmin => "/admin",
            Role::Teacher | Role::Staff | Role::Registrar => "/staff",
            Role::Student => "/student",
            Role::Parent => "/parent",
            Role::PlatformAdmin => "/platform",
        }
    }

    /// Route tables consulted for this role, home areas first.
    ///
    /// Every role lists every area: a user who wanders into another role's area
    /// must meet that area's rules rather than fall through to default-allow.
    pub fn rule_areas(&self) -> &'static [RuleArea] {
        use RuleArea::*;

        match self {
            Role::SchoolAdmin => &[Admin, Staff, Student, Parent, Platform],
            Role::Teacher | Role::Staff | Role::Registrar => {
                &[Staff, Admin, Student, Parent, Platform]
            }
            Role::Student => &[Student, Admin, Staff, Parent, Platform],
            Role::Parent => &[Parent, Admin, Staff, Student, Platform],
            Role::PlatformAdmin => &[Platform, Admin, Staff, Student, Parent],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessPolicyError;

    /// Accepts the camelCase wire names as well as snake/kebab spellings
    /// (`school_admin`, `platform-admin`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "schooladmin" => Ok(Role::SchoolAdmin),
            "teacher" => Ok(Role::Teacher),
            "staff" => Ok(Role::Staff),
            "registrar" => Ok(Role::Registrar),
            "student" => Ok(Role::Student),
            "parent" => Ok(Role::Parent),
            "platformadmin" => Ok(Role::PlatformAdmin),
            _ => Err(AccessPolicyError::UnknownRole(s.to_string())),
        }
    }
}

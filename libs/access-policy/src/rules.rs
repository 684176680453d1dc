use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{Role, FINANCE_MODULE, LIBRARY_MODULE};

/// Top-level section of the school application a route table guards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum RuleArea {
    Admin,
    Staff,
    Student,
    Parent,
    Platform,
}

impl RuleArea {
    pub const ALL: [RuleArea; 5] = [
        RuleArea::Admin,
        RuleArea::Staff,
        RuleArea::Student,
        RuleArea::Parent,
        RuleArea::Platform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleArea::Admin => "admin",
            RuleArea::Staff => "staff",
            RuleArea::Student => "student",
            RuleArea::Parent => "parent",
            RuleArea::Platform => "platform",
        }
    }
}

impl fmt::Display for RuleArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub path_prefix: String,
    pub allowed_roles: BTreeSet<Role>,
    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
    #[serde(default)]
    pub required_features: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_path: Option<String>,
}

impl RouteRule {
    pub fn new(path_prefix: impl Into<String>, allowed_roles: &[Role]) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            allowed_roles: allowed_roles.iter().copied().collect(),
            required_permissions: BTreeSet::new(),
            required_features: BTreeSet::new(),
            fallback_path: None,
        }
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.required_permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.required_features = features.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_fallback(mut self, path: impl Into<String>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.path_prefix)
    }

    pub fn allows_role(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

/// Ordered route rules per area. Within a table the first matching rule wins, so
/// specific prefixes are declared before their parents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTables {
    #[serde(default)]
    pub admin: Vec<RouteRule>,
    #[serde(default)]
    pub staff: Vec<RouteRule>,
    #[serde(default)]
    pub student: Vec<RouteRule>,
    #[serde(default)]
    pub parent: Vec<RouteRule>,
    #[serde(default)]
    pub platform: Vec<RouteRule>,
}

impl RouteTables {
    pub fn table(&self, area: RuleArea) -> &[RouteRule] {
        match area {
            RuleArea::Admin => &self.admin,
            RuleArea::Staff => &self.staff,
            RuleArea::Student => &self.student,
            RuleArea::Parent => &self.parent,
            RuleArea::Platform => &self.platform,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleArea, &RouteRule)> {
        RuleArea::ALL
            .into_iter()
            .flat_map(move |area| self.table(area).iter().map(move |rule| (area, rule)))
    }

    pub fn builtin() -> Self {
        use Role::*;

        let staff_roles = [Teacher, Staff, Registrar, SchoolAdmin];

        Self {
            admin: vec![
                RouteRule::new("/admin/finance", &[SchoolAdmin])
                    .with_permissions(&["finance.manage"])
                    .with_features(&[FINANCE_MODULE]),
                RouteRule::new("/admin/users", &[SchoolAdmin]).with_permissions(&["users.manage"]),
                RouteRule::new("/admin/settings", &[SchoolAdmin])
                    .with_permissions(&["settings.manage"]),
                RouteRule::new("/admin", &[SchoolAdmin]),
            ],
            staff: vec![
                RouteRule::new("/staff/students", &staff_roles).with_permissions(&["students.read"]),
                RouteRule::new("/staff/grades", &[Teacher, SchoolAdmin])
                    .with_permissions(&["grades.write"]),
                RouteRule::new("/staff/admissions", &[Registrar, SchoolAdmin])
                    .with_permissions(&["admissions.manage"]),
                RouteRule::new("/staff/finance", &[Staff, SchoolAdmin])
                    .with_permissions(&["finance.read"])
                    .with_features(&[FINANCE_MODULE]),
                RouteRule::new("/staff/library", &[Teacher, Staff, SchoolAdmin])
                    .with_features(&[LIBRARY_MODULE]),
                RouteRule::new("/staff", &staff_roles),
            ],
            student: vec![
                RouteRule::new("/student/fees", &[Student]).with_features(&[FINANCE_MODULE]),
                RouteRule::new("/student/library", &[Student]).with_features(&[LIBRARY_MODULE]),
                RouteRule::new("/student", &[Student]),
            ],
            parent: vec![
                RouteRule::new("/parent/payments", &[Parent])
                    .with_permissions(&["payments.make"])
                    .with_features(&[FINANCE_MODULE]),
                RouteRule::new("/parent", &[Parent]),
            ],
            platform: vec![RouteRule::new("/platform", &[PlatformAdmin])],
        }
    }
}

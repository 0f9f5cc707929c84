use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::cron::CronSchedule;
use crate::principal::PrincipalRole;

/// Where a procedure definition originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureSource {
    Filesystem,
    Mcp,
    Admin,
    Cli,
}

impl ProcedureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Mcp => "mcp",
            Self::Admin => "admin",
            Self::Cli => "cli",
        }
    }
}

impl std::fmt::Display for ProcedureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted SQL template: one invokable entry point in the procedure runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub sql_query: String,
    pub original_code: String,
    pub description: Option<String>,
    pub allowed_schemas: Vec<String>,
    pub allowed_tables: Vec<String>,
    pub require_roles: Vec<PrincipalRole>,
    pub is_public: bool,
    pub max_execution_time_seconds: u32,
    pub disable_execution_logs: bool,
    pub schedule: Option<String>,
    pub enabled: bool,
    pub source: ProcedureSource,
    pub version: i64,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Procedure {
    /// Construct a new procedure at version 1, defaulting execution-affecting
    /// fields the way the filesystem loader does for a template with no
    /// annotations.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, sql_query: impl Into<String>) -> Self {
        let now = Utc::now();
        let sql_query = sql_query.into();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            name: name.into(),
            original_code: sql_query.clone(),
            sql_query,
            description: None,
            allowed_schemas: Vec::new(),
            allowed_tables: Vec::new(),
            require_roles: Vec::new(),
            is_public: false,
            max_execution_time_seconds: 30,
            disable_execution_logs: false,
            schedule: None,
            enabled: true,
            source: ProcedureSource::Filesystem,
            version: 1,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Key used to address a procedure independent of its id.
    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }

    /// A procedure is schedulable iff enabled, with a non-empty schedule that
    /// parses under the cron grammar.
    pub fn is_schedulable(&self) -> bool {
        self.enabled
            && self
                .schedule
                .as_deref()
                .map(|s| !s.is_empty() && CronSchedule::new(s).is_ok())
                .unwrap_or(false)
    }

    /// Whether `principal_role` may invoke this procedure.
    pub fn admits_role(&self, role: PrincipalRole) -> bool {
        if role == PrincipalRole::Anon {
            return self.is_public;
        }
        if role == PrincipalRole::ServiceRole || role == PrincipalRole::DashboardAdmin {
            return true;
        }
        self.require_roles.is_empty() || self.require_roles.contains(&role)
    }

    /// Change-detection predicate used by the filesystem sync policy: compares
    /// every field that, if different, should trigger an update and a
    /// reschedule. Identity fields (id, version, timestamps) are excluded.
    pub fn differs_from(&self, other: &Procedure) -> bool {
        self.sql_query != other.sql_query
            || self.original_code != other.original_code
            || self.description != other.description
            || self.max_execution_time_seconds != other.max_execution_time_seconds
            || self.is_public != other.is_public
            || self.disable_execution_logs != other.disable_execution_logs
            || self.require_roles_set() != other.require_roles_set()
            || self.schedule != other.schedule
            || self.allowed_tables_set() != other.allowed_tables_set()
            || self.allowed_schemas_set() != other.allowed_schemas_set()
    }

    fn require_roles_set(&self) -> HashSet<PrincipalRole> {
        self.require_roles.iter().copied().collect()
    }

    fn allowed_tables_set(&self) -> HashSet<&str> {
        self.allowed_tables.iter().map(String::as_str).collect()
    }

    fn allowed_schemas_set(&self) -> HashSet<&str> {
        self.allowed_schemas.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_role_public() {
        let mut p = Procedure::new("default", "get_mine", "SELECT 1");
        p.is_public = true;
        assert!(p.admits_role(PrincipalRole::Anon));
    }

    #[test]
    fn test_admits_role_private_anon_rejected() {
        let p = Procedure::new("default", "get_mine", "SELECT 1");
        assert!(!p.admits_role(PrincipalRole::Anon));
    }

    #[test]
    fn test_admits_role_require_roles() {
        let mut p = Procedure::new("default", "admin_only", "SELECT 1");
        p.require_roles = vec![PrincipalRole::DashboardUser];
        assert!(!p.admits_role(PrincipalRole::Authenticated));
        assert!(p.admits_role(PrincipalRole::DashboardUser));
        assert!(p.admits_role(PrincipalRole::DashboardAdmin));
    }

    #[test]
    fn test_is_schedulable() {
        let mut p = Procedure::new("default", "cleanup", "SELECT 1");
        assert!(!p.is_schedulable());
        p.schedule = Some("*/5 * * * *".to_string());
        assert!(p.is_schedulable());
        p.enabled = false;
        assert!(!p.is_schedulable());
    }

    #[test]
    fn test_differs_from() {
        let p1 = Procedure::new("default", "get_mine", "SELECT 1");
        let mut p2 = p1.clone();
        assert!(!p1.differs_from(&p2));
        p2.sql_query = "SELECT 2".to_string();
        assert!(p1.differs_from(&p2));
    }
}

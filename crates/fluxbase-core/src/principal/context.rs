use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role a principal is granted for the duration of a request.
///
/// This drives both the Postgres role assumed by `SET LOCAL ROLE` in the
/// connection broker and the coarse-grained checks gateway handlers perform
/// before a procedure is even looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalRole {
    /// No credential presented, or an expired/invalid one.
    Anon,
    /// A valid end-user session (access token or API key scoped to a user).
    Authenticated,
    /// The service-role credential: bypasses RLS via `SET LOCAL ROLE` to a
    /// privileged database role.
    ServiceRole,
    /// An operator authenticated against the admin surface with full access.
    DashboardAdmin,
    /// An operator authenticated against the admin surface with read/limited access.
    DashboardUser,
}

impl PrincipalRole {
    /// The Postgres role name this principal role maps to, used by the
    /// connection broker's `SET LOCAL ROLE` statement.
    pub fn postgres_role<'a>(&self, authenticated_role: &'a str, anon_role: &'a str) -> &'a str {
        match self {
            PrincipalRole::Authenticated | PrincipalRole::DashboardAdmin | PrincipalRole::DashboardUser => {
                authenticated_role
            }
            PrincipalRole::Anon => anon_role,
            PrincipalRole::ServiceRole => "service_role",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalRole::Anon => "anon",
            PrincipalRole::Authenticated => "authenticated",
            PrincipalRole::ServiceRole => "service_role",
            PrincipalRole::DashboardAdmin => "dashboard_admin",
            PrincipalRole::DashboardUser => "dashboard_user",
        }
    }
}

/// The resolved identity of a request, produced by the auth middleware and
/// carried through to the connection broker and procedure executor.
#[derive(Debug, Clone)]
pub struct Principal {
    role: PrincipalRole,
    user_id: Option<Uuid>,
    email: Option<String>,
    claims: HashMap<String, serde_json::Value>,
}

impl Principal {
    /// The anonymous principal assigned to unauthenticated requests.
    pub fn anon() -> Self {
        Self {
            role: PrincipalRole::Anon,
            user_id: None,
            email: None,
            claims: HashMap::new(),
        }
    }

    /// The service-role principal, resolved from the `X-Service-Key` header.
    pub fn service_role() -> Self {
        Self {
            role: PrincipalRole::ServiceRole,
            user_id: None,
            email: None,
            claims: HashMap::new(),
        }
    }

    /// An authenticated end-user principal.
    pub fn authenticated(
        user_id: Uuid,
        email: Option<String>,
        claims: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            role: PrincipalRole::Authenticated,
            user_id: Some(user_id),
            email,
            claims,
        }
    }

    /// A dashboard operator principal.
    pub fn dashboard(role: PrincipalRole, user_id: Uuid, email: Option<String>) -> Self {
        debug_assert!(matches!(
            role,
            PrincipalRole::DashboardAdmin | PrincipalRole::DashboardUser
        ));
        Self {
            role,
            user_id: Some(user_id),
            email,
            claims: HashMap::new(),
        }
    }

    pub fn role(&self) -> PrincipalRole {
        self.role
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.role, PrincipalRole::Anon)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Get the user ID, returning an error if not authenticated.
    pub fn require_user_id(&self) -> crate::error::Result<Uuid> {
        self.user_id
            .ok_or_else(|| crate::error::FluxbaseError::Unauthorized("authentication required".into()))
    }

    /// Require that the principal holds one of the given roles.
    pub fn require_role(&self, allowed: &[PrincipalRole]) -> crate::error::Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(crate::error::FluxbaseError::Forbidden(format!(
                "role '{}' is not permitted",
                self.role.as_str()
            )))
        }
    }

    /// Get a custom claim value.
    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.get(key)
    }

    /// All custom claims, serialized for `SET LOCAL fluxbase.claims`.
    pub fn claims(&self) -> &HashMap<String, serde_json::Value> {
        &self.claims
    }

    /// Render the claims a Postgres session needs to see for RLS policies
    /// that read `current_setting('fluxbase.claims', true)::jsonb`.
    pub fn claims_json(&self) -> serde_json::Value {
        let mut map = self.claims.clone();
        if let Some(uid) = self.user_id {
            map.insert("sub".to_string(), serde_json::json!(uid));
        }
        map.insert("role".to_string(), serde_json::json!(self.role.as_str()));
        serde_json::Value::Object(map.into_iter().collect())
    }
}

/// Request metadata available to all request handling paths.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// Unique request ID for tracing, also surfaced as `X-Request-Id`.
    pub request_id: Uuid,
    /// Trace ID for distributed tracing.
    pub trace_id: String,
    /// Client IP address.
    pub client_ip: Option<String>,
    /// User agent string.
    pub user_agent: Option<String>,
    /// Request timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl RequestMetadata {
    /// Create new request metadata.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4().to_string(),
            client_ip: None,
            user_agent: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create with a specific trace ID.
    pub fn with_trace_id(trace_id: String) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            trace_id,
            client_ip: None,
            user_agent: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Context passed to a procedure execution: who is calling, and how the
/// request was observed. The connection/transaction itself is handed to the
/// executor separately by the broker, since its lifetime is scoped to one
/// `acquire` call rather than to the principal.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub principal: Principal,
    pub request: RequestMetadata,
}

impl ExecutionContext {
    pub fn new(principal: Principal, request: RequestMetadata) -> Self {
        Self { principal, request }
    }

    pub fn require_user_id(&self) -> crate::error::Result<Uuid> {
        self.principal.require_user_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anon_principal() {
        let p = Principal::anon();
        assert!(!p.is_authenticated());
        assert!(p.user_id().is_none());
        assert!(p.require_user_id().is_err());
        assert_eq!(p.role(), PrincipalRole::Anon);
    }

    #[test]
    fn test_authenticated_principal() {
        let user_id = Uuid::new_v4();
        let mut claims = HashMap::new();
        claims.insert("org_id".to_string(), serde_json::json!("org-123"));
        let p = Principal::authenticated(user_id, Some("a@example.com".into()), claims);

        assert!(p.is_authenticated());
        assert_eq!(p.user_id(), Some(user_id));
        assert_eq!(p.claim("org_id"), Some(&serde_json::json!("org-123")));
        assert!(p
            .require_role(&[PrincipalRole::Authenticated])
            .is_ok());
        assert!(p.require_role(&[PrincipalRole::ServiceRole]).is_err());
    }

    #[test]
    fn test_service_role_maps_to_privileged_postgres_role() {
        let p = Principal::service_role();
        assert_eq!(p.role().postgres_role("authenticated", "anon"), "service_role");
    }

    #[test]
    fn test_claims_json_includes_role_and_sub() {
        let user_id = Uuid::new_v4();
        let p = Principal::authenticated(user_id, None, HashMap::new());
        let claims = p.claims_json();
        assert_eq!(claims["role"], serde_json::json!("authenticated"));
        assert_eq!(claims["sub"], serde_json::json!(user_id));
    }

    #[test]
    fn test_request_metadata() {
        let meta = RequestMetadata::new();
        assert!(!meta.trace_id.is_empty());
        assert!(meta.client_ip.is_none());

        let meta2 = RequestMetadata::with_trace_id("trace-123".to_string());
        assert_eq!(meta2.trace_id, "trace-123");
    }
}

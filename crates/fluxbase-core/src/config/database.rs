use serde::{Deserialize, Serialize};

/// Database configuration for the connection and transaction broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Primary database connection URL.
    pub url: String,

    /// Maximum connection pool size (`max_connections`).
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Minimum connections the pool keeps warm (`min_connections`).
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,

    /// Maximum lifetime of a pooled connection, in seconds, before it is
    /// recycled regardless of activity.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// Statement timeout in seconds, enforced via `SET LOCAL statement_timeout`.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// Postgres role assumed by authenticated requests before RLS policies apply.
    #[serde(default = "default_authenticated_role")]
    pub authenticated_role: String,

    /// Postgres role assumed by anonymous requests.
    #[serde(default = "default_anon_role")]
    pub anon_role: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: default_pool_size(),
            min_pool_size: default_min_pool_size(),
            max_lifetime_secs: default_max_lifetime(),
            pool_timeout_secs: default_pool_timeout(),
            statement_timeout_secs: default_statement_timeout(),
            authenticated_role: default_authenticated_role(),
            anon_role: default_anon_role(),
        }
    }
}

/// Build a `postgres://` URL from discrete host/port/name/user/password
/// parts, the shape `FLUXBASE_DB_*` environment variables arrive in.
pub fn url_from_parts(host: &str, port: &str, name: &str, user: &str, password: &str) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{name}")
}

fn default_pool_size() -> u32 {
    50
}

fn default_min_pool_size() -> u32 {
    0
}

fn default_max_lifetime() -> u64 {
    30 * 60
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_statement_timeout() -> u64 {
    30
}

fn default_authenticated_role() -> String {
    "authenticated".to_string()
}

fn default_anon_role() -> String {
    "anon".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.pool_size, 50);
        assert_eq!(config.pool_timeout_secs, 30);
        assert_eq!(config.authenticated_role, "authenticated");
    }

    #[test]
    fn test_parse_database_config() {
        let toml = r#"
            url = "postgres://localhost/test"
            pool_size = 100
        "#;

        let config: DatabaseConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool_size, 100);
        assert_eq!(config.url, "postgres://localhost/test");
    }
}

use std::collections::HashSet;

use regex_lite::Regex;
use serde_json::Value;

use crate::error::{FluxbaseError, Result};

/// Caller-context parameter names injected automatically into every compile;
/// a user-supplied value with the same key is allowed to override them.
pub const RESERVED_CALLER_PARAMS: [&str; 3] = ["caller_id", "caller_role", "caller_email"];

/// Statement forms that must never appear in a procedure's SQL template,
/// regardless of the caller's role.
const FORBIDDEN_PATTERNS: [&str; 7] = [
    r"(?i)\bdrop\s+table\b",
    r"(?i)\bdrop\s+schema\b",
    r"(?i)\btruncate\b",
    r"(?i)\balter\s+system\b",
    r"(?i)\bgrant\b",
    r"(?i)\brevoke\b",
    r"(?i)\b(create|alter|drop)\s+role\b",
];

fn placeholder_pattern() -> Regex {
    Regex::new(r"\$([a-zA-Z_][a-zA-Z0-9_]*)").expect("static placeholder pattern is valid")
}

fn identifier_pattern() -> Regex {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static identifier pattern is valid")
}

/// Extracts every `$identifier` placeholder referenced by a SQL template, in
/// first-appearance order without duplicates.
pub fn extract_placeholders(sql: &str) -> Vec<String> {
    let re = placeholder_pattern();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cap in re.captures_iter(sql) {
        let name = cap[1].to_string();
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

/// Validates that every placeholder in `sql` is either present in `params`
/// or is a reserved caller-context name.
pub fn validate_placeholders(sql: &str, params: &serde_json::Map<String, Value>) -> Result<()> {
    for name in extract_placeholders(sql) {
        if !params.contains_key(&name) && !RESERVED_CALLER_PARAMS.contains(&name.as_str()) {
            return Err(FluxbaseError::Validation(format!(
                "placeholder '${name}' has no matching parameter"
            )));
        }
    }
    Ok(())
}

/// Rejects SQL templates that attempt forbidden statement forms.
pub fn validate_forbidden_statements(sql: &str) -> Result<()> {
    for pattern in FORBIDDEN_PATTERNS {
        let re = Regex::new(pattern).expect("static forbidden pattern is valid");
        if re.is_match(sql) {
            return Err(FluxbaseError::Validation(
                "SQL template uses a forbidden statement form".to_string(),
            ));
        }
    }
    Ok(())
}

/// Conservative table/schema allowlist check: when a procedure declares a
/// non-empty allowlist, every `FROM`/`JOIN`/`INTO`/`UPDATE` target named in
/// the template must intersect it. No SQL parser is involved; this is a
/// best-effort scan, matching the core's explicit non-goal of not hosting a
/// query planner.
pub fn validate_allowlist(sql: &str, allowed_schemas: &[String], allowed_tables: &[String]) -> Result<()> {
    if allowed_schemas.is_empty() && allowed_tables.is_empty() {
        return Ok(());
    }

    let re = Regex::new(r"(?i)\b(?:from|join|into|update)\s+([a-zA-Z_][a-zA-Z0-9_.]*)")
        .expect("static reference pattern is valid");

    for cap in re.captures_iter(sql) {
        let reference = &cap[1];
        let (schema, table) = match reference.split_once('.') {
            Some((s, t)) => (Some(s), t),
            None => (None, reference),
        };

        if let Some(schema) = schema {
            if !allowed_schemas.is_empty() && !allowed_schemas.iter().any(|s| s == schema) {
                return Err(FluxbaseError::Validation(format!(
                    "schema '{schema}' is not in the procedure's allowed_schemas"
                )));
            }
        }

        if !allowed_tables.is_empty() && !allowed_tables.iter().any(|t| t == table) {
            return Err(FluxbaseError::Validation(format!(
                "table '{table}' is not in the procedure's allowed_tables"
            )));
        }
    }

    Ok(())
}

/// Confirms a string is safe to use as an unquoted SQL identifier reference.
/// The validator rejects any input that would otherwise force identifier
/// interpolation from user-controlled data.
pub fn is_safe_identifier(ident: &str) -> bool {
    identifier_pattern().is_match(ident)
}

/// Runs every static check against a procedure's SQL template ahead of
/// persistence or execution.
pub fn validate_template(
    sql: &str,
    params: &serde_json::Map<String, Value>,
    allowed_schemas: &[String],
    allowed_tables: &[String],
) -> Result<()> {
    validate_forbidden_statements(sql)?;
    validate_placeholders(sql, params)?;
    validate_allowlist(sql, allowed_schemas, allowed_tables)?;
    Ok(())
}

/// Runs [`validate_template`] at ingest time (admin upsert / filesystem sync),
/// before the caller-supplied parameters for any individual call are known.
/// Placeholder presence can't be checked against real values yet, so every
/// placeholder the template itself references is treated as satisfied; this
/// still catches forbidden statements and allowlist violations at write time
/// rather than deferring them to first execution.
pub fn validate_template_for_ingest(sql: &str, allowed_schemas: &[String], allowed_tables: &[String]) -> Result<()> {
    let params: serde_json::Map<String, Value> = extract_placeholders(sql)
        .into_iter()
        .map(|name| (name, Value::Null))
        .collect();
    validate_template(sql, &params, allowed_schemas, allowed_tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_placeholders_dedups_in_order() {
        let placeholders = extract_placeholders("SELECT * FROM items WHERE owner = $caller_id AND name = $name OR owner = $caller_id");
        assert_eq!(placeholders, vec!["caller_id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_validate_placeholders_reserved_ok_without_params() {
        let params = serde_json::Map::new();
        assert!(validate_placeholders("SELECT * FROM items WHERE owner = $caller_id", &params).is_ok());
    }

    #[test]
    fn test_validate_placeholders_missing_param_rejected() {
        let params = serde_json::Map::new();
        let err = validate_placeholders("SELECT * FROM items WHERE name = $name", &params);
        assert!(err.is_err());
    }

    #[test]
    fn test_validate_placeholders_user_supplied_present() {
        let mut params = serde_json::Map::new();
        params.insert("name".to_string(), json!("alice"));
        assert!(validate_placeholders("SELECT * FROM items WHERE name = $name", &params).is_ok());
    }

    #[test]
    fn test_forbidden_statement_rejected() {
        assert!(validate_forbidden_statements("DROP TABLE users").is_err());
        assert!(validate_forbidden_statements("TRUNCATE items").is_err());
        assert!(validate_forbidden_statements("GRANT ALL ON users TO anon").is_err());
        assert!(validate_forbidden_statements("SELECT * FROM users").is_ok());
    }

    #[test]
    fn test_allowlist_rejects_unlisted_table() {
        let allowed = vec!["items".to_string()];
        assert!(validate_allowlist("SELECT * FROM users", &[], &allowed).is_err());
        assert!(validate_allowlist("SELECT * FROM items", &[], &allowed).is_ok());
    }

    #[test]
    fn test_allowlist_empty_is_unrestricted() {
        assert!(validate_allowlist("SELECT * FROM anything", &[], &[]).is_ok());
    }

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("items"));
        assert!(!is_safe_identifier("items; DROP TABLE users"));
        assert!(!is_safe_identifier("1items"));
    }

    #[test]
    fn test_validate_template_for_ingest_accepts_unfilled_placeholders() {
        // $name has no caller-supplied value at ingest time, unlike at
        // execution; that's fine, it's checked against real params later.
        assert!(validate_template_for_ingest("SELECT * FROM items WHERE name = $name", &[], &[]).is_ok());
    }

    #[test]
    fn test_validate_template_for_ingest_rejects_forbidden_statement() {
        assert!(validate_template_for_ingest("DROP TABLE users", &[], &[]).is_err());
    }

    #[test]
    fn test_validate_template_for_ingest_enforces_allowlist() {
        let allowed = vec!["items".to_string()];
        assert!(validate_template_for_ingest("SELECT * FROM users", &[], &allowed).is_err());
        assert!(validate_template_for_ingest("SELECT * FROM items", &[], &allowed).is_ok());
    }
}

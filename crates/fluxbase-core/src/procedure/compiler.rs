use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::error::{FluxbaseError, Result};

use super::validator::extract_placeholders;

/// Escapes a string for use as a single-quoted SQL literal by doubling every
/// embedded single quote.
fn escape_text(s: &str) -> String {
    s.replace('\'', "''")
}

/// Quotes an identifier with double quotes, doubling any embedded double
/// quote. Used by the schema inspector, never by template compilation
/// (templates never interpolate identifiers from user input).
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn is_numeric_string(s: &str) -> bool {
    !s.is_empty() && s.parse::<f64>().is_ok()
}

fn is_number_value(v: &Value) -> bool {
    v.is_number() || v.as_str().is_some_and(is_numeric_string)
}

/// Converts one JSON value into its literal SQL representation per the
/// compiler's formatting contract: every textual emission is wrapped in
/// single quotes with embedded quotes doubled, and no identifier is ever
/// interpolated from this path.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) if is_numeric_string(s) => s.clone(),
        Value::String(s) => format!("'{}'", escape_text(s)),
        Value::Array(items) => {
            if !items.is_empty() && items.iter().all(is_number_value) {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                format!("'[{}]'::vector", rendered.join(","))
            } else {
                let rendered: Vec<String> = items.iter().map(format_value).collect();
                format!("ARRAY[{}]", rendered.join(","))
            }
        }
        Value::Object(_) => {
            format!("'{}'::jsonb", escape_text(&value.to_string()))
        }
    }
}

/// Merges caller-context parameters with user-supplied parameters: caller
/// context values are injected for the reserved names, but an explicit
/// user-supplied value with the same key takes precedence.
pub fn merge_params(caller_context: &Map<String, Value>, user_params: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = caller_context.clone();
    for (k, v) in user_params {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Compiles a SQL template by substituting every `$placeholder` with its
/// formatted literal. Deterministic: the same template and parameter map
/// always produce byte-identical SQL.
pub fn compile(sql_template: &str, params: &Map<String, Value>) -> Result<String> {
    let placeholder_re = Regex::new(r"\$([a-zA-Z_][a-zA-Z0-9_]*)").expect("static pattern is valid");
    let mut missing = None;

    let compiled = placeholder_re.replace_all(sql_template, |caps: &regex_lite::Captures| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => format_value(value),
            None => {
                missing = Some(name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(FluxbaseError::Validation(format!(
            "placeholder '${name}' has no matching parameter"
        )));
    }

    Ok(compiled.into_owned())
}

/// Compiles a template, merging caller-context parameters under the same
/// precedence rules used for validation.
pub fn compile_with_caller(
    sql_template: &str,
    user_params: &Map<String, Value>,
    caller_context: &Map<String, Value>,
) -> Result<String> {
    let merged = merge_params(caller_context, user_params);
    compile(sql_template, &merged)
}

/// Returns the set of caller-context parameter keys a template actually
/// references, so the executor can skip building unused claims.
pub fn referenced_caller_params(sql: &str) -> Vec<String> {
    extract_placeholders(sql)
        .into_iter()
        .filter(|p| super::validator::RESERVED_CALLER_PARAMS.contains(&p.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value_null_and_bool() {
        assert_eq!(format_value(&Value::Null), "NULL");
        assert_eq!(format_value(&json!(true)), "TRUE");
        assert_eq!(format_value(&json!(false)), "FALSE");
    }

    #[test]
    fn test_format_value_numeric() {
        assert_eq!(format_value(&json!(42)), "42");
        assert_eq!(format_value(&json!(3.5)), "3.5");
        assert_eq!(format_value(&json!("42")), "42");
    }

    #[test]
    fn test_format_value_text_escapes_quotes() {
        assert_eq!(format_value(&json!("it's")), "'it''s'");
    }

    #[test]
    fn test_format_value_numeric_array_becomes_vector() {
        assert_eq!(format_value(&json!([1, 2, 3])), "'[1,2,3]'::vector");
    }

    #[test]
    fn test_format_value_heterogeneous_array_becomes_array() {
        assert_eq!(format_value(&json!([1, "a"])), "ARRAY[1,'a']");
    }

    #[test]
    fn test_format_value_object_becomes_jsonb() {
        let rendered = format_value(&json!({"k": "v"}));
        assert!(rendered.starts_with('\''));
        assert!(rendered.ends_with("'::jsonb"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let mut params = Map::new();
        params.insert("name".to_string(), json!("alice"));
        let sql = "SELECT * FROM items WHERE name = $name";

        let a = compile(sql, &params).unwrap();
        let b = compile(sql, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "SELECT * FROM items WHERE name = 'alice'");
    }

    #[test]
    fn test_compile_sql_injection_attempt_is_inert() {
        let mut params = Map::new();
        params.insert("name".to_string(), json!("'; DROP TABLE users; --"));
        let compiled = compile("SELECT * FROM users WHERE name = $name", &params).unwrap();
        assert_eq!(
            compiled,
            "SELECT * FROM users WHERE name = '''; DROP TABLE users; --'"
        );
    }

    #[test]
    fn test_compile_missing_placeholder_errors() {
        let params = Map::new();
        assert!(compile("SELECT * FROM items WHERE name = $name", &params).is_err());
    }

    #[test]
    fn test_merge_params_user_overrides_caller_context() {
        let mut caller = Map::new();
        caller.insert("caller_id".to_string(), json!("system"));
        let mut user = Map::new();
        user.insert("caller_id".to_string(), json!("explicit"));

        let merged = merge_params(&caller, &user);
        assert_eq!(merged["caller_id"], json!("explicit"));
    }

    #[test]
    fn test_quote_identifier_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }
}

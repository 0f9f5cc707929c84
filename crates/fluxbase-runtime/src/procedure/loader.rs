//! Filesystem ingest: recursively scans a directory of `.sql` files, treating
//! the first subdirectory level under the root as the namespace, and parses
//! leading `--`-comment annotations into `Procedure` metadata.

use std::path::{Path, PathBuf};

use fluxbase_core::error::Result;
use fluxbase_core::principal::PrincipalRole;
use fluxbase_core::procedure::{validate_template_for_ingest, Procedure, ProcedureSource};

use super::store::ProcedureStore;

/// Outcome of one sync pass.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct SyncReport {
    pub inserted: Vec<(String, String)>,
    pub updated: Vec<(String, String)>,
    pub deleted: Vec<(String, String)>,
    pub unchanged: usize,
}

/// Parse a single `.sql` file into a `Procedure` template. `namespace` is the
/// file's first path component under the scan root; `name` is the file stem.
pub fn parse_procedure_file(namespace: &str, name: &str, contents: &str) -> Procedure {
    let mut procedure = Procedure::new(namespace, name, "");
    procedure.source = ProcedureSource::Filesystem;
    procedure.original_code = contents.to_string();

    let mut body_lines = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim_start();
        if let Some(annotation) = trimmed.strip_prefix("--").map(str::trim_start) {
            if apply_annotation(&mut procedure, annotation) {
                continue;
            }
        }
        body_lines.push(line);
    }

    procedure.sql_query = body_lines.join("\n").trim().to_string();
    procedure
}

/// Returns `true` iff `line` was a recognized `@annotation` and consumed.
fn apply_annotation(procedure: &mut Procedure, line: &str) -> bool {
    let Some((key, value)) = line.split_once(char::is_whitespace) else {
        return false;
    };
    let value = value.trim();

    match key {
        "@name" => procedure.name = value.to_string(),
        "@description" => procedure.description = Some(value.to_string()),
        "@public" => procedure.is_public = parse_bool(value),
        "@require_roles" => {
            procedure.require_roles = value
                .split(',')
                .filter_map(|r| parse_role(r.trim()))
                .collect();
        }
        "@allowed_tables" => {
            procedure.allowed_tables = value.split(',').map(|t| t.trim().to_string()).collect();
        }
        "@allowed_schemas" => {
            procedure.allowed_schemas = value.split(',').map(|s| s.trim().to_string()).collect();
        }
        "@schedule" => procedure.schedule = Some(value.to_string()),
        "@max_execution_time" => {
            if let Ok(secs) = value.parse::<u32>() {
                procedure.max_execution_time_seconds = secs;
            }
        }
        _ => return false,
    }
    true
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_role(role: &str) -> Option<PrincipalRole> {
    match role {
        "anon" => Some(PrincipalRole::Anon),
        "authenticated" => Some(PrincipalRole::Authenticated),
        "service_role" => Some(PrincipalRole::ServiceRole),
        "dashboard_admin" => Some(PrincipalRole::DashboardAdmin),
        "dashboard_user" => Some(PrincipalRole::DashboardUser),
        _ => None,
    }
}

/// Recursively scan `root` for `.sql` files and parse each into a `Procedure`,
/// using the first path component under `root` as the namespace.
pub fn scan_directory(root: &Path) -> Result<Vec<Procedure>> {
    let mut procedures = Vec::new();
    scan_directory_inner(root, root, &mut procedures)?;
    Ok(procedures)
}

fn scan_directory_inner(root: &Path, dir: &Path, out: &mut Vec<Procedure>) -> Result<()> {
    let entries = std::fs::read_dir(dir)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_directory_inner(root, &path, out)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            continue;
        }

        let namespace = namespace_for(root, &path);
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed")
            .to_string();
        let contents = std::fs::read_to_string(&path)?;

        out.push(parse_procedure_file(&namespace, &name, &contents));
    }
    Ok(())
}

fn namespace_for(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .ok()
        .and_then(|rel| rel.components().next())
        .and_then(|c| c.as_os_str().to_str())
        .unwrap_or("default")
        .to_string()
}

/// Synchronize a directory snapshot against the persisted set in the store.
///
/// `keep` controls the fate of procedures present in storage but absent from
/// the directory: `true` retains them, `false` deletes them.
pub async fn sync_from_directory(store: &ProcedureStore, root: &Path, keep: bool) -> Result<SyncReport> {
    let scanned = scan_directory(root)?;
    sync_procedures(store, scanned, keep).await
}

async fn sync_procedures(store: &ProcedureStore, scanned: Vec<Procedure>, keep: bool) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let mut seen = std::collections::HashSet::new();

    for mut incoming in scanned {
        seen.insert(incoming.key());
        match store.get(&incoming.namespace, &incoming.name).await {
            Some(existing) => {
                if existing.differs_from(&incoming) {
                    incoming.id = existing.id;
                    incoming.version = existing.version + 1;
                    incoming.created_by = existing.created_by;
                    incoming.created_at = existing.created_at;
                    incoming.updated_at = chrono::Utc::now();
                    validate_template_for_ingest(&incoming.sql_query, &incoming.allowed_schemas, &incoming.allowed_tables)?;
                    store.upsert(incoming.clone()).await?;
                    report.updated.push(incoming.key());
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                validate_template_for_ingest(&incoming.sql_query, &incoming.allowed_schemas, &incoming.allowed_tables)?;
                store.upsert(incoming.clone()).await?;
                report.inserted.push(incoming.key());
            }
        }
    }

    if !keep {
        for existing in store.snapshot().await {
            if !seen.contains(&existing.key()) && existing.source == ProcedureSource::Filesystem {
                store.remove(&existing.namespace, &existing.name).await?;
                report.deleted.push(existing.key());
            }
        }
    }

    Ok(report)
}

/// Convenience wrapper bundling a scan root with the store it syncs into.
pub struct FilesystemLoader {
    pub root: PathBuf,
    pub keep: bool,
}

impl FilesystemLoader {
    pub fn new(root: impl Into<PathBuf>, keep: bool) -> Self {
        Self { root: root.into(), keep }
    }

    pub async fn sync(&self, store: &ProcedureStore) -> Result<SyncReport> {
        sync_from_directory(store, &self.root, self.keep).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_annotations() {
        let contents = "-- @name get_mine\n-- @description Get my items\n-- @public true\n-- @require_roles authenticated, dashboard_admin\n-- @max_execution_time 5\nSELECT * FROM items WHERE owner = $caller_id\n";
        let procedure = parse_procedure_file("default", "file_stem", contents);

        assert_eq!(procedure.name, "get_mine");
        assert_eq!(procedure.description.as_deref(), Some("Get my items"));
        assert!(procedure.is_public);
        assert_eq!(
            procedure.require_roles,
            vec![PrincipalRole::Authenticated, PrincipalRole::DashboardAdmin]
        );
        assert_eq!(procedure.max_execution_time_seconds, 5);
        assert_eq!(procedure.sql_query, "SELECT * FROM items WHERE owner = $caller_id");
    }

    #[test]
    fn body_excludes_annotation_lines_only() {
        let contents = "-- not an annotation, a regular comment\nSELECT 1\n";
        let procedure = parse_procedure_file("default", "x", contents);
        assert!(procedure.sql_query.contains("SELECT 1"));
        assert!(procedure.sql_query.contains("not an annotation"));
    }

    #[test]
    fn namespace_is_first_path_component() {
        let root = Path::new("/procedures");
        let file = Path::new("/procedures/billing/charge_card.sql");
        assert_eq!(namespace_for(root, file), "billing");
    }
}

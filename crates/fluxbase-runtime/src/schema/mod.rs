//! Read-only schema introspection for the admin HTTP surface.
//!
//! Queries `information_schema` directly rather than parsing anything —
//! schema and table names are always bound parameters, never interpolated,
//! with `is_safe_identifier` as a defense-in-depth check before the query is
//! even issued.

mod inspector;

pub use inspector::{ColumnInfo, ForeignKeyInfo, SchemaInspector, TableInfo};

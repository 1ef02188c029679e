//! Database Migrations - PostgreSQL schema for the document store
//!
//! One row per top-level key; the row holds that key's whole subtree as
//! JSONB. The table name is configurable, so migrations are rendered per
//! table.

/// SQL migration creating the document table
const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    key         TEXT PRIMARY KEY,
    value       JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at  TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);
"#;

/// SQL migration adding an index for "recently written" housekeeping queries
const MIGRATION_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at);
"#;

/// Name of the table tracking applied migrations for `table`
pub fn tracking_table(table: &str) -> String {
    format!("{}_migrations", table)
}

/// Get all migrations in order, rendered for `table`
pub fn get_migrations(table: &str) -> Vec<(String, String)> {
    [("v1_documents", MIGRATION_V1), ("v2_updated_at_index", MIGRATION_V2)]
        .into_iter()
        .map(|(name, sql)| (format!("{}_{}", table, name), sql.replace("{table}", table)))
        .collect()
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn is_valid_table_name(table: &str) -> bool {
    let mut chars = table.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    table.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_rendered_for_table() {
        let migrations = get_migrations("leveling_documents");
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].0, "leveling_documents_v1_documents");
        assert!(migrations[0].1.contains("CREATE TABLE IF NOT EXISTS leveling_documents ("));
        assert!(migrations[1].1.contains("idx_leveling_documents_updated_at"));
        assert!(!migrations.iter().any(|(_, sql)| sql.contains("{table}")));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("leveling_documents"));
        assert!(is_valid_table_name("_t1"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("1table"));
        assert!(!is_valid_table_name("docs; DROP TABLE x"));
        assert!(!is_valid_table_name("a-b"));
    }
}

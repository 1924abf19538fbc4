//! SQLite DDL for the schema snapshots, the custom-object catalog and the
//! audit tables written by a run.

use rusqlite::Connection;

use crate::errors::AuditResult;

/// Current audit-table version, recorded in `audit_meta`.
pub const AUDIT_SCHEMA_VERSION: i32 = 1;

/// Attached name of the old snapshot.
pub const LEGACY_SCHEMA: &str = "legacy";

/// Snapshot tables, present in both the new catalog (`main`) and the old
/// snapshot (`legacy`). `{schema}` is replaced with the target schema name.
pub const SNAPSHOT_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS {schema}.recdefn (
        recname TEXT PRIMARY KEY,
        rectype INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS {schema}.recfield (
        recname TEXT NOT NULL,
        fieldname TEXT NOT NULL,
        fieldnum INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY(recname, fieldname)
    );",
    "CREATE TABLE IF NOT EXISTS {schema}.dbfield (
        fieldname TEXT PRIMARY KEY,
        fieldtype INTEGER NOT NULL,
        length INTEGER NOT NULL DEFAULT 0
    );",
];

/// Tables that live only in the new catalog.
pub const CATALOG_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS upgrade_actions (
        recname TEXT NOT NULL,
        fieldname TEXT NOT NULL DEFAULT ' ',
        action TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS rename_audit (
        entity_type TEXT NOT NULL CHECK(entity_type IN ('R', 'F')),
        recname TEXT NOT NULL DEFAULT ' ',
        old_name TEXT NOT NULL,
        new_name TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS project_items (
        project_name TEXT NOT NULL,
        object_type INTEGER NOT NULL,
        object_value1 TEXT NOT NULL,
        object_value2 TEXT NOT NULL DEFAULT ' '
    );",
    "CREATE TABLE IF NOT EXISTS sql_definitions (
        sql_id TEXT NOT NULL,
        sql_type INTEGER NOT NULL DEFAULT 0,
        sql_text TEXT NOT NULL,
        PRIMARY KEY(sql_id, sql_type)
    );",
    "CREATE TABLE IF NOT EXISTS program_units (
        object_type INTEGER NOT NULL,
        object_name TEXT NOT NULL,
        event_name TEXT NOT NULL DEFAULT ' ',
        package_name TEXT NOT NULL DEFAULT ' ',
        method_name TEXT NOT NULL DEFAULT ' ',
        program_text TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS query_records (
        oprid TEXT NOT NULL DEFAULT ' ',
        qryname TEXT NOT NULL,
        recname TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS query_fields (
        oprid TEXT NOT NULL DEFAULT ' ',
        qryname TEXT NOT NULL,
        recname TEXT NOT NULL,
        fieldname TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_project_items_lookup \
     ON project_items(project_name, object_type, object_value1);",
    "CREATE INDEX IF NOT EXISTS idx_rename_audit_type \
     ON rename_audit(entity_type, recname, old_name);",
];

/// Audit tables, created idempotently at the start of every run.
pub const AUDIT_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS audit_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS upgrade_audit (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        report_id TEXT NOT NULL,
        change_type TEXT NOT NULL,
        artifact_kind TEXT NOT NULL,
        artifact_ref TEXT NOT NULL,
        line_number INTEGER,
        excerpt TEXT,
        recorded_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS upgrade_totals (
        change_type TEXT PRIMARY KEY,
        pcode_objects INTEGER NOT NULL DEFAULT 0,
        sql_objects INTEGER NOT NULL DEFAULT 0,
        query_objects INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE INDEX IF NOT EXISTS idx_upgrade_audit_type_kind \
     ON upgrade_audit(change_type, artifact_kind, artifact_ref);",
];

/// Tables a run reads from each snapshot.
pub const REQUIRED_SNAPSHOT_TABLES: &[&str] = &["recdefn", "recfield", "dbfield"];

/// Tables a run reads from the new catalog only.
pub const REQUIRED_CATALOG_TABLES: &[&str] = &[
    "upgrade_actions",
    "rename_audit",
    "project_items",
    "sql_definitions",
    "program_units",
    "query_records",
    "query_fields",
];

/// Create the snapshot tables inside `schema` (`main` or an attached name).
pub fn create_snapshot_tables(conn: &Connection, schema: &str) -> AuditResult<()> {
    for stmt in SNAPSHOT_STATEMENTS {
        conn.execute_batch(&stmt.replace("{schema}", schema))?;
    }
    Ok(())
}

pub fn create_catalog_tables(conn: &Connection) -> AuditResult<()> {
    for stmt in CATALOG_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}

/// Create the audit tables and stamp the audit schema version.
pub fn ensure_audit_schema(conn: &Connection) -> AuditResult<()> {
    for stmt in AUDIT_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    conn.execute(
        "INSERT INTO audit_meta(key, value) VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![AUDIT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Names from `tables` that do not exist in `schema`.
pub fn missing_tables(conn: &Connection, schema: &str, tables: &[&str]) -> AuditResult<Vec<String>> {
    let sql = format!("SELECT 1 FROM {schema}.sqlite_master WHERE type = 'table' AND name = ?1;");
    let mut stmt = conn.prepare(&sql)?;
    let mut missing = Vec::new();
    for table in tables {
        if !stmt.exists(rusqlite::params![table])? {
            missing.push(format!("{schema}.{table}"));
        }
    }
    Ok(missing)
}

/// Read the audit schema version. Returns 0 when absent or unparseable.
pub fn audit_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM audit_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

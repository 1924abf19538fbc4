//! SQLite handle over the new catalog with the old snapshot attached.
//!
//! A run holds exactly one connection for its whole duration; every detector,
//! searcher and ledger write goes through it.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::debug;

use crate::errors::{AuditError, AuditResult};
use crate::store::schema;

// ---------------------------------------------------------------------------
// Helper: path resolution
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

/// Expand `~` and make the path absolute against the working directory.
pub fn resolve_path(path: &Path) -> AuditResult<PathBuf> {
    let expanded = expand_tilde(&path.to_string_lossy());
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}

// ---------------------------------------------------------------------------
// AuditDatabase
// ---------------------------------------------------------------------------

pub struct AuditDatabase {
    conn: Connection,
    catalog_path: Option<PathBuf>,
}

impl AuditDatabase {
    /// Open an existing catalog and attach the old snapshot as `legacy`.
    ///
    /// Missing files or missing tables are connectivity failures: the run
    /// cannot start without both snapshots.
    pub fn open(catalog_path: &Path, legacy_path: &Path) -> AuditResult<Self> {
        let catalog = resolve_path(catalog_path)?;
        let legacy = resolve_path(legacy_path)?;
        for path in [&catalog, &legacy] {
            if !path.is_file() {
                return Err(AuditError::Connectivity(format!(
                    "catalog not found: {}",
                    path.display()
                )));
            }
        }

        let conn = Connection::open(&catalog)
            .map_err(|e| AuditError::Connectivity(format!("{}: {e}", catalog.display())))?;
        attach_legacy(&conn, &legacy.to_string_lossy())?;

        let db = Self {
            conn,
            catalog_path: Some(catalog),
        };
        db.verify_tables()?;
        let found = schema::audit_schema_version(&db.conn);
        if found > schema::AUDIT_SCHEMA_VERSION {
            return Err(AuditError::Connectivity(format!(
                "audit schema version {found} is newer than supported version {}",
                schema::AUDIT_SCHEMA_VERSION
            )));
        }
        schema::ensure_audit_schema(&db.conn)?;
        debug!(catalog = %db.describe(), "catalog opened");
        Ok(db)
    }

    /// Create (or extend) empty catalogs at both paths with every table a run
    /// reads and writes.
    pub fn provision(catalog_path: &Path, legacy_path: &Path) -> AuditResult<Self> {
        let catalog = resolve_path(catalog_path)?;
        let legacy = resolve_path(legacy_path)?;
        for path in [&catalog, &legacy] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&catalog)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        attach_legacy(&conn, &legacy.to_string_lossy())?;
        Self::provision_connection(&conn)?;
        Ok(Self {
            conn,
            catalog_path: Some(catalog),
        })
    }

    /// Both snapshots in memory, fully provisioned.
    pub fn open_in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()?;
        attach_legacy(&conn, ":memory:")?;
        Self::provision_connection(&conn)?;
        Ok(Self {
            conn,
            catalog_path: None,
        })
    }

    fn provision_connection(conn: &Connection) -> AuditResult<()> {
        schema::create_snapshot_tables(conn, "main")?;
        schema::create_snapshot_tables(conn, schema::LEGACY_SCHEMA)?;
        schema::create_catalog_tables(conn)?;
        schema::ensure_audit_schema(conn)?;
        Ok(())
    }

    fn verify_tables(&self) -> AuditResult<()> {
        let mut missing =
            schema::missing_tables(&self.conn, "main", schema::REQUIRED_SNAPSHOT_TABLES)?;
        missing.extend(schema::missing_tables(
            &self.conn,
            schema::LEGACY_SCHEMA,
            schema::REQUIRED_SNAPSHOT_TABLES,
        )?);
        missing.extend(schema::missing_tables(
            &self.conn,
            "main",
            schema::REQUIRED_CATALOG_TABLES,
        )?);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuditError::Connectivity(format!(
                "required tables missing: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn describe(&self) -> String {
        self.catalog_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    // -----------------------------------------------------------------------
    // Meta
    // -----------------------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> AuditResult<Option<String>> {
        let result: Result<String, _> = self.conn.query_row(
            "SELECT value FROM audit_meta WHERE key = ?1 LIMIT 1;",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_meta(&self, key: &str, value: &str) -> AuditResult<()> {
        self.conn
            .execute(
                "INSERT INTO audit_meta(key, value) VALUES(?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )
            .map_err(AuditError::storage)?;
        Ok(())
    }
}

fn attach_legacy(conn: &Connection, legacy: &str) -> AuditResult<()> {
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {};", schema::LEGACY_SCHEMA),
        params![legacy],
    )
    .map_err(|e| AuditError::Connectivity(format!("cannot attach {legacy}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_tilde("~/x.db"), PathBuf::from(home).join("x.db"));
        }
        assert_eq!(expand_tilde("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_meta_upsert() {
        let db = AuditDatabase::open_in_memory().unwrap();
        assert_eq!(db.get_meta("report_id").unwrap(), None);
        db.set_meta("report_id", "R1").unwrap();
        db.set_meta("report_id", "R2").unwrap();
        assert_eq!(db.get_meta("report_id").unwrap().as_deref(), Some("R2"));
    }

    #[test]
    fn test_open_missing_catalog_is_connectivity_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AuditDatabase::open(&dir.path().join("new.db"), &dir.path().join("old.db"))
            .err()
            .unwrap();
        assert!(matches!(err, AuditError::Connectivity(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_open_rejects_unprovisioned_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("new.db");
        let old_path = dir.path().join("old.db");
        Connection::open(&new_path).unwrap();
        Connection::open(&old_path).unwrap();
        match AuditDatabase::open(&new_path, &old_path) {
            Err(AuditError::Connectivity(msg)) => assert!(msg.contains("legacy.recdefn")),
            other => panic!("expected connectivity error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_provision_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("nested").join("new.db");
        let old_path = dir.path().join("old.db");
        drop(AuditDatabase::provision(&new_path, &old_path).unwrap());
        let db = AuditDatabase::open(&new_path, &old_path).unwrap();
        assert!(db.describe().ends_with("new.db"));
    }

    #[test]
    fn test_open_rejects_newer_audit_schema() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("new.db");
        let old_path = dir.path().join("old.db");
        let db = AuditDatabase::provision(&new_path, &old_path).unwrap();
        db.set_meta("schema_version", &(schema::AUDIT_SCHEMA_VERSION + 1).to_string())
            .unwrap();
        drop(db);

        let err = AuditDatabase::open(&new_path, &old_path).err().unwrap();
        assert!(matches!(err, AuditError::Connectivity(_)));
    }
}

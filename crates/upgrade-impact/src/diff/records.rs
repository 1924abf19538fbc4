//! Record-level detectors: obsolete, new, and record/view swaps.

use rusqlite::{params, Connection};

use crate::errors::AuditResult;
use crate::models::{ChangeCategory, ChangeEvent, RecordKind, SchemaObject, Snapshot};

/// Excludes objects the upgrade copies over unchanged.
pub(crate) const NOT_COPIED_RECORD: &str = "NOT EXISTS ( \
     SELECT 1 FROM main.upgrade_actions a \
     WHERE a.recname = r.recname AND TRIM(a.fieldname) = '' AND a.action = 'copy_as_is')";

fn collect_records(
    conn: &Connection,
    sql: &str,
    category: ChangeCategory,
    snapshot: Snapshot,
) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut events = Vec::new();
    for row in rows {
        let (name, rectype) = row?;
        events.push(ChangeEvent::record(
            category,
            SchemaObject::new(name, rectype, snapshot),
        ));
    }
    Ok(events)
}

/// In the old snapshot only, and not the old side of a record rename.
pub fn obsolete_records(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let sql = format!(
        "SELECT r.recname, r.rectype FROM legacy.recdefn r \
         WHERE NOT EXISTS (SELECT 1 FROM main.recdefn n WHERE n.recname = r.recname) \
           AND NOT EXISTS (SELECT 1 FROM main.rename_audit x \
                           WHERE x.entity_type = 'R' AND x.old_name = r.recname) \
           AND {NOT_COPIED_RECORD} \
         ORDER BY r.recname;"
    );
    collect_records(conn, &sql, ChangeCategory::ObsoleteRecord, Snapshot::Old)
}

/// In the new snapshot only, and not the target of a record rename.
pub fn new_records(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let sql = format!(
        "SELECT r.recname, r.rectype FROM main.recdefn r \
         WHERE NOT EXISTS (SELECT 1 FROM legacy.recdefn o WHERE o.recname = r.recname) \
           AND NOT EXISTS (SELECT 1 FROM main.rename_audit x \
                           WHERE x.entity_type = 'R' AND x.new_name = r.recname) \
           AND {NOT_COPIED_RECORD} \
         ORDER BY r.recname;"
    );
    collect_records(conn, &sql, ChangeCategory::NewRecord, Snapshot::New)
}

/// Same name in both snapshots, kind `from` in old and `to` in new.
pub fn kind_swaps(
    conn: &Connection,
    from: RecordKind,
    to: RecordKind,
    category: ChangeCategory,
) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT r.recname, r.rectype FROM main.recdefn r \
         JOIN legacy.recdefn o ON o.recname = r.recname \
         WHERE o.rectype = ?1 AND r.rectype = ?2 \
         ORDER BY r.recname;",
    )?;
    let rows = stmt.query_map(params![from.code(), to.code()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut events = Vec::new();
    for row in rows {
        let (name, rectype) = row?;
        events.push(ChangeEvent::record(
            category,
            SchemaObject::new(name, rectype, Snapshot::New),
        ));
    }
    Ok(events)
}

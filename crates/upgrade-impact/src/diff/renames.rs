//! Rename detectors, read straight from the rename-audit table.

use rusqlite::Connection;

use crate::errors::AuditResult;
use crate::models::{ChangeCategory, ChangeEvent, FieldRef, RecordKind, SchemaObject, Snapshot};

/// Record renames; the event carries the old record as its primary object.
pub fn renamed_records(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT x.old_name, x.new_name, COALESCE(o.rectype, -1) \
         FROM main.rename_audit x \
         LEFT JOIN legacy.recdefn o ON o.recname = x.old_name \
         WHERE x.entity_type = 'R' \
         ORDER BY x.old_name, x.new_name;",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    let mut events = Vec::new();
    for row in rows {
        let (old, new, rectype) = row?;
        events.push(
            ChangeEvent::record(
                ChangeCategory::RenamedRecord,
                SchemaObject::new(old, rectype, Snapshot::Old),
            )
            .with_rename(new),
        );
    }
    Ok(events)
}

/// Field renames within one record; the event carries the old field name.
pub fn renamed_fields(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT x.recname, x.old_name, x.new_name, COALESCE(n.rectype, -1) \
         FROM main.rename_audit x \
         LEFT JOIN main.recdefn n ON n.recname = x.recname \
         WHERE x.entity_type = 'F' \
         ORDER BY x.recname, x.old_name, x.new_name;",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    let mut events = Vec::new();
    for row in rows {
        let (record, old, new, rectype) = row?;
        events.push(
            ChangeEvent::field(
                ChangeCategory::RenamedField,
                FieldRef::new(record, old),
                RecordKind::from_code(rectype),
            )
            .with_rename(new),
        );
    }
    Ok(events)
}

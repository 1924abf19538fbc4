//! Field-level detectors: obsolete fields, new fields, and length growth.

use rusqlite::Connection;

use crate::errors::AuditResult;
use crate::models::{
    ChangeCategory, ChangeEvent, ChangeTarget, FieldDefinition, FieldRef, FieldType,
    LengthChange, RecordKind,
};

const NOT_COPIED_FIELD: &str = "NOT EXISTS ( \
     SELECT 1 FROM main.upgrade_actions a \
     WHERE a.recname = f.recname AND a.action = 'copy_as_is' \
       AND (a.fieldname = f.fieldname OR TRIM(a.fieldname) = ''))";

fn collect_fields(conn: &Connection, sql: &str, category: ChangeCategory) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    let mut events = Vec::new();
    for row in rows {
        let (record, field, rectype) = row?;
        events.push(ChangeEvent::field(
            category,
            FieldRef::new(record, field),
            RecordKind::from_code(rectype),
        ));
    }
    Ok(events)
}

/// Fields dropped from records that still exist. Kind comes from the new record.
pub fn obsolete_fields(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let sql = format!(
        "SELECT f.recname, f.fieldname, n.rectype \
         FROM legacy.recfield f \
         JOIN main.recdefn n ON n.recname = f.recname \
         WHERE NOT EXISTS (SELECT 1 FROM main.recfield k \
                           WHERE k.recname = f.recname AND k.fieldname = f.fieldname) \
           AND NOT EXISTS (SELECT 1 FROM main.rename_audit x \
                           WHERE x.entity_type = 'F' AND x.recname = f.recname \
                             AND x.old_name = f.fieldname) \
           AND {NOT_COPIED_FIELD} \
         ORDER BY f.recname, f.fieldname;"
    );
    collect_fields(conn, &sql, ChangeCategory::ObsoleteField)
}

/// Fields added to records that already existed.
pub fn new_fields(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let sql = format!(
        "SELECT f.recname, f.fieldname, n.rectype \
         FROM main.recfield f \
         JOIN main.recdefn n ON n.recname = f.recname \
         WHERE EXISTS (SELECT 1 FROM legacy.recdefn o WHERE o.recname = f.recname) \
           AND NOT EXISTS (SELECT 1 FROM legacy.recfield k \
                           WHERE k.recname = f.recname AND k.fieldname = f.fieldname) \
           AND NOT EXISTS (SELECT 1 FROM main.rename_audit x \
                           WHERE x.entity_type = 'F' AND x.recname = f.recname \
                             AND x.new_name = f.fieldname) \
           AND {NOT_COPIED_FIELD} \
         ORDER BY f.recname, f.fieldname;"
    );
    collect_fields(conn, &sql, ChangeCategory::NewField)
}

/// Character fields with the same type in both snapshots whose length grew.
pub fn length_changes(conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
    let mut stmt = conn.prepare(
        "SELECT n.fieldname, n.fieldtype, o.length, n.length \
         FROM main.dbfield n \
         JOIN legacy.dbfield o ON o.fieldname = n.fieldname AND o.fieldtype = n.fieldtype \
         WHERE n.length > o.length \
         ORDER BY n.fieldname;",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (name, fieldtype, old, new) = row?;
        let field_type = FieldType::from_code(fieldtype);
        if !field_type.is_some_and(FieldType::is_character) {
            continue;
        }
        events.push(ChangeEvent {
            category: ChangeCategory::FieldLengthChange,
            target: ChangeTarget::FieldDefinition(FieldDefinition { name, field_type }),
            renamed_to: None,
            length: Some(LengthChange { old, new }),
        });
    }
    Ok(events)
}

//! Catalog seeding helpers shared by the unit tests.

use rusqlite::{params, Connection};

use crate::search::{QUERY_PROJECT_TYPE, SQL_PROJECT_TYPE};
use crate::store::database::AuditDatabase;

pub const PROJECT: &str = "UPGCUST";

pub fn empty_db() -> AuditDatabase {
    AuditDatabase::open_in_memory().unwrap()
}

/// Insert a record into `schema` (`main` = new snapshot, `legacy` = old).
pub fn record(conn: &Connection, schema: &str, name: &str, rectype: i64) {
    conn.execute(
        &format!("INSERT INTO {schema}.recdefn(recname, rectype) VALUES (?1, ?2);"),
        params![name, rectype],
    )
    .unwrap();
}

pub fn fields(conn: &Connection, schema: &str, recname: &str, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        conn.execute(
            &format!(
                "INSERT INTO {schema}.recfield(recname, fieldname, fieldnum) VALUES (?1, ?2, ?3);"
            ),
            params![recname, name, i as i64 + 1],
        )
        .unwrap();
    }
}

pub fn dbfield(conn: &Connection, schema: &str, name: &str, fieldtype: i64, length: i64) {
    conn.execute(
        &format!("INSERT INTO {schema}.dbfield(fieldname, fieldtype, length) VALUES (?1, ?2, ?3);"),
        params![name, fieldtype, length],
    )
    .unwrap();
}

/// Same record with the same fields in both snapshots.
pub fn unchanged_record(conn: &Connection, name: &str, rectype: i64, field_names: &[&str]) {
    for schema in ["main", "legacy"] {
        record(conn, schema, name, rectype);
        fields(conn, schema, name, field_names);
    }
}

pub fn rename(conn: &Connection, entity_type: &str, recname: &str, old: &str, new: &str) {
    conn.execute(
        "INSERT INTO rename_audit(entity_type, recname, old_name, new_name) VALUES (?1, ?2, ?3, ?4);",
        params![entity_type, recname, old, new],
    )
    .unwrap();
}

pub fn copy_as_is(conn: &Connection, recname: &str, fieldname: &str) {
    conn.execute(
        "INSERT INTO upgrade_actions(recname, fieldname, action) VALUES (?1, ?2, 'copy_as_is');",
        params![recname, fieldname],
    )
    .unwrap();
}

pub fn project_item(conn: &Connection, object_type: i64, value1: &str, value2: &str) {
    conn.execute(
        "INSERT INTO project_items(project_name, object_type, object_value1, object_value2) \
         VALUES (?1, ?2, ?3, ?4);",
        params![PROJECT, object_type, value1, value2],
    )
    .unwrap();
}

/// A SQL definition that belongs to the custom project.
pub fn custom_sql(conn: &Connection, sql_id: &str, sql_type: i64, text: &str) {
    conn.execute(
        "INSERT INTO sql_definitions(sql_id, sql_type, sql_text) VALUES (?1, ?2, ?3);",
        params![sql_id, sql_type, text],
    )
    .unwrap();
    project_item(conn, SQL_PROJECT_TYPE, sql_id, " ");
}

/// A program unit that belongs to the custom project under its own type.
pub fn custom_program(
    conn: &Connection,
    object_type: i64,
    identity: [&str; 4],
    text: &str,
) {
    conn.execute(
        "INSERT INTO program_units(object_type, object_name, event_name, package_name, \
         method_name, program_text) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![object_type, identity[0], identity[1], identity[2], identity[3], text],
    )
    .unwrap();
    project_item(conn, object_type, identity[0], " ");
}

/// A query binding to `recname` (and optionally `fieldname`), in the project.
pub fn custom_query(conn: &Connection, oprid: &str, qryname: &str, recname: &str, fieldname: Option<&str>) {
    conn.execute(
        "INSERT INTO query_records(oprid, qryname, recname) VALUES (?1, ?2, ?3);",
        params![oprid, qryname, recname],
    )
    .unwrap();
    if let Some(fieldname) = fieldname {
        conn.execute(
            "INSERT INTO query_fields(oprid, qryname, recname, fieldname) VALUES (?1, ?2, ?3, ?4);",
            params![oprid, qryname, recname, fieldname],
        )
        .unwrap();
    }
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM project_items WHERE object_type = ?1 \
             AND object_value1 = ?2 AND object_value2 = ?3;",
            params![QUERY_PROJECT_TYPE, qryname, oprid],
            |row| row.get(0),
        )
        .unwrap();
    if !exists {
        project_item(conn, QUERY_PROJECT_TYPE, qryname, oprid);
    }
}

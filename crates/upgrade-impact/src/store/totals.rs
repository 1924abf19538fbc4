//! Per-category totals folded from the ledger.
//!
//! Totals are overwritten on every aggregation, never accumulated, so two runs
//! over unchanged inputs leave byte-identical rows.

use indexmap::IndexMap;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::errors::{AuditError, AuditResult};
use crate::models::{ArtifactKind, ChangeCategory, TotalsRow};
use crate::store::ledger::Ledger;

/// Insert a zero row for every category, resetting rows that already exist.
pub fn seed_zero_totals(conn: &Connection) -> AuditResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO upgrade_totals(change_type, pcode_objects, sql_objects, query_objects) \
         VALUES (?1, 0, 0, 0) \
         ON CONFLICT(change_type) DO UPDATE SET \
           pcode_objects = 0, sql_objects = 0, query_objects = 0;",
    )?;
    for category in ChangeCategory::ALL {
        stmt.execute(params![category.label()])
            .map_err(AuditError::storage)?;
    }
    Ok(())
}

/// Fold the ledger into totals and return the resulting rows.
pub fn aggregate_totals(conn: &Connection) -> AuditResult<IndexMap<ChangeCategory, TotalsRow>> {
    let tx = conn.unchecked_transaction()?;
    seed_zero_totals(&tx)?;
    tx.execute(
        "INSERT INTO upgrade_totals(change_type, pcode_objects, sql_objects, query_objects) \
         SELECT change_type, \
                COUNT(DISTINCT CASE WHEN artifact_kind = 'PCode' THEN artifact_ref END), \
                COUNT(DISTINCT CASE WHEN artifact_kind = 'SQL' THEN artifact_ref END), \
                COUNT(DISTINCT CASE WHEN artifact_kind = 'Query' THEN artifact_ref END) \
         FROM upgrade_audit \
         WHERE artifact_kind <> 'SQR' \
         GROUP BY change_type \
         ON CONFLICT(change_type) DO UPDATE SET \
           pcode_objects = excluded.pcode_objects, \
           sql_objects = excluded.sql_objects, \
           query_objects = excluded.query_objects;",
        [],
    )
    .map_err(AuditError::storage)?;
    tx.commit().map_err(AuditError::storage)?;
    read_totals(conn)
}

/// Totals in category order. Categories without a row read as zero.
pub fn read_totals(conn: &Connection) -> AuditResult<IndexMap<ChangeCategory, TotalsRow>> {
    let mut stmt = conn.prepare(
        "SELECT pcode_objects, sql_objects, query_objects \
         FROM upgrade_totals WHERE change_type = ?1;",
    )?;
    let mut out = IndexMap::new();
    for category in ChangeCategory::ALL {
        let row = match stmt.query_row(params![category.label()], |row| {
            Ok(TotalsRow {
                pcode_objects: row.get(0)?,
                sql_objects: row.get(1)?,
                query_objects: row.get(2)?,
            })
        }) {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => TotalsRow::default(),
            Err(e) => return Err(e.into()),
        };
        out.insert(category, row);
    }
    Ok(out)
}

/// Distinct script files per category.
pub fn sqr_counts(ledger: &Ledger<'_>) -> AuditResult<IndexMap<ChangeCategory, i64>> {
    let mut out = IndexMap::new();
    for category in ChangeCategory::ALL {
        out.insert(
            category,
            ledger.distinct_in_category(category, ArtifactKind::Sqr)?,
        );
    }
    Ok(out)
}

/// Run-wide distinct artifact counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GlobalSummary {
    pub pcode_objects: i64,
    pub sql_objects: i64,
    pub query_objects: i64,
    pub private_queries: i64,
}

pub fn global_summary(ledger: &Ledger<'_>) -> AuditResult<GlobalSummary> {
    Ok(GlobalSummary {
        pcode_objects: ledger.distinct_artifacts(ArtifactKind::PCode)?,
        sql_objects: ledger.distinct_artifacts(ArtifactKind::Sql)?,
        query_objects: ledger.distinct_artifacts(ArtifactKind::Query)?,
        private_queries: ledger.private_query_count()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchEvent;
    use crate::store::database::AuditDatabase;

    fn append(ledger: &Ledger<'_>, category: ChangeCategory, kind: ArtifactKind, reference: &str) {
        ledger
            .append("R1", &MatchEvent::new(category, kind, reference))
            .unwrap();
    }

    #[test]
    fn test_every_category_has_a_zero_row() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let totals = aggregate_totals(db.conn()).unwrap();
        assert_eq!(totals.len(), ChangeCategory::ALL.len());
        assert!(totals.values().all(|row| *row == TotalsRow::default()));
    }

    #[test]
    fn test_aggregate_counts_distinct_per_kind() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();
        append(&ledger, ChangeCategory::ObsoleteField, ArtifactKind::PCode, "P1");
        append(&ledger, ChangeCategory::ObsoleteField, ArtifactKind::PCode, "P1");
        append(&ledger, ChangeCategory::ObsoleteField, ArtifactKind::PCode, "P2");
        append(&ledger, ChangeCategory::ObsoleteField, ArtifactKind::Sql, "S1 - Other");
        append(&ledger, ChangeCategory::ObsoleteField, ArtifactKind::Sqr, "/a.sqr");
        append(&ledger, ChangeCategory::NewField, ArtifactKind::Query, "Q1");

        let totals = aggregate_totals(db.conn()).unwrap();
        assert_eq!(
            totals[&ChangeCategory::ObsoleteField],
            TotalsRow {
                pcode_objects: 2,
                sql_objects: 1,
                query_objects: 0
            }
        );
        assert_eq!(totals[&ChangeCategory::NewField].query_objects, 1);

        let sqr = sqr_counts(&ledger).unwrap();
        assert_eq!(sqr[&ChangeCategory::ObsoleteField], 1);
        assert_eq!(sqr[&ChangeCategory::NewField], 0);
    }

    #[test]
    fn test_aggregate_overwrites_previous_counts() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();
        append(&ledger, ChangeCategory::ObsoleteRecord, ArtifactKind::Sql, "S1 - Other");
        append(&ledger, ChangeCategory::ObsoleteRecord, ArtifactKind::Sql, "S2 - Other");
        assert_eq!(
            aggregate_totals(db.conn()).unwrap()[&ChangeCategory::ObsoleteRecord].sql_objects,
            2
        );

        ledger.reset_run().unwrap();
        append(&ledger, ChangeCategory::ObsoleteRecord, ArtifactKind::Sql, "S1 - Other");
        assert_eq!(
            aggregate_totals(db.conn()).unwrap()[&ChangeCategory::ObsoleteRecord].sql_objects,
            1
        );
        assert_eq!(aggregate_totals(db.conn()).unwrap()[&ChangeCategory::ObsoleteRecord].sql_objects, 1);
    }

    #[test]
    fn test_global_summary() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();
        append(&ledger, ChangeCategory::ObsoleteRecord, ArtifactKind::PCode, "P1");
        append(&ledger, ChangeCategory::NewField, ArtifactKind::PCode, "P1");
        append(&ledger, ChangeCategory::NewField, ArtifactKind::Query, "Q : OWNER");
        let summary = global_summary(&ledger).unwrap();
        assert_eq!(summary.pcode_objects, 1);
        assert_eq!(summary.query_objects, 1);
        assert_eq!(summary.private_queries, 1);
    }
}

//! Append-only impact ledger: one row per match, duplicates allowed.

use rusqlite::{params, Connection};

use crate::errors::{AuditError, AuditResult};
use crate::models::{ArtifactKind, ChangeCategory, MatchEvent};
use crate::store::totals;

/// Separator between query name and owner in private query references.
pub const OWNER_SEPARATOR: &str = " : ";

pub struct Ledger<'a> {
    conn: &'a Connection,
}

impl<'a> Ledger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Clear every ledger row and reseed zero totals for all categories.
    pub fn reset_run(&self) -> AuditResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM upgrade_audit;", [])
            .map_err(AuditError::storage)?;
        totals::seed_zero_totals(&tx)?;
        tx.commit().map_err(AuditError::storage)?;
        Ok(())
    }

    /// Persist one match. A failed write is fatal to the run.
    pub fn append(&self, report_id: &str, event: &MatchEvent) -> AuditResult<()> {
        let (line_number, excerpt) = match &event.locator {
            Some(loc) => (Some(loc.line_number), Some(loc.text.as_str())),
            None => (None, None),
        };
        self.conn
            .execute(
                "INSERT INTO upgrade_audit(report_id, change_type, artifact_kind, artifact_ref, \
                 line_number, excerpt) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    report_id,
                    event.category.label(),
                    event.kind.as_str(),
                    event.reference,
                    line_number,
                    excerpt,
                ],
            )
            .map_err(AuditError::storage)?;
        Ok(())
    }

    pub fn len(&self) -> AuditResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM upgrade_audit;", [], |row| row.get(0))?)
    }

    pub fn is_empty(&self) -> AuditResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every ledger row in insertion order.
    pub fn entries(&self) -> AuditResult<Vec<MatchEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT change_type, artifact_kind, artifact_ref, line_number, excerpt \
             FROM upgrade_audit ORDER BY id;",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (change_type, kind, reference, line, excerpt) = row?;
            let (Some(category), Some(kind)) = (
                ChangeCategory::from_label(&change_type),
                ArtifactKind::from_str_opt(&kind),
            ) else {
                return Err(AuditError::Storage(format!(
                    "unrecognised ledger row: {change_type}/{kind}"
                )));
            };
            let mut event = MatchEvent::new(category, kind, reference);
            if let Some(line) = line {
                event = event.at_line(line, excerpt.unwrap_or_default());
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Distinct artifact references of `kind` across all categories.
    pub fn distinct_artifacts(&self, kind: ArtifactKind) -> AuditResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT artifact_ref) FROM upgrade_audit WHERE artifact_kind = ?1;",
            params![kind.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Distinct references of `kind` recorded under `category`.
    pub fn distinct_in_category(
        &self,
        category: ChangeCategory,
        kind: ArtifactKind,
    ) -> AuditResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT artifact_ref) FROM upgrade_audit \
             WHERE change_type = ?1 AND artifact_kind = ?2;",
            params![category.label(), kind.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Distinct private queries, identified by the owner separator.
    pub fn private_query_count(&self) -> AuditResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT artifact_ref) FROM upgrade_audit \
             WHERE artifact_kind = 'Query' AND instr(artifact_ref, ?1) > 0;",
            params![OWNER_SEPARATOR],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::database::AuditDatabase;

    #[test]
    fn test_append_preserves_order_and_locator() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();

        ledger
            .append(
                "R1",
                &MatchEvent::new(ChangeCategory::ObsoleteRecord, ArtifactKind::Sql, "S1 - Other"),
            )
            .unwrap();
        ledger
            .append(
                "R1",
                &MatchEvent::new(ChangeCategory::ObsoleteRecord, ArtifactKind::Sqr, "/s/a.sqr")
                    .at_line(7, "FROM PS_R"),
            )
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reference, "S1 - Other");
        assert_eq!(entries[1].locator.as_ref().unwrap().line_number, 7);
    }

    #[test]
    fn test_distinct_counts_collapse_duplicates() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();

        for reference in ["A", "A", "B", "A", "C", "B"] {
            ledger
                .append(
                    "R1",
                    &MatchEvent::new(ChangeCategory::ObsoleteField, ArtifactKind::PCode, reference),
                )
                .unwrap();
        }
        assert_eq!(ledger.len().unwrap(), 6);
        assert_eq!(ledger.distinct_artifacts(ArtifactKind::PCode).unwrap(), 3);
        assert_eq!(
            ledger
                .distinct_in_category(ChangeCategory::ObsoleteField, ArtifactKind::PCode)
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_private_queries_need_owner_separator() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger.reset_run().unwrap();
        for reference in ["Q_PUBLIC", "Q_MINE : VP1", "Q_MINE : VP1", "Q_OTHER : PS"] {
            ledger
                .append(
                    "R1",
                    &MatchEvent::new(ChangeCategory::NewField, ArtifactKind::Query, reference),
                )
                .unwrap();
        }
        assert_eq!(ledger.private_query_count().unwrap(), 2);
        assert_eq!(ledger.distinct_artifacts(ArtifactKind::Query).unwrap(), 3);
    }

    #[test]
    fn test_reset_clears_previous_run() {
        let db = AuditDatabase::open_in_memory().unwrap();
        let ledger = Ledger::new(db.conn());
        ledger
            .append(
                "R0",
                &MatchEvent::new(ChangeCategory::NewField, ArtifactKind::Sql, "X - Other"),
            )
            .unwrap();
        ledger.reset_run().unwrap();
        assert!(ledger.is_empty().unwrap());
    }
}

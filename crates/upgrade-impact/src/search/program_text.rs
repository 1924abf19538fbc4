//! Program-text searcher over compiled program units in the custom project.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::errors::AuditResult;
use crate::models::{corpus_revision, ArtifactKind, MatchEvent};
use crate::search::encoder::{encode_text, EncodedText, TermKeys};
use crate::search::{non_blank, record_matches, CorpusSearcher, Loaded, SearchOutcome, SearchRequest};
use crate::store::ledger::Ledger;

/// Object types that carry program text: record, application engine, page,
/// component, component record, component record field, application package.
pub const PROGRAM_OBJECT_TYPES: &[i64] = &[8, 43, 44, 46, 47, 48, 58];

/// Join the non-blank parts of a program unit identity with `.`.
pub fn program_reference(object: &str, event: &str, package: &str, method: &str) -> String {
    [object, event, package, method]
        .into_iter()
        .filter_map(non_blank)
        .collect::<Vec<_>>()
        .join(".")
}

struct ProgramUnit {
    reference: String,
    text: EncodedText,
}

pub struct ProgramTextSearcher {
    units: Vec<ProgramUnit>,
}

impl ProgramTextSearcher {
    pub fn load(conn: &Connection, project: &str, max_text_bytes: usize) -> AuditResult<Loaded<Self>> {
        let type_list = PROGRAM_OBJECT_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT u.object_name, u.event_name, u.package_name, u.method_name, u.program_text \
             FROM program_units u \
             WHERE u.object_type IN ({type_list}) \
               AND EXISTS ( \
                   SELECT 1 FROM project_items p \
                   WHERE p.project_name = ?1 AND p.object_type = u.object_type \
                     AND p.object_value1 = u.object_name) \
             ORDER BY u.object_name, u.event_name, u.package_name, u.method_name, u.object_type;"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![project], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut units = Vec::new();
        let mut skipped = Vec::new();
        let mut revision_parts = Vec::new();
        for row in rows {
            let (object, event, package, method, program_text) = row?;
            let reference = program_reference(&object, &event, &package, &method);
            match encode_text(&reference, &program_text, max_text_bytes) {
                Ok(text) => {
                    revision_parts.push(reference.clone());
                    revision_parts.push(program_text);
                    units.push(ProgramUnit { reference, text });
                }
                Err(err) => {
                    warn!(artifact = %reference, error = %err, "skipping program unit");
                    skipped.push(err);
                }
            }
        }

        let revision = corpus_revision(revision_parts.iter().map(String::as_str));
        debug!(units = units.len(), %revision, "program corpus loaded");
        Ok(Loaded {
            searcher: Self { units },
            skipped,
            revision,
        })
    }
}

impl CorpusSearcher for ProgramTextSearcher {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::PCode
    }

    fn corpus_len(&self) -> usize {
        self.units.len()
    }

    fn search(&self, request: &SearchRequest, ledger: &Ledger<'_>) -> AuditResult<SearchOutcome> {
        let keys = TermKeys::new(&request.record, request.field.as_deref())?;
        let matches = self
            .units
            .iter()
            .filter(|unit| keys.matches(&unit.text))
            .map(|unit| MatchEvent::new(request.category, ArtifactKind::PCode, unit.reference.clone()))
            .collect();
        record_matches(request, ledger, matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::models::ChangeCategory;
    use crate::search::guards::DEFAULT_MAX_ENCODED_TEXT_BYTES;

    fn load(conn: &Connection) -> ProgramTextSearcher {
        ProgramTextSearcher::load(conn, fixtures::PROJECT, DEFAULT_MAX_ENCODED_TEXT_BYTES)
            .unwrap()
            .searcher
    }

    #[test]
    fn test_reference_omits_blank_parts() {
        assert_eq!(program_reference("JOB", "FieldChange", " ", " "), "JOB.FieldChange");
        assert_eq!(
            program_reference("MY_PKG", " ", "Utils", "Run"),
            "MY_PKG.Utils.Run"
        );
    }

    #[test]
    fn test_ineligible_types_and_non_members_are_ignored() {
        let db = fixtures::empty_db();
        let conn = db.conn();
        fixtures::custom_program(conn, 8, ["MY_REC", "FieldChange", " ", " "], "Local Record &r = CreateRecord(Record.JOB);");
        // Type 9 is not a program-carrying type even when in the project.
        fixtures::custom_program(conn, 9, ["OTHER", "X", " ", " "], "Record.JOB");
        conn.execute(
            "INSERT INTO program_units(object_type, object_name, program_text) VALUES (44, 'DELIVERED_PG', 'Record.JOB');",
            [],
        )
        .unwrap();

        let searcher = load(conn);
        assert_eq!(searcher.corpus_len(), 1);
        let ledger = Ledger::new(conn);
        let outcome = searcher
            .search(
                &SearchRequest {
                    report_id: "R1".into(),
                    record: "JOB".into(),
                    field: None,
                    category: ChangeCategory::RecordNowView,
                },
                &ledger,
            )
            .unwrap();
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].reference, "MY_REC.FieldChange");
        assert_eq!(outcome.matches[0].category, ChangeCategory::RecordNowView);
    }

    #[test]
    fn test_membership_is_per_object_type() {
        let db = fixtures::empty_db();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO program_units(object_type, object_name, program_text) VALUES (46, 'COMP', 'JOB.DEPTID');",
            [],
        )
        .unwrap();
        // Same name in the project, but registered under the page type.
        fixtures::project_item(conn, 44, "COMP", " ");
        assert_eq!(load(conn).corpus_len(), 0);
    }

    #[test]
    fn test_record_and_field_must_both_occur() {
        let db = fixtures::empty_db();
        let conn = db.conn();
        fixtures::custom_program(conn, 58, ["PKG", " ", "Cls", "Go"], "&x = JOB.DEPTID.Value;");
        fixtures::custom_program(conn, 58, ["PKG", " ", "Cls", "Stop"], "&x = JOB.EMPLID.Value;");
        let searcher = load(conn);
        let outcome = searcher
            .search(
                &SearchRequest {
                    report_id: "R1".into(),
                    record: "JOB".into(),
                    field: Some("DEPTID".into()),
                    category: ChangeCategory::ObsoleteField,
                },
                &Ledger::new(conn),
            )
            .unwrap();
        let refs: Vec<_> = outcome.matches.iter().map(|m| m.reference.as_str()).collect();
        assert_eq!(refs, vec!["PKG.Cls.Go"]);
    }
}

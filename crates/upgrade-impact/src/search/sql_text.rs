//! SQL-text searcher over the custom project's SQL definitions.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::errors::AuditResult;
use crate::models::{corpus_revision, ArtifactKind, MatchEvent};
use crate::search::encoder::{encode_text, EncodedText, TermKeys};
use crate::search::{record_matches, CorpusSearcher, Loaded, SearchOutcome, SearchRequest, SQL_PROJECT_TYPE};
use crate::store::ledger::Ledger;

pub fn sql_type_label(sql_type: i64) -> &'static str {
    match sql_type {
        1 => "App Engine",
        2 => "View",
        _ => "Other",
    }
}

struct SqlDefinition {
    reference: String,
    text: EncodedText,
}

pub struct SqlTextSearcher {
    definitions: Vec<SqlDefinition>,
}

impl SqlTextSearcher {
    /// Load and encode every SQL definition that belongs to `project`.
    pub fn load(conn: &Connection, project: &str, max_text_bytes: usize) -> AuditResult<Loaded<Self>> {
        let mut stmt = conn.prepare(
            "SELECT d.sql_id, d.sql_type, d.sql_text \
             FROM sql_definitions d \
             WHERE EXISTS ( \
                 SELECT 1 FROM project_items p \
                 WHERE p.project_name = ?1 AND p.object_type = ?2 \
                   AND p.object_value1 = d.sql_id) \
             ORDER BY d.sql_id, d.sql_type;",
        )?;
        let rows = stmt.query_map(params![project, SQL_PROJECT_TYPE], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut definitions = Vec::new();
        let mut skipped = Vec::new();
        let mut revision_parts = Vec::new();
        for row in rows {
            let (sql_id, sql_type, sql_text) = row?;
            let reference = format!("{} - {}", sql_id.trim(), sql_type_label(sql_type));
            match encode_text(&reference, &sql_text, max_text_bytes) {
                Ok(text) => {
                    revision_parts.push(reference.clone());
                    revision_parts.push(sql_text);
                    definitions.push(SqlDefinition { reference, text });
                }
                Err(err) => {
                    warn!(artifact = %reference, error = %err, "skipping SQL definition");
                    skipped.push(err);
                }
            }
        }

        let revision = corpus_revision(revision_parts.iter().map(String::as_str));
        debug!(definitions = definitions.len(), %revision, "SQL corpus loaded");
        Ok(Loaded {
            searcher: Self { definitions },
            skipped,
            revision,
        })
    }
}

impl CorpusSearcher for SqlTextSearcher {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Sql
    }

    fn corpus_len(&self) -> usize {
        self.definitions.len()
    }

    fn search(&self, request: &SearchRequest, ledger: &Ledger<'_>) -> AuditResult<SearchOutcome> {
        let keys = TermKeys::new(&request.record, request.field.as_deref())?;
        let matches = self
            .definitions
            .iter()
            .filter(|def| keys.matches(&def.text))
            .map(|def| MatchEvent::new(request.category, ArtifactKind::Sql, def.reference.clone()))
            .collect();
        record_matches(request, ledger, matches)
    }
}

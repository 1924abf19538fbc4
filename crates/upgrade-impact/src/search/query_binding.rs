//! Query-binding searcher over the record and field bindings of custom queries.

use indexmap::IndexSet;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::errors::{AuditError, AuditResult};
use crate::models::{corpus_revision, ArtifactKind, MatchEvent};
use crate::search::encoder::{encode, EncodedKey};
use crate::search::{
    non_blank, record_matches, CorpusSearcher, Loaded, SearchOutcome, SearchRequest,
    QUERY_PROJECT_TYPE,
};
use crate::store::ledger::{Ledger, OWNER_SEPARATOR};

/// Query name, annotated with its owner when the query is private.
pub fn query_reference(qryname: &str, oprid: &str) -> String {
    match non_blank(oprid) {
        Some(owner) => format!("{}{OWNER_SEPARATOR}{owner}", qryname.trim()),
        None => qryname.trim().to_string(),
    }
}

struct Binding {
    reference: String,
    record: EncodedKey,
    field: Option<EncodedKey>,
}

pub struct QueryBindingSearcher {
    records: Vec<Binding>,
    fields: Vec<Binding>,
}

const MEMBERSHIP: &str = "EXISTS ( \
     SELECT 1 FROM project_items p \
     WHERE p.project_name = ?1 AND p.object_type = ?2 \
       AND p.object_value1 = b.qryname \
       AND TRIM(p.object_value2) = TRIM(b.oprid))";

impl QueryBindingSearcher {
    pub fn load(conn: &Connection, project: &str) -> AuditResult<Loaded<Self>> {
        let mut skipped = Vec::new();
        let mut revision_parts = Vec::new();

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT b.oprid, b.qryname, b.recname, NULL \
             FROM query_records b WHERE {MEMBERSHIP} \
             ORDER BY b.qryname, b.oprid, b.recname;"
        ))?;
        let records = load_bindings(&mut stmt, project, &mut skipped, &mut revision_parts)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT b.oprid, b.qryname, b.recname, b.fieldname \
             FROM query_fields b WHERE {MEMBERSHIP} \
             ORDER BY b.qryname, b.oprid, b.recname, b.fieldname;"
        ))?;
        let fields = load_bindings(&mut stmt, project, &mut skipped, &mut revision_parts)?;

        let revision = corpus_revision(revision_parts.iter().map(String::as_str));
        debug!(
            record_bindings = records.len(),
            field_bindings = fields.len(),
            %revision,
            "query corpus loaded"
        );
        Ok(Loaded {
            searcher: Self { records, fields },
            skipped,
            revision,
        })
    }
}

fn load_bindings(
    stmt: &mut rusqlite::Statement<'_>,
    project: &str,
    skipped: &mut Vec<AuditError>,
    revision_parts: &mut Vec<String>,
) -> AuditResult<Vec<Binding>> {
    let rows = stmt.query_map(params![project, QUERY_PROJECT_TYPE], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut bindings = Vec::new();
    for row in rows {
        let (oprid, qryname, recname, fieldname) = row?;
        let reference = query_reference(&qryname, &oprid);
        let encoded = encode(&recname).and_then(|record| {
            let field = fieldname.as_deref().map(encode).transpose()?;
            Ok((record, field))
        });
        match encoded {
            Ok((record, field)) => {
                revision_parts.push(format!(
                    "{reference}/{recname}/{}",
                    fieldname.as_deref().unwrap_or_default()
                ));
                bindings.push(Binding {
                    reference,
                    record,
                    field,
                });
            }
            Err(err) => {
                warn!(artifact = %reference, error = %err, "skipping query binding");
                skipped.push(AuditError::corpus_access(reference, err));
            }
        }
    }
    Ok(bindings)
}

impl CorpusSearcher for QueryBindingSearcher {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Query
    }

    fn corpus_len(&self) -> usize {
        self.records
            .iter()
            .chain(self.fields.iter())
            .map(|b| b.reference.as_str())
            .collect::<IndexSet<_>>()
            .len()
    }

    /// Record-only bindings always; record-and-field bindings only when the
    /// request carries a field. Each variant reports a query at most once.
    fn search(&self, request: &SearchRequest, ledger: &Ledger<'_>) -> AuditResult<SearchOutcome> {
        let record = encode(&request.record)?;
        let field = request.field.as_deref().map(encode).transpose()?;

        let by_record: IndexSet<&str> = self
            .records
            .iter()
            .filter(|b| b.record == record)
            .map(|b| b.reference.as_str())
            .collect();

        let by_field: IndexSet<&str> = match &field {
            Some(field) => self
                .fields
                .iter()
                .filter(|b| b.record == record && b.field.as_ref() == Some(field))
                .map(|b| b.reference.as_str())
                .collect(),
            None => IndexSet::new(),
        };

        let matches = by_record
            .into_iter()
            .chain(by_field)
            .map(|reference| MatchEvent::new(request.category, ArtifactKind::Query, reference))
            .collect();
        record_matches(request, ledger, matches)
    }
}

//! Cross-reference searchers over the four custom-artifact corpora.
//!
//! Every searcher receives its run state as an explicit [`SearchRequest`],
//! appends each match to the ledger as soon as it is found and returns the
//! matches it wrote.

pub mod encoder;
pub mod filesystem;
pub mod guards;
pub mod program_text;
pub mod query_binding;
pub mod script;
pub mod sql_text;

use crate::errors::{AuditError, AuditResult};
use crate::models::{ArtifactKind, ChangeCategory, MatchEvent, SearchTerms};
use crate::store::ledger::Ledger;

pub use program_text::ProgramTextSearcher;
pub use query_binding::QueryBindingSearcher;
pub use script::ScriptSearcher;
pub use sql_text::SqlTextSearcher;

/// Project item type of SQL definitions.
pub const SQL_PROJECT_TYPE: i64 = 30;

/// Project item type of queries (value1 = query name, value2 = owner).
pub const QUERY_PROJECT_TYPE: i64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub report_id: String,
    pub record: String,
    pub field: Option<String>,
    pub category: ChangeCategory,
}

impl SearchRequest {
    pub fn new(report_id: impl Into<String>, category: ChangeCategory, terms: SearchTerms) -> Self {
        Self {
            report_id: report_id.into(),
            record: terms.record,
            field: terms.field,
            category,
        }
    }
}

/// Matches written to the ledger for one request, in ledger order.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub matches: Vec<MatchEvent>,
}

/// A corpus loaded once per run, plus the artifacts that could not be loaded.
#[derive(Debug)]
pub struct Loaded<T> {
    pub searcher: T,
    pub skipped: Vec<AuditError>,
    /// SHA-256 over the loaded corpus, in load order.
    pub revision: String,
}

pub trait CorpusSearcher {
    fn kind(&self) -> ArtifactKind;

    /// Number of artifacts the searcher scans.
    fn corpus_len(&self) -> usize;

    fn search(&self, request: &SearchRequest, ledger: &Ledger<'_>) -> AuditResult<SearchOutcome>;
}

/// Append each match to the ledger, in order, and hand them back.
pub(crate) fn record_matches(
    request: &SearchRequest,
    ledger: &Ledger<'_>,
    matches: Vec<MatchEvent>,
) -> AuditResult<SearchOutcome> {
    for event in &matches {
        ledger.append(&request.report_id, event)?;
    }
    Ok(SearchOutcome { matches })
}

/// Trimmed value, or `None` when the value is blank.
pub(crate) fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

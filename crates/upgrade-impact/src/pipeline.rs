//! Run orchestration: diff, cross-reference, aggregate, render.
//!
//! Detectors run one after another and every event is fully matched before
//! the next one is read. Corpora are loaded once per run.

use std::path::Path;
use std::time::Instant;

use chrono::Local;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AuditConfig;
use crate::diff::DiffDetector;
use crate::errors::{AuditError, AuditResult};
use crate::models::{ArtifactKind, ChangeCategory, ChangeEvent, RunMode, TotalsRow};
use crate::report::render;
use crate::report::RunLog;
use crate::search::{
    CorpusSearcher, Loaded, ProgramTextSearcher, QueryBindingSearcher, ScriptSearcher,
    SearchRequest, SqlTextSearcher,
};
use crate::store::database::AuditDatabase;
use crate::store::ledger::Ledger;
use crate::store::totals::{self, GlobalSummary};

/// What one run did, also written out as the JSON export.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub report_id: String,
    pub mode: i64,
    pub started_at: String,
    pub finished_at: String,
    pub elapsed_ms: i64,
    /// Change events per category, in category order.
    pub events: IndexMap<ChangeCategory, usize>,
    pub matches: usize,
    pub invalid_terms: usize,
    /// Artifacts skipped because they could not be read or encoded.
    pub skipped: Vec<String>,
    pub corpus_revisions: IndexMap<ArtifactKind, String>,
    pub totals: IndexMap<ChangeCategory, TotalsRow>,
    pub sqr_counts: IndexMap<ChangeCategory, i64>,
    pub summary: Option<GlobalSummary>,
}

impl RunSummary {
    pub fn event_count(&self) -> usize {
        self.events.values().sum()
    }

    pub fn write_json(&self, path: &Path) -> AuditResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_string_pretty(self)?;
        std::fs::write(path, payload)?;
        Ok(())
    }
}

struct Corpora {
    structured: Vec<Box<dyn CorpusSearcher>>,
    scripts: Option<ScriptSearcher>,
}

impl Corpora {
    fn load(
        db: &AuditDatabase,
        config: &AuditConfig,
        mode: RunMode,
        summary: &mut RunSummary,
    ) -> AuditResult<Self> {
        let conn = db.conn();
        let mut structured: Vec<Box<dyn CorpusSearcher>> = Vec::new();
        if mode.searches_structured() {
            let sql = SqlTextSearcher::load(conn, &config.custom_project, config.max_encoded_text_bytes)?;
            structured.push(register(db, summary, ArtifactKind::Sql, sql)?);
            let pcode = ProgramTextSearcher::load(conn, &config.custom_project, config.max_encoded_text_bytes)?;
            structured.push(register(db, summary, ArtifactKind::PCode, pcode)?);
            let query = QueryBindingSearcher::load(conn, &config.custom_project)?;
            structured.push(register(db, summary, ArtifactKind::Query, query)?);
        }

        let scripts = if mode.searches_scripts() {
            let loaded = ScriptSearcher::load(
                &config.script_root,
                &config.script_pattern,
                config.script_workers,
            )?;
            info!(
                scripts = loaded.searcher.corpus_len(),
                root = %config.script_root.display(),
                revision = %loaded.revision,
                "script corpus ready"
            );
            note_load(db, summary, ArtifactKind::Sqr, &loaded.revision, loaded.skipped)?;
            Some(loaded.searcher)
        } else {
            None
        };

        Ok(Self {
            structured,
            scripts,
        })
    }
}

fn register<T: CorpusSearcher + 'static>(
    db: &AuditDatabase,
    summary: &mut RunSummary,
    kind: ArtifactKind,
    loaded: Loaded<T>,
) -> AuditResult<Box<dyn CorpusSearcher>> {
    info!(
        kind = %kind,
        artifacts = loaded.searcher.corpus_len(),
        revision = %loaded.revision,
        "corpus ready"
    );
    note_load(db, summary, kind, &loaded.revision, loaded.skipped)?;
    Ok(Box::new(loaded.searcher))
}

fn note_load(
    db: &AuditDatabase,
    summary: &mut RunSummary,
    kind: ArtifactKind,
    revision: &str,
    skipped: Vec<AuditError>,
) -> AuditResult<()> {
    db.set_meta(&format!("revision.{kind}"), revision)?;
    summary.corpus_revisions.insert(kind, revision.to_string());
    summary
        .skipped
        .extend(skipped.into_iter().map(|e| e.to_string()));
    Ok(())
}

/// Run one searcher and log its matches. An invalid term is counted and
/// reported back as `false` so the caller stops matching this event.
fn search_one(
    searcher: &dyn CorpusSearcher,
    request: &SearchRequest,
    ledger: &Ledger<'_>,
    log: &RunLog,
    summary: &mut RunSummary,
) -> AuditResult<bool> {
    match searcher.search(request, ledger) {
        Ok(outcome) => {
            for event in &outcome.matches {
                log.line(&event.describe())?;
            }
            summary.matches += outcome.matches.len();
            Ok(true)
        }
        Err(err @ AuditError::InvalidTerm { .. }) => {
            warn!(
                kind = %searcher.kind(),
                category = %request.category,
                error = %err,
                "skipping matching for event"
            );
            summary.invalid_terms += 1;
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

fn cross_reference(
    event: &ChangeEvent,
    corpora: &Corpora,
    report_id: &str,
    ledger: &Ledger<'_>,
    log: &RunLog,
    summary: &mut RunSummary,
) -> AuditResult<()> {
    if let Some(terms) = event.structured_terms() {
        if !corpora.structured.is_empty() {
            let request = SearchRequest::new(report_id, event.category, terms);
            for searcher in &corpora.structured {
                if !search_one(searcher.as_ref(), &request, ledger, log, summary)? {
                    return Ok(());
                }
            }
        }
    }
    if let (Some(scripts), Some(terms)) = (&corpora.scripts, event.script_terms()) {
        let request = SearchRequest::new(report_id, event.category, terms);
        search_one(scripts, &request, ledger, log, summary)?;
    }
    Ok(())
}

/// Execute a full run against an open catalog.
pub fn run_audit(
    db: &AuditDatabase,
    config: &AuditConfig,
    mode: RunMode,
    log: &RunLog,
) -> AuditResult<RunSummary> {
    let start = Instant::now();
    let conn = db.conn();
    let ledger = Ledger::new(conn);
    ledger.reset_run()?;

    let started_at = Local::now();
    let mut summary = RunSummary {
        report_id: config.report_id.clone(),
        mode: mode.code(),
        started_at: started_at.to_rfc3339(),
        ..Default::default()
    };
    db.set_meta("report_id", &config.report_id)?;
    db.set_meta("mode", &mode.code().to_string())?;
    db.set_meta("started_at", &summary.started_at)?;
    info!(report_id = %config.report_id, mode = mode.code(), "{}", mode.description());
    log.line(&render::timestamp_line("Start", &started_at))?;

    let corpora = Corpora::load(db, config, mode, &mut summary)?;

    for detector in DiffDetector::ALL {
        let events = detector.scan(conn)?;
        debug!(category = %detector.category(), events = events.len(), "detector finished");
        render::emit(log, &render::section_heading(detector))?;
        for event in &events {
            log.line(&event.describe())?;
            cross_reference(event, &corpora, &config.report_id, &ledger, log, &mut summary)?;
        }
        *summary.events.entry(detector.category()).or_default() += events.len();
    }

    summary.totals = totals::aggregate_totals(conn)?;
    summary.sqr_counts = totals::sqr_counts(&ledger)?;

    if mode.searches_structured() {
        let global = totals::global_summary(&ledger)?;
        render::emit(log, &render::summary_lines(&global))?;
        render::emit(log, &render::breakdown_lines(&summary.totals))?;
        summary.summary = Some(global);
    }
    if let Some(scripts) = &corpora.scripts {
        render::emit(log, &render::sqr_lines(scripts.discovered(), &summary.sqr_counts))?;
    }

    let finished_at = Local::now();
    summary.finished_at = finished_at.to_rfc3339();
    summary.elapsed_ms = start.elapsed().as_millis() as i64;
    db.set_meta("finished_at", &summary.finished_at)?;
    log.blank()?;
    log.line(&render::timestamp_line("End", &finished_at))?;
    log.flush()?;

    info!(
        events = summary.event_count(),
        matches = summary.matches,
        skipped = summary.skipped.len(),
        invalid_terms = summary.invalid_terms,
        elapsed_ms = summary.elapsed_ms,
        "audit finished"
    );
    Ok(summary)
}

//! External-script searcher: plain upper-case substring matching per line.
//!
//! Unlike the structured searchers this one is not boundary-safe: a script
//! line mentioning `PS_JOB_DATA` also matches record `JOB`.

use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use crate::errors::{AuditError, AuditResult};
use crate::models::{corpus_revision, ArtifactKind, MatchEvent};
use crate::search::encoder::PHYSICAL_TABLE_PREFIX;
use crate::search::filesystem::{discover_scripts, ScriptFile};
use crate::search::guards::{clamp_workers, truncate_excerpt};
use crate::search::{record_matches, CorpusSearcher, Loaded, SearchOutcome, SearchRequest};
use crate::store::ledger::Ledger;

struct LoadedScript {
    reference: String,
    /// Upper-cased lines.
    lines: Vec<String>,
}

pub struct ScriptSearcher {
    discovered: Vec<ScriptFile>,
    scripts: Vec<LoadedScript>,
    pool: Option<ThreadPool>,
}

impl ScriptSearcher {
    /// Discover and read every script below `root` matching `pattern`.
    pub fn load(root: &Path, pattern: &str, workers: usize) -> AuditResult<Loaded<Self>> {
        let discovery = discover_scripts(root, pattern)?;
        let mut skipped = discovery.skipped;
        let mut scripts = Vec::with_capacity(discovery.files.len());
        let mut revision_parts = Vec::new();

        for file in &discovery.files {
            let reference = file.path.display().to_string();
            match std::fs::read(&file.path) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes).to_uppercase();
                    revision_parts.push(reference.clone());
                    let lines = content.lines().map(str::to_string).collect();
                    revision_parts.push(content);
                    scripts.push(LoadedScript { reference, lines });
                }
                Err(err) => {
                    warn!(artifact = %reference, error = %err, "skipping unreadable script");
                    skipped.push(AuditError::corpus_access(reference, err));
                }
            }
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(clamp_workers(workers))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!(error = %err, "script pool unavailable; matching sequentially");
                None
            }
        };

        let revision = corpus_revision(revision_parts.iter().map(String::as_str));
        debug!(scripts = scripts.len(), %revision, "script corpus loaded");
        Ok(Loaded {
            searcher: Self {
                discovered: discovery.files,
                scripts,
                pool,
            },
            skipped,
            revision,
        })
    }

    /// Every file the walk found, readable or not, in walk order.
    pub fn discovered(&self) -> &[ScriptFile] {
        &self.discovered
    }
}

/// Matching lines of one script as (line number, excerpt).
fn scan_script(script: &LoadedScript, record: &str, field: Option<&str>) -> Vec<(i64, String)> {
    script
        .lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.contains(record) && field.map_or(true, |f| line.contains(f)))
        .map(|(i, line)| (i as i64 + 1, truncate_excerpt(line)))
        .collect()
}

impl CorpusSearcher for ScriptSearcher {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Sqr
    }

    fn corpus_len(&self) -> usize {
        self.scripts.len()
    }

    fn search(&self, request: &SearchRequest, ledger: &Ledger<'_>) -> AuditResult<SearchOutcome> {
        let record = request.record.trim();
        if record.is_empty() {
            return Err(AuditError::invalid_term(&request.record, "empty term"));
        }
        let record = format!("{PHYSICAL_TABLE_PREFIX}{}", record.to_uppercase());
        let field = match request.field.as_deref().map(str::trim) {
            Some("") => return Err(AuditError::invalid_term("", "empty term")),
            Some(f) => Some(f.to_uppercase()),
            None => None,
        };

        let scan = |script: &LoadedScript| scan_script(script, &record, field.as_deref());
        let per_script: Vec<Vec<(i64, String)>> = match &self.pool {
            Some(pool) => pool.install(|| self.scripts.par_iter().map(scan).collect()),
            None => self.scripts.iter().map(scan).collect(),
        };

        let matches = self
            .scripts
            .iter()
            .zip(per_script)
            .flat_map(|(script, hits)| {
                hits.into_iter().map(move |(line, text)| {
                    MatchEvent::new(request.category, ArtifactKind::Sqr, script.reference.clone())
                        .at_line(line, text)
                })
            })
            .collect();
        record_matches(request, ledger, matches)
    }
}

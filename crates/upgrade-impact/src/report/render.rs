//! Report text. Builders return lines; [`emit`] writes them to the run log.

use chrono::{DateTime, TimeZone};
use indexmap::IndexMap;

use crate::diff::DiffDetector;
use crate::errors::AuditResult;
use crate::models::{ChangeCategory, TotalsRow};
use crate::report::run_log::RunLog;
use crate::search::filesystem::ScriptFile;
use crate::store::totals::GlobalSummary;

pub fn emit(log: &RunLog, lines: &[String]) -> AuditResult<()> {
    for line in lines {
        log.line(line)?;
    }
    Ok(())
}

pub fn timestamp_line<Tz>(label: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{label} Date/Time : {}", at.to_rfc2822())
}

pub fn section_heading(detector: DiffDetector) -> Vec<String> {
    vec![String::new(), detector.heading().to_string()]
}

pub fn summary_lines(summary: &GlobalSummary) -> Vec<String> {
    const IMPACTED: &str = "impacted by changes in the new software release.";
    vec![
        String::new(),
        "Impact Analysis - Summary:".to_string(),
        format!("{} PeopleCode objects are {IMPACTED}", summary.pcode_objects),
        format!("{} SQL objects are {IMPACTED}", summary.sql_objects),
        format!("{} Queries are {IMPACTED}", summary.query_objects),
        format!("{} Private Queries are {IMPACTED}", summary.private_queries),
    ]
}

pub fn breakdown_lines(totals: &IndexMap<ChangeCategory, TotalsRow>) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "Objects impacted by various type of changes:".to_string(),
    ];
    for category in ChangeCategory::REPORTABLE {
        let row = totals.get(&category).cloned().unwrap_or_default();
        lines.push(format!(
            "{} => PCode: {} SQL: {} Queries: {}",
            category.display_name(),
            row.pcode_objects,
            row.sql_objects,
            row.query_objects
        ));
    }
    lines
}

pub fn sqr_lines(discovered: &[ScriptFile], counts: &IndexMap<ChangeCategory, i64>) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "SQR Impact Analysis - Summary:".to_string(),
        format!("Number of custom SQRs found: {}", discovered.len()),
        String::new(),
        "Found the following custom SQRs:".to_string(),
    ];
    lines.extend(
        discovered
            .iter()
            .map(|file| format!("{} - size {} k", file.path.display(), file.size_kib())),
    );
    lines.push(String::new());
    lines.push("SQR Impact Analysis - Detail:".to_string());
    for category in ChangeCategory::REPORTABLE {
        lines.push(format!(
            "{} => {}",
            category.display_name(),
            counts.get(&category).copied().unwrap_or_default()
        ));
    }
    lines
}

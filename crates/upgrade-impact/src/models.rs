//! Shared typed models used across the diff, search, storage and report layers.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::{AuditError, AuditResult};

// ---------------------------------------------------------------------------
// Record kinds
// ---------------------------------------------------------------------------

/// Record kind stored as `rectype` in both schema snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RecordKind {
    Table,
    View,
    DerivedWork,
    SubRecord,
    DynamicView,
    QueryView,
    TemporaryTable,
}

/// Code 4 is reserved and never assigned.
const RECORD_KINDS: &[(i64, RecordKind, &str)] = &[
    (0, RecordKind::Table, "Table"),
    (1, RecordKind::View, "View"),
    (2, RecordKind::DerivedWork, "Derived/Work Record"),
    (3, RecordKind::SubRecord, "SubRecord"),
    (5, RecordKind::DynamicView, "Dynamic View"),
    (6, RecordKind::QueryView, "Query View"),
    (7, RecordKind::TemporaryTable, "Temporary Table"),
];

pub const UNKNOWN_RECORD_KIND_LABEL: &str = "Unknown Record Type";

impl RecordKind {
    pub fn from_code(code: i64) -> Option<Self> {
        RECORD_KINDS
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, kind, _)| *kind)
    }

    pub fn code(self) -> i64 {
        RECORD_KINDS
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .map(|(c, _, _)| *c)
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        RECORD_KINDS
            .iter()
            .find(|(_, kind, _)| *kind == self)
            .map(|(_, _, label)| *label)
            .unwrap_or(UNKNOWN_RECORD_KIND_LABEL)
    }
}

/// Label for an optional kind, falling back to the unknown label.
pub fn record_kind_label(kind: Option<RecordKind>) -> &'static str {
    kind.map(RecordKind::label).unwrap_or(UNKNOWN_RECORD_KIND_LABEL)
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    Character,
    LongCharacter,
    Number,
    SignedNumber,
    Date,
    Time,
    DateTime,
    Image,
    ImageReference,
}

const FIELD_TYPES: &[(i64, FieldType)] = &[
    (0, FieldType::Character),
    (1, FieldType::LongCharacter),
    (2, FieldType::Number),
    (3, FieldType::SignedNumber),
    (4, FieldType::Date),
    (5, FieldType::Time),
    (6, FieldType::DateTime),
    (8, FieldType::Image),
    (9, FieldType::ImageReference),
];

impl FieldType {
    pub fn from_code(code: i64) -> Option<Self> {
        FIELD_TYPES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, t)| *t)
    }

    pub fn code(self) -> i64 {
        FIELD_TYPES
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(c, _)| *c)
            .unwrap_or_default()
    }

    /// Only character types have a length that can grow without a type change.
    pub fn is_character(self) -> bool {
        matches!(self, FieldType::Character | FieldType::LongCharacter)
    }
}

// ---------------------------------------------------------------------------
// Schema objects
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Snapshot {
    Old,
    New,
}

/// A record, view, or other record-like object read from one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaObject {
    pub name: String,
    /// `None` when the snapshot carries a code outside the lookup table.
    pub kind: Option<RecordKind>,
    pub snapshot: Snapshot,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, kind_code: i64, snapshot: Snapshot) -> Self {
        Self {
            name: name.into(),
            kind: RecordKind::from_code(kind_code),
            snapshot,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FieldRef {
    pub record: String,
    pub field: String,
}

impl FieldRef {
    pub fn new(record: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

/// A field-catalog entry, independent of the records that use it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: Option<FieldType>,
}

// ---------------------------------------------------------------------------
// Change categories
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChangeCategory {
    #[serde(rename = "Get-Obsolete-Records")]
    ObsoleteRecord,
    #[serde(rename = "Get-Obsolete-Fields")]
    ObsoleteField,
    #[serde(rename = "Get-New-Records")]
    NewRecord,
    #[serde(rename = "Get-New-Fields")]
    NewField,
    #[serde(rename = "Get-Records-Now-Views")]
    RecordNowView,
    #[serde(rename = "Get-Views-Now-Records")]
    ViewNowRecord,
    #[serde(rename = "Get-Field-Length-Changes")]
    FieldLengthChange,
    #[serde(rename = "Get-Renamed-Records")]
    RenamedRecord,
    #[serde(rename = "Get-Renamed-Objects")]
    RenamedField,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 9] = [
        ChangeCategory::ObsoleteRecord,
        ChangeCategory::ObsoleteField,
        ChangeCategory::NewRecord,
        ChangeCategory::NewField,
        ChangeCategory::RecordNowView,
        ChangeCategory::ViewNowRecord,
        ChangeCategory::FieldLengthChange,
        ChangeCategory::RenamedRecord,
        ChangeCategory::RenamedField,
    ];

    /// Categories listed in the per-category breakdowns, in print order.
    pub const REPORTABLE: [ChangeCategory; 7] = [
        ChangeCategory::NewField,
        ChangeCategory::ObsoleteField,
        ChangeCategory::ObsoleteRecord,
        ChangeCategory::RecordNowView,
        ChangeCategory::ViewNowRecord,
        ChangeCategory::RenamedField,
        ChangeCategory::RenamedRecord,
    ];

    /// Stored verbatim in the ledger and totals; must never change.
    pub fn label(self) -> &'static str {
        match self {
            ChangeCategory::ObsoleteRecord => "Get-Obsolete-Records",
            ChangeCategory::ObsoleteField => "Get-Obsolete-Fields",
            ChangeCategory::NewRecord => "Get-New-Records",
            ChangeCategory::NewField => "Get-New-Fields",
            ChangeCategory::RecordNowView => "Get-Records-Now-Views",
            ChangeCategory::ViewNowRecord => "Get-Views-Now-Records",
            ChangeCategory::FieldLengthChange => "Get-Field-Length-Changes",
            ChangeCategory::RenamedRecord => "Get-Renamed-Records",
            ChangeCategory::RenamedField => "Get-Renamed-Objects",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ChangeCategory::ObsoleteRecord => "Obsolete records",
            ChangeCategory::ObsoleteField => "Obsolete fields",
            ChangeCategory::NewRecord => "New records",
            ChangeCategory::NewField => "New fields added to existing tables",
            ChangeCategory::RecordNowView => "Records now Views",
            ChangeCategory::ViewNowRecord => "Views now Records",
            ChangeCategory::FieldLengthChange => "Field length changes",
            ChangeCategory::RenamedRecord => "Renamed Records",
            ChangeCategory::RenamedField => "Renamed Objects",
        }
    }

    /// New records cannot be referenced by existing custom code, and a wider
    /// character field breaks nothing that reads it.
    pub fn drives_search(self) -> bool {
        !matches!(
            self,
            ChangeCategory::NewRecord | ChangeCategory::FieldLengthChange
        )
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ChangeTarget {
    Record(SchemaObject),
    Field {
        field: FieldRef,
        record_kind: Option<RecordKind>,
    },
    FieldDefinition(FieldDefinition),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LengthChange {
    pub old: i64,
    pub new: i64,
}

/// The record and optional field an event is searched by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchTerms {
    pub record: String,
    pub field: Option<String>,
}

/// One structural delta between the old and new snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub category: ChangeCategory,
    pub target: ChangeTarget,
    /// New name for renames.
    pub renamed_to: Option<String>,
    pub length: Option<LengthChange>,
}

impl ChangeEvent {
    pub fn record(category: ChangeCategory, object: SchemaObject) -> Self {
        Self {
            category,
            target: ChangeTarget::Record(object),
            renamed_to: None,
            length: None,
        }
    }

    pub fn field(category: ChangeCategory, field: FieldRef, record_kind: Option<RecordKind>) -> Self {
        Self {
            category,
            target: ChangeTarget::Field { field, record_kind },
            renamed_to: None,
            length: None,
        }
    }

    pub fn with_rename(mut self, new_name: impl Into<String>) -> Self {
        self.renamed_to = Some(new_name.into());
        self
    }

    /// Name of the record the event is about, if it is record-scoped.
    pub fn record_name(&self) -> Option<&str> {
        match &self.target {
            ChangeTarget::Record(obj) => Some(&obj.name),
            ChangeTarget::Field { field, .. } => Some(&field.record),
            ChangeTarget::FieldDefinition(_) => None,
        }
    }

    /// Terms for the SQL, program and query searchers.
    pub fn structured_terms(&self) -> Option<SearchTerms> {
        if !self.category.drives_search() {
            return None;
        }
        match &self.target {
            ChangeTarget::Record(obj) => Some(SearchTerms {
                record: obj.name.clone(),
                field: None,
            }),
            ChangeTarget::Field { field, .. } => Some(SearchTerms {
                record: field.record.clone(),
                field: Some(field.field.clone()),
            }),
            ChangeTarget::FieldDefinition(_) => None,
        }
    }

    /// Terms for the script searcher. A new field only matters to scripts
    /// through inserts and updates on its record, so its field is dropped.
    pub fn script_terms(&self) -> Option<SearchTerms> {
        let mut terms = self.structured_terms()?;
        if self.category == ChangeCategory::NewField {
            terms.field = None;
        }
        Some(terms)
    }

    /// One-line human description used by the run log.
    pub fn describe(&self) -> String {
        match (&self.category, &self.target) {
            (ChangeCategory::RenamedRecord, ChangeTarget::Record(obj)) => format!(
                "Record {} renamed to {}",
                obj.name,
                self.renamed_to.as_deref().unwrap_or_default()
            ),
            (ChangeCategory::RenamedField, ChangeTarget::Field { field, .. }) => format!(
                "Field: {field} renamed to {}.{}",
                field.record,
                self.renamed_to.as_deref().unwrap_or_default()
            ),
            (ChangeCategory::RecordNowView | ChangeCategory::ViewNowRecord, ChangeTarget::Record(obj)) => {
                obj.name.clone()
            }
            (category, ChangeTarget::Record(obj)) => match obj.kind {
                Some(kind) => {
                    let verb = if *category == ChangeCategory::NewRecord {
                        "New"
                    } else {
                        "Obsolete"
                    };
                    format!("{} - {verb} {}", obj.name, kind.label())
                }
                None => format!("{} - {UNKNOWN_RECORD_KIND_LABEL}", obj.name),
            },
            (category, ChangeTarget::Field { field, record_kind }) => {
                let verb = if *category == ChangeCategory::NewField {
                    "Field added to"
                } else {
                    "Field removed from"
                };
                format!("{field} - {verb} {}", record_kind_label(*record_kind))
            }
            (_, ChangeTarget::FieldDefinition(def)) => match self.length {
                Some(len) => format!("{} - Changed from {} to {}", def.name, len.old, len.new),
                None => def.name.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Matches and totals
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ArtifactKind {
    #[serde(rename = "SQR")]
    Sqr,
    #[serde(rename = "SQL")]
    Sql,
    #[serde(rename = "PCode")]
    PCode,
    #[serde(rename = "Query")]
    Query,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Sqr => "SQR",
            ArtifactKind::Sql => "SQL",
            ArtifactKind::PCode => "PCode",
            ArtifactKind::Query => "Query",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "SQR" => Some(ArtifactKind::Sqr),
            "SQL" => Some(ArtifactKind::Sql),
            "PCode" => Some(ArtifactKind::PCode),
            "Query" => Some(ArtifactKind::Query),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where inside a script file a match was found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineLocator {
    pub line_number: i64,
    pub text: String,
}

/// One confirmed occurrence of a search term inside one artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchEvent {
    pub category: ChangeCategory,
    pub kind: ArtifactKind,
    pub reference: String,
    pub locator: Option<LineLocator>,
}

impl MatchEvent {
    pub fn new(category: ChangeCategory, kind: ArtifactKind, reference: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            reference: reference.into(),
            locator: None,
        }
    }

    pub fn at_line(mut self, line_number: i64, text: impl Into<String>) -> Self {
        self.locator = Some(LineLocator {
            line_number,
            text: text.into(),
        });
        self
    }

    /// Run-log line for this match.
    pub fn describe(&self) -> String {
        match &self.locator {
            Some(loc) => format!(
                "            Found in {}: {} => line: {} - {}",
                self.kind, self.reference, loc.line_number, loc.text
            ),
            None => format!("            Found in {}: {}", self.kind, self.reference),
        }
    }
}

/// Distinct artifact counts for one change category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TotalsRow {
    pub pcode_objects: i64,
    pub sql_objects: i64,
    pub query_objects: i64,
}

// ---------------------------------------------------------------------------
// Run mode
// ---------------------------------------------------------------------------

/// Which stages a run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunMode {
    DiffOnly = 1,
    Scripts = 2,
    Structured = 3,
    Full = 4,
}

impl RunMode {
    pub fn from_code(code: i64) -> AuditResult<Self> {
        match code {
            1 => Ok(RunMode::DiffOnly),
            2 => Ok(RunMode::Scripts),
            3 => Ok(RunMode::Structured),
            4 => Ok(RunMode::Full),
            other => Err(AuditError::Config(format!(
                "invalid report option {other}; expected 1, 2, 3 or 4"
            ))),
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn searches_structured(self) -> bool {
        matches!(self, RunMode::Structured | RunMode::Full)
    }

    pub fn searches_scripts(self) -> bool {
        matches!(self, RunMode::Scripts | RunMode::Full)
    }

    pub fn description(self) -> &'static str {
        match self {
            RunMode::DiffOnly => "List structure changes only",
            RunMode::Scripts => "Run audit only for SQRs",
            RunMode::Structured => "Run audit only for online objects",
            RunMode::Full => "Run full report",
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// SHA-256 hex digest over a sequence of corpus parts, in order.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn corpus_revision<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_lookup_skips_reserved_code() {
        assert_eq!(RecordKind::from_code(0), Some(RecordKind::Table));
        assert_eq!(RecordKind::from_code(7), Some(RecordKind::TemporaryTable));
        assert_eq!(RecordKind::from_code(4), None);
        assert_eq!(RecordKind::DynamicView.code(), 5);
        assert_eq!(RecordKind::DerivedWork.label(), "Derived/Work Record");
    }

    #[test]
    fn test_category_labels_round_trip() {
        for category in ChangeCategory::ALL {
            assert_eq!(ChangeCategory::from_label(category.label()), Some(category));
        }
        assert_eq!(ChangeCategory::RenamedField.display_name(), "Renamed Objects");
    }

    #[test]
    fn test_serialized_category_is_label() {
        let json = serde_json::to_string(&ChangeCategory::ObsoleteRecord).unwrap();
        assert_eq!(json, "\"Get-Obsolete-Records\"");
    }

    #[test]
    fn test_new_field_drops_field_for_scripts_only() {
        let event = ChangeEvent::field(
            ChangeCategory::NewField,
            FieldRef::new("JOB", "NEW_FLD"),
            Some(RecordKind::Table),
        );
        assert_eq!(
            event.structured_terms().unwrap().field.as_deref(),
            Some("NEW_FLD")
        );
        assert_eq!(event.script_terms().unwrap().field, None);
    }

    #[test]
    fn test_length_change_is_not_searched() {
        let event = ChangeEvent {
            category: ChangeCategory::FieldLengthChange,
            target: ChangeTarget::FieldDefinition(FieldDefinition {
                name: "DESCR".into(),
                field_type: Some(FieldType::Character),
            }),
            renamed_to: None,
            length: Some(LengthChange { old: 10, new: 20 }),
        };
        assert!(event.structured_terms().is_none());
        assert_eq!(event.describe(), "DESCR - Changed from 10 to 20");
    }

    #[test]
    fn test_describe_uses_kind_labels() {
        let obsolete = ChangeEvent::record(
            ChangeCategory::ObsoleteRecord,
            SchemaObject::new("R", 0, Snapshot::Old),
        );
        assert_eq!(obsolete.describe(), "R - Obsolete Table");

        let unknown = ChangeEvent::record(
            ChangeCategory::NewRecord,
            SchemaObject::new("X", 4, Snapshot::New),
        );
        assert_eq!(unknown.describe(), "X - Unknown Record Type");

        let renamed = ChangeEvent::field(
            ChangeCategory::RenamedField,
            FieldRef::new("R1", "OLD"),
            None,
        )
        .with_rename("NEW");
        assert_eq!(renamed.describe(), "Field: R1.OLD renamed to R1.NEW");
    }

    #[test]
    fn test_run_mode_range() {
        assert_eq!(RunMode::from_code(3).unwrap(), RunMode::Structured);
        assert!(RunMode::from_code(0).is_err());
        assert!(RunMode::from_code(5).is_err());
        assert!(RunMode::Full.searches_scripts() && RunMode::Full.searches_structured());
        assert!(!RunMode::DiffOnly.searches_scripts());
    }

    #[test]
    fn test_corpus_revision_is_length_prefixed() {
        assert_ne!(corpus_revision(["ab", "c"]), corpus_revision(["a", "bc"]));
        assert_eq!(corpus_revision(["x"]), corpus_revision(["x"]));
    }
}

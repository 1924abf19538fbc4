//! Schema diff scanner: one detector per change category, each a single query
//! over the new catalog and the attached old snapshot.

pub mod fields;
pub mod records;
pub mod renames;

use rusqlite::Connection;

use crate::errors::AuditResult;
use crate::models::{ChangeCategory, ChangeEvent, RecordKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffDetector {
    ObsoleteRecords,
    ObsoleteFields,
    NewRecords,
    NewFields,
    RecordsNowViews,
    ViewsNowRecords,
    FieldLengthChanges,
    RenamedRecords,
    RenamedFields,
}

impl DiffDetector {
    /// Run order.
    pub const ALL: [DiffDetector; 9] = [
        DiffDetector::ObsoleteRecords,
        DiffDetector::ObsoleteFields,
        DiffDetector::NewRecords,
        DiffDetector::NewFields,
        DiffDetector::RecordsNowViews,
        DiffDetector::ViewsNowRecords,
        DiffDetector::FieldLengthChanges,
        DiffDetector::RenamedRecords,
        DiffDetector::RenamedFields,
    ];

    pub fn category(self) -> ChangeCategory {
        match self {
            DiffDetector::ObsoleteRecords => ChangeCategory::ObsoleteRecord,
            DiffDetector::ObsoleteFields => ChangeCategory::ObsoleteField,
            DiffDetector::NewRecords => ChangeCategory::NewRecord,
            DiffDetector::NewFields => ChangeCategory::NewField,
            DiffDetector::RecordsNowViews => ChangeCategory::RecordNowView,
            DiffDetector::ViewsNowRecords => ChangeCategory::ViewNowRecord,
            DiffDetector::FieldLengthChanges => ChangeCategory::FieldLengthChange,
            DiffDetector::RenamedRecords => ChangeCategory::RenamedRecord,
            DiffDetector::RenamedFields => ChangeCategory::RenamedField,
        }
    }

    /// Section heading printed before the detector's events.
    pub fn heading(self) -> &'static str {
        match self {
            DiffDetector::ObsoleteRecords => {
                "The following records are obsolete after the upgrade :"
            }
            DiffDetector::ObsoleteFields => "The following fields are obsolete after the upgrade :",
            DiffDetector::NewRecords => {
                "The following new tables, views, derived work records and subrecords were delivered\n \
                 (Note: Renamed objects are listed in a separate section) :"
            }
            DiffDetector::NewFields => {
                "The following fields were added to existing tables\n \
                 (Note: Renamed fields are listed in a separate section) :"
            }
            DiffDetector::RecordsNowViews => {
                "The following records (old release) have been changed to views (new release) :"
            }
            DiffDetector::ViewsNowRecords => {
                "The following views (old release) have been changed to records (new release) :"
            }
            DiffDetector::FieldLengthChanges => "The following field lengths have changed :",
            DiffDetector::RenamedRecords => "The following records have been renamed :",
            DiffDetector::RenamedFields => "The following objects have been renamed :",
        }
    }

    pub fn scan(self, conn: &Connection) -> AuditResult<Vec<ChangeEvent>> {
        match self {
            DiffDetector::ObsoleteRecords => records::obsolete_records(conn),
            DiffDetector::ObsoleteFields => fields::obsolete_fields(conn),
            DiffDetector::NewRecords => records::new_records(conn),
            DiffDetector::NewFields => fields::new_fields(conn),
            DiffDetector::RecordsNowViews => records::kind_swaps(
                conn,
                RecordKind::Table,
                RecordKind::View,
                ChangeCategory::RecordNowView,
            ),
            DiffDetector::ViewsNowRecords => records::kind_swaps(
                conn,
                RecordKind::View,
                RecordKind::Table,
                ChangeCategory::ViewNowRecord,
            ),
            DiffDetector::FieldLengthChanges => fields::length_changes(conn),
            DiffDetector::RenamedRecords => renames::renamed_records(conn),
            DiffDetector::RenamedFields => renames::renamed_fields(conn),
        }
    }
}

/// Every detector's events, in run order.
pub fn scan_all(conn: &Connection) -> AuditResult<Vec<(DiffDetector, Vec<ChangeEvent>)>> {
    DiffDetector::ALL
        .into_iter()
        .map(|detector| Ok((detector, detector.scan(conn)?)))
        .collect()
}

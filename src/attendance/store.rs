// Storage port for attendance data.
//
// The aggregator and the mark flow only talk to this trait. `MySqlAttendanceStore`
// backs it in production, `InMemoryAttendanceStore` in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::attendance::{
    AttendanceEntry, AttendanceSlot, AttendanceStatus, DailyEntry, NewAttendance,
};
use crate::model::student::{RosterStudent, StudentProfile};

#[derive(Debug, Clone, Display)]
pub enum StorageError {
    /// Connection, pool or protocol failure; aborts the current operation.
    #[display(fmt = "storage unavailable: {}", _0)]
    Unavailable(String),

    #[display(fmt = "undecodable row: {}", _0)]
    Decode(String),
}

impl std::error::Error for StorageError {}

/// Outcome of a single row in `insert_entries`.
pub type RowResult = Result<(), String>;

/// Narrowing filter for `entries`. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub student_id: Option<u64>,
    pub class_id: Option<u64>,
    pub section_id: Option<u64>,
    /// Closed interval.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// `Some(None)` selects rows without a subject.
    pub subject_id: Option<Option<u64>>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &AttendanceEntry) -> bool {
        self.student_id.is_none_or(|id| entry.student_id == id)
            && self.class_id.is_none_or(|id| entry.class_id == id)
            && self.section_id.is_none_or(|id| entry.section_id == id)
            && self
                .date_range
                .is_none_or(|(start, end)| (start..=end).contains(&entry.attendance_date))
            && self.subject_id.is_none_or(|subject| entry.subject_id == subject)
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Number of rows already marked for exactly this slot.
    async fn count_for_slot(&self, slot: &AttendanceSlot) -> Result<u64, StorageError>;

    /// Inserts rows one at a time. Row-level rejections come back in the
    /// returned vector (same order as `rows`); only failures that abort the
    /// whole batch are returned as `Err`, and then nothing is kept.
    async fn insert_entries(&self, rows: &[NewAttendance]) -> Result<Vec<RowResult>, StorageError>;

    /// Rows matching `filter`, newest date first.
    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<AttendanceEntry>, StorageError>;

    /// Active students of a class/section, ordered by first then last name.
    async fn roster(&self, class_id: u64, section_id: u64) -> Result<Vec<RosterStudent>, StorageError>;

    async fn daily_entries(
        &self,
        date: NaiveDate,
        class_id: Option<u64>,
        section_id: Option<u64>,
    ) -> Result<Vec<DailyEntry>, StorageError>;

    /// Returns `false` when no row has this id.
    async fn update_entry(
        &self,
        id: u64,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> Result<bool, StorageError>;

    async fn student_profile(&self, student_id: u64) -> Result<Option<StudentProfile>, StorageError>;

    async fn class_section_names(
        &self,
        class_id: u64,
        section_id: u64,
    ) -> Result<(Option<String>, Option<String>), StorageError>;

    async fn current_academic_year(&self) -> Result<Option<u64>, StorageError>;
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Attendance state of one student for one slot.
#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
}

/// The (class, section, subject, date) tuple a batch is marked for.
///
/// `subject_id: None` is its own slot: it never matches an entry that
/// carries a subject, and vice versa.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AttendanceSlot {
    #[schema(example = 4)]
    pub class_id: u64,
    #[schema(example = 2)]
    pub section_id: u64,
    #[schema(example = 7, nullable = true)]
    pub subject_id: Option<u64>,
    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub attendance_date: NaiveDate,
}

/// Fixed context shared by every row of one batch.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MarkContext {
    pub slot: AttendanceSlot,
    pub academic_year_id: Option<u64>,
    /// Teacher id of the marker; admins mark anonymously.
    pub marked_by: Option<u64>,
}

/// A persisted attendance row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceEntry {
    pub id: u64,
    pub student_id: u64,
    pub class_id: u64,
    pub section_id: u64,
    pub subject_id: Option<u64>,
    /// Absent for whole-day rows or a removed subject.
    #[schema(example = "Mathematics")]
    pub subject_name: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub attendance_date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub marked_by: Option<u64>,
    pub academic_year_id: Option<u64>,
}

impl AttendanceEntry {
    pub fn slot(&self) -> AttendanceSlot {
        AttendanceSlot {
            class_id: self.class_id,
            section_id: self.section_id,
            subject_id: self.subject_id,
            attendance_date: self.attendance_date,
        }
    }
}

/// A row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    pub student_id: u64,
    pub context: MarkContext,
    pub status: AttendanceStatus,
}

/// Entry joined with its class and section names, input of the daily report.
#[derive(Debug, Clone)]
pub struct DailyEntry {
    pub student_id: u64,
    pub class_id: u64,
    pub class_name: String,
    pub section_id: u64,
    pub section_name: String,
    pub status: AttendanceStatus,
}

// Mark flow: validation, duplicate guard and batch insert.
//
// The guard and the insert are two separate calls against the store, so two
// submissions racing for the same slot can both pass the guard. The unique
// index on `attendance` turns the loser's rows into `Rejected` skips.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;
use utoipa::ToSchema;

use super::error::AttendanceError;
use super::store::AttendanceStore;
use crate::model::attendance::{AttendanceSlot, AttendanceStatus, MarkContext, NewAttendance};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The submitted value is not one of the four statuses.
    InvalidStatus(String),
    /// Storage refused the row, e.g. a stray duplicate.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SkippedMark {
    pub student_id: u64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub inserted: Vec<u64>,
    pub skipped: Vec<SkippedMark>,
}

impl BatchOutcome {
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }
}

/// True iff at least one row exists for exactly this slot.
pub async fn check_duplicate<S>(store: &S, slot: &AttendanceSlot) -> Result<bool, AttendanceError>
where
    S: AttendanceStore + ?Sized,
{
    Ok(store.count_for_slot(slot).await? > 0)
}

/// Inserts one row per student. Unknown statuses and rows the store rejects
/// are skipped; only a store-wide failure fails the call.
pub async fn insert_batch<S>(
    store: &S,
    context: MarkContext,
    statuses: &BTreeMap<u64, String>,
) -> Result<BatchOutcome, AttendanceError>
where
    S: AttendanceStore + ?Sized,
{
    let mut outcome = BatchOutcome::default();
    let mut rows = Vec::with_capacity(statuses.len());

    for (&student_id, raw) in statuses {
        match AttendanceStatus::from_str(raw) {
            Ok(status) => rows.push(NewAttendance {
                student_id,
                context,
                status,
            }),
            Err(_) => outcome.skipped.push(SkippedMark {
                student_id,
                reason: SkipReason::InvalidStatus(raw.clone()),
            }),
        }
    }

    if rows.is_empty() {
        return Ok(outcome);
    }

    let results = store.insert_entries(&rows).await?;
    for (row, result) in rows.iter().zip(results) {
        match result {
            Ok(()) => outcome.inserted.push(row.student_id),
            Err(message) => {
                tracing::warn!(student_id = row.student_id, %message, "Attendance row skipped");
                outcome.skipped.push(SkippedMark {
                    student_id: row.student_id,
                    reason: SkipReason::Rejected(message),
                });
            }
        }
    }

    Ok(outcome)
}

/// Full mark flow for one slot.
pub async fn mark_attendance<S>(
    store: &S,
    context: MarkContext,
    statuses: &BTreeMap<u64, String>,
) -> Result<BatchOutcome, AttendanceError>
where
    S: AttendanceStore + ?Sized,
{
    let slot = context.slot;
    if slot.class_id == 0 || slot.section_id == 0 || statuses.is_empty() {
        return Err(AttendanceError::validation(
            "Class, section, and attendance data are required.",
        ));
    }

    if check_duplicate(store, &slot).await? {
        return Err(AttendanceError::Conflict(slot));
    }

    let outcome = insert_batch(store, context, statuses).await?;
    tracing::info!(
        class_id = slot.class_id,
        section_id = slot.section_id,
        date = %slot.attendance_date,
        inserted = outcome.inserted_count(),
        skipped = outcome.skipped.len(),
        "Attendance marked"
    );
    Ok(outcome)
}

/// Edit flow for a single existing row.
pub async fn update_entry<S>(
    store: &S,
    id: u64,
    raw_status: &str,
    remarks: Option<&str>,
) -> Result<(), AttendanceError>
where
    S: AttendanceStore + ?Sized,
{
    let status = AttendanceStatus::from_str(raw_status).map_err(|_| {
        AttendanceError::validation("Invalid status. Allowed: present, absent, late, half_day")
    })?;

    if !store.update_entry(id, status, remarks).await? {
        return Err(AttendanceError::NotFound(
            "Attendance record not found".to_string(),
        ));
    }
    Ok(())
}

// In-memory attendance store.
//
// Mirrors the MySQL store closely enough to exercise the mark flow and the
// reports without a database, including the unique index on
// (student, class, section, subject-or-null, date).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::store::{AttendanceStore, EntryFilter, RowResult, StorageError};
use crate::model::attendance::{
    AttendanceEntry, AttendanceSlot, AttendanceStatus, DailyEntry, NewAttendance,
};
use crate::model::student::{RosterStudent, StudentProfile};

#[derive(Debug, Clone)]
struct Enrollment {
    class_id: u64,
    section_id: u64,
    student: RosterStudent,
    is_active: bool,
}

#[derive(Default)]
pub struct InMemoryAttendanceStore {
    rows: Mutex<Vec<AttendanceEntry>>,
    enrollments: Vec<Enrollment>,
    class_names: HashMap<u64, String>,
    section_names: HashMap<u64, String>,
    subject_names: HashMap<u64, String>,
    current_academic_year: Option<u64>,
    is_offline: bool,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class_id: u64, name: &str) -> Self {
        self.class_names.insert(class_id, name.to_string());
        self
    }

    pub fn with_section(mut self, section_id: u64, name: &str) -> Self {
        self.section_names.insert(section_id, name.to_string());
        self
    }

    pub fn with_subject(mut self, subject_id: u64, name: &str) -> Self {
        self.subject_names.insert(subject_id, name.to_string());
        self
    }

    pub fn with_student(mut self, class_id: u64, section_id: u64, student: RosterStudent) -> Self {
        self.enrollments.push(Enrollment {
            class_id,
            section_id,
            student,
            is_active: true,
        });
        self
    }

    pub fn with_inactive_student(mut self, class_id: u64, section_id: u64, student: RosterStudent) -> Self {
        self.enrollments.push(Enrollment {
            class_id,
            section_id,
            student,
            is_active: false,
        });
        self
    }

    pub fn with_current_academic_year(mut self, id: u64) -> Self {
        self.current_academic_year = Some(id);
        self
    }

    pub fn toggle_offline(&mut self) {
        self.is_offline = !self.is_offline;
    }

    fn online(&self) -> Result<(), StorageError> {
        if self.is_offline {
            return Err(StorageError::Unavailable(
                "attendance store offline".to_string(),
            ));
        }
        Ok(())
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<AttendanceEntry>> {
        self.rows.lock().expect("attendance rows poisoned")
    }

    fn class_name(&self, class_id: u64) -> Option<String> {
        self.class_names.get(&class_id).cloned()
    }

    fn section_name(&self, section_id: u64) -> Option<String> {
        self.section_names.get(&section_id).cloned()
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn count_for_slot(&self, slot: &AttendanceSlot) -> Result<u64, StorageError> {
        self.online()?;
        Ok(self.rows().iter().filter(|e| e.slot() == *slot).count() as u64)
    }

    async fn insert_entries(&self, new_rows: &[NewAttendance]) -> Result<Vec<RowResult>, StorageError> {
        self.online()?;
        let mut rows = self.rows();
        let mut results = Vec::with_capacity(new_rows.len());

        for new in new_rows {
            let slot = new.context.slot;
            let taken = rows
                .iter()
                .any(|e| e.student_id == new.student_id && e.slot() == slot);
            if taken {
                results.push(Err(format!(
                    "Duplicate entry for student {} on {}",
                    new.student_id, slot.attendance_date
                )));
                continue;
            }

            let id = rows.len() as u64 + 1;
            rows.push(AttendanceEntry {
                id,
                student_id: new.student_id,
                class_id: slot.class_id,
                section_id: slot.section_id,
                subject_id: slot.subject_id,
                subject_name: slot
                    .subject_id
                    .and_then(|id| self.subject_names.get(&id).cloned()),
                attendance_date: slot.attendance_date,
                status: new.status,
                remarks: None,
                marked_by: new.context.marked_by,
                academic_year_id: new.context.academic_year_id,
            });
            results.push(Ok(()));
        }

        Ok(results)
    }

    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<AttendanceEntry>, StorageError> {
        self.online()?;
        let mut items: Vec<AttendanceEntry> = self
            .rows()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.attendance_date.cmp(&a.attendance_date));
        Ok(items)
    }

    async fn roster(&self, class_id: u64, section_id: u64) -> Result<Vec<RosterStudent>, StorageError> {
        self.online()?;
        let mut students: Vec<RosterStudent> = self
            .enrollments
            .iter()
            .filter(|e| e.is_active && e.class_id == class_id && e.section_id == section_id)
            .map(|e| e.student.clone())
            .collect();
        students.sort_by(|a, b| (&a.first_name, &a.last_name).cmp(&(&b.first_name, &b.last_name)));
        Ok(students)
    }

    async fn daily_entries(
        &self,
        date: NaiveDate,
        class_id: Option<u64>,
        section_id: Option<u64>,
    ) -> Result<Vec<DailyEntry>, StorageError> {
        self.online()?;
        // Inner join semantics: rows whose class or section is unknown drop out.
        Ok(self
            .rows()
            .iter()
            .filter(|e| e.attendance_date == date)
            .filter(|e| class_id.is_none_or(|id| e.class_id == id))
            .filter(|e| section_id.is_none_or(|id| e.section_id == id))
            .filter_map(|e| {
                Some(DailyEntry {
                    student_id: e.student_id,
                    class_id: e.class_id,
                    class_name: self.class_name(e.class_id)?,
                    section_id: e.section_id,
                    section_name: self.section_name(e.section_id)?,
                    status: e.status,
                })
            })
            .collect())
    }

    async fn update_entry(
        &self,
        id: u64,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> Result<bool, StorageError> {
        self.online()?;
        let mut rows = self.rows();
        match rows.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.status = status;
                entry.remarks = remarks.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn student_profile(&self, student_id: u64) -> Result<Option<StudentProfile>, StorageError> {
        self.online()?;
        Ok(self
            .enrollments
            .iter()
            .find(|e| e.student.id == student_id)
            .map(|e| StudentProfile {
                id: e.student.id,
                admission_number: e.student.admission_number.clone(),
                first_name: e.student.first_name.clone(),
                last_name: e.student.last_name.clone(),
                class_name: self.class_name(e.class_id),
                section_name: self.section_name(e.section_id),
            }))
    }

    async fn class_section_names(
        &self,
        class_id: u64,
        section_id: u64,
    ) -> Result<(Option<String>, Option<String>), StorageError> {
        self.online()?;
        Ok((self.class_name(class_id), self.section_name(section_id)))
    }

    async fn current_academic_year(&self) -> Result<Option<u64>, StorageError> {
        self.online()?;
        Ok(self.current_academic_year)
    }
}

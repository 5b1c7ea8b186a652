use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder};

use super::store::{AttendanceStore, EntryFilter, RowResult, StorageError};
use crate::model::attendance::{
    AttendanceEntry, AttendanceSlot, AttendanceStatus, DailyEntry, NewAttendance,
};
use crate::model::student::{RosterStudent, StudentProfile};

#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// Server errors that roll back only the failing statement, leaving the
/// transaction and the batch's earlier rows intact.
fn rejects_row_only(number: u16) -> bool {
    matches!(
        number,
        1048 // ER_BAD_NULL_ERROR
            | 1062 // ER_DUP_ENTRY
            | 1264 // ER_WARN_DATA_OUT_OF_RANGE
            | 1366 // ER_TRUNCATED_WRONG_VALUE_FOR_FIELD
            | 1406 // ER_DATA_TOO_LONG
            | 1452 // ER_NO_REFERENCED_ROW_2
    )
}

fn unavailable(e: sqlx::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

fn parse_status(raw: &str) -> Result<AttendanceStatus, StorageError> {
    AttendanceStatus::from_str(raw)
        .map_err(|_| StorageError::Decode(format!("unknown attendance status '{raw}'")))
}

#[derive(FromRow)]
struct EntryRow {
    id: u64,
    student_id: u64,
    class_id: u64,
    section_id: u64,
    subject_id: Option<u64>,
    subject_name: Option<String>,
    attendance_date: NaiveDate,
    status: String,
    remarks: Option<String>,
    marked_by: Option<u64>,
    academic_year_id: Option<u64>,
}

impl TryFrom<EntryRow> for AttendanceEntry {
    type Error = StorageError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(AttendanceEntry {
            id: row.id,
            student_id: row.student_id,
            class_id: row.class_id,
            section_id: row.section_id,
            subject_id: row.subject_id,
            subject_name: row.subject_name,
            attendance_date: row.attendance_date,
            status: parse_status(&row.status)?,
            remarks: row.remarks,
            marked_by: row.marked_by,
            academic_year_id: row.academic_year_id,
        })
    }
}

#[derive(FromRow)]
struct DailyRow {
    student_id: u64,
    class_id: u64,
    class_name: String,
    section_id: u64,
    section_name: String,
    status: String,
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn count_for_slot(&self, slot: &AttendanceSlot) -> Result<u64, StorageError> {
        // `<=>` is MySQL's null-safe equality: NULL <=> NULL is true.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM attendance
            WHERE class_id = ? AND section_id = ? AND attendance_date = ?
            AND subject_id <=> ?
            "#,
        )
        .bind(slot.class_id)
        .bind(slot.section_id)
        .bind(slot.attendance_date)
        .bind(slot.subject_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(count.max(0) as u64)
    }

    async fn insert_entries(&self, rows: &[NewAttendance]) -> Result<Vec<RowResult>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let mut results = Vec::with_capacity(rows.len());

        for row in rows {
            let slot = row.context.slot;
            let result = sqlx::query(
                r#"
                INSERT INTO attendance
                    (student_id, class_id, section_id, subject_id, attendance_date, status, marked_by, academic_year_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.student_id)
            .bind(slot.class_id)
            .bind(slot.section_id)
            .bind(slot.subject_id)
            .bind(slot.attendance_date)
            .bind(row.status.to_string())
            .bind(row.context.marked_by)
            .bind(row.context.academic_year_id)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => results.push(Ok(())),
                Err(sqlx::Error::Database(db_err))
                    if db_err
                        .try_downcast_ref::<MySqlDatabaseError>()
                        .is_some_and(|e| rejects_row_only(e.number())) =>
                {
                    results.push(Err(db_err.message().to_string()))
                }
                // Deadlocks and lock timeouts may already have rolled the
                // transaction back; dropping `tx` undoes the rest.
                Err(e) => return Err(unavailable(e)),
            }
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(results)
    }

    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<AttendanceEntry>, StorageError> {
        let mut query = QueryBuilder::<MySql>::new(
            r#"
            SELECT a.id, a.student_id, a.class_id, a.section_id, a.subject_id, sub.subject_name,
                   a.attendance_date, a.status, a.remarks, a.marked_by, a.academic_year_id
            FROM attendance a
            LEFT JOIN subjects sub ON a.subject_id = sub.id
            WHERE 1=1"#,
        );

        if let Some(student_id) = filter.student_id {
            query.push(" AND a.student_id = ").push_bind(student_id);
        }
        if let Some(class_id) = filter.class_id {
            query.push(" AND a.class_id = ").push_bind(class_id);
        }
        if let Some(section_id) = filter.section_id {
            query.push(" AND a.section_id = ").push_bind(section_id);
        }
        if let Some((start, end)) = filter.date_range {
            query
                .push(" AND a.attendance_date BETWEEN ")
                .push_bind(start)
                .push(" AND ")
                .push_bind(end);
        }
        if let Some(subject_id) = filter.subject_id {
            query.push(" AND a.subject_id <=> ").push_bind(subject_id);
        }
        query.push(" ORDER BY a.attendance_date DESC, a.id");

        query
            .build_query_as::<EntryRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?
            .into_iter()
            .map(AttendanceEntry::try_from)
            .collect()
    }

    async fn roster(&self, class_id: u64, section_id: u64) -> Result<Vec<RosterStudent>, StorageError> {
        sqlx::query_as::<_, RosterStudent>(
            r#"
            SELECT s.id, s.admission_number, s.first_name, s.last_name
            FROM students s
            WHERE s.class_id = ? AND s.section_id = ? AND s.is_active = TRUE
            ORDER BY s.first_name, s.last_name
            "#,
        )
        .bind(class_id)
        .bind(section_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn daily_entries(
        &self,
        date: NaiveDate,
        class_id: Option<u64>,
        section_id: Option<u64>,
    ) -> Result<Vec<DailyEntry>, StorageError> {
        let mut query = QueryBuilder::<MySql>::new(
            r#"
            SELECT a.student_id, a.class_id, c.class_name, a.section_id, sec.section_name, a.status
            FROM attendance a
            JOIN classes c ON a.class_id = c.id
            JOIN sections sec ON a.section_id = sec.id
            WHERE a.attendance_date = "#,
        );
        query.push_bind(date);

        if let Some(class_id) = class_id {
            query.push(" AND a.class_id = ").push_bind(class_id);
        }
        if let Some(section_id) = section_id {
            query.push(" AND a.section_id = ").push_bind(section_id);
        }

        query
            .build_query_as::<DailyRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?
            .into_iter()
            .map(|row| {
                Ok(DailyEntry {
                    student_id: row.student_id,
                    class_id: row.class_id,
                    class_name: row.class_name,
                    section_id: row.section_id,
                    section_name: row.section_name,
                    status: parse_status(&row.status)?,
                })
            })
            .collect()
    }

    async fn update_entry(
        &self,
        id: u64,
        status: AttendanceStatus,
        remarks: Option<&str>,
    ) -> Result<bool, StorageError> {
        // Checked separately: MySQL reports 0 affected rows when the values
        // did not change.
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM attendance WHERE id = ? LIMIT 1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        if exists == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE attendance SET status = ?, remarks = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(remarks)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(true)
    }

    async fn student_profile(&self, student_id: u64) -> Result<Option<StudentProfile>, StorageError> {
        sqlx::query_as::<_, StudentProfile>(
            r#"
            SELECT s.id, s.admission_number, s.first_name, s.last_name, c.class_name, sec.section_name
            FROM students s
            LEFT JOIN classes c ON s.class_id = c.id
            LEFT JOIN sections sec ON s.section_id = sec.id
            WHERE s.id = ?
            "#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn class_section_names(
        &self,
        class_id: u64,
        section_id: u64,
    ) -> Result<(Option<String>, Option<String>), StorageError> {
        let class_name = sqlx::query_scalar::<_, String>("SELECT class_name FROM classes WHERE id = ?")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        let section_name =
            sqlx::query_scalar::<_, String>("SELECT section_name FROM sections WHERE id = ?")
                .bind(section_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok((class_name, section_name))
    }

    async fn current_academic_year(&self) -> Result<Option<u64>, StorageError> {
        sqlx::query_scalar::<_, u64>("SELECT id FROM academic_years WHERE is_current = TRUE LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)
    }
}

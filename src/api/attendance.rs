use std::collections::BTreeMap;

use crate::attendance::aggregate::{StatusCounts, round2};
use crate::attendance::error::AttendanceError;
use crate::attendance::service::{self, BatchOutcome};
use crate::attendance::store::{AttendanceStore, EntryFilter};
use crate::auth::auth::AuthUser;
use crate::model::attendance::{AttendanceSlot, AttendanceStatus, MarkContext};
use crate::model::student::RosterStudent;
use crate::utils::academic_year_cache::AcademicYearCache;
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn required_id(value: Option<u64>) -> Result<u64, AttendanceError> {
    value
        .filter(|id| *id != 0)
        .ok_or_else(|| AttendanceError::validation("Class and section are required."))
}

#[derive(Deserialize, ToSchema)]
pub struct MarkAttendance {
    #[schema(example = 4)]
    pub class_id: u64,
    #[schema(example = 2)]
    pub section_id: u64,
    /// Defaults to today
    #[schema(example = "2026-03-02", format = "date", value_type = Option<String>)]
    pub attendance_date: Option<NaiveDate>,
    #[schema(example = 7)]
    pub subject_id: Option<u64>,
    /// student id → `present` | `absent` | `late` | `half_day`; other values are skipped
    #[schema(value_type = Object, example = json!({"31": "present", "32": "late"}))]
    pub statuses: BTreeMap<u64, String>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkAttendanceResponse {
    #[schema(example = "Attendance marked successfully for 2 students!")]
    pub message: String,
    #[schema(example = 2)]
    pub inserted_count: usize,
    pub outcome: BatchOutcome,
}

#[derive(Deserialize, IntoParams)]
pub struct SlotQuery {
    /// Class id (required)
    pub class_id: Option<u64>,
    /// Section id (required)
    pub section_id: Option<u64>,
    /// Defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    /// Omit for whole-day attendance
    pub subject_id: Option<u64>,
}

impl SlotQuery {
    fn slot(&self) -> Result<AttendanceSlot, AttendanceError> {
        Ok(AttendanceSlot {
            class_id: required_id(self.class_id)?,
            section_id: required_id(self.section_id)?,
            subject_id: self.subject_id,
            attendance_date: self.date.unwrap_or_else(today),
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct DuplicateCheckResponse {
    pub slot: AttendanceSlot,
    #[schema(example = false)]
    pub exists: bool,
}

#[derive(Serialize, ToSchema)]
pub struct DaySheetRow {
    pub student: RosterStudent,
    pub entry_id: Option<u64>,
    pub status: Option<AttendanceStatus>,
    pub remarks: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DaySheetResponse {
    pub slot: AttendanceSlot,
    pub rows: Vec<DaySheetRow>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAttendance {
    #[schema(example = "late")]
    pub status: String,
    #[schema(example = "Bus delay")]
    pub remarks: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceOverview {
    pub student_id: u64,
    pub counts: StatusCounts,
    #[schema(example = 92.5)]
    pub percentage: f64,
}

/// Mark attendance for a class/section on one date
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = MarkAttendance,
    responses(
        (status = 201, description = "Batch stored; invalid or rejected rows are listed as skipped", body = MarkAttendanceResponse),
        (status = 400, description = "Class, section, and attendance data are required"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Attendance already marked for this slot", body = Object, example = json!({
            "message": "Attendance already marked for this date. Please edit existing attendance."
        })),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(
    name = "attendance_mark",
    skip_all,
    fields(user_id = auth.user_id, class_id = payload.class_id, section_id = payload.section_id)
)]
pub async fn mark_attendance(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    years: web::Data<AcademicYearCache>,
    payload: web::Json<MarkAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let store = store.get_ref();
    let academic_year_id = years.current(store).await.map_err(AttendanceError::from)?;

    let context = MarkContext {
        slot: AttendanceSlot {
            class_id: payload.class_id,
            section_id: payload.section_id,
            subject_id: payload.subject_id,
            attendance_date: payload.attendance_date.unwrap_or_else(today),
        },
        academic_year_id,
        marked_by: auth.teacher_id(),
    };

    let outcome = service::mark_attendance(store, context, &payload.statuses).await?;
    let inserted_count = outcome.inserted_count();

    Ok(HttpResponse::Created().json(MarkAttendanceResponse {
        message: format!("Attendance marked successfully for {inserted_count} students!"),
        inserted_count,
        outcome,
    }))
}

/// Check whether a slot is already marked
#[utoipa::path(
    get,
    path = "/api/attendance/duplicate",
    params(SlotQuery),
    responses(
        (status = 200, description = "Whether any row exists for the slot", body = DuplicateCheckResponse),
        (status = 400, description = "Class and section are required"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_duplicate(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<SlotQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let slot = query.slot()?;
    let exists = service::check_duplicate(store.get_ref(), &slot).await?;

    Ok(HttpResponse::Ok().json(DuplicateCheckResponse { slot, exists }))
}

/// Day sheet: roster with each student's status for one slot
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(SlotQuery),
    responses(
        (status = 200, description = "Roster with recorded statuses", body = DaySheetResponse),
        (status = 400, description = "Class and section are required"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn view_attendance(
    _auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<SlotQuery>,
) -> actix_web::Result<impl Responder> {
    let slot = query.slot()?;

    let roster = store
        .roster(slot.class_id, slot.section_id)
        .await
        .map_err(AttendanceError::from)?;

    let filter = EntryFilter {
        class_id: Some(slot.class_id),
        section_id: Some(slot.section_id),
        date_range: Some((slot.attendance_date, slot.attendance_date)),
        subject_id: Some(slot.subject_id),
        ..Default::default()
    };
    let mut by_student: BTreeMap<u64, _> = store
        .entries(&filter)
        .await
        .map_err(AttendanceError::from)?
        .into_iter()
        .map(|e| (e.student_id, e))
        .collect();

    let rows = roster
        .into_iter()
        .map(|student| {
            let entry = by_student.remove(&student.id);
            DaySheetRow {
                entry_id: entry.as_ref().map(|e| e.id),
                status: entry.as_ref().map(|e| e.status),
                remarks: entry.and_then(|e| e.remarks),
                student,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(DaySheetResponse { slot, rows }))
}

/// Edit a single attendance record
#[utoipa::path(
    put,
    path = "/api/attendance/{attendance_id}",
    params(
        ("attendance_id" = u64, Path, description = "ID of the attendance record")
    ),
    request_body = UpdateAttendance,
    responses(
        (status = 200, description = "Attendance updated", body = Object, example = json!({
            "message": "Attendance updated"
        })),
        (status = 400, description = "Invalid status"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Attendance record not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_attendance(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let attendance_id = path.into_inner();
    service::update_entry(
        store.get_ref(),
        attendance_id,
        &payload.status,
        payload.remarks.as_deref(),
    )
    .await?;

    tracing::info!(attendance_id, user_id = auth.user_id, "Attendance updated");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Attendance updated"
    })))
}

/// All-time attendance figures of the logged-in student
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    responses(
        (status = 200, description = "Attendance overview", body = AttendanceOverview),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Students only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
) -> actix_web::Result<impl Responder> {
    let student_id = match (auth.is_student(), auth.profile_id) {
        (true, Some(id)) => id,
        (true, None) => return Err(AttendanceError::NotFound("Student profile not found.".into()).into()),
        (false, _) => return Err(actix_web::error::ErrorForbidden("Students only")),
    };

    let filter = EntryFilter {
        student_id: Some(student_id),
        ..Default::default()
    };
    let counts: StatusCounts = store
        .entries(&filter)
        .await
        .map_err(AttendanceError::from)?
        .into_iter()
        .map(|e| e.status)
        .collect();

    Ok(HttpResponse::Ok().json(AttendanceOverview {
        student_id,
        percentage: round2(counts.percentage()),
        counts,
    }))
}

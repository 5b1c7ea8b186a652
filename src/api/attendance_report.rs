use crate::api::attendance::{required_id, today};
use crate::attendance::aggregate::{
    ClassSectionSummary, DateRange, StatusCounts, StudentSummary, aggregate_daily,
    aggregate_range, round2, summarize_student,
};
use crate::attendance::error::AttendanceError;
use crate::attendance::store::{AttendanceStore, EntryFilter};
use crate::auth::auth::AuthUser;
use crate::model::attendance::AttendanceEntry;
use crate::model::student::StudentProfile;
use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams)]
pub struct DailyReportQuery {
    /// Defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    pub class_id: Option<u64>,
    pub section_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct DailyReportResponse {
    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub report_date: NaiveDate,
    pub rows: Vec<ClassSectionSummary>,
}

#[derive(Deserialize, IntoParams)]
pub struct RangeQuery {
    /// Required for the class-wise report
    pub class_id: Option<u64>,
    /// Required for the class-wise report
    pub section_id: Option<u64>,
    /// Defaults to the first day of the current month
    #[param(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    /// Defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
}

impl RangeQuery {
    fn range(&self) -> Result<DateRange, AttendanceError> {
        let today = today();
        let first_of_month = today.with_day(1).unwrap_or(today);
        DateRange::new(
            self.start_date.unwrap_or(first_of_month),
            self.end_date.unwrap_or(today),
        )
    }
}

#[derive(Serialize, ToSchema)]
pub struct ClassWiseReportResponse {
    #[schema(example = "Grade 5")]
    pub class_name: String,
    #[schema(example = "A")]
    pub section_name: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub students: Vec<StudentSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct StudentReportResponse {
    pub student: StudentProfile,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub counts: StatusCounts,
    /// Rounded to two decimals
    #[schema(example = 87.5)]
    pub percentage: f64,
    /// Newest first
    pub records: Vec<AttendanceEntry>,
}

/// Per class/section totals for one day
#[utoipa::path(
    get,
    path = "/api/attendance/reports/daily",
    params(DailyReportQuery),
    responses(
        (status = 200, description = "One row per class/section marked that day", body = DailyReportResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Reports"
)]
#[instrument(name = "attendance_daily_report", skip_all, fields(user_id = auth.user_id))]
pub async fn daily_report(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<DailyReportQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let report_date = query.date.unwrap_or_else(today);
    let entries = store
        .daily_entries(report_date, query.class_id, query.section_id)
        .await
        .map_err(AttendanceError::from)?;

    debug!(%report_date, rows = entries.len(), "Building daily report");

    Ok(HttpResponse::Ok().json(DailyReportResponse {
        report_date,
        rows: aggregate_daily(&entries),
    }))
}

/// Per-student totals for a class/section over a date range
#[utoipa::path(
    get,
    path = "/api/attendance/reports/class-wise",
    params(RangeQuery),
    responses(
        (status = 200, description = "Roster with per-student totals", body = ClassWiseReportResponse),
        (status = 400, description = "Class and section are required, or the range is inverted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Reports"
)]
#[instrument(name = "attendance_class_wise_report", skip_all, fields(user_id = auth.user_id))]
pub async fn class_wise_report(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_staff()?;

    let class_id = required_id(query.class_id)?;
    let section_id = required_id(query.section_id)?;
    let range = query.range()?;

    let roster = store
        .roster(class_id, section_id)
        .await
        .map_err(AttendanceError::from)?;

    let filter = EntryFilter {
        class_id: Some(class_id),
        section_id: Some(section_id),
        date_range: Some((range.start(), range.end())),
        ..Default::default()
    };
    let entries = store.entries(&filter).await.map_err(AttendanceError::from)?;

    let (class_name, section_name) = store
        .class_section_names(class_id, section_id)
        .await
        .map_err(AttendanceError::from)?;

    Ok(HttpResponse::Ok().json(ClassWiseReportResponse {
        class_name: class_name.unwrap_or_else(|| "Unknown".to_string()),
        section_name: section_name.unwrap_or_else(|| "Unknown".to_string()),
        start_date: range.start(),
        end_date: range.end(),
        students: aggregate_range(&roster, &entries, range),
    }))
}

/// Attendance history and totals of one student
#[utoipa::path(
    get,
    path = "/api/attendance/reports/student/{student_id}",
    params(
        ("student_id" = u64, Path, description = "ID of the student"),
        RangeQuery
    ),
    responses(
        (status = 200, description = "Student report", body = StudentReportResponse),
        (status = 400, description = "Inverted date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Students can only view their own report"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance Reports"
)]
#[instrument(name = "attendance_student_report", skip_all, fields(user_id = auth.user_id))]
pub async fn student_report(
    auth: AuthUser,
    store: web::Data<dyn AttendanceStore>,
    path: web::Path<u64>,
    query: web::Query<RangeQuery>,
) -> actix_web::Result<impl Responder> {
    let student_id = path.into_inner();
    auth.require_self_or_staff(student_id)?;

    let range = query.range()?;

    let student = store
        .student_profile(student_id)
        .await
        .map_err(AttendanceError::from)?
        .ok_or_else(|| AttendanceError::NotFound("Student not found.".to_string()))?;

    let filter = EntryFilter {
        student_id: Some(student_id),
        date_range: Some((range.start(), range.end())),
        ..Default::default()
    };
    let records = store.entries(&filter).await.map_err(AttendanceError::from)?;
    let counts = summarize_student(&records, range);

    Ok(HttpResponse::Ok().json(StudentReportResponse {
        student,
        start_date: range.start(),
        end_date: range.end(),
        percentage: round2(counts.percentage()),
        counts,
        records,
    }))
}

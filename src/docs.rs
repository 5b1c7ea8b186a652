use crate::api::attendance::{
    AttendanceOverview, DaySheetResponse, DaySheetRow, DuplicateCheckResponse, MarkAttendance,
    MarkAttendanceResponse, UpdateAttendance,
};
use crate::api::attendance_report::{
    ClassWiseReportResponse, DailyReportResponse, StudentReportResponse,
};
use crate::attendance::aggregate::{ClassSectionSummary, StatusCounts, StudentSummary};
use crate::attendance::service::{BatchOutcome, SkipReason, SkippedMark};
use crate::auth::handlers::LoginResponse;
use crate::model::attendance::{AttendanceEntry, AttendanceSlot, AttendanceStatus};
use crate::model::student::{RosterStudent, StudentProfile};
use crate::models::LoginReqDto;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "School Attendance API",
        version = "1.0.0",
        description = r#"
## School Attendance

Daily attendance for a school: teachers mark a class/section in one batch,
edit single records afterwards, and pull daily, class-wise, and per-student
reports.

### 🔹 Key Features
- **Marking**
  - One batch per (class, section, subject, date), guarded against duplicates
  - Rows with an unknown status or rejected by the database are skipped, not fatal
- **Reports**
  - Daily totals per class/section
  - Class-wise totals and percentages over a date range
  - Student history with totals

### 🔐 Security
Every `/api` endpoint needs a **JWT Bearer** access token.
Marking, editing, and class reports are for **Admin** and **Teacher** roles;
students see only their own attendance.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::attendance::mark_attendance,
        crate::api::attendance::check_duplicate,
        crate::api::attendance::view_attendance,
        crate::api::attendance::update_attendance,
        crate::api::attendance::my_attendance,

        crate::api::attendance_report::daily_report,
        crate::api::attendance_report::class_wise_report,
        crate::api::attendance_report::student_report
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            AttendanceStatus,
            AttendanceSlot,
            AttendanceEntry,
            RosterStudent,
            StudentProfile,
            MarkAttendance,
            MarkAttendanceResponse,
            BatchOutcome,
            SkippedMark,
            SkipReason,
            DuplicateCheckResponse,
            DaySheetRow,
            DaySheetResponse,
            UpdateAttendance,
            AttendanceOverview,
            StatusCounts,
            StudentSummary,
            ClassSectionSummary,
            DailyReportResponse,
            ClassWiseReportResponse,
            StudentReportResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and token rotation"),
        (name = "Attendance", description = "Marking and editing attendance"),
        (name = "Attendance Reports", description = "Daily, class-wise and student reports"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub mod attendance;
pub mod attendance_report;

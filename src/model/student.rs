use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An active student enrolled in a class/section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct RosterStudent {
    #[schema(example = 31)]
    pub id: u64,
    #[schema(example = "ADM-2026-031")]
    pub admission_number: String,
    #[schema(example = "Amina")]
    pub first_name: String,
    #[schema(example = "Rahman")]
    pub last_name: String,
}

impl RosterStudent {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Header block of a student report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct StudentProfile {
    pub id: u64,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    /// Absent when the student's class was removed.
    pub class_name: Option<String>,
    pub section_name: Option<String>,
}

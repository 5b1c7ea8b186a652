//! Folds raw attendance rows into report figures.
//!
//! Everything here is pure: callers fetch rows through an
//! [`AttendanceStore`](super::store::AttendanceStore) and hand the slices in.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::AttendanceError;
use crate::model::attendance::{AttendanceEntry, AttendanceStatus, DailyEntry};
use crate::model::student::RosterStudent;

/// Closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AttendanceError> {
        if start > end {
            return Err(AttendanceError::validation(
                "start_date cannot be after end_date",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    #[schema(example = 4)]
    pub total_days: u32,
    #[schema(example = 2)]
    pub present: u32,
    #[schema(example = 1)]
    pub absent: u32,
    #[schema(example = 1)]
    pub late: u32,
    #[schema(example = 0)]
    pub half_day: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: AttendanceStatus) {
        self.total_days += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::HalfDay => self.half_day += 1,
        }
    }

    /// Share of `present` over all recorded days, `0.0` when nothing was recorded.
    pub fn percentage(&self) -> f64 {
        if self.total_days == 0 {
            return 0.0;
        }
        f64::from(self.present) / f64::from(self.total_days) * 100.0
    }
}

impl FromIterator<AttendanceStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = AttendanceStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StudentSummary {
    #[schema(example = 31)]
    pub student_id: u64,
    #[schema(example = "ADM-2026-031")]
    pub admission_number: String,
    #[schema(example = "Amina Rahman")]
    pub name: String,
    pub counts: StatusCounts,
    #[schema(example = 50.0)]
    pub percentage: f64,
}

/// Per-student figures for a class/section over `range`.
///
/// Every roster student gets a row, zeroed if they have no entries. Entries
/// outside `range` or for students not on the roster are ignored. Rows come
/// out ordered by first name, then last name, then student id.
pub fn aggregate_range(
    roster: &[RosterStudent],
    entries: &[AttendanceEntry],
    range: DateRange,
) -> Vec<StudentSummary> {
    let mut counts: HashMap<u64, StatusCounts> = roster
        .iter()
        .map(|s| (s.id, StatusCounts::default()))
        .collect();

    for entry in entries.iter().filter(|e| range.contains(e.attendance_date)) {
        if let Some(c) = counts.get_mut(&entry.student_id) {
            c.record(entry.status);
        }
    }

    let mut ordered: Vec<&RosterStudent> = roster.iter().collect();
    ordered.sort_by(|a, b| {
        (&a.first_name, &a.last_name, a.id).cmp(&(&b.first_name, &b.last_name, b.id))
    });
    ordered.dedup_by_key(|s| s.id);

    ordered
        .into_iter()
        .map(|student| {
            let c = counts.get(&student.id).copied().unwrap_or_default();
            StudentSummary {
                student_id: student.id,
                admission_number: student.admission_number.clone(),
                name: student.display_name(),
                counts: c,
                percentage: c.percentage(),
            }
        })
        .collect()
}

/// Figures for a single student's entries within `range`.
pub fn summarize_student(entries: &[AttendanceEntry], range: DateRange) -> StatusCounts {
    entries
        .iter()
        .filter(|e| range.contains(e.attendance_date))
        .map(|e| e.status)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClassSectionSummary {
    pub class_id: u64,
    #[schema(example = "Grade 5")]
    pub class_name: String,
    pub section_id: u64,
    #[schema(example = "A")]
    pub section_name: String,
    /// Distinct students with at least one entry.
    #[schema(example = 28)]
    pub total_students: u32,
    pub counts: StatusCounts,
}

/// Groups one day's entries by class/section.
///
/// Output is sorted by class name, then section name; ids only break ties
/// between pairs that share both names.
pub fn aggregate_daily(entries: &[DailyEntry]) -> Vec<ClassSectionSummary> {
    type Key<'a> = (&'a str, &'a str, u64, u64);
    let mut groups: BTreeMap<Key<'_>, (HashSet<u64>, StatusCounts)> = BTreeMap::new();

    for entry in entries {
        let key = (
            entry.class_name.as_str(),
            entry.section_name.as_str(),
            entry.class_id,
            entry.section_id,
        );
        let (students, counts) = groups.entry(key).or_default();
        students.insert(entry.student_id);
        counts.record(entry.status);
    }

    groups
        .into_iter()
        .map(
            |((class_name, section_name, class_id, section_id), (students, counts))| {
                ClassSectionSummary {
                    class_id,
                    class_name: class_name.to_string(),
                    section_id,
                    section_name: section_name.to_string(),
                    total_students: students.len() as u32,
                    counts,
                }
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use AttendanceStatus::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn student(id: u64, first: &str, last: &str) -> RosterStudent {
        RosterStudent {
            id,
            admission_number: format!("ADM-{id}"),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    fn entry(student_id: u64, date: NaiveDate, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            id: 0,
            student_id,
            class_id: 1,
            section_id: 1,
            subject_id: None,
            subject_name: None,
            attendance_date: date,
            status,
            remarks: None,
            marked_by: None,
            academic_year_id: None,
        }
    }

    fn daily(class: (u64, &str), section: (u64, &str), student_id: u64, status: AttendanceStatus) -> DailyEntry {
        DailyEntry {
            student_id,
            class_id: class.0,
            class_name: class.1.to_string(),
            section_id: section.0,
            section_name: section.1.to_string(),
            status,
        }
    }

    #[fixture]
    fn march() -> DateRange {
        DateRange::new(day(1), day(31)).unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateRange::new(day(5), day(4)).unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
    }

    #[test]
    fn percentage_is_zero_without_records() {
        let counts = StatusCounts::default();
        assert_eq!(counts.percentage(), 0.0);
    }

    #[rstest]
    fn mixed_statuses_fold_into_counts(march: DateRange) {
        let roster = vec![student(1, "Amina", "Rahman")];
        let entries = vec![
            entry(1, day(2), Present),
            entry(1, day(3), Present),
            entry(1, day(4), Absent),
            entry(1, day(5), Late),
        ];

        let summaries = aggregate_range(&roster, &entries, march);

        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s.counts.total_days, 4);
        assert_eq!(s.counts.present, 2);
        assert_eq!(s.counts.absent, 1);
        assert_eq!(s.counts.late, 1);
        assert_eq!(s.counts.half_day, 0);
        assert_eq!(s.percentage, 50.0);
        assert_eq!(s.name, "Amina Rahman");
    }

    #[rstest]
    fn roster_students_without_entries_get_zeroed_rows(march: DateRange) {
        let roster = vec![student(1, "Amina", "Rahman"), student(2, "Bilal", "Khan")];
        let entries = vec![entry(1, day(2), Present)];

        let summaries = aggregate_range(&roster, &entries, march);

        assert_eq!(summaries[1].student_id, 2);
        assert_eq!(summaries[1].counts, StatusCounts::default());
        assert_eq!(summaries[1].percentage, 0.0);
    }

    #[test]
    fn entries_outside_the_range_or_roster_are_ignored() {
        let roster = vec![student(1, "Amina", "Rahman")];
        let entries = vec![
            entry(1, day(1), Absent),
            entry(1, day(2), Present),
            entry(1, day(10), Absent),
            entry(99, day(2), Present),
        ];

        let summaries = aggregate_range(&roster, &entries, DateRange::new(day(2), day(9)).unwrap());

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].counts.total_days, 1);
        assert_eq!(summaries[0].percentage, 100.0);
    }

    #[rstest]
    fn summaries_are_ordered_by_name_then_id(march: DateRange) {
        let roster = vec![
            student(5, "Zara", "Ali"),
            student(4, "Amina", "Rahman"),
            student(3, "Amina", "Khan"),
            student(2, "Amina", "Rahman"),
        ];

        let ids: Vec<u64> = aggregate_range(&roster, &[], march)
            .into_iter()
            .map(|s| s.student_id)
            .collect();

        assert_eq!(ids, vec![3, 2, 4, 5]);
    }

    #[rstest]
    fn summarize_student_counts_only_the_range(march: DateRange) {
        let entries = vec![
            entry(1, day(2), HalfDay),
            entry(1, day(3), Present),
            entry(1, NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), Absent),
        ];

        let counts = summarize_student(&entries, march);

        assert_eq!(counts.total_days, 2);
        assert_eq!(counts.half_day, 1);
        assert_eq!(round2(counts.percentage()), 50.0);
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(200.0 / 3.0), 66.67);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn daily_groups_per_class_section_sorted_by_names() {
        let entries = vec![
            daily((2, "Grade 6"), (20, "A"), 7, Present),
            daily((1, "Grade 5"), (10, "B"), 3, Absent),
            daily((1, "Grade 5"), (10, "B"), 4, Present),
            daily((2, "Grade 6"), (20, "A"), 8, Late),
            daily((2, "Grade 6"), (20, "A"), 9, HalfDay),
        ];

        let rows = aggregate_daily(&entries);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class_name, "Grade 5");
        assert_eq!(rows[0].total_students, 2);
        assert_eq!(rows[0].counts.present, 1);
        assert_eq!(rows[0].counts.absent, 1);
        assert_eq!(rows[1].class_name, "Grade 6");
        assert_eq!(rows[1].total_students, 3);
        assert_eq!(rows[1].counts.present, 1);
        assert_eq!(rows[1].counts.late, 1);
        assert_eq!(rows[1].counts.half_day, 1);
    }

    #[test]
    fn daily_counts_distinct_students_across_subjects() {
        let entries = vec![
            daily((1, "Grade 5"), (10, "A"), 3, Present),
            daily((1, "Grade 5"), (10, "A"), 3, Absent),
        ];

        let rows = aggregate_daily(&entries);

        assert_eq!(rows[0].total_students, 1);
        assert_eq!(rows[0].counts.total_days, 2);
    }

    #[test]
    fn daily_sorts_sections_within_a_class() {
        let entries = vec![
            daily((1, "Grade 5"), (11, "B"), 3, Present),
            daily((1, "Grade 5"), (10, "A"), 4, Present),
        ];

        let sections: Vec<String> = aggregate_daily(&entries)
            .into_iter()
            .map(|r| r.section_name)
            .collect();

        assert_eq!(sections, vec!["A", "B"]);
    }

    #[test]
    fn daily_of_nothing_is_empty() {
        assert!(aggregate_daily(&[]).is_empty());
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    Quiz,
    Homework,
    Project,
    Exam,
    Presentation,
    Other,
}

impl AssignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentType::Quiz => "quiz",
            AssignmentType::Homework => "homework",
            AssignmentType::Project => "project",
            AssignmentType::Exam => "exam",
            AssignmentType::Presentation => "presentation",
            AssignmentType::Other => "other",
        }
    }

    /// Effort guess used when a syllabus or manual entry gives no estimate.
    pub fn default_hours(&self) -> f64 {
        match self {
            AssignmentType::Quiz => 2.0,
            AssignmentType::Homework => 5.0,
            AssignmentType::Project => 20.0,
            AssignmentType::Exam => 8.0,
            AssignmentType::Presentation => 10.0,
            AssignmentType::Other => 5.0,
        }
    }

    pub fn task_verb(&self) -> &'static str {
        match self {
            AssignmentType::Quiz => "Review for",
            AssignmentType::Homework => "Complete",
            AssignmentType::Project => "Work on",
            AssignmentType::Exam => "Study for",
            AssignmentType::Presentation => "Prepare",
            AssignmentType::Other => "Work on",
        }
    }
}

/// Lenient: anything unrecognised (including LLM spellings like "Midterm")
/// maps onto the closest type or `Other`.
impl FromStr for AssignmentType {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "quiz" | "quizzes" => AssignmentType::Quiz,
            "homework" | "hw" | "assignment" | "problem set" | "lab" => AssignmentType::Homework,
            "project" | "paper" | "essay" => AssignmentType::Project,
            "exam" | "midterm" | "final" | "test" => AssignmentType::Exam,
            "presentation" => AssignmentType::Presentation,
            _ => AssignmentType::Other,
        };
        Ok(kind)
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub course: String,
    #[serde(default)]
    pub course_code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AssignmentType,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub estimated_hours: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub progress: u8,
}

impl Assignment {
    pub fn reference(&self) -> AssignmentRef {
        AssignmentRef {
            course: self.course.clone(),
            name: self.name.clone(),
        }
    }

    /// Signed: negative once the due date has passed.
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }

    pub fn remaining_hours(&self) -> f64 {
        let left = 100u8.saturating_sub(self.progress.min(100));
        self.estimated_hours.max(0.0) * f64::from(left) / 100.0
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("assignment name is empty".into()));
        }
        if !(0.0..=100.0).contains(&self.weight) {
            return Err(Error::InvalidInput(format!(
                "weight {} for '{}' is outside 0-100",
                self.weight, self.name
            )));
        }
        if !self.estimated_hours.is_finite() || self.estimated_hours < 0.0 {
            return Err(Error::InvalidInput(format!(
                "estimated hours {} for '{}' must be non-negative",
                self.estimated_hours, self.name
            )));
        }
        if self.progress > 100 {
            return Err(Error::InvalidInput(format!(
                "progress {} for '{}' is outside 0-100",
                self.progress, self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_name: String,
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl Course {
    /// Copies the course name and code onto every assignment.
    pub fn stamp_assignments(&mut self) {
        for assignment in self.assignments.iter_mut() {
            assignment.course = self.course_name.clone();
            assignment.course_code = self.course_code.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentRef {
    pub course: String,
    pub name: String,
}

impl fmt::Display for AssignmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.course)
    }
}

/// Declaration order doubles as sort order: `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Urgency = Priority;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub assignment: AssignmentRef,
    pub task: String,
    pub hours: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schedule {
    pub daily_schedule: BTreeMap<NaiveDate, Vec<Task>>,
    pub warnings: Vec<String>,
}

impl Schedule {
    pub fn hours_on(&self, date: NaiveDate) -> f64 {
        self.daily_schedule
            .get(&date)
            .map(|tasks| tasks.iter().map(|task| task.hours).sum())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskStatus {
    Normal,
    Moderate,
    HighRisk,
}

impl RiskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RiskStatus::Normal => "normal",
            RiskStatus::Moderate => "moderate",
            RiskStatus::HighRisk => "high risk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyLoad {
    pub week_start: NaiveDate,
    pub label: String,
    pub hours: f64,
    pub status: RiskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkloadAnalysis {
    pub total_hours: f64,
    pub weekly_breakdown: Vec<WeeklyLoad>,
    pub risk_weeks: Vec<WeeklyLoad>,
    pub priority_assignments: Vec<Assignment>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    Overload,
    DailyPlan,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Overload => "overload",
            NotificationKind::DailyPlan => "daily_plan",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "Reminder",
            NotificationKind::Overload => "Overload",
            NotificationKind::DailyPlan => "Daily Plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub urgency: Urgency,
    pub message: String,
    pub action: String,
    #[serde(with = "minute_format")]
    pub send_at: NaiveDateTime,
    pub assignment: Option<AssignmentRef>,
    /// Send time before clipping to "now"; part of the fingerprint.
    #[serde(with = "minute_format")]
    pub nominal_at: NaiveDateTime,
}

pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

mod minute_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::MINUTE_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(MINUTE_FORMAT))
    }
}

/// Parses a user-supplied percentage, rejecting non-numeric and out-of-range
/// values instead of clamping them.
pub fn parse_percentage(input: &str, field: &str) -> Result<u8> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{field} must be a whole number, got '{input}'")))?;
    if !(0..=100).contains(&value) {
        return Err(Error::InvalidInput(format!(
            "{field} must be between 0 and 100, got {value}"
        )));
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn homework(progress: u8) -> Assignment {
        Assignment {
            course: "Algorithms".to_string(),
            course_code: "CS 301".to_string(),
            name: "Problem Set 1".to_string(),
            kind: AssignmentType::Homework,
            due_date: NaiveDate::from_ymd_opt(2026, 10, 23).unwrap(),
            weight: 10.0,
            estimated_hours: 8.0,
            description: String::new(),
            progress,
        }
    }

    #[test]
    fn lenient_type_parsing_falls_back_to_other() {
        assert_eq!("Midterm".parse::<AssignmentType>().unwrap(), AssignmentType::Exam);
        assert_eq!(" QUIZ ".parse::<AssignmentType>().unwrap(), AssignmentType::Quiz);
        assert_eq!("reading".parse::<AssignmentType>().unwrap(), AssignmentType::Other);
    }

    #[test]
    fn remaining_hours_tracks_progress() {
        assert_eq!(homework(0).remaining_hours(), 8.0);
        assert_eq!(homework(50).remaining_hours(), 4.0);
        assert_eq!(homework(100).remaining_hours(), 0.0);
    }

    #[test]
    fn percentage_parsing_rejects_bad_input() {
        assert_eq!(parse_percentage("40", "progress").unwrap(), 40);
        assert!(parse_percentage("abc", "progress").is_err());
        assert!(parse_percentage("101", "progress").is_err());
        assert!(parse_percentage("-3", "progress").is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_weight() {
        let mut assignment = homework(0);
        assignment.weight = 140.0;
        assert!(assignment.validate().is_err());
    }

    #[test]
    fn assignment_serializes_type_field() {
        let json = serde_json::to_value(homework(0)).unwrap();
        assert_eq!(json["type"], "homework");
        assert_eq!(json["due_date"], "2026-10-23");
    }

    #[test]
    fn priority_orders_high_first() {
        let mut tiers = vec![Priority::Low, Priority::High, Priority::Medium];
        tiers.sort();
        assert_eq!(tiers, vec![Priority::High, Priority::Medium, Priority::Low]);
    }
}

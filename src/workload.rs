use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{Assignment, RiskStatus, WeeklyLoad, WorkloadAnalysis};

/// Assignments due within this many days are always priority candidates.
pub const PRIORITY_WINDOW_DAYS: i64 = 7;
/// Assignments at or above this weight are priority candidates regardless of date.
pub const PRIORITY_MIN_WEIGHT: f64 = 20.0;
pub const MAX_PRIORITY_ASSIGNMENTS: usize = 5;

pub fn analyze_workload(
    assignments: &[Assignment],
    risk_threshold: u32,
    today: NaiveDate,
) -> WorkloadAnalysis {
    if assignments.is_empty() {
        return WorkloadAnalysis::default();
    }

    let total_hours = assignments
        .iter()
        .map(|assignment| assignment.estimated_hours.max(0.0))
        .sum();

    let mut weeks: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for assignment in assignments {
        *weeks.entry(week_start(assignment.due_date)).or_insert(0.0) +=
            assignment.estimated_hours.max(0.0);
    }

    let weekly_breakdown: Vec<WeeklyLoad> = weeks
        .into_iter()
        .map(|(start, hours)| WeeklyLoad {
            week_start: start,
            label: week_label(start),
            hours,
            status: week_status(hours, risk_threshold),
        })
        .collect();

    let risk_weeks: Vec<WeeklyLoad> = weekly_breakdown
        .iter()
        .filter(|week| week.status == RiskStatus::HighRisk)
        .cloned()
        .collect();

    let priority_assignments = select_priorities(assignments, today);
    let recommendations = recommend(
        assignments,
        &risk_weeks,
        &priority_assignments,
        risk_threshold,
        today,
    );

    WorkloadAnalysis {
        total_hours,
        weekly_breakdown,
        risk_weeks,
        priority_assignments,
        recommendations,
    }
}

/// Monday of the calendar week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn week_label(start: NaiveDate) -> String {
    format!("Week of {}", start.format("%Y-%m-%d"))
}

pub fn week_status(hours: f64, risk_threshold: u32) -> RiskStatus {
    let threshold = f64::from(risk_threshold);
    if hours > threshold {
        RiskStatus::HighRisk
    } else if hours < (threshold - 5.0).max(10.0) {
        RiskStatus::Normal
    } else {
        RiskStatus::Moderate
    }
}

fn select_priorities(assignments: &[Assignment], today: NaiveDate) -> Vec<Assignment> {
    let mut candidates: Vec<(usize, &Assignment)> = assignments
        .iter()
        .enumerate()
        .filter(|(_, assignment)| {
            let days = assignment.days_until_due(today);
            days >= 0
                && !assignment.is_complete()
                && (days <= PRIORITY_WINDOW_DAYS || assignment.weight >= PRIORITY_MIN_WEIGHT)
        })
        .collect();

    candidates.sort_by(|(ia, a), (ib, b)| {
        a.days_until_due(today)
            .cmp(&b.days_until_due(today))
            .then(b.weight.total_cmp(&a.weight))
            .then(ia.cmp(ib))
    });

    candidates
        .into_iter()
        .take(MAX_PRIORITY_ASSIGNMENTS)
        .map(|(_, assignment)| assignment.clone())
        .collect()
}

fn recommend(
    assignments: &[Assignment],
    risk_weeks: &[WeeklyLoad],
    priorities: &[Assignment],
    risk_threshold: u32,
    today: NaiveDate,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    for week in risk_weeks {
        let heaviest = assignments
            .iter()
            .filter(|assignment| week_start(assignment.due_date) == week.week_start)
            .max_by(|a, b| a.estimated_hours.total_cmp(&b.estimated_hours));
        let mut line = format!(
            "{} carries {:.1}h, above your {}h/week threshold.",
            week.label, week.hours, risk_threshold
        );
        if let Some(assignment) = heaviest {
            line.push_str(&format!(
                " Start '{}' ({}) the week before.",
                assignment.name, assignment.course
            ));
        }
        recommendations.push(line);
    }

    for assignment in priorities {
        let days = assignment.days_until_due(today);
        let when = match days {
            0 => "today".to_string(),
            1 => "tomorrow".to_string(),
            n => format!("in {n} days"),
        };
        recommendations.push(format!(
            "Prioritize '{}' ({}): due {} ({}), worth {}% of the grade.",
            assignment.name,
            assignment.course,
            when,
            assignment.due_date,
            assignment.weight
        ));
    }

    for assignment in assignments {
        if assignment.days_until_due(today) < 0 && !assignment.is_complete() {
            recommendations.push(format!(
                "'{}' ({}) was due {} and is at {}%; check whether late submission is possible.",
                assignment.name, assignment.course, assignment.due_date, assignment.progress
            ));
        }
    }

    if risk_weeks.is_empty() {
        recommendations.push(format!(
            "Every week stays within your {risk_threshold}h/week threshold."
        ));
    }

    recommendations
}

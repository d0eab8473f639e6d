//! Day-by-day study plan.
//!
//! Assignments claim capacity in priority order. Each one fills its days
//! earliest-first, from today through its due date, without pushing any day
//! past the daily cap. Whatever does not fit becomes a warning.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::models::{Assignment, Priority, Schedule, Task};

/// Hours below this are treated as zero when comparing capacity.
const EPSILON: f64 = 1e-9;

/// Cut-offs for the priority tier of an assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityThresholds {
    pub high_within_days: i64,
    pub high_min_weight: f64,
    pub high_daily_load: f64,
    pub medium_within_days: i64,
    pub medium_min_weight: f64,
    pub medium_daily_load: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            high_within_days: 2,
            high_min_weight: 30.0,
            high_daily_load: 3.0,
            medium_within_days: 7,
            medium_min_weight: 15.0,
            medium_daily_load: 1.5,
        }
    }
}

impl PriorityThresholds {
    /// `daily_load` is the remaining hours spread evenly over the available days.
    pub fn tier(&self, days_until_due: i64, weight: f64, daily_load: f64) -> Priority {
        if days_until_due <= self.high_within_days
            || weight >= self.high_min_weight
            || daily_load >= self.high_daily_load
        {
            Priority::High
        } else if days_until_due <= self.medium_within_days
            || weight >= self.medium_min_weight
            || daily_load >= self.medium_daily_load
        {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

struct Candidate<'a> {
    position: usize,
    assignment: &'a Assignment,
    days_until_due: i64,
    remaining: f64,
    priority: Priority,
}

pub fn build_schedule(assignments: &[Assignment], hours_per_day: u32, today: NaiveDate) -> Schedule {
    build_schedule_with(assignments, hours_per_day, today, &PriorityThresholds::default())
}

pub fn build_schedule_with(
    assignments: &[Assignment],
    hours_per_day: u32,
    today: NaiveDate,
    thresholds: &PriorityThresholds,
) -> Schedule {
    let cap = f64::from(hours_per_day);
    let mut candidates: Vec<Candidate> = assignments
        .iter()
        .enumerate()
        .filter_map(|(position, assignment)| {
            let days_until_due = assignment.days_until_due(today);
            let remaining = assignment.remaining_hours();
            if days_until_due < 0 || remaining <= EPSILON {
                return None;
            }
            let available_days = (days_until_due + 1) as f64;
            let priority =
                thresholds.tier(days_until_due, assignment.weight, remaining / available_days);
            Some(Candidate {
                position,
                assignment,
                days_until_due,
                remaining,
                priority,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.days_until_due.cmp(&b.days_until_due))
            .then(b.assignment.weight.total_cmp(&a.assignment.weight))
            .then(a.position.cmp(&b.position))
    });

    let mut used: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut schedule = Schedule::default();

    for candidate in candidates {
        let assignment = candidate.assignment;
        let mut remaining = candidate.remaining;

        for offset in 0..=candidate.days_until_due {
            if remaining <= EPSILON {
                break;
            }
            let day = today + Duration::days(offset);
            let booked = used.entry(day).or_insert(0.0);
            let free = cap - *booked;
            if free <= EPSILON {
                continue;
            }
            let chunk = remaining.min(free);
            *booked += chunk;
            remaining -= chunk;

            schedule.daily_schedule.entry(day).or_default().push(Task {
                assignment: assignment.reference(),
                task: format!("{} {}", assignment.kind.task_verb(), assignment.name),
                hours: chunk,
                priority: candidate.priority,
            });
        }

        if remaining > EPSILON {
            tracing::debug!(
                assignment = %assignment.name,
                shortfall = remaining,
                "assignment does not fit before its deadline"
            );
            schedule.warnings.push(format!(
                "'{}' ({}) is short {:.1}h: only {:.1} of {:.1}h fit at {}h/day before {}.",
                assignment.name,
                assignment.course,
                remaining,
                candidate.remaining - remaining,
                candidate.remaining,
                hours_per_day,
                assignment.due_date
            ));
        }
    }

    schedule
}

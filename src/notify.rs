//! Deadline reminders, overload alerts and the daily plan, plus the
//! fingerprint that identifies a notification for de-duplication.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sha2::{Digest, Sha256};

use crate::models::{
    Assignment, Notification, NotificationKind, Schedule, Urgency, MINUTE_FORMAT,
};

/// Reminders nominally go out the day before the due date at this hour.
pub const REMINDER_HOUR: u32 = 9;
pub const REMINDER_LEAD_DAYS: i64 = 1;
/// Overload alerts and the daily plan go out at this hour of the affected day.
pub const MORNING_HOUR: u32 = 8;

const EPSILON: f64 = 1e-9;

/// Days-remaining cut-offs for reminder urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyThresholds {
    pub high_within_days: i64,
    pub medium_within_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            high_within_days: 1,
            medium_within_days: 3,
        }
    }
}

impl UrgencyThresholds {
    pub fn urgency(&self, days_remaining: i64) -> Urgency {
        if days_remaining <= self.high_within_days {
            Urgency::High
        } else if days_remaining <= self.medium_within_days {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifyOptions {
    pub lead_days: u32,
    pub hours_per_day: u32,
    pub thresholds: UrgencyThresholds,
}

impl NotifyOptions {
    pub fn new(lead_days: u32, hours_per_day: u32) -> Self {
        Self {
            lead_days,
            hours_per_day,
            thresholds: UrgencyThresholds::default(),
        }
    }
}

pub fn generate_notifications(
    schedule: &Schedule,
    assignments: &[Assignment],
    options: &NotifyOptions,
    now: NaiveDateTime,
) -> Vec<Notification> {
    let today = now.date();
    let mut notifications = Vec::new();

    for assignment in assignments {
        let days = assignment.days_until_due(today);
        if days < 0 || days > i64::from(options.lead_days) || assignment.is_complete() {
            continue;
        }
        let nominal = at_hour(assignment.due_date, REMINDER_HOUR)
            - chrono::Duration::days(REMINDER_LEAD_DAYS);
        notifications.push(Notification {
            kind: NotificationKind::Reminder,
            urgency: options.thresholds.urgency(days),
            // The message is fingerprinted, so it only carries date-independent text.
            message: format!(
                "{} ({}) is due on {}.",
                assignment.name, assignment.course, assignment.due_date
            ),
            action: format!("Due {}. {}", describe_days(days), reminder_action(assignment)),
            send_at: nominal.max(now),
            assignment: Some(assignment.reference()),
            nominal_at: nominal,
        });
    }

    let cap = f64::from(options.hours_per_day);
    for (day, tasks) in &schedule.daily_schedule {
        let hours: f64 = tasks.iter().map(|task| task.hours).sum();
        if hours <= cap + EPSILON {
            continue;
        }
        let nominal = at_hour(*day, MORNING_HOUR);
        notifications.push(Notification {
            kind: NotificationKind::Overload,
            urgency: Urgency::High,
            message: format!(
                "{} is overcommitted: {:.1}h planned against a {}h/day limit.",
                day, hours, options.hours_per_day
            ),
            action: "Move work to a lighter day or raise your daily hours.".to_string(),
            send_at: nominal.max(now),
            assignment: None,
            nominal_at: nominal,
        });
    }

    if let Some(tasks) = schedule.daily_schedule.get(&today) {
        if !tasks.is_empty() {
            let hours: f64 = tasks.iter().map(|task| task.hours).sum();
            let first = &tasks[0];
            let nominal = at_hour(today, MORNING_HOUR);
            notifications.push(Notification {
                kind: NotificationKind::DailyPlan,
                urgency: Urgency::Low,
                message: format!(
                    "Today's plan: {} task{} totalling {:.1}h.",
                    tasks.len(),
                    if tasks.len() == 1 { "" } else { "s" },
                    hours
                ),
                action: format!("Start with: {} ({:.1}h).", first.task, first.hours),
                send_at: nominal.max(now),
                assignment: None,
                nominal_at: nominal,
            });
        }
    }

    // Stable sort keeps generation order for full ties.
    notifications.sort_by(|a, b| a.send_at.cmp(&b.send_at).then(a.urgency.cmp(&b.urgency)));
    notifications
}

/// Stable identity of a notification: SHA-256 over type, course, assignment
/// name, nominal send time and message. The nominal time is used rather than
/// the clipped `send_at` so the same reminder keeps its identity from one
/// poll to the next.
pub fn fingerprint(notification: &Notification) -> String {
    let (course, name) = notification
        .assignment
        .as_ref()
        .map(|reference| (reference.course.as_str(), reference.name.as_str()))
        .unwrap_or(("", ""));
    let key = format!(
        "{}|{}|{}|{}|{}",
        notification.kind.as_str(),
        course,
        name,
        notification.nominal_at.format(MINUTE_FORMAT),
        notification.message
    );
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

fn describe_days(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    }
}

fn reminder_action(assignment: &Assignment) -> String {
    let remaining = assignment.remaining_hours();
    if assignment.progress == 0 {
        format!(
            "{} {} now: about {:.1}h of work left.",
            assignment.kind.task_verb(),
            assignment.name,
            remaining
        )
    } else {
        format!(
            "Finish the remaining {:.1}h ({}% done).",
            remaining, assignment.progress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentType, Priority, Task};
    use crate::schedule::build_schedule;
    use chrono::Duration;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
    }

    fn sample(name: &str, due_in: i64, hours: f64) -> Assignment {
        Assignment {
            course: "Databases".to_string(),
            course_code: "CS 445".to_string(),
            name: name.to_string(),
            kind: AssignmentType::Project,
            due_date: now().date() + Duration::days(due_in),
            weight: 15.0,
            estimated_hours: hours,
            description: String::new(),
            progress: 0,
        }
    }

    #[test]
    fn urgency_thresholds() {
        let thresholds = UrgencyThresholds::default();
        assert_eq!(thresholds.urgency(0), Urgency::High);
        assert_eq!(thresholds.urgency(1), Urgency::High);
        assert_eq!(thresholds.urgency(2), Urgency::Medium);
        assert_eq!(thresholds.urgency(3), Urgency::Medium);
        assert_eq!(thresholds.urgency(4), Urgency::Low);
    }

    #[test]
    fn reminder_within_lead_window() {
        let assignments = vec![sample("Schema design", 2, 3.0), sample("Final", 10, 3.0)];
        let schedule = build_schedule(&assignments, 4, now().date());
        let notes =
            generate_notifications(&schedule, &assignments, &NotifyOptions::new(3, 4), now());

        let reminders: Vec<&Notification> = notes
            .iter()
            .filter(|note| note.kind == NotificationKind::Reminder)
            .collect();
        assert_eq!(reminders.len(), 1);
        let reminder = reminders[0];
        assert_eq!(reminder.urgency, Urgency::Medium);
        assert!(reminder.send_at >= now());
        assert_eq!(
            reminder.send_at,
            (now().date() + Duration::days(1)).and_hms_opt(9, 0, 0).unwrap()
        );
        assert!(reminder.action.starts_with("Due in 2 days."));
        assert!(!reminder.message.contains("days"));
    }

    #[test]
    fn reminder_send_at_is_clipped_to_now() {
        let assignments = vec![sample("Demo", 0, 1.0)];
        let notes = generate_notifications(
            &Schedule::default(),
            &assignments,
            &NotifyOptions::new(3, 4),
            now(),
        );
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].urgency, Urgency::High);
        assert_eq!(notes[0].send_at, now());
        assert!(notes[0].nominal_at < now());
    }

    #[test]
    fn completed_assignments_get_no_reminder() {
        let mut done = sample("Done", 1, 2.0);
        done.progress = 100;
        let notes = generate_notifications(
            &Schedule::default(),
            &[done],
            &NotifyOptions::new(3, 4),
            now(),
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn overcommitted_day_raises_overload() {
        let day = now().date() + Duration::days(2);
        let mut schedule = Schedule::default();
        schedule.daily_schedule.insert(
            day,
            vec![Task {
                assignment: sample("Big", 2, 6.0).reference(),
                task: "Work on Big".to_string(),
                hours: 6.0,
                priority: Priority::High,
            }],
        );
        let notes = generate_notifications(&schedule, &[], &NotifyOptions::new(3, 4), now());
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Overload);
        assert_eq!(notes[0].urgency, Urgency::High);
        assert_eq!(notes[0].send_at, day.and_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn ordered_by_send_at_then_urgency() {
        let assignments = vec![
            sample("Three days", 3, 1.0),
            sample("Tomorrow", 1, 1.0),
            sample("Today", 0, 1.0),
        ];
        let schedule = build_schedule(&assignments, 4, now().date());
        let notes =
            generate_notifications(&schedule, &assignments, &NotifyOptions::new(3, 4), now());

        for pair in notes.windows(2) {
            assert!(pair[0].send_at <= pair[1].send_at);
            if pair[0].send_at == pair[1].send_at {
                assert!(pair[0].urgency <= pair[1].urgency);
            }
        }
        // Today and tomorrow both clip to now; the high-urgency reminders lead
        // the low-urgency daily plan.
        let kinds: Vec<NotificationKind> = notes.iter().map(|note| note.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationKind::Reminder,
                NotificationKind::Reminder,
                NotificationKind::DailyPlan,
                NotificationKind::Reminder,
            ]
        );
        assert_eq!(notes[0].urgency, Urgency::High);
        assert_eq!(notes[3].urgency, Urgency::Medium);
    }

    #[test]
    fn fingerprint_is_stable_across_clock_ticks() {
        let assignments = vec![sample("Demo", 0, 1.0)];
        let options = NotifyOptions::new(3, 4);
        let first = generate_notifications(&Schedule::default(), &assignments, &options, now());
        let later = generate_notifications(
            &Schedule::default(),
            &assignments,
            &options,
            now() + Duration::minutes(5),
        );
        assert_ne!(first[0].send_at, later[0].send_at);
        assert_eq!(fingerprint(&first[0]), fingerprint(&later[0]));
    }

    #[test]
    fn fingerprint_changes_with_message() {
        let assignments = vec![sample("Demo", 0, 1.0)];
        let options = NotifyOptions::new(3, 4);
        let note = generate_notifications(&Schedule::default(), &assignments, &options, now())
            .remove(0);
        let mut edited = note.clone();
        edited.message.push('!');
        assert_ne!(fingerprint(&note), fingerprint(&edited));
        assert_eq!(fingerprint(&note).len(), 64);
    }

    #[test]
    fn reminder_keeps_its_fingerprint_overnight() {
        let assignment = sample("Problem set 5", 2, 3.0);
        let options = NotifyOptions::new(3, 4);
        let reminder_at = |at: NaiveDateTime| {
            generate_notifications(&Schedule::default(), &[assignment.clone()], &options, at)
                .into_iter()
                .find(|note| note.kind == NotificationKind::Reminder)
                .unwrap()
        };

        let due = assignment.due_date;
        let day_before = reminder_at((due - Duration::days(1)).and_hms_opt(10, 0, 0).unwrap());
        let due_day = reminder_at(due.and_hms_opt(10, 0, 0).unwrap());

        assert_eq!(day_before.nominal_at, due_day.nominal_at);
        assert_ne!(day_before.action, due_day.action);
        assert_eq!(fingerprint(&day_before), fingerprint(&due_day));
    }
}

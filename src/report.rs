use std::fmt::Write;

use chrono::{Duration, NaiveDateTime};

use crate::models::{Assignment, Notification, Schedule, WorkloadAnalysis, MINUTE_FORMAT};

/// Days of the daily plan shown in reports and by `schedule`.
pub const PLAN_DAYS: i64 = 14;

pub struct ReportInput<'a> {
    pub assignments: &'a [Assignment],
    pub analysis: &'a WorkloadAnalysis,
    pub schedule: &'a Schedule,
    pub notifications: &'a [Notification],
    pub hours_per_day: u32,
}

pub fn build_report(input: &ReportInput<'_>, generated_at: NaiveDateTime) -> String {
    let today = generated_at.date();
    let analysis = input.analysis;
    let mut output = String::new();

    let _ = writeln!(output, "# CourseSync Workload Report");
    let _ = writeln!(
        output,
        "Generated {} for {} assignments ({}h/day study budget)",
        generated_at.format(MINUTE_FORMAT),
        input.assignments.len(),
        input.hours_per_day
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let open = input
        .assignments
        .iter()
        .filter(|assignment| !assignment.is_complete())
        .count();
    let _ = writeln!(output, "- Total estimated hours: {:.1}", analysis.total_hours);
    let _ = writeln!(output, "- Open assignments: {open}");
    let _ = writeln!(output, "- High-risk weeks: {}", analysis.risk_weeks.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Breakdown");
    if analysis.weekly_breakdown.is_empty() {
        let _ = writeln!(output, "No assignments recorded.");
    } else {
        for week in &analysis.weekly_breakdown {
            let _ = writeln!(
                output,
                "- {}: {:.1}h ({})",
                week.label,
                week.hours,
                week.status.label()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Priority Assignments");
    if analysis.priority_assignments.is_empty() {
        let _ = writeln!(output, "Nothing heavy is due in the next week.");
    } else {
        for assignment in &analysis.priority_assignments {
            let _ = writeln!(
                output,
                "- {} ({}) due {}, {}% of grade, {}% done",
                assignment.name,
                assignment.course,
                assignment.due_date,
                assignment.weight,
                assignment.progress
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for recommendation in &analysis.recommendations {
        let _ = writeln!(output, "- {recommendation}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next {PLAN_DAYS} Days");
    let horizon = today + Duration::days(PLAN_DAYS);
    let mut planned = false;
    for (date, tasks) in input.schedule.daily_schedule.range(today..horizon) {
        if tasks.is_empty() {
            continue;
        }
        planned = true;
        let _ = writeln!(
            output,
            "### {} ({:.1}h)",
            date.format("%a %Y-%m-%d"),
            input.schedule.hours_on(*date)
        );
        for task in tasks {
            let _ = writeln!(
                output,
                "- [{}] {} for {}: {:.1}h",
                task.priority, task.task, task.assignment.course, task.hours
            );
        }
    }
    if !planned {
        let _ = writeln!(output, "No study time scheduled.");
    }

    if !input.schedule.warnings.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Scheduling Warnings");
        for warning in &input.schedule.warnings {
            let _ = writeln!(output, "- {warning}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Upcoming Notifications");
    if input.notifications.is_empty() {
        let _ = writeln!(output, "No notifications pending.");
    } else {
        for notification in input.notifications.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} [{}] {}: {}",
                notification.send_at.format(MINUTE_FORMAT),
                notification.urgency,
                notification.kind.title(),
                notification.message
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentType;
    use crate::notify::{generate_notifications, NotifyOptions};
    use crate::schedule::build_schedule;
    use crate::workload::analyze_workload;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap()
    }

    fn assignment(name: &str, due_in: i64, weight: f64, hours: f64) -> Assignment {
        Assignment {
            course: "Biology".to_string(),
            course_code: "BIO 110".to_string(),
            name: name.to_string(),
            kind: AssignmentType::Exam,
            due_date: now().date() + Duration::days(due_in),
            weight,
            estimated_hours: hours,
            description: String::new(),
            progress: 0,
        }
    }

    fn render(assignments: &[Assignment]) -> String {
        let analysis = analyze_workload(assignments, 20, now().date());
        let schedule = build_schedule(assignments, 4, now().date());
        let notifications =
            generate_notifications(&schedule, assignments, &NotifyOptions::new(3, 4), now());
        build_report(
            &ReportInput {
                assignments,
                analysis: &analysis,
                schedule: &schedule,
                notifications: &notifications,
                hours_per_day: 4,
            },
            now(),
        )
    }

    #[test]
    fn report_covers_every_section() {
        let assignments = vec![
            assignment("Midterm", 2, 30.0, 8.0),
            assignment("Lab report", 1, 5.0, 10.0),
        ];
        let report = render(&assignments);

        assert!(report.starts_with("# CourseSync Workload Report\n"));
        assert!(report.contains("- Total estimated hours: 18.0"));
        assert!(report.contains("## Weekly Breakdown\n- Week of 2026-10-19: 18.0h (moderate)"));
        assert!(report.contains("- Midterm (Biology) due 2026-10-21, 30% of grade, 0% done"));
        assert!(report.contains("### Mon 2026-10-19 (4.0h)"));
        assert!(report.contains("## Scheduling Warnings\n- 'Lab report'"));
        assert!(report.contains("## Upcoming Notifications\n- 2026-10-19 08:00"));
    }

    #[test]
    fn empty_state_reads_cleanly() {
        let report = render(&[]);
        assert!(report.contains("No assignments recorded."));
        assert!(report.contains("No study time scheduled."));
        assert!(!report.contains("## Scheduling Warnings"));
    }
}

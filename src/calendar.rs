//! iCalendar (RFC 5545) export of assignment due dates.

use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Assignment;
use crate::store::write_atomically;

const MAX_LINE_OCTETS: usize = 75;

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

/// Folds a content line so no physical line exceeds 75 octets, never
/// splitting a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + 8);
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
            width = 1;
        }
        folded.push(ch);
        width += len;
    }
    folded.push_str("\r\n");
    folded
}

/// Same course, name and due date always produce the same UID, so importing
/// a re-export updates events instead of duplicating them.
pub fn event_uid(assignment: &Assignment) -> String {
    let key = format!(
        "{}|{}|{}",
        assignment.course, assignment.name, assignment.due_date
    );
    format!("{}@coursesync", Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
}

/// One all-day event per assignment. `stamp` is the UTC creation time.
pub fn render_calendar(assignments: &[Assignment], stamp: NaiveDateTime) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//CourseSync//Assignment Deadlines//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];
    let dtstamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();

    for assignment in assignments {
        let description = format!(
            "Course: {}\nType: {}\nWeight: {}%",
            assignment.course, assignment.kind, assignment.weight
        );
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{}", event_uid(assignment)));
        lines.push(format!("DTSTAMP:{dtstamp}"));
        lines.push(format!(
            "DTSTART;VALUE=DATE:{}",
            assignment.due_date.format("%Y%m%d")
        ));
        lines.push(format!(
            "DTEND;VALUE=DATE:{}",
            (assignment.due_date + Duration::days(1)).format("%Y%m%d")
        ));
        lines.push(format!("SUMMARY:{}", escape_text(&assignment.name)));
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    lines.iter().map(|line| fold_line(line)).collect()
}

pub fn write_calendar(path: &Path, assignments: &[Assignment], stamp: NaiveDateTime) -> Result<()> {
    let calendar = render_calendar(assignments, stamp);
    write_atomically(path, calendar.as_bytes())?;
    tracing::info!(path = %path.display(), events = assignments.len(), "calendar exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentType;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(15, 4, 5)
            .unwrap()
    }

    fn essay() -> Assignment {
        Assignment {
            course: "Philosophy".to_string(),
            course_code: "PHIL 210".to_string(),
            name: "Essay: ethics, duty; and choice".to_string(),
            kind: AssignmentType::Project,
            due_date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
            weight: 25.0,
            estimated_hours: 12.0,
            description: String::new(),
            progress: 0,
        }
    }

    #[test]
    fn renders_all_day_event() {
        let ics = render_calendar(&[essay()], stamp());
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("DTSTAMP:20261019T150405Z\r\n"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20261103\r\n"));
        assert!(ics.contains("DTEND;VALUE=DATE:20261104\r\n"));
        assert!(ics.contains("SUMMARY:Essay: ethics\\, duty\\; and choice\r\n"));
        assert!(ics.contains("DESCRIPTION:Course: Philosophy\\nType: project\\nWeight: 25%\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
    }

    #[test]
    fn uid_is_stable_and_distinct() {
        let first = event_uid(&essay());
        assert_eq!(first, event_uid(&essay()));
        let mut other = essay();
        other.due_date = NaiveDate::from_ymd_opt(2026, 11, 4).unwrap();
        assert_ne!(first, event_uid(&other));
        assert!(first.ends_with("@coursesync"));
    }

    #[test]
    fn long_lines_are_folded() {
        let mut long = essay();
        long.name = "é".repeat(60);
        let ics = render_calendar(&[long], stamp());
        for line in ics.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "{} octets", line.len());
        }
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{}", "é".repeat(60))));
    }

    #[test]
    fn export_reads_back_through_an_ical_parser() {
        let mut long = essay();
        long.name = "é".repeat(60);
        let ics = render_calendar(&[essay(), long], stamp());

        let calendars: Vec<_> = ical::IcalParser::new(std::io::BufReader::new(ics.as_bytes()))
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(calendars.len(), 1);
        let events = &calendars[0].events;
        assert_eq!(events.len(), 2);

        let value = |index: usize, name: &str| -> Option<String> {
            events[index]
                .properties
                .iter()
                .find(|property| property.name == name)
                .and_then(|property| property.value.clone())
        };
        assert_eq!(value(0, "UID"), Some(event_uid(&essay())));
        assert_eq!(value(0, "DTSTART").as_deref(), Some("20261103"));
        assert_eq!(value(1, "SUMMARY"), Some("é".repeat(60)));

        let dtstart = events[0]
            .properties
            .iter()
            .find(|property| property.name == "DTSTART")
            .unwrap();
        let params = dtstart.params.clone().unwrap_or_default();
        assert!(params
            .iter()
            .any(|(key, values)| key == "VALUE" && values.iter().any(|v| v == "DATE")));
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ics");
        write_calendar(&path, &[essay()], stamp()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_calendar(&[essay()], stamp()));
    }
}

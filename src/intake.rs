//! Turning outside material into courses: the syllabus parser's JSON reply,
//! CSV files, and prompt-driven manual entry.

use std::io::{BufRead, Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{parse_percentage, Assignment, AssignmentType, Course};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Loose shape of the parser's reply; every field may be missing or mistyped.
#[derive(Debug, Deserialize)]
pub struct RawCourse {
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub assignments: Vec<RawAssignment>,
}

#[derive(Debug, Deserialize)]
pub struct RawAssignment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub weight: Option<Value>,
    #[serde(default)]
    pub estimated_hours: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Numbers sometimes come back as strings such as "20%" or "~5".
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text
            .trim()
            .trim_start_matches('~')
            .trim_end_matches('%')
            .trim_end_matches('h')
            .trim()
            .parse()
            .ok(),
        _ => None,
    }
}

/// Parses the chat reply (optionally wrapped in a markdown fence) into a course.
pub fn parse_course_reply(content: &str) -> Result<Course> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    let raw: RawCourse = serde_json::from_str(body.trim())
        .map_err(|err| Error::ParseFailed(format!("reply is not course JSON: {err}")))?;
    normalize_course(raw)
}

pub fn normalize_course(raw: RawCourse) -> Result<Course> {
    let course_name = raw
        .course_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "N/A".to_string());
    let mut course = Course {
        course_name,
        course_code: raw.course_code.unwrap_or_default(),
        instructor: raw.instructor.unwrap_or_else(|| "N/A".to_string()),
        assignments: Vec::new(),
    };

    for entry in raw.assignments {
        let Some(name) = entry.name.filter(|name| !name.trim().is_empty()) else {
            tracing::warn!("dropping parsed assignment without a name");
            continue;
        };
        let Some(due_date) = entry.due_date.as_deref().and_then(parse_date) else {
            tracing::warn!(assignment = %name, due = ?entry.due_date, "dropping parsed assignment without a usable due date");
            continue;
        };
        let kind: AssignmentType = entry
            .kind
            .as_deref()
            .unwrap_or("other")
            .parse()
            .unwrap_or(AssignmentType::Other);
        let weight = entry
            .weight
            .as_ref()
            .and_then(lenient_number)
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);
        let estimated_hours = entry
            .estimated_hours
            .as_ref()
            .and_then(lenient_number)
            .filter(|hours| hours.is_finite() && *hours >= 0.0)
            .unwrap_or_else(|| kind.default_hours());

        course.assignments.push(Assignment {
            course: String::new(),
            course_code: String::new(),
            name: name.trim().to_string(),
            kind,
            due_date,
            weight,
            estimated_hours,
            description: entry.description.unwrap_or_default(),
            progress: 0,
        });
    }

    if course.assignments.is_empty() {
        return Err(Error::ParseFailed("no assignments with due dates found".into()));
    }
    course.stamp_assignments();
    Ok(course)
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    course_name: String,
    course_code: Option<String>,
    instructor: Option<String>,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    due_date: NaiveDate,
    weight: f64,
    estimated_hours: Option<f64>,
    description: Option<String>,
}

/// Reads assignment rows and groups them into courses in order of first
/// appearance.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Course>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut courses: Vec<Course> = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let kind: AssignmentType = row.kind.parse().unwrap_or(AssignmentType::Other);
        let assignment = Assignment {
            course: row.course_name.clone(),
            course_code: row.course_code.clone().unwrap_or_default(),
            name: row.name,
            kind,
            due_date: row.due_date,
            weight: row.weight,
            estimated_hours: row.estimated_hours.unwrap_or_else(|| kind.default_hours()),
            description: row.description.unwrap_or_default(),
            progress: 0,
        };
        assignment.validate()?;

        match courses
            .iter_mut()
            .find(|course| course.course_name == row.course_name)
        {
            Some(course) => course.assignments.push(assignment),
            None => courses.push(Course {
                course_name: row.course_name,
                course_code: row.course_code.unwrap_or_default(),
                instructor: row.instructor.unwrap_or_else(|| "N/A".to_string()),
                assignments: vec![assignment],
            }),
        }
    }

    for course in courses.iter_mut() {
        course.stamp_assignments();
    }
    Ok(courses)
}

pub fn import_csv(path: &Path) -> Result<Vec<Course>> {
    let file = std::fs::File::open(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file)
}

/// Line-oriented question/answer over any reader and writer.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns the default on an empty answer or end of input.
    pub fn ask(&mut self, label: &str, default: &str) -> Result<String> {
        Ok(self.ask_raw(label, default)?.0)
    }

    fn ask_raw(&mut self, label: &str, default: &str) -> Result<(String, bool)> {
        if default.is_empty() {
            write!(self.output, "{label}: ")?;
        } else {
            write!(self.output, "{label} [{default}]: ")?;
        }
        self.output.flush()?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        let answer = line.trim();
        if read == 0 || answer.is_empty() {
            return Ok((default.to_string(), read == 0));
        }
        Ok((answer.to_string(), false))
    }

    /// Asks until `parse` accepts the answer. Invalid answers are reported
    /// and asked again; at end of input the default is used.
    pub fn ask_with<T>(
        &mut self,
        label: &str,
        default: &str,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        loop {
            let (answer, eof) = self.ask_raw(label, default)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(err) if eof => return Err(err),
                Err(err) => writeln!(self.output, "  {err}")?,
            }
        }
    }
}

fn parse_count(input: &str) -> Result<usize> {
    input
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("'{input}' is not a whole number")))
}

fn parse_hours(input: &str) -> Result<f64> {
    match input.trim().parse::<f64>() {
        Ok(hours) if hours.is_finite() && hours >= 0.0 => Ok(hours),
        _ => Err(Error::InvalidInput(format!(
            "'{input}' is not a non-negative number of hours"
        ))),
    }
}

fn parse_due(input: &str) -> Result<NaiveDate> {
    parse_date(input)
        .ok_or_else(|| Error::InvalidInput(format!("'{input}' is not a date (YYYY-MM-DD)")))
}

/// Walks the user through entering a course by hand.
pub fn manual_course<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    today: NaiveDate,
) -> Result<Course> {
    let course_name = prompter.ask("Course name", "Untitled Course")?;
    let course_code = prompter.ask("Course code", "N/A")?;
    let instructor = prompter.ask("Instructor", "N/A")?;
    let count = prompter.ask_with("Number of assignments", "1", parse_count)?;
    let today_text = today.format("%Y-%m-%d").to_string();

    let mut course = Course {
        course_name,
        course_code,
        instructor,
        assignments: Vec::with_capacity(count),
    };

    for index in 1..=count {
        writeln!(prompter.output, "\nAssignment {index}")?;
        let name = prompter.ask("Name", &format!("Assignment {index}"))?;
        let kind: AssignmentType = prompter
            .ask("Type", "homework")?
            .parse()
            .unwrap_or(AssignmentType::Other);
        let due_date = prompter.ask_with("Due date (YYYY-MM-DD)", &today_text, parse_due)?;
        let weight = prompter.ask_with("Weight (%)", "10", |answer| {
            parse_percentage(answer, "weight")
        })?;
        let hours_default = kind.default_hours().to_string();
        let estimated_hours = prompter.ask_with("Estimated hours", &hours_default, parse_hours)?;
        let description = prompter.ask("Description", "")?;

        course.assignments.push(Assignment {
            course: String::new(),
            course_code: String::new(),
            name,
            kind,
            due_date,
            weight: f64::from(weight),
            estimated_hours,
            description,
            progress: 0,
        });
    }

    course.stamp_assignments();
    Ok(course)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_fenced_reply_and_fills_defaults() {
        let reply = r#"```json
        {
          "course_name": "Compilers",
          "course_code": "CS 432",
          "instructor": "Prof. Adeyemi",
          "assignments": [
            {"name": "Lexer", "type": "Homework", "due_date": "2026-10-30", "weight": "15%"},
            {"name": "Midterm", "type": "midterm", "due_date": "11/12/2026", "weight": 25, "estimated_hours": 10},
            {"name": "Reading", "due_date": "someday"},
            {"type": "quiz", "due_date": "2026-11-01"}
          ]
        }
        ```"#;
        let course = parse_course_reply(reply).unwrap();

        assert_eq!(course.course_name, "Compilers");
        assert_eq!(course.assignments.len(), 2);

        let lexer = &course.assignments[0];
        assert_eq!(lexer.kind, AssignmentType::Homework);
        assert_eq!(lexer.weight, 15.0);
        assert_eq!(lexer.estimated_hours, 5.0);
        assert_eq!(lexer.course, "Compilers");
        assert_eq!(lexer.course_code, "CS 432");

        let midterm = &course.assignments[1];
        assert_eq!(midterm.kind, AssignmentType::Exam);
        assert_eq!(midterm.due_date, NaiveDate::from_ymd_opt(2026, 11, 12).unwrap());
        assert_eq!(midterm.estimated_hours, 10.0);
    }

    #[test]
    fn reply_without_assignments_fails() {
        let err = parse_course_reply(r#"{"course_name": "Empty", "assignments": []}"#).unwrap_err();
        assert!(matches!(err, Error::ParseFailed(_)));
        assert!(parse_course_reply("I could not find a syllabus.").is_err());
    }

    #[test]
    fn csv_rows_group_into_courses() {
        let data = "\
course_name,course_code,instructor,name,type,due_date,weight,estimated_hours,description
Biology,BIO 110,Dr. Lin,Lab report,homework,2026-10-28,10,,Cells
Chemistry,CHEM 101,,Quiz 3,quiz,2026-10-24,5,1.5,
Biology,BIO 110,Dr. Lin,Final,exam,2026-12-10,40,12,Cumulative
";
        let courses = read_csv(Cursor::new(data)).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].course_name, "Biology");
        assert_eq!(courses[0].assignments.len(), 2);
        assert_eq!(courses[0].assignments[0].estimated_hours, 5.0);
        assert_eq!(courses[1].instructor, "N/A");
        assert_eq!(courses[1].assignments[0].estimated_hours, 1.5);
        assert_eq!(courses[1].assignments[0].course_code, "CHEM 101");
    }

    #[test]
    fn csv_rejects_out_of_range_weight() {
        let data = "\
course_name,course_code,instructor,name,type,due_date,weight,estimated_hours,description
Art,ART 1,,Portfolio,project,2026-12-01,120,30,
";
        assert!(read_csv(Cursor::new(data)).is_err());
    }

    #[test]
    fn manual_entry_uses_defaults_and_reasks_invalid_answers() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let answers = "\
Statistics
STAT 200

two
2
Problem set

2026-10-26
150
20

\n\n\n\n\n\n";
        let mut output = Vec::new();
        let mut prompter = Prompter::new(Cursor::new(answers), &mut output);
        let course = manual_course(&mut prompter, today).unwrap();

        assert_eq!(course.course_name, "Statistics");
        assert_eq!(course.instructor, "N/A");
        assert_eq!(course.assignments.len(), 2);

        let first = &course.assignments[0];
        assert_eq!(first.name, "Problem set");
        assert_eq!(first.kind, AssignmentType::Homework);
        assert_eq!(first.weight, 20.0);
        assert_eq!(first.estimated_hours, 5.0);
        assert_eq!(first.course, "Statistics");

        let second = &course.assignments[1];
        assert_eq!(second.name, "Assignment 2");
        assert_eq!(second.due_date, today);

        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("'two' is not a whole number"));
        assert!(transcript.contains("weight must be between 0 and 100"));
    }
}

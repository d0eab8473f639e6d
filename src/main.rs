use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::Context;
use chrono::{Days, Local, NaiveDate, NaiveDateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use coursesync::calendar;
use coursesync::delivery::{body_for, deliver, subject_for, SendmailMailer};
use coursesync::intake::{self, Prompter};
use coursesync::llm::{GroqParser, SyllabusParser};
use coursesync::models::{parse_percentage, Course, MINUTE_FORMAT};
use coursesync::notify::{generate_notifications, NotifyOptions};
use coursesync::report::{self, ReportInput, PLAN_DAYS};
use coursesync::schedule::build_schedule;
use coursesync::scrape::{extract_pdf_text, PageScraper, Scraper};
use coursesync::settings::{parse_flag, DataPaths, SettingsPatch};
use coursesync::store::{write_snapshot, Store};
use coursesync::worker;
use coursesync::workload::analyze_workload;

/// Notifications emailed by a single `notify --send`.
const SEND_LIMIT: usize = 10;
const MAX_PLAN_DAYS: i64 = 3660;

#[derive(Parser)]
#[command(name = "coursesync")]
#[command(about = "Syllabus-driven workload analysis, study schedules and deadline reminders", long_about = None)]
struct Cli {
    /// Directory holding data.json and settings.json
    #[arg(long, global = true, env = "COURSESYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse syllabus text from a file or stdin
    AddText {
        #[arg(long)]
        file: Option<PathBuf>,
        /// Anchor for relative dates such as "week 3" (defaults to today)
        #[arg(long)]
        semester_start: Option<NaiveDate>,
    },
    /// Parse a syllabus PDF
    AddPdf {
        path: PathBuf,
        #[arg(long)]
        semester_start: Option<NaiveDate>,
    },
    /// Scrape a syllabus web page and parse it
    Scrape {
        url: String,
        #[arg(long)]
        semester_start: Option<NaiveDate>,
    },
    /// Enter a course by hand
    AddManual,
    /// Import courses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List courses and their assignments
    List,
    /// Weekly workload and risk analysis
    Analyze,
    /// Day-by-day study schedule
    Schedule {
        /// Override the saved daily hours for this run
        #[arg(long)]
        hours_per_day: Option<u32>,
        /// Days to show, up to ten years
        #[arg(long, default_value_t = PLAN_DAYS, value_parser = clap::value_parser!(i64).range(1..=MAX_PLAN_DAYS))]
        days: i64,
    },
    /// Show pending notifications, optionally emailing them
    Notify {
        #[arg(long)]
        send: bool,
    },
    /// Record progress on an assignment (number as shown by `list`)
    Progress { number: usize, percent: String },
    /// Export due dates as an iCalendar file
    ExportIcs {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Write a markdown workload report
    Report {
        #[arg(long, default_value = "coursesync_report.md")]
        out: PathBuf,
    },
    /// Save a dated snapshot of courses and settings
    Save,
    /// Run the background notification worker
    Watch {
        /// Run one cycle and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    #[command(group(
        ArgGroup::new("changes")
            .args([
                "hours_per_day",
                "risk_threshold",
                "lead_days",
                "calendar_file",
                "email_enabled",
                "email_to",
                "email_schedule",
                "poll_seconds",
            ])
            .multiple(true)
            .required(true)
    ))]
    Set {
        #[arg(long)]
        hours_per_day: Option<u32>,
        #[arg(long)]
        risk_threshold: Option<u32>,
        #[arg(long)]
        lead_days: Option<u32>,
        #[arg(long)]
        calendar_file: Option<PathBuf>,
        #[arg(long, value_parser = parse_flag)]
        email_enabled: Option<bool>,
        #[arg(long)]
        email_to: Option<String>,
        #[arg(long, value_parser = parse_flag)]
        email_schedule: Option<bool>,
        #[arg(long)]
        poll_seconds: Option<u64>,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(match cli.command {
        Commands::Watch { .. } => "info",
        _ => "warn",
    });

    let paths = match cli.data_dir {
        Some(dir) => DataPaths::new(dir),
        None => DataPaths::platform_default()?,
    };
    let store = Store::open(paths.clone())
        .with_context(|| format!("failed to load data from {}", paths.data_dir.display()))?;
    let today = now().date();

    match cli.command {
        Commands::AddText {
            file,
            semester_start,
        } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    std::io::stdin()
                        .read_to_string(&mut text)
                        .context("failed to read syllabus from stdin")?;
                    text
                }
            };
            ingest(&store, Ok(text), semester_start.unwrap_or(today)).await?;
        }
        Commands::AddPdf {
            path,
            semester_start,
        } => {
            ingest(&store, extract_pdf_text(&path), semester_start.unwrap_or(today)).await?;
        }
        Commands::Scrape {
            url,
            semester_start,
        } => {
            let text = match Scraper::from_env() {
                Ok(scraper) => scraper.scrape(&url).await,
                Err(err) => Err(err),
            };
            ingest(&store, text, semester_start.unwrap_or(today)).await?;
        }
        Commands::AddManual => {
            let course = prompt_course(today)?;
            add_course(&store, course)?;
        }
        Commands::Import { csv } => {
            let courses = intake::import_csv(&csv)
                .with_context(|| format!("failed to import {}", csv.display()))?;
            let mut inserted = 0;
            for course in courses {
                inserted += store.update(|state| state.add_course(course))?;
            }
            println!("Imported {inserted} assignments from {}.", csv.display());
        }
        Commands::List => {
            let state = store.snapshot();
            if state.courses.is_empty() {
                println!("No courses yet. Add one with add-text, add-pdf, scrape, add-manual or import.");
                return Ok(());
            }
            for course in &state.courses {
                println!(
                    "{} ({}) taught by {}",
                    course.course_name, course.course_code, course.instructor
                );
            }
            println!();
            for (index, assignment) in state.assignments.iter().enumerate() {
                println!(
                    "{:>3}. {} [{}] {} due {} ({}%, {:.1}h, {}% done)",
                    index + 1,
                    assignment.course,
                    assignment.kind,
                    assignment.name,
                    assignment.due_date,
                    assignment.weight,
                    assignment.estimated_hours,
                    assignment.progress
                );
            }
        }
        Commands::Analyze => {
            let state = store.snapshot();
            let analysis =
                analyze_workload(&state.assignments, state.settings.risk_threshold, today);
            if analysis.weekly_breakdown.is_empty() {
                println!("No assignments to analyze.");
                return Ok(());
            }
            println!("Total estimated hours: {:.1}", analysis.total_hours);
            println!();
            println!("Weekly breakdown:");
            for week in &analysis.weekly_breakdown {
                println!("- {}: {:.1}h ({})", week.label, week.hours, week.status.label());
            }
            println!();
            println!("Recommendations:");
            for recommendation in &analysis.recommendations {
                println!("- {recommendation}");
            }
        }
        Commands::Schedule {
            hours_per_day,
            days,
        } => {
            let state = store.snapshot();
            let hours_per_day = hours_per_day.unwrap_or(state.settings.hours_per_day);
            anyhow::ensure!(hours_per_day > 0, "--hours-per-day must be greater than 0");
            let schedule = build_schedule(&state.assignments, hours_per_day, today);

            let horizon = today
                .checked_add_days(Days::new(days.clamp(1, MAX_PLAN_DAYS).unsigned_abs()))
                .unwrap_or(NaiveDate::MAX);
            let mut shown = false;
            for (date, tasks) in schedule.daily_schedule.range(today..horizon) {
                if tasks.is_empty() {
                    continue;
                }
                shown = true;
                println!("{} ({:.1}h)", date.format("%a %Y-%m-%d"), schedule.hours_on(*date));
                for task in tasks {
                    println!("  [{}] {} ({}): {:.1}h", task.priority, task.task, task.assignment.course, task.hours);
                }
            }
            if !shown {
                println!("Nothing to schedule.");
            }
            for warning in &schedule.warnings {
                println!("warning: {warning}");
            }
        }
        Commands::Notify { send } => {
            let state = store.snapshot();
            let settings = &state.settings;
            let now = now();
            let schedule = build_schedule(&state.assignments, settings.hours_per_day, now.date());
            let options =
                NotifyOptions::new(settings.notification_lead_days, settings.hours_per_day);
            let notifications =
                generate_notifications(&schedule, &state.assignments, &options, now);

            if notifications.is_empty() {
                println!("No notifications pending.");
            }
            for notification in &notifications {
                println!(
                    "{} [{}] {}",
                    notification.send_at.format(MINUTE_FORMAT),
                    notification.urgency,
                    subject_for(notification)
                );
                println!("  {}", body_for(notification).replace('\n', "\n  "));
            }

            if send {
                anyhow::ensure!(
                    settings.email_ready(),
                    "email is not configured; run `coursesync settings set --email-enabled true --email-to you@example.edu`"
                );
                let mailer = SendmailMailer::from_env();
                let batch: Vec<_> = notifications.into_iter().take(SEND_LIMIT).collect();
                let report = deliver(&store, &mailer, &settings.email_to, &batch).await;
                println!(
                    "Emailed {} notifications ({} already sent, {} failed).",
                    report.sent, report.duplicates, report.failed
                );
                anyhow::ensure!(report.unrecorded == 0, "sent notifications could not be recorded");
            }
        }
        Commands::Progress { number, percent } => {
            let progress = parse_percentage(&percent, "progress")?;
            let updated = store.update(|state| {
                state.set_progress(number, progress).map(|assignment| {
                    format!("{} ({})", assignment.name, assignment.course)
                })
            })?;
            println!("{updated} is now {progress}% complete.");
        }
        Commands::ExportIcs { out } => {
            let state = store.snapshot();
            let path = out.unwrap_or_else(|| state.settings.calendar_filename.clone());
            calendar::write_calendar(&path, &state.assignments, Utc::now().naive_utc())?;
            println!(
                "Exported {} events to {}.",
                state.assignments.len(),
                path.display()
            );
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = store.settings();
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            SettingsAction::Set {
                hours_per_day,
                risk_threshold,
                lead_days,
                calendar_file,
                email_enabled,
                email_to,
                email_schedule,
                poll_seconds,
            } => {
                let patch = SettingsPatch {
                    hours_per_day,
                    risk_threshold,
                    notification_lead_days: lead_days,
                    calendar_filename: calendar_file,
                    email_enabled,
                    email_to,
                    email_schedule_enabled: email_schedule,
                    notification_poll_seconds: poll_seconds,
                };
                let next = patch.apply(&store.settings())?;
                store.update_settings(next)?;
                println!("Settings saved.");
            }
        },
        Commands::Report { out } => {
            let state = store.snapshot();
            let settings = &state.settings;
            let now = now();
            let analysis = analyze_workload(&state.assignments, settings.risk_threshold, today);
            let schedule = build_schedule(&state.assignments, settings.hours_per_day, today);
            let options =
                NotifyOptions::new(settings.notification_lead_days, settings.hours_per_day);
            let notifications =
                generate_notifications(&schedule, &state.assignments, &options, now);
            let report = report::build_report(
                &ReportInput {
                    assignments: &state.assignments,
                    analysis: &analysis,
                    schedule: &schedule,
                    notifications: &notifications,
                    hours_per_day: settings.hours_per_day,
                },
                now,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Save => {
            let path = write_snapshot(store.paths(), &store.snapshot(), now())?;
            println!("Snapshot saved to {}.", path.display());
        }
        Commands::Watch { once } => {
            let mailer = SendmailMailer::from_env();
            if once {
                match worker::run_cycle(&store, &mailer, now()).await? {
                    worker::CycleOutcome::Idle => {
                        println!("Scheduled email is off; nothing sent.");
                    }
                    worker::CycleOutcome::Delivered(report) => println!(
                        "Emailed {} notifications ({} already sent, {} failed).",
                        report.sent, report.duplicates, report.failed
                    ),
                }
            } else {
                if !store.settings().scheduler_active() {
                    tracing::warn!(
                        "scheduled email is off; enable it with `settings set --email-enabled true --email-schedule true`"
                    );
                }
                let token = worker::install_shutdown_handler();
                worker::run_worker(&store, &mailer, token, now).await;
            }
        }
    }

    Ok(())
}

fn add_course(store: &Store, course: Course) -> anyhow::Result<()> {
    let name = course.course_name.clone();
    let added = store.update(|state| state.add_course(course))?;
    println!("Added {name} with {added} assignments.");
    Ok(())
}

/// Parses syllabus text into a course. External failures fall back to
/// manual entry instead of aborting.
async fn ingest(
    store: &Store,
    text: coursesync::Result<String>,
    semester_start: NaiveDate,
) -> anyhow::Result<()> {
    let parsed = match text {
        Ok(text) => match GroqParser::from_env() {
            Ok(parser) => parser.parse_syllabus(&text, semester_start).await,
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    };

    let course = match parsed {
        Ok(course) => course,
        Err(err) if err.is_external() => {
            tracing::warn!(error = %err, "automatic syllabus parsing failed");
            eprintln!("Could not parse the syllabus automatically: {err}");
            if !std::io::stdin().is_terminal() {
                anyhow::bail!(
                    "enter the course with `coursesync add-manual` or `coursesync import --csv <file>`"
                );
            }
            eprintln!("Falling back to manual entry.");
            prompt_course(now().date())?
        }
        Err(err) => return Err(err.into()),
    };

    add_course(store, course)
}

fn prompt_course(today: NaiveDate) -> anyhow::Result<Course> {
    let stdin = std::io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), std::io::stdout());
    let course = intake::manual_course(&mut prompter, today).context("manual entry failed")?;
    Ok(course)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_days_are_bounded() {
        let parsed = Cli::try_parse_from(["coursesync", "schedule", "--days", "30"]).unwrap();
        assert!(matches!(parsed.command, Commands::Schedule { days: 30, .. }));

        for days in ["0", "100000000"] {
            assert!(Cli::try_parse_from(["coursesync", "schedule", "--days", days]).is_err());
        }
    }
}

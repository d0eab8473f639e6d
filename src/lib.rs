//! Syllabus intake, workload analysis, study scheduling and deadline
//! notifications for a single student.

pub mod calendar;
pub mod delivery;
pub mod error;
pub mod intake;
pub mod llm;
pub mod models;
pub mod notify;
pub mod report;
pub mod schedule;
pub mod scrape;
pub mod settings;
pub mod store;
pub mod worker;
pub mod workload;

pub use error::{Error, Result};

//! Persistent application state: courses, the flat assignment list, settings
//! and the fingerprints of notifications already delivered.
//!
//! The whole document is rewritten on every mutation. [`Store`] wraps it in a
//! mutex so the CLI and the background worker can share one copy.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::models::{Assignment, Course};
use crate::settings::{self, DataPaths, Settings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    pub settings: Settings,
    #[serde(default)]
    pub sent_notifications: BTreeSet<String>,
}

/// On-disk shape; settings are optional because the settings file is the
/// source of truth for them.
#[derive(Deserialize)]
struct StoredState {
    #[serde(default)]
    timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    courses: Vec<Course>,
    #[serde(default)]
    assignments: Vec<Assignment>,
    #[serde(default)]
    sent_notifications: BTreeSet<String>,
}

impl AppState {
    pub fn empty(settings: Settings) -> Self {
        Self {
            timestamp: None,
            courses: Vec::new(),
            assignments: Vec::new(),
            settings,
            sent_notifications: BTreeSet::new(),
        }
    }

    /// Appends a course and its assignments to both collections.
    pub fn add_course(&mut self, mut course: Course) -> Result<usize> {
        if course.course_name.trim().is_empty() {
            return Err(Error::InvalidInput("course name is empty".into()));
        }
        course.stamp_assignments();
        for assignment in &course.assignments {
            assignment.validate()?;
        }
        let added = course.assignments.len();
        self.assignments.extend(course.assignments.iter().cloned());
        self.courses.push(course);
        Ok(added)
    }

    /// `position` is 1-based, as shown by `list`.
    pub fn set_progress(&mut self, position: usize, progress: u8) -> Result<&Assignment> {
        if progress > 100 {
            return Err(Error::InvalidInput(format!(
                "progress must be between 0 and 100, got {progress}"
            )));
        }
        let index = position
            .checked_sub(1)
            .filter(|index| *index < self.assignments.len())
            .ok_or(Error::AssignmentNotFound(position))?;

        if let Some((course, slot)) = self.locate(index) {
            self.courses[course].assignments[slot].progress = progress;
        }
        self.assignments[index].progress = progress;
        Ok(&self.assignments[index])
    }

    /// Maps a flat index to (course, slot) by walking courses in order.
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let mut offset = 0;
        for (course_index, course) in self.courses.iter().enumerate() {
            let len = course.assignments.len();
            if index < offset + len {
                return Some((course_index, index - offset));
            }
            offset += len;
        }
        None
    }

    pub fn is_consistent(&self) -> bool {
        let flattened: Vec<&Assignment> = self
            .courses
            .iter()
            .flat_map(|course| course.assignments.iter())
            .collect();
        flattened.len() == self.assignments.len()
            && flattened
                .iter()
                .zip(self.assignments.iter())
                .all(|(a, b)| *a == b)
    }

    /// Restores the course/flat-list invariant after loading a file written
    /// by an older version that only updated the flat list.
    pub fn reconcile(&mut self) {
        if self.is_consistent() {
            return;
        }
        let course_total: usize = self.courses.iter().map(|c| c.assignments.len()).sum();
        if course_total == self.assignments.len() {
            let mut flat = self.assignments.iter();
            for course in self.courses.iter_mut() {
                for slot in course.assignments.iter_mut() {
                    if let Some(source) = flat.next() {
                        *slot = source.clone();
                    }
                }
            }
            tracing::info!("synchronised course assignment copies from the flat list");
        } else {
            tracing::warn!(
                courses = course_total,
                flat = self.assignments.len(),
                "assignment lists disagree in length, rebuilding from courses"
            );
            self.assignments = self
                .courses
                .iter()
                .flat_map(|course| course.assignments.iter().cloned())
                .collect();
        }
    }
}

pub fn load_state(paths: &DataPaths) -> Result<AppState> {
    let (settings, needs_write) = settings::load_settings(paths)?;
    if needs_write {
        if let Err(err) = settings::save_settings(paths, &settings) {
            tracing::warn!(error = %err, "could not write merged settings");
        }
    }

    let path = paths.state_file();
    if !path.exists() {
        return Ok(AppState::empty(settings));
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| Error::Read {
        path: path.clone(),
        source,
    })?;
    let stored: StoredState =
        serde_json::from_str(&contents).map_err(|source| Error::Malformed {
            path: path.clone(),
            source,
        })?;

    let mut state = AppState {
        timestamp: stored.timestamp,
        courses: stored.courses,
        assignments: stored.assignments,
        settings,
        sent_notifications: stored.sent_notifications,
    };
    state.reconcile();
    Ok(state)
}

pub fn save_state(paths: &DataPaths, state: &mut AppState) -> Result<()> {
    state.timestamp = Some(Local::now().naive_local());
    let json = serde_json::to_string_pretty(state).map_err(|err| Error::Persist {
        path: paths.state_file(),
        reason: err.to_string(),
    })?;
    write_atomically(&paths.state_file(), json.as_bytes())
}

/// Writes to a uniquely named temp file in the target's directory and
/// renames it over the target, so concurrent writers never share a temp file.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let persist_err = |err: std::io::Error| Error::Persist {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(persist_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(persist_err)?;
    tmp.write_all(contents).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|err| persist_err(err.error))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    timestamp: NaiveDateTime,
    courses: &'a [Course],
    total_assignments: usize,
    settings: &'a Settings,
}

/// Writes a dated copy of the courses and settings next to the state file
/// and returns its path.
pub fn write_snapshot(paths: &DataPaths, state: &AppState, now: NaiveDateTime) -> Result<PathBuf> {
    let path = paths
        .data_dir
        .join(format!("coursesync_data_{}.json", now.format("%Y%m%d_%H%M%S")));
    let snapshot = Snapshot {
        timestamp: now,
        courses: &state.courses,
        total_assignments: state.assignments.len(),
        settings: &state.settings,
    };
    let json = serde_json::to_string_pretty(&snapshot).map_err(|err| Error::Persist {
        path: path.clone(),
        reason: err.to_string(),
    })?;
    write_atomically(&path, json.as_bytes())?;
    Ok(path)
}

/// Mutex-guarded state shared between the CLI and the background worker.
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct Store {
    paths: DataPaths,
    state: Mutex<AppState>,
}

impl Store {
    pub fn open(paths: DataPaths) -> Result<Self> {
        let state = load_state(&paths)?;
        Ok(Self {
            paths,
            state: Mutex::new(state),
        })
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AppState {
        self.lock().clone()
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Applies `change` to a draft copy. Nothing changes in memory if the
    /// closure fails; a persistence failure after a successful change is
    /// reported as [`Error::Persist`] with the change kept in memory.
    pub fn update<R>(&self, change: impl FnOnce(&mut AppState) -> Result<R>) -> Result<R> {
        let mut guard = self.lock();
        let mut draft = guard.clone();
        let result = change(&mut draft)?;
        *guard = draft;
        save_state(&self.paths, &mut guard)?;
        Ok(result)
    }

    pub fn update_settings(&self, next: Settings) -> Result<()> {
        next.validate()?;
        settings::save_settings(&self.paths, &next)?;
        self.update(|state| {
            state.settings = next;
            Ok(())
        })
    }

    pub fn is_sent(&self, fingerprint: &str) -> bool {
        self.lock().sent_notifications.contains(fingerprint)
    }

    /// Records a delivered fingerprint. It stays recorded in memory even if
    /// the write fails, so this process never re-sends it.
    ///
    /// The file is re-read first, so edits another invocation made since the
    /// last reload are kept rather than overwritten.
    pub fn mark_sent(&self, fingerprint: String) -> Result<()> {
        let mut guard = self.lock();
        if !guard.sent_notifications.insert(fingerprint) {
            return Ok(());
        }
        match load_state(&self.paths) {
            Ok(fresh) => merge_fresh(&mut guard, fresh),
            Err(err) => {
                tracing::warn!(error = %err, "could not re-read state before recording a sent notification");
            }
        }
        save_state(&self.paths, &mut guard)
    }

    /// Re-reads the files so edits made by other invocations are picked up.
    /// Sent fingerprints are merged rather than replaced.
    pub fn reload(&self) -> Result<()> {
        let fresh = load_state(&self.paths)?;
        merge_fresh(&mut self.lock(), fresh);
        Ok(())
    }
}

/// Replaces `current` with the state read from disk, keeping the union of
/// both sent sets.
fn merge_fresh(current: &mut AppState, fresh: AppState) {
    let sent: BTreeSet<String> = current
        .sent_notifications
        .union(&fresh.sent_notifications)
        .cloned()
        .collect();
    *current = fresh;
    current.sent_notifications = sent;
}

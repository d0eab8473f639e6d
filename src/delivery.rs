//! Email delivery of notifications, guarded by the sent-fingerprint set.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use chrono::NaiveDateTime;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::models::{Notification, MINUTE_FORMAT};
use crate::notify::fingerprint;
use crate::store::Store;

pub trait Mailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Hands messages to the local mail transport via `sendmail -t -i`.
///
/// `COURSESYNC_SENDMAIL` overrides the program path and
/// `COURSESYNC_MAIL_FROM` sets the From header.
#[derive(Debug, Clone)]
pub struct SendmailMailer {
    program: PathBuf,
    from: Option<String>,
}

impl SendmailMailer {
    pub fn new(program: impl Into<PathBuf>, from: Option<String>) -> Self {
        Self {
            program: program.into(),
            from,
        }
    }

    pub fn from_env() -> Self {
        let program = std::env::var("COURSESYNC_SENDMAIL").unwrap_or_else(|_| "sendmail".into());
        let from = std::env::var("COURSESYNC_MAIL_FROM")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self::new(program, from)
    }
}

/// Header values may not carry line breaks.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

pub fn compose_message(from: Option<&str>, to: &str, subject: &str, body: &str) -> String {
    let mut message = String::new();
    if let Some(from) = from {
        message.push_str(&format!("From: {}\r\n", header_value(from)));
    }
    message.push_str(&format!("To: {}\r\n", header_value(to)));
    message.push_str(&format!("Subject: {}\r\n", header_value(subject)));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    message.push_str(&body.replace('\n', "\r\n"));
    message.push_str("\r\n");
    message
}

impl Mailer for SendmailMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = compose_message(self.from.as_deref(), to, subject, body);
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                Error::Delivery(format!("could not start {}: {err}", self.program.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(message.as_bytes())
                .await
                .map_err(|err| Error::Delivery(format!("could not write message: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| Error::Delivery(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Delivery(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(to, subject, "message handed to sendmail");
        Ok(())
    }
}

pub fn subject_for(notification: &Notification) -> String {
    format!("CourseSync: {}", notification.kind.title())
}

pub fn body_for(notification: &Notification) -> String {
    format!(
        "{}\n\nAction: {}\nSend at: {}",
        notification.message,
        notification.action,
        notification.send_at.format(MINUTE_FORMAT)
    )
}

/// Notifications whose send time has arrived.
pub fn due_now(notifications: &[Notification], now: NaiveDateTime) -> Vec<Notification> {
    notifications
        .iter()
        .filter(|notification| notification.send_at <= now)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Sent, but the fingerprint could not be written to disk.
    pub unrecorded: usize,
}

/// Sends every notification whose fingerprint is not yet recorded, recording
/// each one right after its send succeeds.
pub async fn deliver<M: Mailer>(
    store: &Store,
    mailer: &M,
    to: &str,
    notifications: &[Notification],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for notification in notifications {
        let id = fingerprint(notification);
        if store.is_sent(&id) {
            report.duplicates += 1;
            continue;
        }

        let subject = subject_for(notification);
        match mailer.send(to, &subject, &body_for(notification)).await {
            Ok(()) => {
                report.sent += 1;
                tracing::info!(fingerprint = &id[..12], kind = notification.kind.as_str(), "notification emailed");
                if let Err(err) = store.mark_sent(id) {
                    report.unrecorded += 1;
                    tracing::error!(error = %err, "could not record delivered notification");
                }
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(error = %err, kind = notification.kind.as_str(), "notification email failed");
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records messages instead of sending them.
    #[derive(Debug, Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String, String)>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Delivery("transport offline".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }
}

//! Background notification worker for `coursesync watch`.

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;

use crate::delivery::{deliver, due_now, DeliveryReport, Mailer};
use crate::error::Result;
use crate::notify::{generate_notifications, NotifyOptions};
use crate::schedule::build_schedule;
use crate::store::Store;

/// Install a shutdown handler that listens for Ctrl-C and, on unix, SIGTERM.
///
/// Returns a `CancellationToken` that is cancelled when either arrives.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, finishing current cycle");
                        }
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Received SIGINT, finishing current cycle");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "could not install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Received SIGINT, finishing current cycle");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl-C, finishing current cycle");
        }

        token_clone.cancel();
    });

    token
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Email or scheduled delivery is switched off.
    Idle,
    Delivered(DeliveryReport),
}

/// One poll: pick up edits from disk, rebuild the schedule, and mail every
/// due notification that has not been sent before.
pub async fn run_cycle<M: Mailer + Sync>(
    store: &Store,
    mailer: &M,
    now: NaiveDateTime,
) -> Result<CycleOutcome> {
    if let Err(err) = store.reload() {
        tracing::warn!(error = %err, "could not reload state, using the copy in memory");
    }

    let state = store.snapshot();
    let settings = &state.settings;
    if !settings.scheduler_active() {
        tracing::debug!("scheduled email is off, skipping cycle");
        return Ok(CycleOutcome::Idle);
    }

    let schedule = build_schedule(&state.assignments, settings.hours_per_day, now.date());
    let options = NotifyOptions::new(settings.notification_lead_days, settings.hours_per_day);
    let notifications = generate_notifications(&schedule, &state.assignments, &options, now);
    let due = due_now(&notifications, now);

    let report = deliver(store, mailer, &settings.email_to, &due).await;
    if report.sent > 0 || report.failed > 0 {
        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.duplicates,
            "notification cycle complete"
        );
    }
    Ok(CycleOutcome::Delivered(report))
}

/// Polls until `token` is cancelled. A cycle in progress always runs to
/// completion; only the sleep between cycles is interrupted.
pub async fn run_worker<M, C>(store: &Store, mailer: &M, token: CancellationToken, clock: C)
where
    M: Mailer + Sync,
    C: Fn() -> NaiveDateTime,
{
    tracing::info!(data_dir = %store.paths().data_dir.display(), "notification worker started");

    loop {
        if token.is_cancelled() {
            break;
        }

        if let Err(err) = run_cycle(store, mailer, clock()).await {
            tracing::error!(error = %err, "notification cycle failed");
        }

        let interval = store.settings().poll_interval();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("notification worker stopped");
}

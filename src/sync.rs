//! Background Gmail / Drive sync.
//!
//! Polling itself is simulated: a tick only checks whether the Google
//! session is authenticated and logs what it would do. The loop runs on
//! its own task and is stopped through the returned [`SyncHandle`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::google_auth::GoogleAuth;

pub struct SyncLoop;

pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncLoop {
    /// Spawn the loop. The first tick runs immediately.
    pub fn start(auth: Arc<GoogleAuth>, config: &SyncConfig) -> SyncHandle {
        let cancel = CancellationToken::new();
        let interval = Duration::from_secs(config.interval_secs);
        let max_backoff = Duration::from_secs(config.max_backoff_secs);

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "sync loop started");
            let mut delay = interval;

            loop {
                let ok = tick(&auth).await;
                delay = next_delay(delay, interval, max_backoff, ok);

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            tracing::info!("sync loop stopped");
        });

        SyncHandle { cancel, task }
    }
}

impl SyncHandle {
    /// Cancel the loop and wait for its task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "sync task ended abnormally");
        }
    }
}

async fn tick(auth: &GoogleAuth) -> bool {
    match auth.check().await {
        Ok(true) => {
            tracing::info!("polling Gmail and Google Drive (simulated)");
            true
        }
        Ok(false) => {
            tracing::info!("not authenticated, skipping Gmail and Google Drive poll");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "sync tick failed");
            false
        }
    }
}

/// Delay before the next tick: doubled after a failure, capped at
/// `max_backoff`, and back to `interval` after a success.
pub fn next_delay(current: Duration, interval: Duration, max_backoff: Duration, ok: bool) -> Duration {
    if ok {
        interval
    } else {
        current.saturating_mul(2).min(max_backoff).max(interval)
    }
}

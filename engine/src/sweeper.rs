//! Periodic expiry sweeper.
//!
//! Expired pending registrations are reconciled lazily on every read and
//! write; this background task additionally sweeps on an interval so that
//! freed slots reach the waitlist even on events nobody is looking at.

use crate::engine::RegistrationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to the background sweep task.
pub struct ExpirySweeper {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Spawn a sweeper that sweeps every hosted event on `interval`.
    #[must_use]
    pub fn spawn(engine: Arc<RegistrationEngine>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::debug!("expiry sweep tick");
                        engine.sweep_all().await;
                    },
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    },
                }
            }
        });

        Self { stop, task }
    }

    /// Stop the sweeper and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

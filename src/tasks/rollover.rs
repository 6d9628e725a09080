use std::{sync::Arc, time::Duration};

use cashday_core::{business_day, Clock};
use cashday_domain::BusinessDayConfig;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};

pub const DEFAULT_ROLLOVER_PERIOD: Duration = Duration::from_secs(60);
const EVENT_BUFFER: usize = 8;

/// Emitted when the computed business day differs from the previous check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDayChanged {
    pub previous: NaiveDate,
    pub current: NaiveDate,
}

/// Periodically recomputes the business day and reports changes.
#[derive(Debug)]
pub struct RolloverWatcher {
    current: NaiveDate,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RolloverWatcher {
    /// Starts the watcher on the current tokio runtime.
    ///
    /// Each check reads the latest value published on `config`, so a cutoff
    /// change is picked up on the next tick. The returned receiver yields one
    /// event per observed change. The task ends when the watcher is cancelled
    /// or dropped, or the receiver is dropped.
    pub fn spawn(
        clock: Arc<dyn Clock>,
        config: watch::Receiver<BusinessDayConfig>,
        period: Duration,
    ) -> (Self, mpsc::Receiver<BusinessDayChanged>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let initial = business_day(*config.borrow(), clock.local_now());

        let handle = tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let cutoff = *config.borrow();
                        let current = business_day(cutoff, clock.local_now());
                        if current != last {
                            info!(
                                previous = %last,
                                current = %current,
                                cutoff = cutoff.cutoff_hour(),
                                "business day rolled over"
                            );
                            let event = BusinessDayChanged { previous: last, current };
                            last = current;
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            debug!("rollover watcher stopped");
        });

        (
            Self {
                current: initial,
                cancel_tx,
                handle: Some(handle),
            },
            events_rx,
        )
    }

    /// Business day observed when the watcher started.
    pub fn initial_day(&self) -> NaiveDate {
        self.current
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Cancels and waits for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RolloverWatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

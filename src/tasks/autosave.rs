use std::{sync::Arc, time::Duration};

use cashday_domain::ClosureDraft;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use crate::{session::AutosaveOutcome, CashdayError};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(3);

/// Receiver of debounced drafts. Calls run on tokio's blocking pool.
pub trait AutosaveSink: Send + Sync + 'static {
    fn autosave(&self, draft: &ClosureDraft) -> Result<AutosaveOutcome, CashdayError>;
}

/// Hands the latest scheduled draft to a sink once edits pause for `delay`.
#[derive(Debug)]
pub struct AutosaveDebouncer {
    drafts_tx: mpsc::UnboundedSender<ClosureDraft>,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl AutosaveDebouncer {
    pub fn spawn<S: AutosaveSink>(sink: Arc<S>, delay: Duration) -> Self {
        let (drafts_tx, mut drafts_rx) = mpsc::unbounded_channel::<ClosureDraft>();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut pending: Option<ClosureDraft> = None;
            let mut deadline = Instant::now();

            loop {
                tokio::select! {
                    biased;
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    draft = drafts_rx.recv() => match draft {
                        Some(draft) => {
                            pending = Some(draft);
                            deadline = Instant::now() + delay;
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                        if let Some(draft) = pending.take() {
                            let date = draft.date;
                            let sink = Arc::clone(&sink);
                            // Sinks write files; keep that off the async workers.
                            match tokio::task::spawn_blocking(move || sink.autosave(&draft)).await {
                                Ok(Ok(outcome)) => debug!(date = %date, ?outcome, "autosave flushed"),
                                Ok(Err(err)) => warn!(date = %date, error = %err, "autosave failed"),
                                Err(err) => warn!(date = %date, error = %err, "autosave task panicked"),
                            }
                        }
                    }
                }
            }
            if pending.is_some() {
                debug!("autosave debouncer stopped with an unsaved draft");
            }
        });

        Self {
            drafts_tx,
            cancel_tx,
            handle: Some(handle),
        }
    }

    /// Replaces the pending draft and restarts the delay.
    pub fn schedule(&self, draft: ClosureDraft) -> Result<(), CashdayError> {
        self.drafts_tx
            .send(draft)
            .map_err(|_| CashdayError::TaskStopped("autosave debouncer".into()))
    }

    /// Stops the task; a pending draft is dropped unsaved.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for AutosaveDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

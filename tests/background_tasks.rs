mod common;

use std::{sync::Arc, time::Duration};

use cashday::{
    tasks::{AutosaveDebouncer, AutosaveSink, BusinessDayChanged, DEFAULT_ROLLOVER_PERIOD},
    AutosaveOutcome, CashdayError,
};
use cashday_core::ClosureStore;
use cashday_domain::{ClosureDraft, SettingsPatch};
use tokio::{sync::mpsc, time::Instant};

use common::{at, june, setup_test_env};

struct RecordingSink {
    saved: mpsc::UnboundedSender<(Instant, ClosureDraft)>,
}

impl AutosaveSink for RecordingSink {
    fn autosave(&self, draft: &ClosureDraft) -> Result<AutosaveOutcome, CashdayError> {
        let _ = self.saved.send((Instant::now(), draft.clone()));
        Ok(AutosaveOutcome::SkippedEmpty)
    }
}

fn recording_sink() -> (
    Arc<RecordingSink>,
    mpsc::UnboundedReceiver<(Instant, ClosureDraft)>,
) {
    let (saved, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingSink { saved }), rx)
}

#[tokio::test(start_paused = true)]
async fn rollover_fires_once_when_the_business_day_changes() {
    let env = setup_test_env(at(june(1), 23, 50));
    let (watcher, mut events) = env.session.watch_rollover(DEFAULT_ROLLOVER_PERIOD);
    assert_eq!(watcher.initial_day(), june(1));

    env.clock.set(at(june(2), 3, 0));
    let quiet = tokio::time::timeout(Duration::from_secs(180), events.recv()).await;
    assert!(quiet.is_err(), "no event while still inside the cutoff window");

    env.clock.set(at(june(2), 4, 1));
    let event = events.recv().await.expect("rollover event");
    assert_eq!(
        event,
        BusinessDayChanged {
            previous: june(1),
            current: june(2),
        }
    );

    assert_eq!(
        serde_json::to_value(event).unwrap(),
        serde_json::json!({ "previous": "2024-06-01", "current": "2024-06-02" })
    );

    watcher.shutdown().await;
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn rollover_follows_a_cutoff_change_while_running() {
    let env = setup_test_env(at(june(2), 4, 30));
    let (watcher, mut events) = env.session.watch_rollover(DEFAULT_ROLLOVER_PERIOD);
    assert_eq!(watcher.initial_day(), june(2));

    env.session
        .update_settings(&SettingsPatch::cutoff_hour(6))
        .expect("update cutoff");
    assert_eq!(env.session.business_day(), june(1));

    let event = tokio::time::timeout(Duration::from_secs(180), events.recv())
        .await
        .expect("event after the cutoff change")
        .expect("watcher still running");
    assert_eq!(
        event,
        BusinessDayChanged {
            previous: june(2),
            current: june(1),
        }
    );
    watcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn debouncer_saves_only_the_latest_draft_after_the_delay() {
    let (sink, mut saved) = recording_sink();
    let debouncer = AutosaveDebouncer::spawn(sink, Duration::from_secs(3));
    let start = Instant::now();

    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(1.0, 0.0, 0.0))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(2.0, 0.0, 0.0))
        .unwrap();

    let (when, draft) = saved.recv().await.expect("flushed draft");
    assert_eq!(draft.cash_counted, 2.0);
    assert!(when.duration_since(start) >= Duration::from_secs(4));

    let again = tokio::time::timeout(Duration::from_secs(10), saved.recv()).await;
    assert!(again.is_err(), "a single flush per burst of edits");
    debouncer.shutdown().await;
}

struct ThreadSink {
    threads: mpsc::UnboundedSender<std::thread::ThreadId>,
}

impl AutosaveSink for ThreadSink {
    fn autosave(&self, _draft: &ClosureDraft) -> Result<AutosaveOutcome, CashdayError> {
        let _ = self.threads.send(std::thread::current().id());
        Ok(AutosaveOutcome::SkippedEmpty)
    }
}

#[tokio::test(start_paused = true)]
async fn debouncer_flushes_on_the_blocking_pool() {
    let (threads, mut seen) = mpsc::unbounded_channel();
    let debouncer = AutosaveDebouncer::spawn(Arc::new(ThreadSink { threads }), Duration::from_secs(3));

    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(1.0, 0.0, 0.0))
        .unwrap();
    let flushed_on = seen.recv().await.expect("flushed");
    assert_ne!(flushed_on, std::thread::current().id());
    debouncer.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancelled_debouncer_drops_the_pending_draft() {
    let (sink, mut saved) = recording_sink();
    let debouncer = AutosaveDebouncer::spawn(sink, Duration::from_secs(3));

    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(5.0, 0.0, 0.0))
        .unwrap();
    debouncer.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(10), saved.recv()).await;
    assert!(!matches!(result, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn session_debouncer_writes_open_closures_and_respects_closed_days() {
    let env = setup_test_env(at(june(1), 19, 0));
    let debouncer = env.session.autosave_debouncer(Duration::from_secs(3));

    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(80.0, 0.0, 0.0))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    let open = env.store.get_closure_by_date(june(1)).unwrap().unwrap();
    assert_eq!(open.total_counted, 80.0);
    assert!(!open.is_closed());

    env.session
        .finalize(&ClosureDraft::new(june(1)).with_counts(90.0, 0.0, 0.0))
        .unwrap();
    debouncer
        .schedule(ClosureDraft::new(june(1)).with_counts(1.0, 0.0, 0.0))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;

    let closed = env.store.get_closure_by_date(june(1)).unwrap().unwrap();
    assert!(closed.is_closed());
    assert_eq!(closed.total_counted, 90.0);
    debouncer.shutdown().await;
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cashday::ClosureSession;
use cashday_config::SettingsManager;
use cashday_core::ManualClock;
use cashday_storage_json::JsonClosureStore;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use tempfile::TempDir;

pub const USER: &str = "u1";

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub struct TestEnv {
    pub session: Arc<ClosureSession>,
    pub store: Arc<JsonClosureStore>,
    pub settings: Arc<SettingsManager>,
    pub clock: Arc<ManualClock>,
}

pub fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).expect("valid time")
}

pub fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).expect("valid date")
}

/// Creates a session over a JSON store in a fresh directory, with time frozen at `local`.
pub fn setup_test_env(local: NaiveDateTime) -> TestEnv {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);

    let store = Arc::new(JsonClosureStore::new(base.join("data"), USER).expect("json store"));
    let settings =
        Arc::new(SettingsManager::with_base_dir(base).expect("settings manager for temp dir"));
    let clock = Arc::new(ManualClock::new(local));
    let session = ClosureSession::open(USER, store.clone(), settings.clone(), clock.clone())
        .expect("open session");

    TestEnv {
        session: Arc::new(session),
        store,
        settings,
        clock,
    }
}

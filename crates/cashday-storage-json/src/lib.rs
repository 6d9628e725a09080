use std::{
    cmp::Reverse,
    collections::BTreeMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use cashday_core::{ClosureListener, ClosureStore, CoreError, Subscription};
use cashday_domain::{closure_id, format_date, DailyClosure, WorkModeTransaction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

const FILE_EXTENSION: &str = "json";
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const COUNTERS_FILE: &str = "counters.json";
const TMP_SUFFIX: &str = "tmp";
const DEFAULT_RETENTION: usize = 5;

type Listeners = Arc<Mutex<Vec<(u64, ClosureListener)>>>;

/// Filesystem-backed JSON persistence for one user's closures.
///
/// Layout under `root`:
/// `closures/{id}.json`, `transactions/{date}.json`, `counters.json` and
/// `archive/{id}/{timestamp}.json` for deleted closures.
#[derive(Clone)]
pub struct JsonClosureStore {
    root: PathBuf,
    user_id: String,
    retention: usize,
    write_lock: Arc<Mutex<()>>,
    listeners: Listeners,
    next_listener: Arc<AtomicU64>,
}

impl JsonClosureStore {
    pub fn new(root: PathBuf, user_id: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_retention(root, user_id, DEFAULT_RETENTION)
    }

    pub fn with_retention(
        root: PathBuf,
        user_id: impl Into<String>,
        retention: usize,
    ) -> Result<Self, CoreError> {
        fs::create_dir_all(root.join("closures"))?;
        fs::create_dir_all(root.join("transactions"))?;
        fs::create_dir_all(root.join("archive"))?;
        Ok(Self {
            root,
            user_id: user_id.into(),
            retention: retention.max(1),
            write_lock: Arc::new(Mutex::new(())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn closure_path(&self, id: &str) -> PathBuf {
        self.root
            .join("closures")
            .join(format!("{}.{}", id, FILE_EXTENSION))
    }

    pub fn transactions_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join("transactions")
            .join(format!("{}.{}", format_date(date), FILE_EXTENSION))
    }

    fn counters_path(&self) -> PathBuf {
        self.root.join(COUNTERS_FILE)
    }

    fn archive_dir(&self, id: &str) -> PathBuf {
        self.root.join("archive").join(id)
    }

    /// Appends an externally registered transaction to the snapshot of `date`.
    pub fn record_transaction(
        &self,
        date: NaiveDate,
        transaction: &WorkModeTransaction,
    ) -> Result<(), CoreError> {
        let _guard = self.lock_writes();
        let path = self.transactions_path(date);
        let mut transactions: Vec<WorkModeTransaction> = read_json(&path)?.unwrap_or_default();
        if transactions.iter().any(|existing| existing.id == transaction.id) {
            return Err(CoreError::Validation(format!(
                "transaction {} already recorded for {}",
                transaction.id,
                format_date(date)
            )));
        }
        transactions.push(transaction.clone());
        write_json(&path, &transactions)?;
        debug!(date = %date, id = %transaction.id, "recorded work mode transaction");
        Ok(())
    }

    /// Archived copies of a deleted closure, newest first.
    pub fn archived_closures(&self, id: &str) -> Result<Vec<PathBuf>, CoreError> {
        let dir = self.archive_dir(id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION) {
                entries.push(path);
            }
        }
        entries.sort_by_key(|path| Reverse(path.file_name().map(|name| name.to_os_string())));
        Ok(entries)
    }

    fn load_closure(&self, id: &str) -> Result<Option<DailyClosure>, CoreError> {
        read_json(&self.closure_path(id))
    }

    fn write_closure(&self, closure: &DailyClosure) -> Result<(), CoreError> {
        write_json(&self.closure_path(&closure.id), closure)
    }

    fn archive(&self, id: &str, source: &Path) -> Result<(), CoreError> {
        let dir = self.archive_dir(id);
        fs::create_dir_all(&dir)?;
        let stamp = Utc::now().format(ARCHIVE_TIMESTAMP_FORMAT).to_string();
        fs::copy(source, dir.join(format!("{}.{}", stamp, FILE_EXTENSION)))?;
        for stale in self.archived_closures(id)?.into_iter().skip(self.retention) {
            let _ = fs::remove_file(stale);
        }
        Ok(())
    }

    fn load_counters(&self) -> Result<BTreeMap<String, u32>, CoreError> {
        Ok(read_json(&self.counters_path())?.unwrap_or_default())
    }

    fn raise_counter(&self, date: NaiveDate, number: u32) -> Result<(), CoreError> {
        let mut counters = self.load_counters()?;
        let entry = counters.entry(format_date(date)).or_insert(0);
        if number > *entry {
            *entry = number;
            write_json(&self.counters_path(), &counters)?;
        }
        Ok(())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let listeners: Vec<ClosureListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }
        match self.list_closures() {
            Ok(snapshot) => {
                for listener in listeners {
                    listener(&snapshot);
                }
            }
            Err(err) => warn!(error = %err, "could not refresh closure listeners"),
        }
    }
}

impl ClosureStore for JsonClosureStore {
    fn get_closure_by_date(&self, date: NaiveDate) -> Result<Option<DailyClosure>, CoreError> {
        self.load_closure(&closure_id(&self.user_id, date, None))
    }

    fn save_closure(&self, closure: &DailyClosure) -> Result<String, CoreError> {
        {
            let _guard = self.lock_writes();
            if let Some(stored) = self.load_closure(&closure.id)? {
                if stored.version != closure.version {
                    return Err(CoreError::StaleWrite {
                        id: closure.id.clone(),
                        expected: closure.version,
                        found: stored.version,
                    });
                }
            }
            let mut record = closure.clone();
            record.version = closure.version + 1;
            self.write_closure(&record)?;
            if let Some(number) = record.closure_number {
                self.raise_counter(record.date, number)?;
            }
            debug!(id = %record.id, version = record.version, status = %record.status, "saved closure");
        }
        self.notify();
        Ok(closure.id.clone())
    }

    fn close_closure(&self, id: &str, closed_at: DateTime<Utc>) -> Result<(), CoreError> {
        {
            let _guard = self.lock_writes();
            let mut record = self
                .load_closure(id)?
                .ok_or_else(|| CoreError::ClosureNotFound(id.to_string()))?;
            record.mark_closed(closed_at);
            record.version += 1;
            self.write_closure(&record)?;
            debug!(id, "closed closure");
        }
        self.notify();
        Ok(())
    }

    fn delete_closure(&self, date: NaiveDate) -> Result<(), CoreError> {
        {
            let _guard = self.lock_writes();
            let id = closure_id(&self.user_id, date, None);
            let path = self.closure_path(&id);
            if !path.exists() {
                return Ok(());
            }
            self.archive(&id, &path)?;
            fs::remove_file(&path)?;
            debug!(id = %id, "deleted closure");
        }
        self.notify();
        Ok(())
    }

    fn get_next_closure_number(&self, date: NaiveDate) -> Result<u32, CoreError> {
        let _guard = self.lock_writes();
        let on_disk = self
            .list_closures()?
            .iter()
            .filter(|closure| closure.date == date)
            .map(|closure| closure.closure_number.unwrap_or(1))
            .max()
            .unwrap_or(0);
        let high_water = self
            .load_counters()?
            .get(&format_date(date))
            .copied()
            .unwrap_or(0);
        let next = on_disk.max(high_water) + 1;
        self.raise_counter(date, next)?;
        Ok(next)
    }

    fn get_transactions_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<WorkModeTransaction>, CoreError> {
        Ok(read_json(&self.transactions_path(date))?.unwrap_or_default())
    }

    fn list_closures(&self) -> Result<Vec<DailyClosure>, CoreError> {
        let dir = self.root.join("closures");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut closures = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(closure) = read_json::<DailyClosure>(&path)? {
                closures.push(closure);
            }
        }
        closures.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(a.closure_number.unwrap_or(1).cmp(&b.closure_number.unwrap_or(1)))
        });
        Ok(closures)
    }

    fn subscribe_to_closures(&self, listener: ClosureListener) -> Result<Subscription, CoreError> {
        let snapshot = self.list_closures()?;
        let key = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, Arc::clone(&listener)));
        listener(&snapshot);
        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::new(move || {
            listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != key);
        }))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|err| CoreError::Serde(format!("{}: {}", path.display(), err)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json =
        serde_json::to_string_pretty(value).map_err(|err| CoreError::Serde(err.to_string()))?;
    let tmp = tmp_path(path);
    write_file(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_file(path: &Path, data: &str) -> Result<(), CoreError> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use cashday_core::{ClosureListener, ClosureStore, CoreError, Subscription};
use cashday_domain::{closure_id, DailyClosure, WorkModeTransaction};
use chrono::{DateTime, NaiveDate, Utc};

/// Store operations, recorded in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Save,
    Close,
    Delete,
    NextNumber,
    Transactions,
}

type Listeners = Arc<Mutex<Vec<(u64, ClosureListener)>>>;

/// In-memory store with call recording and failure injection.
pub struct MemoryStore {
    user_id: String,
    closures: Mutex<BTreeMap<String, DailyClosure>>,
    transactions: Mutex<HashMap<NaiveDate, Vec<WorkModeTransaction>>>,
    counters: Mutex<HashMap<NaiveDate, u32>>,
    fail_on: Mutex<Option<Op>>,
    calls: Mutex<Vec<Op>>,
    reads: AtomicUsize,
    listeners: Listeners,
    next_listener: AtomicU64,
}

impl MemoryStore {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            closures: Mutex::new(BTreeMap::new()),
            transactions: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            fail_on: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn fail_on(&self, op: Op) {
        *self.fail_on.lock().unwrap() = Some(op);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn insert(&self, closure: DailyClosure) {
        self.closures
            .lock()
            .unwrap()
            .insert(closure.id.clone(), closure);
    }

    pub fn remove(&self, id: &str) {
        self.closures.lock().unwrap().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<DailyClosure> {
        self.closures.lock().unwrap().get(id).cloned()
    }

    pub fn all(&self) -> Vec<DailyClosure> {
        self.closures.lock().unwrap().values().cloned().collect()
    }

    pub fn add_transaction(&self, date: NaiveDate, txn: WorkModeTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .entry(date)
            .or_default()
            .push(txn);
    }

    fn record(&self, op: Op) -> Result<(), CoreError> {
        self.calls.lock().unwrap().push(op);
        if *self.fail_on.lock().unwrap() == Some(op) {
            return Err(CoreError::Storage(format!("injected failure on {op:?}")));
        }
        Ok(())
    }

    fn notify(&self) {
        let snapshot = self.all();
        let listeners: Vec<ClosureListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl ClosureStore for MemoryStore {
    fn get_closure_by_date(&self, date: NaiveDate) -> Result<Option<DailyClosure>, CoreError> {
        self.record(Op::Get)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(&closure_id(&self.user_id, date, None)))
    }

    fn save_closure(&self, closure: &DailyClosure) -> Result<String, CoreError> {
        self.record(Op::Save)?;
        let mut stored = closure.clone();
        stored.version = closure.version + 1;
        self.insert(stored);
        self.notify();
        Ok(closure.id.clone())
    }

    fn close_closure(&self, id: &str, closed_at: DateTime<Utc>) -> Result<(), CoreError> {
        self.record(Op::Close)?;
        {
            let mut closures = self.closures.lock().unwrap();
            let closure = closures
                .get_mut(id)
                .ok_or_else(|| CoreError::ClosureNotFound(id.to_string()))?;
            closure.mark_closed(closed_at);
            closure.version += 1;
        }
        self.notify();
        Ok(())
    }

    fn delete_closure(&self, date: NaiveDate) -> Result<(), CoreError> {
        self.record(Op::Delete)?;
        self.closures
            .lock()
            .unwrap()
            .remove(&closure_id(&self.user_id, date, None));
        self.notify();
        Ok(())
    }

    fn get_next_closure_number(&self, date: NaiveDate) -> Result<u32, CoreError> {
        self.record(Op::NextNumber)?;
        let existing = self
            .closures
            .lock()
            .unwrap()
            .values()
            .filter(|closure| closure.date == date)
            .map(|closure| closure.closure_number.unwrap_or(1))
            .max()
            .unwrap_or(0);
        let mut counters = self.counters.lock().unwrap();
        let high_water = counters.entry(date).or_insert(0);
        let next = existing.max(*high_water) + 1;
        *high_water = next;
        Ok(next)
    }

    fn get_transactions_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<WorkModeTransaction>, CoreError> {
        self.record(Op::Transactions)?;
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }

    fn list_closures(&self) -> Result<Vec<DailyClosure>, CoreError> {
        Ok(self.all())
    }

    fn subscribe_to_closures(&self, listener: ClosureListener) -> Result<Subscription, CoreError> {
        let key = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((key, listener.clone()));
        listener(&self.all());
        let listeners = Arc::clone(&self.listeners);
        Ok(Subscription::new(move || {
            listeners.lock().unwrap().retain(|(id, _)| *id != key);
        }))
    }
}

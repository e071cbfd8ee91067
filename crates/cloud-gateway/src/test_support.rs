use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use crate::adapter::{LogAdapter, QueueAdapter, StorageAdapter, StoredObject};
use crate::error::{GatewayError, GatewayResult};
use crate::resource::LogEvent;

/// In-memory storage backend for testing. Counts `get` calls.
pub struct InMemoryStorage {
    label: String,
    objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    reachable: AtomicBool,
    gets: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            objects: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            gets: AtomicUsize::new(0),
        }
    }

    /// Seed an object without going through the gateway.
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.into(), (bytes.into(), Utc::now()));
    }

    /// Make every call fail as a transport error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> GatewayResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::unavailable(format!("{} is unreachable", self.label)))
        }
    }
}

#[async_trait::async_trait]
impl StorageAdapter for InMemoryStorage {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list(&self, prefix: Option<&str>) -> GatewayResult<Vec<StoredObject>> {
        self.check()?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(key, (bytes, modified))| StoredObject {
                key: key.clone(),
                size_bytes: bytes.len() as u64,
                last_modified: *modified,
            })
            .collect())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> GatewayResult<StoredObject> {
        self.check()?;
        let now = Utc::now();
        let size_bytes = bytes.len() as u64;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_owned(), (bytes, now));
        Ok(StoredObject {
            key: key.to_owned(),
            size_bytes,
            last_modified: now,
        })
    }

    async fn get(&self, key: &str) -> GatewayResult<Vec<u8>> {
        self.check()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| GatewayError::not_found(key))
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        self.check()?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn probe(&self) -> GatewayResult<()> {
        self.check()
    }
}

/// Queue double that replays scripted outcomes, then succeeds.
pub struct ScriptedQueue {
    label: String,
    script: Mutex<VecDeque<GatewayResult<String>>>,
    published: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl ScriptedQueue {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            script: Mutex::new(VecDeque::new()),
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Queue up the outcome of the next publish attempt.
    pub fn then(self, outcome: GatewayResult<String>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl QueueAdapter for ScriptedQueue {
    fn label(&self) -> &str {
        &self.label
    }

    async fn publish(&self, message: &str) -> GatewayResult<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.script.lock().unwrap().pop_front();
        let outcome = outcome.unwrap_or_else(|| Ok(format!("msg-{attempt}")));
        if outcome.is_ok() {
            self.published.lock().unwrap().push(message.to_owned());
        }
        outcome
    }

    async fn probe(&self) -> GatewayResult<()> {
        Ok(())
    }
}

/// Log sink double that records events, or fails every call when configured to.
pub struct RecordingLogSink {
    label: String,
    events: Mutex<Vec<LogEvent>>,
    failing: bool,
}

impl RecordingLogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            events: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    pub fn failing(label: impl Into<String>) -> Self {
        Self {
            failing: true,
            ..Self::new(label)
        }
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LogAdapter for RecordingLogSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn log_event(&self, event: &LogEvent) -> GatewayResult<()> {
        if self.failing {
            return Err(GatewayError::unavailable("log sink rejected event"));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn probe(&self) -> GatewayResult<()> {
        if self.failing {
            Err(GatewayError::unavailable("log sink down"))
        } else {
            Ok(())
        }
    }
}

/// Storage adapter whose every call never completes.
pub struct HangingStorage {
    label: String,
}

impl HangingStorage {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait::async_trait]
impl StorageAdapter for HangingStorage {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list(&self, _prefix: Option<&str>) -> GatewayResult<Vec<StoredObject>> {
        std::future::pending().await
    }

    async fn put(&self, _key: &str, _bytes: Vec<u8>) -> GatewayResult<StoredObject> {
        std::future::pending().await
    }

    async fn get(&self, _key: &str) -> GatewayResult<Vec<u8>> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> GatewayResult<()> {
        std::future::pending().await
    }

    async fn probe(&self) -> GatewayResult<()> {
        std::future::pending().await
    }
}

/// Log sink whose every call never completes.
pub struct HangingLogSink {
    label: String,
}

impl HangingLogSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait::async_trait]
impl LogAdapter for HangingLogSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn log_event(&self, _event: &LogEvent) -> GatewayResult<()> {
        std::future::pending().await
    }

    async fn probe(&self) -> GatewayResult<()> {
        std::future::pending().await
    }
}

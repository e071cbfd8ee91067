use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use cloud_gateway::{GatewayError, GatewayResult, ProviderId, ResourceGateway};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::parser::{CalamineParser, SheetData, WorkbookParser};
use crate::reference::ReferenceIdGenerator;
use crate::workbook::{ParsedSheet, ParsedWorkbook};

pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

type SharedParse = Shared<BoxFuture<'static, GatewayResult<Arc<ParsedWorkbook>>>>;

/// Bounds on what the cache retains. `None` disables a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Sum of source byte lengths across cached workbooks.
    pub max_total_bytes: Option<u64>,
    /// Entries older than this are treated as absent.
    pub max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: Some(DEFAULT_MAX_TOTAL_BYTES),
            max_age: Some(DEFAULT_MAX_AGE),
        }
    }
}

impl CacheConfig {
    pub fn unbounded() -> Self {
        Self {
            max_total_bytes: None,
            max_age: None,
        }
    }
}

/// Counters and gauges exposed by [`ParseCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub sheets: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Requests that joined a parse already in flight.
    pub coalesced: u64,
    pub parses: u64,
    pub failures: u64,
    pub evictions: u64,
}

struct Entry {
    workbook: Arc<ParsedWorkbook>,
    inserted: Instant,
    last_access: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, Entry>,
    /// Reference id to (owning fingerprint, sheet index).
    sheets: HashMap<String, (Fingerprint, usize)>,
    inflight: HashMap<Fingerprint, SharedParse>,
    total_bytes: u64,
    stats: CacheStats,
}

impl CacheState {
    fn is_expired(entry: &Entry, max_age: Option<Duration>, now: Instant) -> bool {
        max_age.is_some_and(|age| now.duration_since(entry.inserted) >= age)
    }

    /// Fresh entry for `fingerprint`, dropping it first if it has expired.
    fn lookup(
        &mut self,
        fingerprint: &Fingerprint,
        max_age: Option<Duration>,
    ) -> Option<Arc<ParsedWorkbook>> {
        let now = Instant::now();
        let expired = Self::is_expired(self.entries.get(fingerprint)?, max_age, now);
        if expired {
            self.evict(fingerprint);
            return None;
        }
        let entry = self.entries.get_mut(fingerprint)?;
        entry.last_access = now;
        Some(entry.workbook.clone())
    }

    fn insert(&mut self, workbook: Arc<ParsedWorkbook>) {
        let fingerprint = workbook.fingerprint.clone();
        self.remove(&fingerprint);

        for (index, sheet) in workbook.sheets.iter().enumerate() {
            self.sheets
                .insert(sheet.reference_id.clone(), (fingerprint.clone(), index));
        }
        self.total_bytes += workbook.size_bytes;
        let now = Instant::now();
        self.entries.insert(
            fingerprint,
            Entry {
                workbook,
                inserted: now,
                last_access: now,
            },
        );
    }

    /// Drop an entry and every reference id it owns in one step.
    fn remove(&mut self, fingerprint: &Fingerprint) -> bool {
        let Some(entry) = self.entries.remove(fingerprint) else {
            return false;
        };
        for sheet in &entry.workbook.sheets {
            self.sheets.remove(&sheet.reference_id);
        }
        self.total_bytes = self.total_bytes.saturating_sub(entry.workbook.size_bytes);
        true
    }

    /// `remove`, counted as an eviction.
    fn evict(&mut self, fingerprint: &Fingerprint) -> bool {
        let removed = self.remove(fingerprint);
        if removed {
            self.stats.evictions += 1;
        }
        removed
    }

    fn remove_expired(&mut self, max_age: Option<Duration>, keep: Option<&Fingerprint>) -> usize {
        let now = Instant::now();
        let expired: Vec<Fingerprint> = self
            .entries
            .iter()
            .filter(|(fp, entry)| Some(*fp) != keep && Self::is_expired(entry, max_age, now))
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in &expired {
            self.evict(fp);
        }
        expired.len()
    }

    /// Evict until under `max_total_bytes`: expired entries first, then least
    /// recently used. `keep` is never chosen, so an oversize entry can remain
    /// as the only one.
    fn enforce_capacity(&mut self, config: &CacheConfig, keep: &Fingerprint) {
        let Some(limit) = config.max_total_bytes else {
            return;
        };
        if self.total_bytes <= limit {
            return;
        }
        self.remove_expired(config.max_age, Some(keep));

        while self.total_bytes > limit {
            let victim = self
                .entries
                .iter()
                .filter(|(fp, _)| *fp != keep)
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(fp, _)| fp.clone());
            match victim {
                Some(fp) => {
                    debug!(fingerprint = %fp, "evicting least recently used workbook");
                    self.evict(&fp);
                }
                None => break,
            }
        }
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            sheets: self.sheets.len(),
            total_bytes: self.total_bytes,
            ..self.stats.clone()
        }
    }
}

struct Inner {
    config: CacheConfig,
    ids: ReferenceIdGenerator,
    state: Mutex<CacheState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of a parse. Only successes are stored.
    fn complete(
        &self,
        fingerprint: Fingerprint,
        source_key: String,
        size_bytes: u64,
        result: GatewayResult<Vec<SheetData>>,
    ) -> GatewayResult<Arc<ParsedWorkbook>> {
        let mut state = self.lock();
        state.inflight.remove(&fingerprint);

        let sheets = match result {
            Ok(sheets) => sheets,
            Err(err) => {
                state.stats.failures += 1;
                warn!(fingerprint = %fingerprint, key = %source_key, error = %err, "workbook parse failed");
                return Err(err);
            }
        };
        state.stats.parses += 1;

        let sheets = sheets
            .into_iter()
            .map(|sheet| {
                Arc::new(ParsedSheet {
                    reference_id: self.ids.next(&fingerprint),
                    sheet_name: sheet.name,
                    row_count: sheet.rows.len(),
                    headers: sheet.headers,
                    rows: sheet.rows,
                })
            })
            .collect();

        let workbook = Arc::new(ParsedWorkbook {
            source_key,
            fingerprint: fingerprint.clone(),
            sheets,
            size_bytes,
            created_at: Utc::now(),
        });

        state.insert(workbook.clone());
        state.enforce_capacity(&self.config, &fingerprint);
        info!(
            fingerprint = %fingerprint,
            key = %workbook.source_key,
            sheets = workbook.sheets.len(),
            "workbook parsed"
        );
        Ok(workbook)
    }

    fn evict_expired(&self) -> usize {
        let removed = self.lock().remove_expired(self.config.max_age, None);
        if removed > 0 {
            debug!(removed, "expired workbooks evicted");
        }
        removed
    }
}

/// Content-addressed cache of parsed workbooks.
///
/// Concurrent requests for the same bytes share one parse. Parses run on a
/// blocking thread inside a detached task, so a caller that gives up does not
/// cancel the work for others. Evicted workbooks stay alive for readers that
/// already hold them.
#[derive(Clone)]
pub struct ParseCache {
    gateway: Arc<ResourceGateway>,
    parser: Arc<dyn WorkbookParser>,
    inner: Arc<Inner>,
}

impl ParseCache {
    pub fn new(gateway: Arc<ResourceGateway>, config: CacheConfig) -> Self {
        Self::with_parser(gateway, config, CalamineParser)
    }

    pub fn with_parser(
        gateway: Arc<ResourceGateway>,
        config: CacheConfig,
        parser: impl WorkbookParser,
    ) -> Self {
        Self {
            gateway,
            parser: Arc::new(parser),
            inner: Arc::new(Inner {
                config,
                ids: ReferenceIdGenerator::default(),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.config
    }

    /// Fetch `key` from `provider` and return its parsed form, parsing only if
    /// these bytes have not been seen before.
    pub async fn parse(
        &self,
        provider: &ProviderId,
        key: &str,
    ) -> GatewayResult<Arc<ParsedWorkbook>> {
        let bytes = self.gateway.get(provider, key).await?;
        self.parse_bytes(key, bytes).await
    }

    /// Parse bytes already in hand. `source_key` is recorded on a fresh entry.
    pub async fn parse_bytes(
        &self,
        source_key: &str,
        bytes: Vec<u8>,
    ) -> GatewayResult<Arc<ParsedWorkbook>> {
        let fingerprint = Fingerprint::of(&bytes);

        let pending = {
            let mut state = self.inner.lock();
            if let Some(workbook) = state.lookup(&fingerprint, self.inner.config.max_age) {
                state.stats.hits += 1;
                debug!(fingerprint = %fingerprint, "parse cache hit");
                return Ok(workbook);
            }
            if let Some(pending) = state.inflight.get(&fingerprint) {
                let pending = pending.clone();
                state.stats.coalesced += 1;
                debug!(fingerprint = %fingerprint, "joining parse in flight");
                pending
            } else {
                state.stats.misses += 1;
                let pending = self.start_parse(fingerprint.clone(), source_key.to_owned(), bytes);
                state.inflight.insert(fingerprint, pending.clone());
                pending
            }
        };

        pending.await
    }

    fn start_parse(&self, fingerprint: Fingerprint, source_key: String, bytes: Vec<u8>) -> SharedParse {
        let inner = self.inner.clone();
        let parser = self.parser.clone();
        let size_bytes = bytes.len() as u64;

        let task: JoinHandle<GatewayResult<Arc<ParsedWorkbook>>> = tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || parser.parse(&bytes))
                .await
                .map_err(|e| GatewayError::internal(format!("parse task failed: {e}")))
                .and_then(|parsed| parsed);
            inner.complete(fingerprint, source_key, size_bytes, result)
        });

        async move {
            task.await
                .map_err(|e| GatewayError::internal(format!("parse task failed: {e}")))?
        }
        .boxed()
        .shared()
    }

    /// Sheet by reference id. Unknown, evicted and expired ids are all `NotFound`.
    pub fn get_sheet(&self, reference_id: &str) -> GatewayResult<Arc<ParsedSheet>> {
        let mut state = self.inner.lock();
        let (fingerprint, index) = state
            .sheets
            .get(reference_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(format!("sheet {reference_id}")))?;

        state
            .lookup(&fingerprint, self.inner.config.max_age)
            .and_then(|workbook| workbook.sheets.get(index).cloned())
            .ok_or_else(|| GatewayError::not_found(format!("sheet {reference_id}")))
    }

    /// Cached workbook for `fingerprint`, if present and fresh.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<ParsedWorkbook>> {
        self.inner
            .lock()
            .lookup(fingerprint, self.inner.config.max_age)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.get(fingerprint).is_some()
    }

    /// Remove one workbook and all its reference ids. Returns whether it was cached.
    pub fn evict(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.inner.lock().evict(fingerprint);
        if removed {
            info!(fingerprint = %fingerprint, "workbook evicted");
        }
        removed
    }

    pub fn evict_expired(&self) -> usize {
        self.inner.evict_expired()
    }

    /// Drop every cached workbook. Parses in flight still complete and insert.
    pub fn clear(&self) -> usize {
        let mut state = self.inner.lock();
        let fingerprints: Vec<Fingerprint> = state.entries.keys().cloned().collect();
        for fp in &fingerprints {
            state.remove(fp);
        }
        info!(removed = fingerprints.len(), "parse cache cleared");
        fingerprints.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().snapshot()
    }

    /// Periodically evict expired entries. Stops once every handle to this
    /// cache has been dropped.
    pub fn spawn_expiry_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.evict_expired();
            }
        })
    }
}

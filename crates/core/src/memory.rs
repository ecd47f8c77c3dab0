use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::error::{RegistryError, StreamError};
use crate::model::{Batch, Point, ScanInfo, ScanState, ScanTimestamp};
use crate::source::{RefreshMode, Registry, ScanHandle, StreamCursor, StreamSource};

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<StoreState>,
    changed: Condvar,
    refresh_timeout: Duration,
}

#[derive(Default)]
struct StoreState {
    scans: HashMap<String, ScanRecord>,
    announced: Vec<(ScanTimestamp, String)>,
    last_stamp: Option<ScanTimestamp>,
}

struct ScanRecord {
    state: ScanState,
    revision: u64,
    info: Arc<ScanInfo>,
    streams: Vec<(String, Arc<MemoryStream>)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl MemoryStore {
    pub fn new(refresh_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::default()),
                changed: Condvar::new(),
                refresh_timeout,
            }),
        }
    }

    pub fn create_scan(&self, info: ScanInfo) -> Result<ScanPublisher, RegistryError> {
        let key = format!("scan:{}", Uuid::new_v4());
        {
            let mut state = self.lock()?;
            let stamp = state.next_stamp();
            state.scans.insert(
                key.clone(),
                ScanRecord {
                    state: ScanState::Created,
                    revision: 0,
                    info: Arc::new(info),
                    streams: Vec::new(),
                },
            );
            state.announced.push((stamp, key.clone()));
        }
        self.shared.changed.notify_all();
        Ok(ScanPublisher {
            store: self.clone(),
            key,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RegistryError> {
        self.shared.state.lock().map_err(poisoned)
    }

    fn update_record(
        &self,
        key: &str,
        update: impl FnOnce(&mut ScanRecord),
    ) -> Result<(), RegistryError> {
        {
            let mut state = self.lock()?;
            let record = state
                .scans
                .get_mut(key)
                .ok_or_else(|| RegistryError::UnknownScan(key.to_string()))?;
            update(record);
            record.revision += 1;
        }
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl StoreState {
    fn next_stamp(&mut self) -> ScanTimestamp {
        let millis = Utc::now().timestamp_millis();
        let stamp = match self.last_stamp {
            Some(last) if last.millis >= millis => ScanTimestamp {
                millis: last.millis,
                seq: last.seq + 1,
            },
            _ => ScanTimestamp { millis, seq: 0 },
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

fn poisoned<T>(_: PoisonError<T>) -> RegistryError {
    RegistryError::Unavailable("memory store lock poisoned".to_string())
}

impl Registry for MemoryStore {
    fn next_scan(
        &self,
        since: Option<ScanTimestamp>,
        timeout: Duration,
    ) -> Result<(ScanTimestamp, String), RegistryError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        loop {
            if let Some(found) = state
                .announced
                .iter()
                .find(|(stamp, _)| since.map_or(true, |since| *stamp > since))
            {
                return Ok(found.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RegistryError::TimedOut(timeout));
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(poisoned)?;
            state = guard;
        }
    }

    fn load_scan(&self, key: &str) -> Result<Box<dyn ScanHandle>, RegistryError> {
        let state = self.lock()?;
        let record = state
            .scans
            .get(key)
            .ok_or_else(|| RegistryError::UnknownScan(key.to_string()))?;
        Ok(Box::new(MemoryScan {
            store: self.clone(),
            key: key.to_string(),
            state: record.state,
            revision: record.revision,
            info: Arc::clone(&record.info),
        }))
    }
}

pub struct MemoryScan {
    store: MemoryStore,
    key: String,
    state: ScanState,
    revision: u64,
    info: Arc<ScanInfo>,
}

impl ScanHandle for MemoryScan {
    fn key(&self) -> &str {
        &self.key
    }

    fn state(&self) -> ScanState {
        self.state
    }

    fn info(&self) -> Arc<ScanInfo> {
        Arc::clone(&self.info)
    }

    fn refresh(&mut self, mode: RefreshMode) -> Result<ScanState, RegistryError> {
        let shared = &self.store.shared;
        let deadline = Instant::now() + shared.refresh_timeout;
        let mut state = shared.state.lock().map_err(poisoned)?;
        loop {
            let record = state
                .scans
                .get(&self.key)
                .ok_or_else(|| RegistryError::UnknownScan(self.key.clone()))?;
            let now = Instant::now();
            if mode == RefreshMode::NonBlocking || record.revision != self.revision || now >= deadline
            {
                self.state = record.state;
                self.revision = record.revision;
                self.info = Arc::clone(&record.info);
                return Ok(self.state);
            }
            let (guard, _) = shared
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(poisoned)?;
            state = guard;
        }
    }

    fn stream(&self, label: &str) -> Option<Arc<dyn StreamSource>> {
        let state = self.store.lock().ok()?;
        state
            .scans
            .get(&self.key)?
            .streams
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, stream)| Arc::clone(stream) as Arc<dyn StreamSource>)
    }

    fn stream_labels(&self) -> Vec<String> {
        let Ok(state) = self.store.lock() else {
            return Vec::new();
        };
        state
            .scans
            .get(&self.key)
            .map(|record| record.streams.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }
}

// Producer side, driven the way an acquisition recorder drives a scan.
#[derive(Clone)]
pub struct ScanPublisher {
    store: MemoryStore,
    key: String,
}

impl ScanPublisher {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn create_stream(&self, label: &str) -> Result<Arc<MemoryStream>, RegistryError> {
        let stream = Arc::new(MemoryStream::new(label));
        let declared = Arc::clone(&stream);
        self.store.update_record(&self.key, |record| {
            record.streams.push((label.to_string(), declared));
        })?;
        Ok(stream)
    }

    pub fn update_info(&self, update: impl FnOnce(&mut ScanInfo)) -> Result<(), RegistryError> {
        self.store
            .update_record(&self.key, |record| update(Arc::make_mut(&mut record.info)))
    }

    pub fn set_state(&self, state: ScanState) -> Result<(), RegistryError> {
        self.store.update_record(&self.key, |record| record.state = state)
    }

    pub fn prepare(&self) -> Result<(), RegistryError> {
        self.set_state(ScanState::Prepared)
    }

    pub fn start(&self) -> Result<(), RegistryError> {
        self.set_state(ScanState::Started)
    }

    pub fn stop(&self) -> Result<(), RegistryError> {
        self.set_state(ScanState::Stopped)
    }

    pub fn close(&self) -> Result<(), RegistryError> {
        self.set_state(ScanState::Closed)
    }
}

#[derive(Default)]
struct StreamData {
    points: Vec<Point>,
    sealed: bool,
}

/// Append-only column stream.
pub struct MemoryStream {
    label: String,
    data: Arc<Mutex<StreamData>>,
}

impl MemoryStream {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            data: Arc::new(Mutex::new(StreamData::default())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn append<I>(&self, points: I) -> Result<(), StreamError>
    where
        I: IntoIterator,
        I::Item: Into<Point>,
    {
        let mut data = self.data.lock().map_err(stream_poisoned)?;
        if data.sealed {
            return Err(StreamError::Unavailable(format!(
                "stream {} is sealed",
                self.label
            )));
        }
        data.points.extend(points.into_iter().map(Into::into));
        Ok(())
    }

    pub fn seal(&self) -> Result<(), StreamError> {
        self.data.lock().map_err(stream_poisoned)?.sealed = true;
        Ok(())
    }
}

fn stream_poisoned<T>(_: PoisonError<T>) -> StreamError {
    StreamError::Unavailable("stream lock poisoned".to_string())
}

impl StreamSource for MemoryStream {
    fn cursor(&self) -> Box<dyn StreamCursor> {
        Box::new(MemoryCursor {
            data: Arc::clone(&self.data),
            position: 0,
        })
    }
}

struct MemoryCursor {
    data: Arc<Mutex<StreamData>>,
    position: usize,
}

impl StreamCursor for MemoryCursor {
    fn read_batch(&mut self) -> Result<Batch, StreamError> {
        let data = self.data.lock().map_err(stream_poisoned)?;
        let start_index = self.position as u64;
        if self.position < data.points.len() {
            let points = data.points[self.position..].to_vec();
            self.position = data.points.len();
            Ok(Batch {
                start_index,
                points,
            })
        } else if data.sealed {
            Err(StreamError::EndOfStream)
        } else {
            Ok(Batch {
                start_index,
                points: Vec::new(),
            })
        }
    }
}

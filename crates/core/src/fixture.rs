//! Whole-scan descriptions stored as JSON and replayed into a
//! [`MemoryStore`] the way an acquisition recorder would publish them.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{RegistryError, Result, SpecWriterError, StreamError};
use crate::memory::MemoryStore;
use crate::model::{Point, ScanInfo};

const DEFAULT_END_REASON: &str = "SUCCESS";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("publishing into stream {label} failed: {source}")]
    Stream {
        label: String,
        #[source]
        source: StreamError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanFixture {
    pub info: ScanInfo,
    /// Points per stream label. Declared columns without an entry get an
    /// empty stream.
    #[serde(default, with = "crate::model::ordered_map")]
    pub streams: Vec<(String, Vec<Point>)>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub end_reason: Option<String>,
    /// Points appended per stream and step; everything at once when unset.
    #[serde(default)]
    pub chunk_size: Option<usize>,
}

impl ScanFixture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            SpecWriterError::config(format!("failed to read fixture {}: {err}", path.display()))
        })?;
        serde_json::from_str(&text).map_err(|err| {
            SpecWriterError::config(format!("failed to parse fixture {}: {err}", path.display()))
        })
    }

    /// Moves the output file into `dir`, keeping its file name.
    pub fn retarget(&mut self, dir: &Path) {
        if let Some(name) = self.info.filename.as_ref().and_then(|path| path.file_name()) {
            self.info.filename = Some(dir.join(name));
        }
    }

    /// Labels of every stream the scan declares: its columns first, then any
    /// extra stream carrying data.
    pub fn stream_labels(&self) -> Vec<String> {
        let mut labels = self
            .info
            .datadesc
            .iter()
            .map(|(key, column)| column.label.clone().unwrap_or_else(|| key.clone()))
            .collect::<Vec<_>>();
        for (label, _) in &self.streams {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    fn dtype_of(&self, label: &str) -> Option<&str> {
        self.info
            .datadesc
            .iter()
            .find(|(key, column)| column.label.as_deref().unwrap_or(key.as_str()) == label)
            .and_then(|(_, column)| column.dtype.as_deref())
    }

    /// Registers the scan and plays it through to CLOSED, sleeping `pace`
    /// between chunks. Returns the scan key.
    pub fn publish(&self, store: &MemoryStore, pace: Duration) -> Result<String, PublishError> {
        let publisher = store.create_scan(self.info.clone())?;
        let streams = self
            .stream_labels()
            .into_iter()
            .map(|label| -> Result<_, RegistryError> {
                let stream = publisher.create_stream(&label)?;
                let dtype = self.dtype_of(&label);
                let points = self
                    .streams
                    .iter()
                    .find(|(name, _)| *name == label)
                    .map(|(_, points)| {
                        points
                            .iter()
                            .cloned()
                            .map(|point| match dtype {
                                Some(dtype) => point.for_dtype(dtype),
                                None => point,
                            })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok((stream, points))
            })
            .collect::<Result<Vec<_>, _>>()?;

        publisher.prepare()?;
        publisher.start()?;

        let longest = streams.iter().map(|(_, points)| points.len()).max().unwrap_or(0);
        let chunk = self.chunk_size.filter(|size| *size > 0).unwrap_or(longest.max(1));
        let mut offset = 0;
        while offset < longest {
            for (stream, points) in &streams {
                let end = (offset + chunk).min(points.len());
                if offset < end {
                    stream
                        .append(points[offset..end].iter().cloned())
                        .map_err(|source| stream_error(stream.label(), source))?;
                }
            }
            offset += chunk;
            if !pace.is_zero() {
                thread::sleep(pace);
            }
        }
        for (stream, _) in &streams {
            stream
                .seal()
                .map_err(|source| stream_error(stream.label(), source))?;
        }

        publisher.stop()?;
        let end_time = self.end_time.clone();
        let end_reason = self
            .end_reason
            .clone()
            .unwrap_or_else(|| DEFAULT_END_REASON.to_string());
        publisher.update_info(|info| {
            info.end_time = end_time;
            info.end_reason = Some(end_reason);
        })?;
        publisher.close()?;
        debug!("published fixture scan {}", publisher.key());
        Ok(publisher.key().to_string())
    }
}

fn stream_error(label: &str, source: StreamError) -> PublishError {
    PublishError::Stream {
        label: label.to_string(),
        source,
    }
}

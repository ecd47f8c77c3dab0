use std::sync::Arc;
use std::time::Duration;

use crate::error::{RegistryError, StreamError};
use crate::model::{Batch, ScanInfo, ScanState, ScanTimestamp};

pub trait StreamCursor: Send {
    /// Everything published since the previous read, possibly empty.
    /// `EndOfStream` once the stream is sealed and drained.
    fn read_batch(&mut self) -> Result<Batch, StreamError>;
}

pub trait StreamSource: Send + Sync {
    fn cursor(&self) -> Box<dyn StreamCursor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Blocking,
    NonBlocking,
}

// State and metadata only change on `refresh`.
pub trait ScanHandle: Send {
    fn key(&self) -> &str;

    fn state(&self) -> ScanState;

    fn info(&self) -> Arc<ScanInfo>;

    fn refresh(&mut self, mode: RefreshMode) -> Result<ScanState, RegistryError>;

    fn stream(&self, label: &str) -> Option<Arc<dyn StreamSource>>;

    fn stream_labels(&self) -> Vec<String>;
}

pub trait Registry: Send + Sync {
    fn next_scan(
        &self,
        since: Option<ScanTimestamp>,
        timeout: Duration,
    ) -> Result<(ScanTimestamp, String), RegistryError>;

    fn load_scan(&self, key: &str) -> Result<Box<dyn ScanHandle>, RegistryError>;
}

pub mod columns;
pub mod config;
pub mod driver;
pub mod error;
pub mod fixture;
pub mod format;
pub mod memory;
pub mod model;
pub mod renderer;
pub mod source;

pub use columns::{
    classify_column, sanitize_label, ColumnKind, ColumnLayout, ExcludedColumn, ExclusionReason,
};
pub use config::WriterConfig;
pub use driver::{process_scan, ScanOutcome, ScanReport};
pub use error::{RegistryError, Result, SpecWriterError, StreamError};
pub use fixture::{PublishError, ScanFixture};
pub use format::{summarize, ScanSummary};
pub use memory::{MemoryStore, MemoryStream, ScanPublisher};
pub use model::{
    Batch, ColumnDescriptor, Point, Sample, ScanInfo, ScanMetadata, ScanState, ScanTimestamp,
    SnapshotEntry,
};
pub use renderer::{DrainOutcome, RenderOptions, RenderStats, SpecOutput};
pub use source::{RefreshMode, Registry, ScanHandle, StreamCursor, StreamSource};

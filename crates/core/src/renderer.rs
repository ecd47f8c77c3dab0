use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::columns::ColumnLayout;
use crate::config::WriterConfig;
use crate::error::{Result, SpecWriterError, StreamError};
use crate::format;
use crate::model::{ColumnDescriptor, Point, ScanMetadata};
use crate::source::{ScanHandle, StreamCursor};

pub const SUPPORTED_SUFFIXES: &[&str] = &["dat", "spec"];

pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|suffix| suffix.to_str())
        .map_or(false, |suffix| SUPPORTED_SUFFIXES.contains(&suffix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub min_write_interval: Duration,
    pub max_pending_points: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&WriterConfig::default())
    }
}

impl From<&WriterConfig> for RenderOptions {
    fn from(config: &WriterConfig) -> Self {
        Self {
            min_write_interval: config.max_write_interval(),
            max_pending_points: config.max_pending_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Inert,
    Throttled,
    Interrupted { label: String },
    Idle,
    Written { rows: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    pub rows_written: u64,
    pub drains: u64,
    pub interrupted_drains: u64,
    pub dropped_points: u64,
}

/// Unsupported suffixes get `Inert`: every operation succeeds, nothing is written.
pub enum SpecOutput {
    Active(Box<SpecFile>),
    Inert { path: PathBuf },
}

impl SpecOutput {
    pub fn open(path: &Path, metadata: ScanMetadata, options: RenderOptions) -> Result<Self> {
        if !is_supported_path(path) {
            debug!("{} is not a SPEC target", path.display());
            return Ok(SpecOutput::Inert {
                path: path.to_path_buf(),
            });
        }
        let file = SpecFile::open(path, metadata, options)?;
        Ok(SpecOutput::Active(Box::new(file)))
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SpecOutput::Active(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            SpecOutput::Active(file) => file.path(),
            SpecOutput::Inert { path } => path,
        }
    }

    pub fn stats(&self) -> RenderStats {
        match self {
            SpecOutput::Active(file) => file.stats(),
            SpecOutput::Inert { .. } => RenderStats::default(),
        }
    }

    pub fn write_file_header(&mut self) -> Result<()> {
        match self {
            SpecOutput::Active(file) => file.write_file_header(),
            SpecOutput::Inert { .. } => Ok(()),
        }
    }

    pub fn write_scan_header(&mut self) -> Result<()> {
        match self {
            SpecOutput::Active(file) => file.write_scan_header(),
            SpecOutput::Inert { .. } => Ok(()),
        }
    }

    pub fn prepare_cursors(&mut self, scan: &dyn ScanHandle) -> Result<()> {
        match self {
            SpecOutput::Active(file) => file.prepare_cursors(scan),
            SpecOutput::Inert { .. } => Ok(()),
        }
    }

    pub fn drain_once(&mut self) -> Result<DrainOutcome> {
        match self {
            SpecOutput::Active(file) => file.drain_once(),
            SpecOutput::Inert { .. } => Ok(DrainOutcome::Inert),
        }
    }

    pub fn drain_now(&mut self) -> Result<DrainOutcome> {
        match self {
            SpecOutput::Active(file) => file.drain_now(),
            SpecOutput::Inert { .. } => Ok(DrainOutcome::Inert),
        }
    }

    pub fn write_scan_tail(&mut self, end_time: &str) -> Result<()> {
        match self {
            SpecOutput::Active(file) => file.write_scan_tail(end_time),
            SpecOutput::Inert { .. } => Ok(()),
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            SpecOutput::Active(file) => (*file).close(),
            SpecOutput::Inert { .. } => Ok(()),
        }
    }
}

struct ColumnFeed {
    label: String,
    cursor: Box<dyn StreamCursor>,
    pending: VecDeque<Point>,
    exhausted: bool,
}

impl ColumnFeed {
    fn new(label: String, cursor: Box<dyn StreamCursor>) -> Self {
        Self {
            label,
            cursor,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn pull(&mut self, limit: usize) -> Result<Pull> {
        let batch = match self.cursor.read_batch() {
            Ok(batch) => batch,
            Err(StreamError::EndOfStream) => return Ok(Pull::EndOfStream),
            Err(source) => {
                return Err(SpecWriterError::Stream {
                    label: self.label.clone(),
                    source,
                })
            }
        };
        let received = batch.len();
        self.pending.extend(batch.points);
        if self.pending.len() > limit {
            return Err(SpecWriterError::Backlog {
                label: self.label.clone(),
                limit,
            });
        }
        Ok(Pull::Received(received))
    }
}

enum Pull {
    Received(usize),
    EndOfStream,
}

pub struct SpecFile {
    path: PathBuf,
    writer: BufWriter<File>,
    existed: bool,
    file_header_written: bool,
    metadata: ScanMetadata,
    layout: OnceCell<ColumnLayout>,
    scalar_feeds: Vec<ColumnFeed>,
    oned_feeds: Vec<ColumnFeed>,
    options: RenderOptions,
    last_write: Option<Instant>,
    stats: RenderStats,
}

impl SpecFile {
    fn open(path: &Path, metadata: ScanMetadata, options: RenderOptions) -> Result<Self> {
        let existed = path.exists();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| SpecWriterError::render("create directory", parent, err))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| SpecWriterError::render("open", path, err))?;
        if existed {
            debug!("appending to existing file {}", path.display());
        } else {
            info!("new file {}", path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            existed,
            file_header_written: false,
            metadata,
            layout: OnceCell::new(),
            scalar_feeds: Vec::new(),
            oned_feeds: Vec::new(),
            options,
            last_write: None,
            stats: RenderStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Classified lazily, then fixed for the rest of the scan.
    pub fn layout(&self) -> &ColumnLayout {
        self.layout.get_or_init(|| ColumnLayout::classify(&self.metadata))
    }

    pub fn write_file_header(&mut self) -> Result<()> {
        if self.existed || self.file_header_written {
            return Ok(());
        }
        let epoch = (Utc::now().timestamp_millis() as f64 / 1000.0).round() as i64;
        let text = format::file_header(&self.path, epoch);
        self.write_text(&text)?;
        self.file_header_written = true;
        Ok(())
    }

    pub fn write_scan_header(&mut self) -> Result<()> {
        let text = format::scan_header(&self.metadata, self.layout());
        self.write_text(&text)
    }

    pub fn prepare_cursors(&mut self, scan: &dyn ScanHandle) -> Result<()> {
        let layout = self.layout();
        let scalar_labels = labels_of(layout.scalar_columns());
        let oned_labels = labels_of(layout.oned_columns());

        self.scalar_feeds = open_feeds(scan, scalar_labels)?;
        self.oned_feeds = open_feeds(scan, oned_labels)?;
        Ok(())
    }

    pub fn drain_once(&mut self) -> Result<DrainOutcome> {
        let now = Instant::now();
        if let Some(last) = self.last_write {
            if now.duration_since(last) < self.options.min_write_interval {
                return Ok(DrainOutcome::Throttled);
            }
        }
        let outcome = self.drain_now()?;
        self.last_write = Some(now);
        Ok(outcome)
    }

    /// A column at end of stream interrupts the call before anything is
    /// written. Once a column is exhausted no cursor is read any more until
    /// the tail drain.
    pub fn drain_now(&mut self) -> Result<DrainOutcome> {
        self.stats.drains += 1;
        if let Some(feed) = self
            .scalar_feeds
            .iter()
            .chain(self.oned_feeds.iter())
            .find(|feed| feed.exhausted)
        {
            debug!("end of stream for column {}", feed.label);
            self.stats.interrupted_drains += 1;
            return Ok(DrainOutcome::Interrupted {
                label: feed.label.clone(),
            });
        }

        let limit = self.options.max_pending_points;
        let mut batch_lengths = Vec::with_capacity(self.scalar_feeds.len() + self.oned_feeds.len());

        for feed in self.scalar_feeds.iter_mut().chain(self.oned_feeds.iter_mut()) {
            match feed.pull(limit)? {
                Pull::Received(received) => batch_lengths.push(received),
                Pull::EndOfStream => {
                    warn!("end of stream for column {}", feed.label);
                    feed.exhausted = true;
                    self.stats.interrupted_drains += 1;
                    return Ok(DrainOutcome::Interrupted {
                        label: feed.label.clone(),
                    });
                }
            }
        }

        if let Some((first, rest)) = batch_lengths.split_first() {
            if rest.iter().any(|length| length != first) {
                warn!(
                    "number of points between stream cursors do not match: {:?}",
                    batch_lengths
                );
            }
        }

        self.write_rows()
    }

    pub fn write_scan_tail(&mut self, end_time: &str) -> Result<()> {
        self.drain_remaining()?;
        self.write_text(&format::scan_tail(end_time))
    }

    pub fn close(mut self) -> Result<()> {
        let path = self.path.clone();
        self.writer
            .flush()
            .map_err(|err| SpecWriterError::render("flush", path, err))
    }

    // End of stream only ends that column here. The scan is closed, so the
    // pending bound does not apply; rows are written after every pass.
    fn drain_remaining(&mut self) -> Result<()> {
        self.stats.drains += 1;
        loop {
            let mut received = 0;
            for feed in self.scalar_feeds.iter_mut().chain(self.oned_feeds.iter_mut()) {
                if feed.exhausted {
                    continue;
                }
                match feed.pull(usize::MAX)? {
                    Pull::Received(count) => received += count,
                    Pull::EndOfStream => feed.exhausted = true,
                }
            }
            self.write_rows()?;
            if self.rows_complete() {
                self.drop_unmatched();
            }
            if received == 0 {
                break;
            }
        }
        self.drop_unmatched();
        Ok(())
    }

    fn rows_complete(&self) -> bool {
        self.scalar_feeds
            .iter()
            .chain(self.oned_feeds.iter())
            .any(|feed| feed.exhausted && feed.pending.is_empty())
    }

    fn drop_unmatched(&mut self) {
        for feed in self.scalar_feeds.iter_mut().chain(self.oned_feeds.iter_mut()) {
            if !feed.pending.is_empty() {
                warn!(
                    "dropping {} unmatched points of column {}",
                    feed.pending.len(),
                    feed.label
                );
                self.stats.dropped_points += feed.pending.len() as u64;
                feed.pending.clear();
            }
        }
    }

    fn write_rows(&mut self) -> Result<DrainOutcome> {
        let rows = self
            .scalar_feeds
            .iter()
            .chain(self.oned_feeds.iter())
            .map(|feed| feed.pending.len())
            .min()
            .unwrap_or(0);
        if rows == 0 {
            return Ok(DrainOutcome::Idle);
        }

        let mut text = String::new();
        let mut spectra = Vec::with_capacity(self.oned_feeds.len());
        let mut scalars = Vec::with_capacity(self.scalar_feeds.len());
        for _ in 0..rows {
            spectra.clear();
            scalars.clear();
            spectra.extend(self.oned_feeds.iter_mut().filter_map(|feed| feed.pending.pop_front()));
            scalars.extend(self.scalar_feeds.iter_mut().filter_map(|feed| feed.pending.pop_front()));
            format::push_row(&mut text, &spectra, &scalars);
        }

        self.write_text(&text)?;
        self.stats.rows_written += rows as u64;
        debug!("wrote {} rows to {}", rows, self.path.display());
        Ok(DrainOutcome::Written { rows })
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|err| SpecWriterError::render("write", &self.path, err))
    }
}

fn labels_of(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns.iter().map(|column| column.label.clone()).collect()
}

fn open_feeds(scan: &dyn ScanHandle, labels: Vec<String>) -> Result<Vec<ColumnFeed>> {
    labels
        .into_iter()
        .map(|label| {
            let source = scan.stream(&label).ok_or_else(|| {
                SpecWriterError::config(format!(
                    "no stream declared for column `{label}` (declared: {})",
                    scan.stream_labels().join(", ")
                ))
            })?;
            Ok(ColumnFeed::new(label, source.cursor()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::{is_supported_path, DrainOutcome, RenderOptions, SpecOutput};
    use crate::error::SpecWriterError;
    use crate::memory::{MemoryStore, MemoryStream};
    use crate::model::{ColumnDescriptor, Point, ScanInfo, ScanMetadata};
    use crate::source::Registry;

    fn column(label: &str, dtype: &str, shape: &[u64]) -> ColumnDescriptor {
        ColumnDescriptor {
            name: label.to_string(),
            label: label.to_string(),
            dtype: dtype.to_string(),
            shape: shape.to_vec(),
            unit: None,
            plot_type: None,
        }
    }

    fn metadata(path: &Path, columns: Vec<ColumnDescriptor>) -> ScanMetadata {
        ScanMetadata {
            title: "ascan".to_string(),
            scan_nb: 1,
            start_time: "T0".to_string(),
            filename: path.to_path_buf(),
            npoints: None,
            columns,
            snapshot: Vec::new(),
        }
    }

    fn options(min_write_interval: Duration) -> RenderOptions {
        RenderOptions {
            min_write_interval,
            max_pending_points: 1_000,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
        streams: Vec<Arc<MemoryStream>>,
        output: SpecOutput,
    }

    fn open_with_columns(columns: Vec<ColumnDescriptor>, interval: Duration) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.dat");
        let store = MemoryStore::default();
        let publisher = store.create_scan(ScanInfo::default()).expect("scan");
        let streams = columns
            .iter()
            .map(|column| publisher.create_stream(&column.label).expect("stream"))
            .collect::<Vec<_>>();
        let scan = store.load_scan(publisher.key()).expect("load");

        let mut output =
            SpecOutput::open(&path, metadata(&path, columns), options(interval)).expect("open");
        output.prepare_cursors(scan.as_ref()).expect("cursors");
        Fixture {
            _dir: dir,
            path,
            streams,
            output,
        }
    }

    fn contents(path: &Path) -> String {
        fs::read_to_string(path).expect("read output")
    }

    #[test]
    fn unsupported_suffix_is_inert() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.h5");
        let mut output = SpecOutput::open(&path, metadata(&path, Vec::new()), options(Duration::ZERO))
            .expect("open");

        assert!(!output.is_active());
        output.write_file_header().expect("no-op");
        output.write_scan_header().expect("no-op");
        assert_eq!(output.drain_once().expect("no-op"), DrainOutcome::Inert);
        output.write_scan_tail("T1").expect("no-op");
        output.close().expect("no-op");
        assert!(!path.exists());
    }

    #[test]
    fn suffix_match_is_case_sensitive() {
        assert!(is_supported_path(Path::new("/data/scan.dat")));
        assert!(is_supported_path(Path::new("/data/scan.spec")));
        assert!(!is_supported_path(Path::new("/data/scan.DAT")));
        assert!(!is_supported_path(Path::new("/data/scan.h5")));
        assert!(!is_supported_path(Path::new("/data/scan")));
    }

    #[test]
    fn file_header_only_for_new_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("scan.spec");

        let mut first = SpecOutput::open(&path, metadata(&path, Vec::new()), options(Duration::ZERO))
            .expect("open new");
        first.write_file_header().expect("header");
        first.write_file_header().expect("second call is a no-op");
        first.close().expect("close");

        let mut second =
            SpecOutput::open(&path, metadata(&path, Vec::new()), options(Duration::ZERO))
                .expect("open existing");
        second.write_file_header().expect("skipped");
        second.close().expect("close");

        let text = contents(&path);
        assert_eq!(text.matches("#F ").count(), 1);
        assert!(text.starts_with(&format!("#F {}\n#E ", path.display())));
    }

    #[test]
    fn pre_existing_file_never_gets_a_file_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.dat");
        fs::write(&path, "").expect("create");

        let mut output = SpecOutput::open(&path, metadata(&path, Vec::new()), options(Duration::ZERO))
            .expect("open");
        output.write_file_header().expect("skipped");
        output.close().expect("close");
        assert_eq!(contents(&path), "");
    }

    #[test]
    fn rows_interleave_spectra_and_scalars() {
        let mut fixture = open_with_columns(
            vec![column("ct", "int64", &[]), column("mca", "int32", &[2])],
            Duration::ZERO,
        );
        fixture.streams[0].append([10_i64, 20]).expect("append");
        fixture.streams[1]
            .append([vec![1_i64, 2], vec![3_i64, 4]])
            .expect("append");

        assert_eq!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Written { rows: 2 }
        );
        assert_eq!(contents(&fixture.path), "@A 1 2\n10\n@A 3 4\n20\n");
    }

    #[test]
    fn end_of_stream_on_one_column_writes_nothing() {
        let mut fixture = open_with_columns(
            vec![column("c1", "float64", &[]), column("c2", "float64", &[])],
            Duration::ZERO,
        );
        fixture.output.write_scan_header().expect("header");
        let before = contents(&fixture.path);

        fixture.streams[0].append([1.0, 2.0]).expect("append");
        fixture.streams[1].seal().expect("seal");

        assert_eq!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Interrupted {
                label: "c2".to_string()
            }
        );
        assert_eq!(contents(&fixture.path), before);
        assert_eq!(fixture.output.stats().interrupted_drains, 1);
    }

    #[test]
    fn throttle_limits_writes_within_the_interval() {
        let mut fixture = open_with_columns(
            vec![column("det", "float64", &[])],
            Duration::from_millis(200),
        );
        fixture.streams[0].append([1.0]).expect("append");
        assert_eq!(
            fixture.output.drain_once().expect("drain"),
            DrainOutcome::Written { rows: 1 }
        );
        fixture.streams[0].append([2.0]).expect("append");
        assert_eq!(
            fixture.output.drain_once().expect("drain"),
            DrainOutcome::Throttled
        );
        assert_eq!(contents(&fixture.path), "1.0\n");

        thread::sleep(Duration::from_millis(250));
        assert_eq!(
            fixture.output.drain_once().expect("drain"),
            DrainOutcome::Written { rows: 1 }
        );
        assert_eq!(contents(&fixture.path), "1.0\n2.0\n");
    }

    #[test]
    fn lagging_column_keeps_surplus_for_the_next_drain() {
        let mut fixture = open_with_columns(
            vec![column("a", "int64", &[]), column("b", "int64", &[])],
            Duration::ZERO,
        );
        fixture.streams[0].append([1_i64, 2, 3]).expect("append");
        fixture.streams[1].append([10_i64]).expect("append");
        assert_eq!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Written { rows: 1 }
        );

        fixture.streams[1].append([20_i64, 30]).expect("append");
        assert_eq!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Written { rows: 2 }
        );
        assert_eq!(contents(&fixture.path), "1 10\n2 20\n3 30\n");
    }

    #[test]
    fn empty_drain_writes_nothing() {
        let mut fixture = open_with_columns(vec![column("det", "float64", &[])], Duration::ZERO);
        assert_eq!(fixture.output.drain_now().expect("drain"), DrainOutcome::Idle);
        assert_eq!(contents(&fixture.path), "");
    }

    #[test]
    fn tail_flushes_rows_left_after_end_of_stream() {
        let mut fixture = open_with_columns(
            vec![column("a", "int64", &[]), column("b", "int64", &[])],
            Duration::ZERO,
        );
        fixture.streams[0].append([1_i64]).expect("append");
        fixture.streams[0].seal().expect("seal");
        fixture.streams[1].append([5_i64]).expect("append");
        assert_eq!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Written { rows: 1 }
        );

        fixture.streams[1].append([6_i64, 7]).expect("append");
        fixture.streams[1].seal().expect("seal");
        assert!(matches!(
            fixture.output.drain_now().expect("drain"),
            DrainOutcome::Interrupted { .. }
        ));

        fixture.output.write_scan_tail("T1").expect("tail");
        let stats = fixture.output.stats();
        assert_eq!(stats.rows_written, 1);
        assert_eq!(stats.dropped_points, 2);
        assert_eq!(contents(&fixture.path), "1 5\n#C Acquisition ended T1\n");
    }

    #[test]
    fn finished_column_stops_reading_the_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.dat");
        let store = MemoryStore::default();
        let publisher = store.create_scan(ScanInfo::default()).expect("scan");
        let a = publisher.create_stream("a").expect("stream");
        let b = publisher.create_stream("b").expect("stream");
        let scan = store.load_scan(publisher.key()).expect("load");
        let columns = vec![column("a", "int64", &[]), column("b", "int64", &[])];
        let mut output = SpecOutput::open(
            &path,
            metadata(&path, columns),
            RenderOptions {
                min_write_interval: Duration::ZERO,
                max_pending_points: 10,
            },
        )
        .expect("open");
        output.prepare_cursors(scan.as_ref()).expect("cursors");

        a.append([1_i64]).expect("append");
        b.append([1_i64]).expect("append");
        assert_eq!(
            output.drain_now().expect("drain"),
            DrainOutcome::Written { rows: 1 }
        );

        b.seal().expect("seal");
        for value in 2..14_i64 {
            a.append([value]).expect("append");
            assert_eq!(
                output.drain_now().expect("end of stream is not an error"),
                DrainOutcome::Interrupted {
                    label: "b".to_string()
                }
            );
        }

        output.write_scan_tail("T1").expect("tail");
        assert_eq!(output.stats().dropped_points, 12);
        assert_eq!(contents(&path), "1 1\n#C Acquisition ended T1\n");
    }

    #[test]
    fn spectra_only_scan_writes_no_scalar_lines() {
        let mut fixture = open_with_columns(vec![column("mca", "uint16", &[3])], Duration::ZERO);
        fixture.streams[0].append([vec![1_i64, 2, 3]]).expect("append");
        fixture.streams[0].seal().expect("seal");
        fixture.output.write_scan_tail("T1").expect("tail");
        assert_eq!(contents(&fixture.path), "@A 1 2 3\n#C Acquisition ended T1\n");
    }

    #[test]
    fn backlog_beyond_the_bound_fails_the_drain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.dat");
        let store = MemoryStore::default();
        let publisher = store.create_scan(ScanInfo::default()).expect("scan");
        let fast = publisher.create_stream("fast").expect("stream");
        publisher.create_stream("slow").expect("stream");
        let scan = store.load_scan(publisher.key()).expect("load");
        let columns = vec![column("fast", "int64", &[]), column("slow", "int64", &[])];
        let mut output = SpecOutput::open(
            &path,
            metadata(&path, columns),
            RenderOptions {
                min_write_interval: Duration::ZERO,
                max_pending_points: 2,
            },
        )
        .expect("open");
        output.prepare_cursors(scan.as_ref()).expect("cursors");

        fast.append([1_i64, 2, 3]).expect("append");
        assert!(matches!(
            output.drain_now(),
            Err(SpecWriterError::Backlog { limit: 2, .. })
        ));
    }

    #[test]
    fn column_without_stream_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.dat");
        let store = MemoryStore::default();
        let publisher = store.create_scan(ScanInfo::default()).expect("scan");
        publisher.create_stream("counter").expect("stream");
        let scan = store.load_scan(publisher.key()).expect("load");

        let mut output = SpecOutput::open(
            &path,
            metadata(&path, vec![column("det", "float64", &[])]),
            options(Duration::ZERO),
        )
        .expect("open");
        let err = output
            .prepare_cursors(scan.as_ref())
            .expect_err("det has no stream");
        assert!(matches!(err, SpecWriterError::Configuration(_)));
        assert!(err.to_string().contains("declared: counter"));
    }

    #[test]
    fn points_render_through_display() {
        let point: Point = vec![0.5, 1.0].into();
        assert_eq!(point.to_string(), "0.5 1.0");
    }
}

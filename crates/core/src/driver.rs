use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WriterConfig;
use crate::error::{Result, SpecWriterError};
use crate::model::{ScanMetadata, ScanState};
use crate::renderer::{RenderOptions, RenderStats, SpecOutput};
use crate::source::{RefreshMode, ScanHandle};

/// Tail date used when a closed scan does not publish `end_time`.
const UNKNOWN_END_TIME: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Written,
    /// The scan targets a file this writer does not produce.
    Skipped,
    Abandoned { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub key: String,
    pub outcome: ScanOutcome,
    pub output_path: Option<PathBuf>,
    pub rows_written: u64,
    pub drains: u64,
    pub dropped_points: u64,
    pub elapsed_ms: u64,
}

#[derive(Default)]
struct Progress {
    output_path: Option<PathBuf>,
    stats: RenderStats,
}

/// Follows one scan from PREPARED to CLOSED and writes it out. Failures are
/// contained here: the returned report says what happened.
pub fn process_scan(scan: &mut dyn ScanHandle, config: &WriterConfig) -> ScanReport {
    let started = Instant::now();
    let key = scan.key().to_string();
    info!("processing scan {}", key);

    let mut progress = Progress::default();
    let outcome = match drive(scan, config, &mut progress) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("abandoning scan {}: {}", key, err);
            ScanOutcome::Abandoned {
                reason: err.to_string(),
            }
        }
    };

    ScanReport {
        key,
        outcome,
        output_path: progress.output_path,
        rows_written: progress.stats.rows_written,
        drains: progress.stats.drains,
        dropped_points: progress.stats.dropped_points,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn drive(
    scan: &mut dyn ScanHandle,
    config: &WriterConfig,
    progress: &mut Progress,
) -> Result<ScanOutcome> {
    await_state(scan, ScanState::Prepared)?;

    let metadata = ScanMetadata::from_info(&scan.info())?;
    let path = metadata.filename.clone();
    progress.output_path = Some(path.clone());

    // Dropping `output` on an early return closes the file without a tail.
    let mut output = SpecOutput::open(&path, metadata, RenderOptions::from(config))?;
    if output.is_active() {
        info!("recording into {}", path.display());
        output.write_file_header()?;
        output.write_scan_header()?;
        output.prepare_cursors(&*scan)?;
    } else {
        info!("no spec file in scan {}", scan.key());
    }

    let poll_interval = config.poll_interval();
    while scan.state() < ScanState::Stopped {
        refresh(scan, RefreshMode::NonBlocking)?;
        let outcome = output.drain_once()?;
        progress.stats = output.stats();
        debug!("drain of {}: {:?}", scan.key(), outcome);
        if scan.state() < ScanState::Stopped {
            thread::sleep(poll_interval);
        }
    }

    // End time and end reason are only final once the scan is closed.
    await_state(scan, ScanState::Closed)?;

    let info = scan.info();
    let end_time = match info.end_time.as_deref() {
        Some(end_time) => end_time,
        None => {
            warn!("scan {} closed without end_time", scan.key());
            UNKNOWN_END_TIME
        }
    };
    output.write_scan_tail(end_time)?;
    progress.stats = output.stats();

    let active = output.is_active();
    output.close()?;
    if active {
        info!("finished recording to {}", path.display());
        Ok(ScanOutcome::Written)
    } else {
        Ok(ScanOutcome::Skipped)
    }
}

fn await_state(scan: &mut dyn ScanHandle, target: ScanState) -> Result<()> {
    while scan.state() < target {
        refresh(scan, RefreshMode::Blocking)?;
    }
    Ok(())
}

fn refresh(scan: &mut dyn ScanHandle, mode: RefreshMode) -> Result<ScanState> {
    scan.refresh(mode).map_err(|source| SpecWriterError::Refresh {
        key: scan.key().to_string(),
        source,
    })
}

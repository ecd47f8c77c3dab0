//! Text of the SPEC file blocks. The layout is read by legacy tools, so
//! every separator here is load-bearing.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::columns::ColumnLayout;
use crate::model::{Point, Sample, ScanMetadata};

/// Motors per `#O`/`#P` line.
pub const MOTORS_PER_LINE: usize = 8;

/// Separator between names on `#O` and `#L` lines.
const NAME_SEPARATOR: &str = "  ";

pub fn file_header(path: &Path, epoch_seconds: i64) -> String {
    format!("#F {}\n#E {}\n", path.display(), epoch_seconds)
}

pub fn scan_header(metadata: &ScanMetadata, layout: &ColumnLayout) -> String {
    let mut text = String::new();
    let date = &metadata.start_time;
    let _ = write!(
        text,
        "\n#S {} {}\n#D {}\n#C Acquisition started at {}\n",
        metadata.scan_nb, metadata.title, date, date
    );
    text.push_str(&motor_block(layout.pre_snapshot()));
    if let Some(size) = layout.mca_size() {
        text.push_str(&mca_block(size, layout.oned_labels()));
    }
    let _ = writeln!(text, "#N {}", layout.scalar_labels().len());
    let _ = writeln!(text, "#L {}", layout.scalar_labels().join(NAME_SEPARATOR));
    text
}

/// `#O` lines for every group first, then the matching `#P` lines.
pub fn motor_block(snapshot: &[(String, Option<Sample>)]) -> String {
    let mut names = String::new();
    let mut values = String::new();
    for (index, chunk) in snapshot.chunks(MOTORS_PER_LINE).enumerate() {
        let chunk_names = chunk
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(NAME_SEPARATOR);
        let chunk_values = chunk
            .iter()
            .map(|(_, value)| snapshot_value(value))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(names, "#O{index} {chunk_names}");
        let _ = writeln!(values, "#P{index} {chunk_values}");
    }
    names + &values
}

fn snapshot_value(value: &Option<Sample>) -> String {
    match value {
        Some(sample) => sample.to_string(),
        None => "None".to_string(),
    }
}

pub fn mca_block(size: u64, labels: &[String]) -> String {
    let mut text = format!(
        "#@MCA {size}\n#@CHANN {size} 0 {} 1\n#@MCA_NB {}\n",
        size.saturating_sub(1),
        labels.len()
    );
    for (index, label) in labels.iter().enumerate() {
        let _ = writeln!(text, "#@DET_{index} {label}");
    }
    text
}

/// Appends one row: an `@A` line per spectrum, then the scalar line if the
/// scan has scalar columns.
pub fn push_row(text: &mut String, spectra: &[Point], scalars: &[Point]) {
    for spectrum in spectra {
        let _ = writeln!(text, "@A {spectrum}");
    }
    if scalars.is_empty() {
        return;
    }
    let line = scalars
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    text.push_str(&line);
    text.push('\n');
}

pub fn scan_tail(end_time: &str) -> String {
    format!("#C Acquisition ended {end_time}\n")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScanSummary {
    pub scan_nb: String,
    pub title: String,
    pub labels: Vec<String>,
    pub spectra: usize,
    pub rows: usize,
    pub closed: bool,
}

/// Lists the scans found in the text of a SPEC file.
pub fn summarize(text: &str) -> Vec<ScanSummary> {
    let mut scans: Vec<ScanSummary> = Vec::new();
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("#S ") {
            let (scan_nb, title) = rest.split_once(' ').unwrap_or((rest, ""));
            scans.push(ScanSummary {
                scan_nb: scan_nb.to_string(),
                title: title.to_string(),
                labels: Vec::new(),
                spectra: 0,
                rows: 0,
                closed: false,
            });
            continue;
        }
        let Some(scan) = scans.last_mut() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix("#L ") {
            scan.labels = rest.split_whitespace().map(str::to_string).collect();
        } else if let Some(rest) = line.strip_prefix("#@MCA_NB ") {
            scan.spectra = rest.trim().parse().unwrap_or(0);
        } else if line.starts_with("#C Acquisition ended") {
            scan.closed = true;
        } else if !line.is_empty() && !line.starts_with('#') && !line.starts_with('@') {
            scan.rows += 1;
        }
    }
    scans
}

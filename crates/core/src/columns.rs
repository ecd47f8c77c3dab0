use serde::Serialize;
use tracing::debug;

use crate::model::{ColumnDescriptor, Sample, ScanMetadata};

/// Numeric dtypes a SPEC file can carry.
pub const SUPPORTED_DTYPES: &[&str] = &[
    "float32", "float64", "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64",
];

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Scalar,
    OneDimensional,
    Excluded(ExclusionReason),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    UnsupportedDtype,
    UnsupportedShape,
}

pub fn is_scalar(shape: &[u64]) -> bool {
    shape.first().map_or(true, |&first| first == 1)
}

pub fn is_one_dimensional(shape: &[u64]) -> bool {
    shape.len() == 1 && shape[0] > 1
}

pub fn classify_column(dtype: &str, shape: &[u64]) -> ColumnKind {
    if !SUPPORTED_DTYPES.contains(&dtype) {
        ColumnKind::Excluded(ExclusionReason::UnsupportedDtype)
    } else if is_scalar(shape) {
        ColumnKind::Scalar
    } else if is_one_dimensional(shape) {
        ColumnKind::OneDimensional
    } else {
        ColumnKind::Excluded(ExclusionReason::UnsupportedShape)
    }
}

/// Labels go into whitespace separated header lines.
pub fn sanitize_label(label: &str) -> String {
    label.replace(' ', "_")
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedColumn {
    pub name: String,
    pub label: String,
    pub reason: ExclusionReason,
}

/// Which columns of a scan end up in the file, and under which labels.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnLayout {
    scalar_columns: Vec<ColumnDescriptor>,
    scalar_labels: Vec<String>,
    oned_columns: Vec<ColumnDescriptor>,
    oned_labels: Vec<String>,
    pre_snapshot: Vec<(String, Option<Sample>)>,
    excluded: Vec<ExcludedColumn>,
}

impl ColumnLayout {
    pub fn classify(metadata: &ScanMetadata) -> Self {
        let mut scalar_columns = Vec::new();
        let mut oned_columns = Vec::new();
        let mut excluded = Vec::new();

        for column in &metadata.columns {
            match classify_column(&column.dtype, &column.shape) {
                ColumnKind::Scalar => scalar_columns.push(column.clone()),
                ColumnKind::OneDimensional => oned_columns.push(column.clone()),
                ColumnKind::Excluded(reason) => {
                    debug!(
                        "column {} ({} {:?}) excluded: {:?}",
                        column.label, column.dtype, column.shape, reason
                    );
                    excluded.push(ExcludedColumn {
                        name: column.name.clone(),
                        label: column.label.clone(),
                        reason,
                    });
                }
            }
        }

        let scalar_labels = scalar_columns
            .iter()
            .map(|column| sanitize_label(&column.label))
            .collect();
        let oned_labels = oned_columns
            .iter()
            .map(|column| sanitize_label(&column.label))
            .collect();
        let pre_snapshot = metadata
            .snapshot
            .iter()
            .filter(|entry| classify_column(&entry.dtype, &entry.shape) == ColumnKind::Scalar)
            .map(|entry| (entry.label.clone(), entry.value))
            .collect();

        Self {
            scalar_columns,
            scalar_labels,
            oned_columns,
            oned_labels,
            pre_snapshot,
            excluded,
        }
    }

    pub fn scalar_columns(&self) -> &[ColumnDescriptor] {
        &self.scalar_columns
    }

    pub fn scalar_labels(&self) -> &[String] {
        &self.scalar_labels
    }

    pub fn oned_columns(&self) -> &[ColumnDescriptor] {
        &self.oned_columns
    }

    pub fn oned_labels(&self) -> &[String] {
        &self.oned_labels
    }

    pub fn pre_snapshot(&self) -> &[(String, Option<Sample>)] {
        &self.pre_snapshot
    }

    pub fn excluded(&self) -> &[ExcludedColumn] {
        &self.excluded
    }

    /// Spectrum length announced in `#@MCA`, taken from the last 1D column.
    pub fn mca_size(&self) -> Option<u64> {
        self.oned_columns
            .last()
            .and_then(|column| column.shape.first().copied())
    }
}

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecWriterError};

/// Lifecycle of a scan as published by the registry. The ordering matters:
/// callers compare with `<`/`>=` because polling can skip intermediate states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanState {
    Created,
    Prepared,
    Started,
    Stopped,
    Closed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Created => "CREATED",
            ScanState::Prepared => "PREPARED",
            ScanState::Started => "STARTED",
            ScanState::Stopped => "STOPPED",
            ScanState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Position of a scan announcement in the registry, ordered like a
/// `<millis>-<seq>` stream id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanTimestamp {
    pub millis: i64,
    pub seq: u64,
}

impl fmt::Display for ScanTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

/// One numeric value read from a stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Sample {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Sample {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let serde_json::Value::Number(number) = value else {
            return None;
        };
        if let Some(v) = number.as_i64() {
            Some(Sample::Int(v))
        } else if let Some(v) = number.as_u64() {
            Some(Sample::UInt(v))
        } else {
            number.as_f64().map(Sample::Float)
        }
    }

    /// JSON drops the ".0" of integral floats; float dtypes get it back.
    pub fn for_dtype(self, dtype: &str) -> Self {
        if !dtype.starts_with("float") {
            return self;
        }
        match self {
            Sample::Int(v) => Sample::Float(v as f64),
            Sample::UInt(v) => Sample::Float(v as f64),
            Sample::Float(v) => Sample::Float(v),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Int(v) => write!(f, "{v}"),
            Sample::UInt(v) => write!(f, "{v}"),
            Sample::Float(v) => f.write_str(&float_text(*v)),
        }
    }
}

// Legacy SPEC text: `1.0`, `nan`, `-inf`, `1e+16`, `2.5e-07`.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Debug keeps the ".0" of integral floats and switches to exponent form
    // below 1e-4 and from 1e16 on.
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

/// One entry of a column stream: a single value or a whole spectrum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Point {
    Scalar(Sample),
    Spectrum(Vec<Sample>),
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Scalar(sample) => sample.fmt(f),
            Point::Spectrum(samples) => {
                for (index, sample) in samples.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    sample.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

impl Point {
    pub fn for_dtype(self, dtype: &str) -> Self {
        match self {
            Point::Scalar(sample) => Point::Scalar(sample.for_dtype(dtype)),
            Point::Spectrum(samples) => Point::Spectrum(
                samples
                    .into_iter()
                    .map(|sample| sample.for_dtype(dtype))
                    .collect(),
            ),
        }
    }
}

impl From<f64> for Point {
    fn from(value: f64) -> Self {
        Point::Scalar(Sample::Float(value))
    }
}

impl From<i64> for Point {
    fn from(value: i64) -> Self {
        Point::Scalar(Sample::Int(value))
    }
}

impl From<Vec<i64>> for Point {
    fn from(values: Vec<i64>) -> Self {
        Point::Spectrum(values.into_iter().map(Sample::Int).collect())
    }
}

impl From<Vec<f64>> for Point {
    fn from(values: Vec<f64>) -> Self {
        Point::Spectrum(values.into_iter().map(Sample::Float).collect())
    }
}

/// What a cursor hands back on each read. `start_index` is informational.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub start_index: u64,
    pub points: Vec<Point>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Scan metadata exactly as published. Every field may still be missing
/// while the scan is being set up; see [`ScanMetadata::from_info`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub scan_nb: Option<u64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub end_reason: Option<String>,
    #[serde(default)]
    pub filename: Option<PathBuf>,
    #[serde(default)]
    pub npoints: Option<u64>,
    #[serde(default, with = "ordered_map")]
    pub datadesc: Vec<(String, RawColumn)>,
    #[serde(default, with = "ordered_map")]
    pub snapshot: Vec<(String, RawSnapshotEntry)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawColumn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub shape: Option<Vec<u64>>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub plot_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSnapshotEntry {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub shape: Option<Vec<u64>>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub label: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub unit: Option<String>,
    pub plot_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    pub label: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub value: Option<Sample>,
}

/// Validated metadata of a prepared scan. Built once and never refreshed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanMetadata {
    pub title: String,
    pub scan_nb: u64,
    pub start_time: String,
    pub filename: PathBuf,
    pub npoints: Option<u64>,
    pub columns: Vec<ColumnDescriptor>,
    pub snapshot: Vec<SnapshotEntry>,
}

impl ScanMetadata {
    pub fn from_info(info: &ScanInfo) -> Result<Self> {
        let title = required(&info.title, "title")?;
        let scan_nb = info
            .scan_nb
            .ok_or_else(|| SpecWriterError::config("scan metadata is missing `scan_nb`"))?;
        let start_time = required(&info.start_time, "start_time")?;
        let filename = info
            .filename
            .clone()
            .ok_or_else(|| SpecWriterError::config("scan metadata is missing `filename`"))?;

        let columns = info
            .datadesc
            .iter()
            .map(|(key, raw)| {
                let label = column_field(&raw.label, key, "label")?;
                Ok(ColumnDescriptor {
                    name: raw.name.clone().unwrap_or_else(|| key.clone()),
                    label,
                    dtype: column_field(&raw.dtype, key, "dtype")?,
                    shape: raw.shape.clone().ok_or_else(|| {
                        SpecWriterError::config(format!("column `{key}` is missing `shape`"))
                    })?,
                    unit: raw.unit.clone(),
                    plot_type: raw.plot_type.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let snapshot = info
            .snapshot
            .iter()
            .map(|(key, raw)| {
                let dtype = column_field(&raw.dtype, key, "dtype")?;
                let value = raw
                    .value
                    .as_ref()
                    .and_then(Sample::from_json)
                    .map(|sample| sample.for_dtype(&dtype));
                Ok(SnapshotEntry {
                    label: raw.label.clone().unwrap_or_else(|| key.clone()),
                    dtype,
                    shape: raw.shape.clone().unwrap_or_default(),
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            title,
            scan_nb,
            start_time,
            filename,
            npoints: info.npoints,
            columns,
            snapshot,
        })
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| SpecWriterError::config(format!("scan metadata is missing `{field}`")))
}

fn column_field(value: &Option<String>, key: &str, field: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| SpecWriterError::config(format!("column `{key}` is missing `{field}`")))
}

/// Serde adapter keeping the publication order of JSON object entries.
pub(crate) mod ordered_map {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(entries: &Vec<(String, T)>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Vec<(String, T)>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::ProjectionError,
    stand::{HeightKey, Stand, MAX_HEIGHT_FT},
};

pub const HEIGHT_COLUMN: &str = "Tree Height (ft)";
pub const LOT_COLUMN: &str = "Lot";
pub const ROW_COLUMN: &str = "Row";
pub const QUALITY_COLUMN: &str = "Quality";
pub const COUNT_COLUMN: &str = "Count";

/// Grade assigned during the inventory walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Quality {
    /// Good.
    A,
    /// Needs pruning.
    B,
    /// Needs to be cut.
    C,
    /// Overcrowded.
    Oc,
    Other(String),
}

impl Quality {
    pub const CANONICAL: [Quality; 4] = [Quality::A, Quality::B, Quality::C, Quality::Oc];

    pub fn label(&self) -> &str {
        match self {
            Quality::A => "A",
            Quality::B => "B",
            Quality::C => "C",
            Quality::Oc => "OC",
            Quality::Other(label) => label,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Quality::A => "Good",
            Quality::B => "Needs Pruning",
            Quality::C => "Needs to be Cut",
            Quality::Oc => "Overcrowded",
            Quality::Other(_) => "Ungraded",
        }
    }

    fn rank(&self) -> usize {
        Self::CANONICAL
            .iter()
            .position(|quality| quality == self)
            .unwrap_or(Self::CANONICAL.len())
    }
}

impl From<&str> for Quality {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Quality::A,
            "B" => Quality::B,
            "C" => Quality::C,
            "OC" => Quality::Oc,
            _ => Quality::Other(value.trim().to_string()),
        }
    }
}

impl From<String> for Quality {
    fn from(value: String) -> Self {
        Quality::from(value.as_str())
    }
}

impl From<Quality> for String {
    fn from(value: Quality) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl PartialOrd for Quality {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quality {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.label().cmp(other.label()))
    }
}

/// One inventory line: `count` trees of one grade at one height in one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub height: f64,
    pub lot: String,
    pub row: String,
    pub quality: Quality,
    pub count: u64,
}

impl TreeRecord {
    pub fn new(height: f64, count: u64) -> Self {
        Self {
            height,
            lot: String::new(),
            row: String::new(),
            quality: Quality::A,
            count,
        }
    }

    pub fn located(mut self, lot: impl Into<String>, row: impl Into<String>) -> Self {
        self.lot = lot.into();
        self.row = row.into();
        self
    }

    pub fn graded(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }
}

/// Buckets `records` by height, rejecting the whole batch on the first bad
/// record. Row numbers in errors are 1-based.
pub fn stand_from_records(records: &[TreeRecord]) -> Result<Stand, ProjectionError> {
    let mut stand = Stand::new();
    for (index, record) in records.iter().enumerate() {
        if !record.height.is_finite() || record.height < 0.0 {
            return Err(ProjectionError::malformed(
                index + 1,
                format!("height {} must be a finite, non-negative number", record.height),
            ));
        }
        if record.height > MAX_HEIGHT_FT {
            return Err(ProjectionError::malformed(
                index + 1,
                format!("height {} exceeds {MAX_HEIGHT_FT} ft", record.height),
            ));
        }
        stand.add(record.height, record.count as f64);
    }
    Ok(stand)
}

/// Dashboard-style selection over inventory records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryFilter {
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub qualities: Vec<Quality>,
    pub lot: Option<String>,
}

impl Default for InventoryFilter {
    fn default() -> Self {
        Self {
            min_height: None,
            max_height: None,
            qualities: vec![Quality::A, Quality::B, Quality::C],
            lot: None,
        }
    }
}

impl InventoryFilter {
    pub fn all() -> Self {
        Self {
            qualities: Vec::new(),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &TreeRecord) -> bool {
        height_in_range(record.height, self.min_height, self.max_height)
            && (self.qualities.is_empty() || self.qualities.contains(&record.quality))
            && self.lot.as_ref().map_or(true, |lot| lot == &record.lot)
    }
}

pub(crate) fn height_in_range(height: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |min| height >= min) && max.map_or(true, |max| height <= max)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeightCount {
    pub height: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// A grade and what it means, for dashboard legends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityLegend {
    pub quality: Quality,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaintenanceRow {
    pub quality: Quality,
    pub lot: String,
    pub row: String,
    pub height: f64,
    pub count: u64,
}

/// Height bands used by the distribution summary: upper bound inclusive.
const HEIGHT_BANDS: [(&str, f64); 5] = [
    ("0-5ft", 5.0),
    ("6-10ft", 10.0),
    ("11-15ft", 15.0),
    ("16-20ft", 20.0),
    (">20ft", f64::INFINITY),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Inventory {
    records: Vec<TreeRecord>,
}

impl Inventory {
    pub fn new(records: Vec<TreeRecord>) -> Self {
        Self { records }
    }

    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open inventory file {}", path.display()))?;
        let inventory = Self::from_reader(file)
            .with_context(|| format!("Failed to read inventory {}", path.display()))?;
        debug!(
            path = %path.display(),
            records = inventory.records.len(),
            "inventory loaded"
        );
        Ok(inventory)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut table = CsvTable::new(
            reader,
            &[HEIGHT_COLUMN, LOT_COLUMN, ROW_COLUMN, QUALITY_COLUMN, COUNT_COLUMN],
        )?;
        let mut records = Vec::new();
        while let Some((row, fields)) = table.next_row()? {
            records.push(TreeRecord {
                height: parse_height(row, HEIGHT_COLUMN, &fields[0])?,
                lot: required_text(row, LOT_COLUMN, &fields[1])?,
                row: fields[2].clone(),
                quality: Quality::from(required_text(row, QUALITY_COLUMN, &fields[3])?),
                count: parse_count(row, COUNT_COLUMN, &fields[4])?,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TreeRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filter(&self, filter: &InventoryFilter) -> Inventory {
        Inventory {
            records: self
                .records
                .iter()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        }
    }

    pub fn total_count(&self) -> u64 {
        self.records.iter().map(|record| record.count).sum()
    }

    pub fn height_span(&self) -> Option<(f64, f64)> {
        self.records.iter().fold(None, |span, record| match span {
            None => Some((record.height, record.height)),
            Some((min, max)) => Some((min.min(record.height), max.max(record.height))),
        })
    }

    /// Grades present in the data, canonical grades first.
    pub fn available_qualities(&self) -> Vec<Quality> {
        let mut qualities: Vec<Quality> = Vec::new();
        for record in &self.records {
            if !qualities.contains(&record.quality) {
                qualities.push(record.quality.clone());
            }
        }
        qualities.sort();
        qualities
    }

    pub fn quality_legend(&self) -> Vec<QualityLegend> {
        self.available_qualities()
            .into_iter()
            .map(|quality| QualityLegend {
                description: quality.description().to_string(),
                quality,
            })
            .collect()
    }

    pub fn lots(&self) -> Vec<String> {
        let mut lots: Vec<String> = Vec::new();
        for record in &self.records {
            if !lots.contains(&record.lot) {
                lots.push(record.lot.clone());
            }
        }
        lots.sort_by(|a, b| lot_order(a, b));
        lots
    }

    pub fn counts_by_height(&self) -> Vec<HeightCount> {
        let mut grouped: BTreeMap<HeightKey, u64> = BTreeMap::new();
        for record in &self.records {
            *grouped
                .entry(HeightKey::from_feet(record.height))
                .or_default() += record.count;
        }
        grouped
            .into_iter()
            .map(|(key, count)| HeightCount {
                height: key.feet(),
                count,
            })
            .collect()
    }

    pub fn height_bands(&self) -> Vec<LabelCount> {
        let mut counts = [0_u64; HEIGHT_BANDS.len()];
        for record in &self.records {
            let band = HEIGHT_BANDS
                .iter()
                .position(|(_, upper)| record.height <= *upper)
                .unwrap_or(HEIGHT_BANDS.len() - 1);
            counts[band] += record.count;
        }
        HEIGHT_BANDS
            .iter()
            .zip(counts)
            .map(|((label, _), count)| LabelCount {
                label: label.to_string(),
                count,
            })
            .collect()
    }

    pub fn counts_by_lot(&self) -> Vec<LabelCount> {
        group_counts(self.records.iter().map(|record| (&record.lot, record.count)))
    }

    pub fn counts_by_row(&self) -> Vec<LabelCount> {
        group_counts(self.records.iter().map(|record| (&record.row, record.count)))
    }

    /// Work list grouped by grade, lot, row and height.
    pub fn maintenance_table(&self) -> Vec<MaintenanceRow> {
        let mut rows: Vec<MaintenanceRow> = Vec::new();
        for record in &self.records {
            let existing = rows.iter_mut().find(|row| {
                row.quality == record.quality
                    && row.lot == record.lot
                    && row.row == record.row
                    && HeightKey::from_feet(row.height)
                        == HeightKey::from_feet(record.height)
            });
            match existing {
                Some(row) => row.count += record.count,
                None => rows.push(MaintenanceRow {
                    quality: record.quality.clone(),
                    lot: record.lot.clone(),
                    row: record.row.clone(),
                    height: record.height,
                    count: record.count,
                }),
            }
        }
        rows.sort_by(|a, b| {
            a.quality
                .cmp(&b.quality)
                .then_with(|| lot_order(&a.lot, &b.lot))
                .then_with(|| lot_order(&a.row, &b.row))
                .then_with(|| a.height.total_cmp(&b.height))
        });
        rows
    }
}

fn group_counts<'a>(items: impl Iterator<Item = (&'a String, u64)>) -> Vec<LabelCount> {
    let mut grouped: Vec<LabelCount> = Vec::new();
    for (label, count) in items {
        match grouped.iter_mut().find(|entry| &entry.label == label) {
            Some(entry) => entry.count += count,
            None => grouped.push(LabelCount {
                label: label.clone(),
                count,
            }),
        }
    }
    grouped.sort_by(|a, b| lot_order(&a.label, &b.label));
    grouped
}

/// Numeric labels sort numerically and ahead of free text.
pub(crate) fn lot_order(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// CSV reader that resolves a fixed set of columns by header name.
pub(crate) struct CsvTable<R> {
    reader: csv::Reader<R>,
    indices: Vec<usize>,
    row: usize,
}

impl<R: Read> CsvTable<R> {
    pub(crate) fn new(reader: R, columns: &[&str]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers().context("Failed to read header row")?.clone();
        let mut indices = Vec::with_capacity(columns.len());
        for column in columns {
            let index = headers
                .iter()
                .position(|header| header.eq_ignore_ascii_case(column))
                .ok_or_else(|| {
                    ProjectionError::malformed(0, format!("missing required column `{column}`"))
                })?;
            indices.push(index);
        }
        Ok(Self {
            reader,
            indices,
            row: 0,
        })
    }

    /// Next data row as `(1-based row number, fields in column order)`.
    pub(crate) fn next_row(&mut self) -> Result<Option<(usize, Vec<String>)>> {
        let mut record = csv::StringRecord::new();
        loop {
            if !self
                .reader
                .read_record(&mut record)
                .with_context(|| format!("Failed to read row {}", self.row + 1))?
            {
                return Ok(None);
            }
            self.row += 1;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            let fields = self
                .indices
                .iter()
                .map(|index| record.get(*index).unwrap_or_default().to_string())
                .collect();
            return Ok(Some((self.row, fields)));
        }
    }
}

pub(crate) fn required_text(
    row: usize,
    column: &str,
    value: &str,
) -> Result<String, ProjectionError> {
    if value.is_empty() {
        return Err(ProjectionError::malformed(
            row,
            format!("`{column}` is required"),
        ));
    }
    Ok(value.to_string())
}

pub(crate) fn parse_height(row: usize, column: &str, value: &str) -> Result<f64, ProjectionError> {
    let height: f64 = required_text(row, column, value)?
        .parse()
        .map_err(|_| ProjectionError::malformed(row, format!("`{column}` is not a number: '{value}'")))?;
    if !height.is_finite() || height < 0.0 {
        return Err(ProjectionError::malformed(
            row,
            format!("`{column}` must be a non-negative number, got {value}"),
        ));
    }
    if height > MAX_HEIGHT_FT {
        return Err(ProjectionError::malformed(
            row,
            format!("`{column}` {value} exceeds {MAX_HEIGHT_FT} ft"),
        ));
    }
    Ok(height)
}

/// Accepts `12` and spreadsheet-style `12.0`, rejects fractions and
/// negatives.
pub(crate) fn parse_count(row: usize, column: &str, value: &str) -> Result<u64, ProjectionError> {
    let count: f64 = required_text(row, column, value)?
        .parse()
        .map_err(|_| ProjectionError::malformed(row, format!("`{column}` is not a number: '{value}'")))?;
    if !count.is_finite() || count < 0.0 {
        return Err(ProjectionError::malformed(
            row,
            format!("`{column}` must not be negative, got {value}"),
        ));
    }
    if count.fract() != 0.0 {
        return Err(ProjectionError::malformed(
            row,
            format!("`{column}` must be a whole number, got {value}"),
        ));
    }
    Ok(count as u64)
}

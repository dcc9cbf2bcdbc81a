use std::{collections::BTreeMap, fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{Bracket, Schedule},
    error::ProjectionError,
    inventory::{
        height_in_range, parse_count, parse_height, required_text, CsvTable, HeightCount,
        LabelCount, Quality, HEIGHT_COLUMN, QUALITY_COLUMN,
    },
    projection::Binning,
    stand::HeightKey,
};

pub const CUSTOMER_COLUMN: &str = "Customer";
pub const YEAR_COLUMN: &str = "Sales Year";
pub const QUANTITY_COLUMN: &str = "Quantity";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub height: f64,
    pub quality: Quality,
    pub customer: String,
    pub sales_year: i32,
    pub quantity: u64,
}

/// Selection over past sales. Empty customer and year lists select all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesFilter {
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub qualities: Vec<Quality>,
    pub customers: Vec<String>,
    pub years: Vec<i32>,
}

impl Default for SalesFilter {
    fn default() -> Self {
        Self {
            min_height: None,
            max_height: None,
            qualities: vec![Quality::A, Quality::B],
            customers: Vec::new(),
            years: Vec::new(),
        }
    }
}

impl SalesFilter {
    pub fn matches(&self, record: &SaleRecord) -> bool {
        height_in_range(record.height, self.min_height, self.max_height)
            && (self.qualities.is_empty() || self.qualities.contains(&record.quality))
            && (self.customers.is_empty() || self.customers.contains(&record.customer))
            && (self.years.is_empty() || self.years.contains(&record.sales_year))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesHistory {
    records: Vec<SaleRecord>,
}

impl SalesHistory {
    pub fn new(records: Vec<SaleRecord>) -> Self {
        Self { records }
    }

    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open sales file {}", path.display()))?;
        let history = Self::from_reader(file)
            .with_context(|| format!("Failed to read sales {}", path.display()))?;
        debug!(path = %path.display(), records = history.records.len(), "sales loaded");
        Ok(history)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut table = CsvTable::new(
            reader,
            &[
                HEIGHT_COLUMN,
                QUALITY_COLUMN,
                CUSTOMER_COLUMN,
                YEAR_COLUMN,
                QUANTITY_COLUMN,
            ],
        )?;
        let mut records = Vec::new();
        while let Some((row, fields)) = table.next_row()? {
            let year = parse_count(row, YEAR_COLUMN, &fields[3])?;
            records.push(SaleRecord {
                height: parse_height(row, HEIGHT_COLUMN, &fields[0])?,
                quality: Quality::from(required_text(row, QUALITY_COLUMN, &fields[1])?),
                customer: fields[2].clone(),
                sales_year: i32::try_from(year).map_err(|_| {
                    ProjectionError::malformed(row, format!("`{YEAR_COLUMN}` {year} is out of range"))
                })?,
                quantity: parse_count(row, QUANTITY_COLUMN, &fields[4])?,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[SaleRecord] {
        &self.records
    }

    pub fn filter(&self, filter: &SalesFilter) -> SalesHistory {
        SalesHistory {
            records: self
                .records
                .iter()
                .filter(|record| filter.matches(record))
                .cloned()
                .collect(),
        }
    }

    pub fn total_quantity(&self) -> u64 {
        self.records.iter().map(|record| record.quantity).sum()
    }

    pub fn customers(&self) -> Vec<String> {
        let mut customers: Vec<String> = self
            .records
            .iter()
            .map(|record| record.customer.clone())
            .filter(|customer| !customer.is_empty())
            .collect();
        customers.sort();
        customers.dedup();
        customers
    }

    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|record| record.sales_year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    pub fn quantity_by_height(&self) -> Vec<HeightCount> {
        let mut grouped: BTreeMap<HeightKey, u64> = BTreeMap::new();
        for record in &self.records {
            *grouped
                .entry(HeightKey::from_feet(record.height))
                .or_default() += record.quantity;
        }
        grouped
            .into_iter()
            .map(|(key, count)| HeightCount {
                height: key.feet(),
                count,
            })
            .collect()
    }

    pub fn quantity_by_customer(&self) -> Vec<LabelCount> {
        let mut grouped: BTreeMap<&str, u64> = BTreeMap::new();
        for record in &self.records {
            *grouped.entry(record.customer.as_str()).or_default() += record.quantity;
        }
        grouped
            .into_iter()
            .map(|(customer, count)| LabelCount {
                label: customer.to_string(),
                count,
            })
            .collect()
    }

    /// Mean quantity sold per year in each `bracket_width` ft height band,
    /// as a sales schedule for the projection.
    ///
    /// Years with no sales at all are not counted; heights outside every band
    /// sell nothing.
    pub fn average_annual_schedule(&self, bracket_width: f64) -> Result<Schedule, ProjectionError> {
        let binning = Binning::Width(bracket_width);
        binning.validate().map_err(|_| {
            ProjectionError::invalid(
                "sales.bracket_width_ft",
                format!("bracket width {bracket_width} must be a positive number of feet"),
            )
        })?;

        let years = self.years().len();
        if years == 0 {
            return Ok(Schedule::uniform(0.0));
        }

        let mut bands: BTreeMap<HeightKey, u64> = BTreeMap::new();
        for record in &self.records {
            *bands
                .entry(HeightKey::from_feet(binning.bin(record.height)))
                .or_default() += record.quantity;
        }
        let brackets = bands
            .into_iter()
            .map(|(key, quantity)| {
                let from = key.feet();
                Bracket::new(from, Some(from + bracket_width), quantity as f64 / years as f64)
            })
            .collect();
        Ok(Schedule::bracketed(0.0, brackets))
    }
}

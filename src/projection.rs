use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::ProjectionParameters,
    engine::EngineSettings,
    error::ProjectionError,
    stand::{HeightKey, StandSnapshot, YearLedger},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub height: f64,
    pub year: u32,
    pub count: f64,
}

/// Output of one projection run: a row per (height, year) plus the yearly
/// ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub scenario: String,
    pub start_year: Option<i32>,
    pub parameters: ProjectionParameters,
    pub rows: Vec<ProjectionRow>,
    pub ledger: Vec<YearLedger>,
}

impl Projection {
    pub(crate) fn from_snapshots(
        settings: &EngineSettings,
        parameters: ProjectionParameters,
        snapshots: Vec<StandSnapshot>,
        ledger: Vec<YearLedger>,
    ) -> Self {
        let rows = snapshots
            .iter()
            .flat_map(|snapshot| {
                snapshot.buckets.iter().map(move |bucket| ProjectionRow {
                    height: bucket.height,
                    year: snapshot.year,
                    count: bucket.count,
                })
            })
            .collect();
        Self {
            scenario: settings.scenario_name.clone(),
            start_year: settings.start_year,
            parameters,
            rows,
            ledger,
        }
    }

    pub fn horizon_years(&self) -> u32 {
        self.parameters.horizon_years
    }

    pub fn calendar_year(&self, year: u32) -> Option<i32> {
        self.start_year.map(|start| start + year as i32)
    }

    pub fn rows_for_year(&self, year: u32) -> impl Iterator<Item = &ProjectionRow> {
        self.rows.iter().filter(move |row| row.year == year)
    }

    pub fn total_for_year(&self, year: u32) -> f64 {
        self.rows_for_year(year).map(|row| row.count).sum()
    }

    pub fn count_at(&self, height: f64, year: u32) -> Option<f64> {
        let key = HeightKey::from_feet(height);
        self.rows_for_year(year)
            .find(|row| HeightKey::from_feet(row.height) == key)
            .map(|row| row.count)
    }

    /// Pivots the rows into a height-by-year matrix.
    ///
    /// Binning only happens here; the simulation itself always runs on the
    /// fine height grid.
    pub fn table(&self, binning: Binning) -> Result<ProjectionTable, ProjectionError> {
        binning.validate()?;
        let years: Vec<u32> = (0..=self.horizon_years()).collect();
        let mut cells: BTreeMap<HeightKey, Vec<f64>> = BTreeMap::new();
        for row in &self.rows {
            let key = HeightKey::from_feet(binning.bin(row.height));
            let column = cells
                .entry(key)
                .or_insert_with(|| vec![0.0; years.len()]);
            if let Some(cell) = column.get_mut(row.year as usize) {
                *cell += row.count;
            }
        }

        let (heights, counts): (Vec<f64>, Vec<Vec<f64>>) = cells
            .into_iter()
            .map(|(key, column)| (key.feet(), column))
            .unzip();
        Ok(ProjectionTable {
            calendar_years: years
                .iter()
                .map(|year| self.calendar_year(*year))
                .collect(),
            years,
            heights,
            counts,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binning {
    #[default]
    Exact,
    /// Heights are floored to multiples of this many feet.
    Width(f64),
}

impl Binning {
    pub fn from_width(width: Option<f64>) -> Self {
        width.map_or(Binning::Exact, Binning::Width)
    }

    pub fn validate(&self) -> Result<(), ProjectionError> {
        match self {
            Binning::Exact => Ok(()),
            Binning::Width(width) if width.is_finite() && *width > 0.0 => Ok(()),
            Binning::Width(width) => Err(ProjectionError::invalid(
                "report.bin_width_ft",
                format!("bin width {width} must be a positive number of feet"),
            )),
        }
    }

    pub fn bin(&self, height: f64) -> f64 {
        match self {
            Binning::Exact => height,
            Binning::Width(width) => {
                // Absorb float error from the 0.01 ft grid before flooring.
                let steps = (height / width + 1e-9).floor();
                steps * width
            }
        }
    }
}

/// `counts[h][y]` is the number of trees at `heights[h]` in `years[y]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionTable {
    pub heights: Vec<f64>,
    pub years: Vec<u32>,
    pub calendar_years: Vec<Option<i32>>,
    pub counts: Vec<Vec<f64>>,
}

impl ProjectionTable {
    pub fn year_totals(&self) -> Vec<f64> {
        (0..self.years.len())
            .map(|column| self.counts.iter().map(|row| row[column]).sum::<f64>())
            .collect()
    }

    pub fn column_labels(&self) -> Vec<String> {
        self.years
            .iter()
            .zip(&self.calendar_years)
            .map(|(year, calendar)| match calendar {
                Some(calendar) => calendar.to_string(),
                None => format!("Year {year}"),
            })
            .collect()
    }
}

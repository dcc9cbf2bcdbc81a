use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{PlantingTarget, ProjectionParameters, Schedule, DEFAULT_PLANTING_HEIGHT_FT},
    engine::{Engine, EngineSettings},
    error::ProjectionError,
    inventory::{Inventory, TreeRecord},
    projection::{Binning, Projection},
    sales::{SalesFilter, SalesHistory},
};

fn default_horizon_years() -> i64 {
    10
}

fn default_bracket_width() -> f64 {
    1.0
}

/// A projection run as written in a scenario YAML file.
///
/// Counts and the horizon are kept signed here so that a negative value
/// reaches validation and is reported by field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default = "default_horizon_years")]
    pub horizon_years: i64,
    #[serde(default)]
    pub planting: PlantingConfig,
    #[serde(default)]
    pub growth: Schedule,
    #[serde(default)]
    pub mortality: Schedule,
    #[serde(default)]
    pub sales: Option<Schedule>,
    #[serde(default)]
    pub sales_history: Option<SalesHistoryConfig>,
    #[serde(default)]
    pub inventory: Option<PathBuf>,
    #[serde(default)]
    pub stock: Vec<StockEntry>,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub snapshot_interval_years: u32,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantingConfig {
    #[serde(default)]
    pub per_year: Option<i64>,
    #[serde(default)]
    pub height_ft: f64,
    #[serde(default)]
    pub targets: Vec<StockEntry>,
}

impl Default for PlantingConfig {
    fn default() -> Self {
        Self {
            per_year: None,
            height_ft: DEFAULT_PLANTING_HEIGHT_FT,
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    pub height_ft: f64,
    pub count: i64,
}

/// Derives the sales schedule from past sales instead of listing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesHistoryConfig {
    pub path: PathBuf,
    #[serde(default = "default_bracket_width")]
    pub bracket_width_ft: f64,
    #[serde(default)]
    pub filter: Option<SalesFilter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub bin_width_ft: Option<f64>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(scenario = %scenario.name, path = %path.display(), "scenario loaded");
        Ok(scenario)
    }
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse scenario")
    }

    /// Calendar year of the starting inventory; the current year when the
    /// scenario does not say.
    pub fn calendar_start(&self) -> i32 {
        self.start_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            scenario_name: self.name.clone(),
            start_year: Some(self.calendar_start()),
        }
    }

    pub fn binning(&self) -> Binning {
        Binning::from_width(self.report.bin_width_ft)
    }

    /// Starting records: the inventory CSV when one is named, the inline
    /// stock list otherwise.
    pub fn stock(&self) -> Result<Vec<TreeRecord>> {
        match &self.inventory {
            Some(path) => {
                if !self.stock.is_empty() {
                    bail!(ProjectionError::invalid(
                        "stock",
                        "use either `inventory` or inline `stock`, not both"
                    ));
                }
                let inventory = Inventory::load_csv(self.base_dir.join(path))?;
                Ok(inventory.records().to_vec())
            }
            None => {
                let mut records = Vec::with_capacity(self.stock.len());
                for (index, entry) in self.stock.iter().enumerate() {
                    if entry.count < 0 {
                        return Err(ProjectionError::malformed(
                            index + 1,
                            format!("stock count {} must not be negative", entry.count),
                        )
                        .into());
                    }
                    records.push(TreeRecord::new(entry.height_ft, entry.count as u64));
                }
                Ok(records)
            }
        }
    }

    pub fn parameters(&self) -> Result<ProjectionParameters> {
        let horizon_years = u32::try_from(self.horizon_years).map_err(|_| {
            ProjectionError::invalid(
                "horizon_years",
                format!("{} is not a valid number of years", self.horizon_years),
            )
        })?;

        let sales = match (&self.sales, &self.sales_history) {
            (Some(_), Some(_)) => bail!(ProjectionError::invalid(
                "sales",
                "use either `sales` or `sales_history`, not both"
            )),
            (Some(schedule), None) => schedule.clone(),
            (None, Some(history)) => {
                let sales = SalesHistory::load_csv(self.base_dir.join(&history.path))?;
                let filter = history.filter.clone().unwrap_or_default();
                sales
                    .filter(&filter)
                    .average_annual_schedule(history.bracket_width_ft)?
            }
            (None, None) => Schedule::default(),
        };

        let params = ProjectionParameters {
            horizon_years,
            planting: self.planting.targets()?,
            growth: self.growth.clone(),
            mortality: self.mortality.clone(),
            sales,
        };
        params.validate()?;
        Ok(params)
    }

    /// Loads the stock, resolves parameters and runs the standard engine.
    pub fn run(&self) -> Result<Projection> {
        let records = self.stock()?;
        let params = self.parameters()?;
        let projection = Engine::standard(self.engine_settings()).project(&records, &params)?;
        Ok(projection)
    }
}

impl PlantingConfig {
    pub fn targets(&self) -> Result<Vec<PlantingTarget>, ProjectionError> {
        let mut targets = Vec::with_capacity(self.targets.len() + 1);
        if let Some(per_year) = self.per_year {
            targets.push(PlantingTarget::new(
                self.height_ft,
                non_negative("planting.per_year", per_year)?,
            ));
        }
        for (index, entry) in self.targets.iter().enumerate() {
            targets.push(PlantingTarget::new(
                entry.height_ft,
                non_negative(&format!("planting.targets[{index}].count"), entry.count)?,
            ));
        }
        Ok(targets)
    }
}

fn non_negative(field: &str, value: i64) -> Result<u64, ProjectionError> {
    u64::try_from(value)
        .map_err(|_| ProjectionError::invalid(field, format!("{value} must not be negative")))
}

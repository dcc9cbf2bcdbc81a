use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::{PlantingTarget, ProjectionParameters, Schedule},
    engine::{Engine, EngineSettings},
    error::ProjectionError,
    inventory::{
        HeightCount, Inventory, InventoryFilter, LabelCount, Quality, QualityLegend, TreeRecord,
    },
    projection::{Binning, Projection, ProjectionTable},
    scenario::Scenario,
};

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub host: String,
    pub port: u16,
}

/// Loaded once at startup and shared read-only by every request.
struct AppState {
    scenario: Scenario,
    settings: EngineSettings,
    inventory: Inventory,
    parameters: ProjectionParameters,
    baseline: Projection,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        host,
        port,
    } = config;

    let records = scenario.stock()?;
    let parameters = scenario.parameters()?;
    let settings = scenario.engine_settings();
    let baseline = Engine::standard(settings.clone()).project(&records, &parameters)?;
    let state = Arc::new(AppState {
        scenario,
        settings,
        inventory: Inventory::new(records),
        parameters,
        baseline,
    });

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        scenario = %state.scenario.name,
        "projection API live at http://{addr} (Ctrl+C to stop)"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/scenario", get(scenario_info))
        .route("/api/projection", get(baseline).post(recompute))
        .route("/api/projection/table", get(baseline_table))
        .route("/api/inventory/summary", get(inventory_summary))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down projection API");
}

enum ApiError {
    Invalid(ProjectionError),
    Internal(String),
}

impl From<ProjectionError> for ApiError {
    fn from(value: ProjectionError) -> Self {
        ApiError::Invalid(value)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    field: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Invalid(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody {
                    field: err.field().map(str::to_string),
                    error: err.to_string(),
                },
            ),
            ApiError::Internal(message) => {
                warn!("request failed: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: message,
                        field: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ScenarioInfo {
    name: String,
    description: Option<String>,
    start_year: Option<i32>,
    parameters: ProjectionParameters,
    total_trees: u64,
}

async fn scenario_info(State(state): State<Arc<AppState>>) -> Json<ScenarioInfo> {
    Json(ScenarioInfo {
        name: state.scenario.name.clone(),
        description: state.scenario.description.clone(),
        start_year: state.settings.start_year,
        parameters: state.parameters.clone(),
        total_trees: state.inventory.total_count(),
    })
}

async fn baseline(State(state): State<Arc<AppState>>) -> Json<Projection> {
    Json(state.baseline.clone())
}

#[derive(Debug, Default, Deserialize)]
struct TableQuery {
    bin_width_ft: Option<f64>,
}

async fn baseline_table(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TableQuery>,
) -> Result<Json<ProjectionTable>, ApiError> {
    let binning = match query.bin_width_ft {
        Some(width) => Binning::Width(width),
        None => state.scenario.binning(),
    };
    Ok(Json(state.baseline.table(binning)?))
}

/// Parameter changes for a what-if run; anything left out keeps the
/// scenario's value.
#[derive(Debug, Default, Deserialize)]
pub struct ParameterOverrides {
    pub horizon_years: Option<i64>,
    pub planting_per_year: Option<i64>,
    pub growth: Option<Schedule>,
    pub mortality: Option<Schedule>,
    pub sales: Option<Schedule>,
}

impl ParameterOverrides {
    pub fn apply(
        self,
        base: &ProjectionParameters,
        planting_height: f64,
    ) -> Result<ProjectionParameters, ProjectionError> {
        let mut params = base.clone();
        if let Some(horizon) = self.horizon_years {
            params.horizon_years = u32::try_from(horizon).map_err(|_| {
                ProjectionError::invalid(
                    "horizon_years",
                    format!("{horizon} is not a valid number of years"),
                )
            })?;
        }
        if let Some(per_year) = self.planting_per_year {
            let count = u64::try_from(per_year).map_err(|_| {
                ProjectionError::invalid(
                    "planting_per_year",
                    format!("{per_year} must not be negative"),
                )
            })?;
            params.planting = vec![PlantingTarget::new(planting_height, count)];
        }
        if let Some(growth) = self.growth {
            params.growth = growth;
        }
        if let Some(mortality) = self.mortality {
            params.mortality = mortality;
        }
        if let Some(sales) = self.sales {
            params.sales = sales;
        }
        params.validate()?;
        Ok(params)
    }
}

async fn recompute(
    State(state): State<Arc<AppState>>,
    Json(overrides): Json<ParameterOverrides>,
) -> Result<Json<Projection>, ApiError> {
    let params = overrides.apply(&state.parameters, state.scenario.planting.height_ft)?;
    let records: Vec<TreeRecord> = state.inventory.records().to_vec();
    let settings = state.settings.clone();
    let projection = tokio::task::spawn_blocking(move || {
        Engine::standard(settings).project(&records, &params)
    })
    .await
    .map_err(|err| ApiError::Internal(format!("projection task failed: {err}")))??;
    Ok(Json(projection))
}

#[derive(Debug, Default, Deserialize)]
struct SummaryQuery {
    min_height: Option<f64>,
    max_height: Option<f64>,
    /// Comma separated grades, e.g. `A,B`.
    quality: Option<String>,
    lot: Option<String>,
}

impl SummaryQuery {
    fn filter(self) -> InventoryFilter {
        let mut filter = InventoryFilter {
            min_height: self.min_height,
            max_height: self.max_height,
            lot: self.lot.filter(|lot| !lot.is_empty() && lot != "All"),
            ..InventoryFilter::default()
        };
        if let Some(quality) = self.quality {
            filter.qualities = quality
                .split(',')
                .filter(|label| !label.trim().is_empty())
                .map(Quality::from)
                .collect();
        }
        filter
    }
}

#[derive(Debug, Serialize)]
struct InventorySummary {
    total_count: u64,
    /// Full height range of the unfiltered inventory, for slider bounds.
    height_range: Option<(f64, f64)>,
    qualities: Vec<QualityLegend>,
    lots: Vec<String>,
    by_height: Vec<HeightCount>,
    height_bands: Vec<LabelCount>,
    by_lot: Vec<LabelCount>,
    /// Only when a single lot is selected; row labels repeat across lots.
    by_row: Option<Vec<LabelCount>>,
}

fn summarize(inventory: &Inventory, filter: &InventoryFilter) -> InventorySummary {
    let filtered = inventory.filter(filter);
    InventorySummary {
        total_count: filtered.total_count(),
        height_range: inventory.height_span(),
        qualities: inventory.quality_legend(),
        lots: inventory.lots(),
        by_height: filtered.counts_by_height(),
        height_bands: filtered.height_bands(),
        by_lot: filtered.counts_by_lot(),
        by_row: filter.lot.as_ref().map(|_| filtered.counts_by_row()),
    }
}

async fn inventory_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Json<InventorySummary> {
    Json(summarize(&state.inventory, &query.filter()))
}

use tracing::{debug, info, trace};

use crate::{
    config::ProjectionParameters,
    error::ProjectionError,
    inventory::{self, TreeRecord},
    projection::Projection,
    stand::{Stand, StandSnapshot},
    systems::{BookkeepingSystem, GrowthSystem, MortalitySystem, PlantingSystem, SalesSystem},
};

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub scenario_name: String,
    pub start_year: Option<i32>,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// Mortality, growth, sales, planting, then bookkeeping.
    pub fn with_standard_systems(self) -> Self {
        self.with_system(MortalitySystem::new())
            .with_system(GrowthSystem::new())
            .with_system(SalesSystem::new())
            .with_system(PlantingSystem::new())
            .with_system(BookkeepingSystem::new())
    }

    pub fn build(self) -> Engine {
        Engine {
            systems: self.systems,
            settings: self.settings,
        }
    }
}

pub struct Engine {
    systems: Vec<Box<dyn System>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn standard(settings: EngineSettings) -> Self {
        EngineBuilder::new(settings).with_standard_systems().build()
    }

    pub fn run(
        &mut self,
        stand: &mut Stand,
        params: &ProjectionParameters,
    ) -> Result<(), ProjectionError> {
        self.run_with_hook(stand, params, |_| {})
    }

    /// Advances `stand` through the horizon, handing `hook` a snapshot of
    /// the starting state and of every simulated year.
    pub fn run_with_hook<F>(
        &mut self,
        stand: &mut Stand,
        params: &ProjectionParameters,
        mut hook: F,
    ) -> Result<(), ProjectionError>
    where
        F: FnMut(StandSnapshot),
    {
        params.validate()?;
        info!(
            scenario = %self.settings.scenario_name,
            horizon_years = params.horizon_years,
            buckets = stand.len(),
            total = stand.total(),
            "starting projection"
        );

        hook(stand.snapshot(&self.settings.scenario_name, self.settings.start_year));
        for _ in 0..params.horizon_years {
            stand.begin_year();
            let ctx = SystemContext {
                year: stand.year(),
                params,
                scenario_name: &self.settings.scenario_name,
            };
            for system in &mut self.systems {
                trace!(year = ctx.year, system = system.name(), "running stage");
                system.run(&ctx, stand)?;
            }
            if let Some(ledger) = stand.history().last() {
                debug!(
                    year = ledger.year,
                    opening = ledger.opening,
                    deaths = ledger.deaths,
                    sold = ledger.sold,
                    planted = ledger.planted,
                    closing = ledger.closing,
                    "year complete"
                );
            }
            hook(stand.snapshot(&self.settings.scenario_name, self.settings.start_year));
        }

        info!(
            scenario = %self.settings.scenario_name,
            total = stand.total(),
            "projection finished"
        );
        Ok(())
    }

    /// Projects `initial` forward under `params`.
    ///
    /// Records and parameters are both validated before the first year runs.
    pub fn project(
        &mut self,
        initial: &[TreeRecord],
        params: &ProjectionParameters,
    ) -> Result<Projection, ProjectionError> {
        self.project_with_hook(initial, params, |_| {})
    }

    /// Like [`Engine::project`], also passing each yearly snapshot to `hook`.
    pub fn project_with_hook<F>(
        &mut self,
        initial: &[TreeRecord],
        params: &ProjectionParameters,
        mut hook: F,
    ) -> Result<Projection, ProjectionError>
    where
        F: FnMut(&StandSnapshot),
    {
        let mut stand = inventory::stand_from_records(initial)?;
        let mut snapshots = Vec::with_capacity(params.horizon_years as usize + 1);
        self.run_with_hook(&mut stand, params, |snapshot| {
            hook(&snapshot);
            snapshots.push(snapshot);
        })?;
        Ok(Projection::from_snapshots(
            &self.settings,
            params.clone(),
            snapshots,
            stand.history().to_vec(),
        ))
    }
}

/// Runs the standard pipeline once over `initial`.
pub fn project(
    initial: &[TreeRecord],
    params: &ProjectionParameters,
) -> Result<Projection, ProjectionError> {
    Engine::standard(EngineSettings::default()).project(initial, params)
}

pub struct SystemContext<'a> {
    pub year: u32,
    pub params: &'a ProjectionParameters,
    pub scenario_name: &'a str,
}

/// One step of the yearly pipeline.
pub trait System {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError>;
}

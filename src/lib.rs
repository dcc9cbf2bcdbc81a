pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod inventory;
pub mod logging;
pub mod projection;
pub mod sales;
pub mod scenario;
pub mod snapshot;
pub mod stand;
pub mod systems;
pub mod web;

pub use config::{PlantingTarget, ProjectionParameters, Schedule};
pub use engine::{project, Engine, EngineBuilder, EngineSettings};
pub use error::ProjectionError;
pub use inventory::{Inventory, TreeRecord};
pub use projection::{Projection, ProjectionRow};
pub use scenario::{Scenario, ScenarioLoader};

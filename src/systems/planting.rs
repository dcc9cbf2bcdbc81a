use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    error::ProjectionError,
    stand::Stand,
};

pub struct PlantingSystem;

impl PlantingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlantingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PlantingSystem {
    fn name(&self) -> &str {
        "planting"
    }

    fn run(&mut self, ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError> {
        let mut planted = 0.0;
        for target in &ctx.params.planting {
            let count = target.count as f64;
            stand.add(target.height, count);
            planted += count;
        }
        trace!(year = ctx.year, planted, "planting applied");
        stand.ledger.planted += planted;
        Ok(())
    }
}

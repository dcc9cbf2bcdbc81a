use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    error::ProjectionError,
    stand::{Stand, MAX_HEIGHT_FT},
};

pub struct GrowthSystem;

impl GrowthSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrowthSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for GrowthSystem {
    fn name(&self) -> &str {
        "growth"
    }

    fn run(&mut self, ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError> {
        let growth = &ctx.params.growth;
        let before = stand.len();
        let tallest = stand
            .buckets()
            .map(|bucket| bucket.height + growth.lookup(bucket.height).max(0.0))
            .fold(0.0, f64::max);
        if tallest > MAX_HEIGHT_FT {
            return Err(ProjectionError::invalid(
                "growth",
                format!(
                    "trees would reach {tallest} ft in year {}, above {MAX_HEIGHT_FT} ft",
                    ctx.year
                ),
            ));
        }
        stand.regrow(|height| height + growth.lookup(height).max(0.0));
        trace!(
            year = ctx.year,
            buckets_before = before,
            buckets_after = stand.len(),
            "growth applied"
        );
        Ok(())
    }
}

use crate::{
    engine::{System, SystemContext},
    error::ProjectionError,
    stand::Stand,
};

/// Closes the year's ledger. Must run last.
pub struct BookkeepingSystem;

impl BookkeepingSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BookkeepingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BookkeepingSystem {
    fn name(&self) -> &str {
        "bookkeeping"
    }

    fn run(&mut self, _ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError> {
        for (_, count) in stand.buckets_mut() {
            if *count < 0.0 || !count.is_finite() {
                *count = 0.0;
            }
        }
        stand.close_year();
        Ok(())
    }
}

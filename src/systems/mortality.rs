use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    error::ProjectionError,
    stand::Stand,
};

pub struct MortalitySystem;

impl MortalitySystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MortalitySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for MortalitySystem {
    fn name(&self) -> &str {
        "mortality"
    }

    fn run(&mut self, ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError> {
        let mut deaths = 0.0;
        for (height, count) in stand.buckets_mut() {
            let rate = ctx.params.mortality.lookup(height).clamp(0.0, 1.0);
            let lost = (*count * rate).min(*count);
            *count -= lost;
            deaths += lost;
        }
        trace!(year = ctx.year, deaths, "mortality applied");
        stand.ledger.deaths += deaths;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bracket, ProjectionParameters, Schedule};

    #[test]
    fn bracketed_mortality_hits_only_its_heights() {
        let params = ProjectionParameters::new(1).with_mortality(Schedule::bracketed(
            0.0,
            vec![Bracket::new(0.0, Some(2.0), 0.5)],
        ));
        let ctx = SystemContext {
            year: 1,
            params: &params,
            scenario_name: "test",
        };
        let mut stand = Stand::from_buckets([(1.0, 100.0), (6.0, 100.0)]);
        MortalitySystem::new().run(&ctx, &mut stand).unwrap();

        assert_eq!(stand.count_at(1.0), 50.0);
        assert_eq!(stand.count_at(6.0), 100.0);
        assert_eq!(stand.ledger.deaths, 50.0);
    }
}

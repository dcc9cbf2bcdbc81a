use tracing::trace;

use crate::{
    engine::{System, SystemContext},
    error::ProjectionError,
    stand::Stand,
};

/// Removes the scheduled number of trees from each height bucket.
///
/// Sales never exceed the stock on hand. A sales bracket with no stock at
/// all still leaves an empty bucket at its lower bound for reporting.
pub struct SalesSystem;

impl SalesSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SalesSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SalesSystem {
    fn name(&self) -> &str {
        "sales"
    }

    fn run(&mut self, ctx: &SystemContext, stand: &mut Stand) -> Result<(), ProjectionError> {
        let sales = &ctx.params.sales;
        let mut sold = 0.0;
        for (height, count) in stand.buckets_mut() {
            let wanted = sales.lookup(height).max(0.0);
            let removed = wanted.min(*count);
            *count -= removed;
            sold += removed;
        }

        for bracket in sales.targets() {
            let stocked = stand
                .buckets()
                .any(|bucket| bracket.contains(bucket.height));
            if !stocked {
                stand.touch(bracket.from);
            }
        }

        trace!(year = ctx.year, sold, "sales applied");
        stand.ledger.sold += sold;
        Ok(())
    }
}

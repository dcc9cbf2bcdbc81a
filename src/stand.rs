use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Heights are merged on a 0.01 ft grid; finer differences are float noise.
pub const HEIGHT_RESOLUTION_FT: f64 = 0.01;

/// Tallest height the stand accepts. Keeps [`HeightKey`] well inside `i64`.
pub const MAX_HEIGHT_FT: f64 = 10_000.0;

const STEPS_PER_FOOT: f64 = 1.0 / HEIGHT_RESOLUTION_FT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeightKey(i64);

impl HeightKey {
    pub fn from_feet(height: f64) -> Self {
        HeightKey((height * STEPS_PER_FOOT).round() as i64)
    }

    pub fn feet(self) -> f64 {
        self.0 as f64 / STEPS_PER_FOOT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightBucket {
    pub height: f64,
    pub count: f64,
}

/// Movements recorded for one simulated year.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct YearLedger {
    pub year: u32,
    pub opening: f64,
    pub deaths: f64,
    pub sold: f64,
    pub planted: f64,
    pub closing: f64,
}

impl YearLedger {
    /// Difference between the closing total and what the movements imply.
    pub fn imbalance(&self) -> f64 {
        self.closing - (self.opening - self.deaths - self.sold + self.planted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandSnapshot {
    pub scenario: String,
    pub year: u32,
    pub calendar_year: Option<i32>,
    pub total_trees: f64,
    pub buckets: Vec<HeightBucket>,
    pub ledger: Option<YearLedger>,
}

/// The simulated population: tree counts keyed by height.
///
/// Each bucket carries its exact height; the [`HeightKey`] grid only decides
/// which buckets merge. Explicitly targeted heights are kept even when empty
/// so the year still reports them.
#[derive(Debug, Clone, Default)]
pub struct Stand {
    year: u32,
    buckets: BTreeMap<HeightKey, HeightBucket>,
    pub(crate) ledger: YearLedger,
    history: Vec<YearLedger>,
}

impl Stand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buckets(buckets: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut stand = Self::new();
        for (height, count) in buckets {
            stand.add(height, count);
        }
        stand
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    pub fn add(&mut self, height: f64, count: f64) {
        merge_into(&mut self.buckets, height, count.max(0.0));
    }

    /// Makes sure a bucket exists at `height`, without adding trees.
    pub fn touch(&mut self, height: f64) {
        self.buckets
            .entry(HeightKey::from_feet(height))
            .or_insert(HeightBucket { height, count: 0.0 });
    }

    pub fn count_at(&self, height: f64) -> f64 {
        self.buckets
            .get(&HeightKey::from_feet(height))
            .map_or(0.0, |bucket| bucket.count)
    }

    /// Exact height of the bucket on `height`'s grid cell.
    pub fn height_at(&self, height: f64) -> Option<f64> {
        self.buckets
            .get(&HeightKey::from_feet(height))
            .map(|bucket| bucket.height)
    }

    pub fn total(&self) -> f64 {
        self.buckets.values().map(|bucket| bucket.count).sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn buckets(&self) -> impl Iterator<Item = HeightBucket> + '_ {
        self.buckets.values().copied()
    }

    /// Exact height and mutable count of every bucket.
    pub(crate) fn buckets_mut(&mut self) -> impl Iterator<Item = (f64, &mut f64)> + '_ {
        self.buckets
            .values_mut()
            .map(|bucket| (bucket.height, &mut bucket.count))
    }

    /// Moves every bucket to `f(height)`, merging buckets that land on the
    /// same grid cell.
    pub(crate) fn regrow(&mut self, mut f: impl FnMut(f64) -> f64) {
        let previous = std::mem::take(&mut self.buckets);
        for bucket in previous.into_values() {
            merge_into(&mut self.buckets, f(bucket.height), bucket.count);
        }
    }

    /// Drops empty buckets left over from last year's reporting.
    pub(crate) fn prune_empty(&mut self) {
        self.buckets.retain(|_, bucket| bucket.count > 0.0);
    }

    pub(crate) fn begin_year(&mut self) {
        self.prune_empty();
        self.year += 1;
        self.ledger = YearLedger {
            year: self.year,
            opening: self.total(),
            ..YearLedger::default()
        };
    }

    pub(crate) fn close_year(&mut self) {
        self.ledger.closing = self.total();
        self.history.push(self.ledger);
    }

    pub fn history(&self) -> &[YearLedger] {
        &self.history
    }

    pub fn snapshot(&self, scenario: &str, start_year: Option<i32>) -> StandSnapshot {
        StandSnapshot {
            scenario: scenario.to_string(),
            year: self.year,
            calendar_year: start_year.map(|start| start + self.year as i32),
            total_trees: self.total(),
            buckets: self.buckets().collect(),
            ledger: self.history.last().copied(),
        }
    }
}

/// Adds `count` trees at `height`. Trees joining a non-empty bucket take the
/// count-weighted mean height.
fn merge_into(buckets: &mut BTreeMap<HeightKey, HeightBucket>, height: f64, count: f64) {
    let bucket = buckets
        .entry(HeightKey::from_feet(height))
        .or_insert(HeightBucket { height, count: 0.0 });
    if bucket.count <= 0.0 {
        bucket.height = height;
    } else if count > 0.0 {
        let combined = bucket.count + count;
        bucket.height = (bucket.height * bucket.count + height * count) / combined;
    }
    bucket.count += count;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_merge_on_resolution_grid() {
        let mut stand = Stand::new();
        stand.add(6.0, 10.0);
        stand.add(6.0 + 1e-9, 5.0);
        stand.add(6.5, 1.0);
        assert_eq!(stand.len(), 2);
        assert_eq!(stand.count_at(6.0), 15.0);
    }

    #[test]
    fn regrow_merges_colliding_buckets() {
        let mut stand = Stand::from_buckets([(1.5, 10.0), (2.0, 4.0)]);
        stand.regrow(|height| if height < 2.0 { height + 0.5 } else { height });
        assert_eq!(stand.len(), 1);
        assert_eq!(stand.count_at(2.0), 14.0);
    }

    #[test]
    fn touched_bucket_is_empty_and_pruned_next_year() {
        let mut stand = Stand::from_buckets([(3.0, 2.0)]);
        stand.touch(8.0);
        assert_eq!(stand.len(), 2);
        assert_eq!(stand.count_at(8.0), 0.0);
        stand.begin_year();
        assert_eq!(stand.len(), 1);
        assert_eq!(stand.ledger.opening, 2.0);
    }

    #[test]
    fn regrow_keeps_heights_finer_than_the_grid() {
        let mut stand = Stand::from_buckets([(6.0, 100.0)]);
        for _ in 0..3 {
            stand.regrow(|height| height + 0.004);
        }
        let height = stand.height_at(6.012).unwrap();
        assert!((height - 6.012).abs() < 1e-12, "{height}");
        assert_eq!(stand.count_at(6.01), 100.0);
    }

    #[test]
    fn merged_bucket_takes_weighted_height() {
        let mut stand = Stand::from_buckets([(2.001, 30.0)]);
        stand.add(2.004, 10.0);
        assert_eq!(stand.len(), 1);
        let height = stand.height_at(2.0).unwrap();
        assert!((height - 2.00175).abs() < 1e-12, "{height}");
    }
}

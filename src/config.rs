use serde::{Deserialize, Serialize};

use crate::{error::ProjectionError, stand::MAX_HEIGHT_FT};

/// Height used for new plantings when a scenario does not name one.
pub const DEFAULT_PLANTING_HEIGHT_FT: f64 = 0.0;

/// Half-open height range `[from, to)` carrying one schedule value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    #[serde(default)]
    pub from: f64,
    #[serde(default)]
    pub to: Option<f64>,
    pub value: f64,
}

impl Bracket {
    pub fn new(from: f64, to: Option<f64>, value: f64) -> Self {
        Self { from, to, value }
    }

    pub fn contains(&self, height: f64) -> bool {
        height >= self.from && self.to.map_or(true, |to| height < to)
    }
}

/// A per-year rate that is either uniform or keyed by height bracket.
///
/// Every stage reads schedules through [`Schedule::lookup`], so a scalar and
/// a bracket map behave the same way: a height no bracket covers falls back
/// to the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    Uniform(f64),
    Bracketed {
        #[serde(default)]
        default: f64,
        brackets: Vec<Bracket>,
    },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Uniform(0.0)
    }
}

impl Schedule {
    pub fn uniform(value: f64) -> Self {
        Schedule::Uniform(value)
    }

    pub fn bracketed(default: f64, brackets: Vec<Bracket>) -> Self {
        Schedule::Bracketed { default, brackets }
    }

    pub fn lookup(&self, height: f64) -> f64 {
        match self {
            Schedule::Uniform(value) => *value,
            Schedule::Bracketed { default, brackets } => brackets
                .iter()
                .find(|bracket| bracket.contains(height))
                .map(|bracket| bracket.value)
                .unwrap_or(*default),
        }
    }

    /// Brackets with a positive value. A uniform schedule names no explicit
    /// heights.
    pub fn targets(&self) -> impl Iterator<Item = &Bracket> {
        let brackets: &[Bracket] = match self {
            Schedule::Uniform(_) => &[],
            Schedule::Bracketed { brackets, .. } => brackets,
        };
        brackets.iter().filter(|bracket| bracket.value > 0.0)
    }

    fn validate(&self, field: &str, max: Option<f64>) -> Result<(), ProjectionError> {
        match self {
            Schedule::Uniform(value) => check_rate(field, *value, max),
            Schedule::Bracketed { default, brackets } => {
                check_rate(&format!("{field}.default"), *default, max)?;
                for (index, bracket) in brackets.iter().enumerate() {
                    let bracket_field = format!("{field}.brackets[{index}]");
                    check_height(&format!("{bracket_field}.from"), bracket.from)?;
                    if let Some(to) = bracket.to {
                        check_height(&format!("{bracket_field}.to"), to)?;
                        if to <= bracket.from {
                            return Err(ProjectionError::invalid(
                                format!("{bracket_field}.to"),
                                format!("upper bound {to} must exceed lower bound {}", bracket.from),
                            ));
                        }
                    }
                    check_rate(&format!("{bracket_field}.value"), bracket.value, max)?;
                }

                let mut ordered: Vec<&Bracket> = brackets.iter().collect();
                ordered.sort_by(|a, b| a.from.total_cmp(&b.from));
                for pair in ordered.windows(2) {
                    let upper = pair[0].to.unwrap_or(f64::INFINITY);
                    if upper > pair[1].from {
                        return Err(ProjectionError::invalid(
                            format!("{field}.brackets"),
                            format!(
                                "bracket starting at {} overlaps bracket starting at {}",
                                pair[0].from, pair[1].from
                            ),
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

/// New trees added at a fixed height every simulated year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantingTarget {
    #[serde(default)]
    pub height: f64,
    pub count: u64,
}

impl PlantingTarget {
    pub fn new(height: f64, count: u64) -> Self {
        Self { height, count }
    }
}

/// Policy for one projection run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectionParameters {
    pub horizon_years: u32,
    #[serde(default)]
    pub planting: Vec<PlantingTarget>,
    #[serde(default)]
    pub growth: Schedule,
    #[serde(default)]
    pub mortality: Schedule,
    #[serde(default)]
    pub sales: Schedule,
}

impl ProjectionParameters {
    pub fn new(horizon_years: u32) -> Self {
        Self {
            horizon_years,
            ..Self::default()
        }
    }

    /// Plants `count` trees per year at the default planting height.
    pub fn with_planting(mut self, count: u64) -> Self {
        self.planting = vec![PlantingTarget::new(DEFAULT_PLANTING_HEIGHT_FT, count)];
        self
    }

    pub fn with_planting_targets(mut self, targets: Vec<PlantingTarget>) -> Self {
        self.planting = targets;
        self
    }

    pub fn with_growth(mut self, growth: Schedule) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_mortality(mut self, mortality: Schedule) -> Self {
        self.mortality = mortality;
        self
    }

    pub fn with_sales(mut self, sales: Schedule) -> Self {
        self.sales = sales;
        self
    }

    pub fn planted_per_year(&self) -> u64 {
        self.planting.iter().map(|target| target.count).sum()
    }

    pub fn validate(&self) -> Result<(), ProjectionError> {
        for (index, target) in self.planting.iter().enumerate() {
            check_height(&format!("planting[{index}].height"), target.height)?;
        }
        self.growth.validate("growth", None)?;
        self.mortality.validate("mortality", Some(1.0))?;
        self.sales.validate("sales", None)?;
        Ok(())
    }
}

fn check_rate(field: &str, value: f64, max: Option<f64>) -> Result<(), ProjectionError> {
    if !value.is_finite() {
        return Err(ProjectionError::invalid(field, "value must be finite"));
    }
    if value < 0.0 {
        return Err(ProjectionError::invalid(
            field,
            format!("value {value} must not be negative"),
        ));
    }
    if let Some(max) = max {
        if value > max {
            return Err(ProjectionError::invalid(
                field,
                format!("value {value} must not exceed {max}"),
            ));
        }
    }
    Ok(())
}

fn check_height(field: &str, value: f64) -> Result<(), ProjectionError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ProjectionError::invalid(
            field,
            format!("height {value} must be a finite, non-negative number of feet"),
        ));
    }
    if value > MAX_HEIGHT_FT {
        return Err(ProjectionError::invalid(
            field,
            format!("height {value} exceeds {MAX_HEIGHT_FT} ft"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sapling_growth() -> Schedule {
        Schedule::bracketed(1.0, vec![Bracket::new(0.0, Some(2.0), 0.5)])
    }

    #[test]
    fn lookup_falls_back_to_default_outside_brackets() {
        let growth = sapling_growth();
        assert_eq!(growth.lookup(0.0), 0.5);
        assert_eq!(growth.lookup(1.99), 0.5);
        assert_eq!(growth.lookup(2.0), 1.0);
        assert_eq!(growth.lookup(30.0), 1.0);
        assert_eq!(Schedule::uniform(0.05).lookup(12.0), 0.05);
    }

    #[test]
    fn missing_schedule_fails_closed_to_zero() {
        let params = ProjectionParameters::new(3);
        assert_eq!(params.mortality.lookup(4.0), 0.0);
        assert_eq!(params.sales.lookup(4.0), 0.0);
    }

    #[test]
    fn uniform_schedule_has_no_explicit_targets() {
        assert_eq!(Schedule::uniform(25.0).targets().count(), 0);
        let sales = Schedule::bracketed(
            0.0,
            vec![
                Bracket::new(6.0, Some(7.0), 40.0),
                Bracket::new(7.0, Some(8.0), 0.0),
            ],
        );
        let targets: Vec<f64> = sales.targets().map(|b| b.from).collect();
        assert_eq!(targets, vec![6.0]);
    }

    #[rstest]
    #[case::negative_mortality(ProjectionParameters::new(1).with_mortality(Schedule::uniform(-0.1)), "mortality")]
    #[case::mortality_above_one(ProjectionParameters::new(1).with_mortality(Schedule::uniform(1.5)), "mortality")]
    #[case::negative_growth(ProjectionParameters::new(1).with_growth(Schedule::uniform(-1.0)), "growth")]
    #[case::nan_sales(ProjectionParameters::new(1).with_sales(Schedule::uniform(f64::NAN)), "sales")]
    #[case::bracket_default(
        ProjectionParameters::new(1).with_mortality(Schedule::bracketed(2.0, vec![])),
        "mortality.default"
    )]
    #[case::bracket_value(
        ProjectionParameters::new(1).with_growth(Schedule::bracketed(1.0, vec![Bracket::new(0.0, Some(2.0), -0.5)])),
        "growth.brackets[0].value"
    )]
    #[case::inverted_bracket(
        ProjectionParameters::new(1).with_sales(Schedule::bracketed(0.0, vec![Bracket::new(5.0, Some(4.0), 1.0)])),
        "sales.brackets[0].to"
    )]
    #[case::overlapping_brackets(
        ProjectionParameters::new(1).with_sales(Schedule::bracketed(
            0.0,
            vec![Bracket::new(4.0, Some(8.0), 1.0), Bracket::new(6.0, None, 2.0)],
        )),
        "sales.brackets"
    )]
    #[case::negative_planting_height(
        ProjectionParameters::new(1).with_planting_targets(vec![PlantingTarget::new(-1.0, 10)]),
        "planting[0].height"
    )]
    #[case::planting_above_height_limit(
        ProjectionParameters::new(1).with_planting_targets(vec![PlantingTarget::new(1e300, 10)]),
        "planting[0].height"
    )]
    fn invalid_parameters_name_the_field(
        #[case] params: ProjectionParameters,
        #[case] field: &str,
    ) {
        let err = params.validate().unwrap_err();
        assert_eq!(err.field(), Some(field), "unexpected error {err}");
    }

    #[test]
    fn bracket_yaml_accepts_scalar_and_map_forms() {
        let scalar: Schedule = serde_yaml::from_str("0.05").unwrap();
        assert_eq!(scalar, Schedule::uniform(0.05));

        let map: Schedule = serde_yaml::from_str(
            "default: 1.0\nbrackets:\n  - to: 2.0\n    value: 0.5\n",
        )
        .unwrap();
        assert_eq!(map, sapling_growth());
    }
}

use rstest::rstest;
use sprucepoint::{
    config::Bracket,
    engine::{project, Engine, EngineSettings},
    ProjectionError, ProjectionParameters, Schedule, TreeRecord,
};

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

fn six_foot_stand() -> Vec<TreeRecord> {
    vec![TreeRecord::new(6.0, 100)]
}

#[test]
fn zero_horizon_returns_initial_stock() {
    let records = vec![TreeRecord::new(2.0, 30), TreeRecord::new(4.5, 12)];
    let params = ProjectionParameters::new(0)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(0.5))
        .with_planting(100);

    let projection = project(&records, &params).unwrap();

    assert_eq!(projection.rows.len(), 2);
    assert_eq!(projection.count_at(2.0, 0), Some(30.0));
    assert_eq!(projection.count_at(4.5, 0), Some(12.0));
    assert!(projection.ledger.is_empty());
}

#[test]
fn one_year_of_growth_mortality_and_planting() {
    let params = ProjectionParameters::new(1)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(0.05))
        .with_planting(10);

    let projection = project(&six_foot_stand(), &params).unwrap();

    assert_eq!(projection.count_at(6.0, 0), Some(100.0));
    assert_close(projection.count_at(7.0, 1).unwrap(), 95.0);
    assert_close(projection.count_at(0.0, 1).unwrap(), 10.0);
    assert_eq!(projection.count_at(6.0, 1), None);
}

#[test]
fn sales_never_drive_counts_negative() {
    let params = ProjectionParameters::new(1)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(0.05))
        .with_planting(10)
        .with_sales(Schedule::uniform(200.0));

    let projection = project(&six_foot_stand(), &params).unwrap();

    assert_eq!(projection.count_at(7.0, 1), Some(0.0));
    assert_close(projection.count_at(0.0, 1).unwrap(), 10.0);
    assert_close(projection.ledger[0].sold, 95.0);
}

#[rstest]
#[case(0.1, 5)]
#[case(0.05, 10)]
#[case(0.0, 3)]
fn mortality_compounds_yearly(#[case] mortality: f64, #[case] years: u32) {
    let params = ProjectionParameters::new(years)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(mortality));

    let projection = project(&[TreeRecord::new(2.0, 1000)], &params).unwrap();

    let expected = 1000.0 * (1.0 - mortality).powi(years as i32);
    assert_close(
        projection.count_at(2.0 + f64::from(years), years).unwrap(),
        expected,
    );
}

#[test]
fn trees_are_conserved_without_mortality_or_sales() {
    let records = vec![
        TreeRecord::new(0.0, 10),
        TreeRecord::new(1.5, 40),
        TreeRecord::new(9.0, 7),
    ];
    let params = ProjectionParameters::new(6)
        .with_growth(Schedule::uniform(0.5))
        .with_planting(25);

    let projection = project(&records, &params).unwrap();

    for year in 0..=6 {
        assert_close(
            projection.total_for_year(year),
            57.0 + 25.0 * f64::from(year),
        );
    }
}

#[test]
fn heights_advance_by_the_growth_schedule() {
    let growth = Schedule::bracketed(1.0, vec![Bracket::new(0.0, Some(2.0), 0.5)]);
    let params = ProjectionParameters::new(4).with_growth(growth.clone());
    let projection = project(
        &[TreeRecord::new(0.5, 5), TreeRecord::new(3.0, 8)],
        &params,
    )
    .unwrap();

    for year in 0..4 {
        let mut now: Vec<f64> = projection.rows_for_year(year).map(|row| row.height).collect();
        let mut next: Vec<f64> = projection
            .rows_for_year(year + 1)
            .map(|row| row.height)
            .collect();
        now.sort_by(f64::total_cmp);
        next.sort_by(f64::total_cmp);
        assert_eq!(now.len(), next.len());
        for (before, after) in now.iter().zip(&next) {
            assert!(
                (after - (before + growth.lookup(*before))).abs() < 1e-9,
                "{before} grew to {after} in year {}",
                year + 1
            );
        }
    }
    assert_eq!(projection.count_at(3.0, 4), Some(5.0));
    assert_eq!(projection.count_at(7.0, 4), Some(8.0));
}

#[test]
fn projections_are_deterministic() {
    let records = vec![TreeRecord::new(1.0, 500), TreeRecord::new(7.25, 33)];
    let params = ProjectionParameters::new(8)
        .with_growth(Schedule::uniform(0.75))
        .with_mortality(Schedule::uniform(0.07))
        .with_sales(Schedule::uniform(3.0))
        .with_planting(120);

    let first = project(&records, &params).unwrap();
    let second = project(&records, &params).unwrap();
    assert_eq!(first, second);
}

#[test]
fn ledger_balances_every_year() {
    let records = vec![TreeRecord::new(0.0, 300), TreeRecord::new(6.0, 90)];
    let params = ProjectionParameters::new(10)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(0.04))
        .with_sales(Schedule::uniform(15.0))
        .with_planting(50);

    let projection = project(&records, &params).unwrap();

    assert_eq!(projection.ledger.len(), 10);
    for (index, ledger) in projection.ledger.iter().enumerate() {
        assert_eq!(ledger.year as usize, index + 1);
        assert!(ledger.imbalance().abs() < 1e-6, "{ledger:?}");
        assert_close(ledger.closing, projection.total_for_year(ledger.year));
    }
    assert!(projection.rows.iter().all(|row| row.count >= 0.0));
}

#[test]
fn negative_heights_reject_the_batch() {
    let records = vec![TreeRecord::new(3.0, 4), TreeRecord::new(-1.0, 4)];
    let err = project(&records, &ProjectionParameters::new(2)).unwrap_err();
    assert!(matches!(err, ProjectionError::MalformedInput { row: 2, .. }));
}

#[test]
fn mortality_above_one_is_rejected() {
    let mut engine = Engine::standard(EngineSettings::default());
    let params = ProjectionParameters::new(2).with_mortality(Schedule::uniform(1.5));
    let err = engine.project(&six_foot_stand(), &params).unwrap_err();
    assert_eq!(err.field(), Some("mortality"));
}

#[test]
fn empty_stock_projects_only_plantings() {
    let params = ProjectionParameters::new(3)
        .with_growth(Schedule::uniform(1.0))
        .with_mortality(Schedule::uniform(0.1))
        .with_sales(Schedule::uniform(50.0))
        .with_planting(20);

    let projection = project(&[], &params).unwrap();

    assert_eq!(projection.rows_for_year(0).count(), 0);
    assert_eq!(projection.total_for_year(0), 0.0);
    assert_close(projection.count_at(0.0, 1).unwrap(), 20.0);
    assert_eq!(projection.count_at(1.0, 2), Some(0.0));
    assert!(projection.rows.iter().all(|row| row.count >= 0.0));
    assert!(projection
        .ledger
        .iter()
        .all(|ledger| ledger.imbalance().abs() < 1e-6));
}

#[rstest]
#[case::below_grid_resolution(6.0, 0.004, 3)]
#[case::repeating_fraction(0.0, 0.333, 30)]
#[case::eighth_foot(1.0, 0.125, 7)]
fn fractional_growth_accumulates_exactly(
    #[case] start: f64,
    #[case] growth: f64,
    #[case] years: u32,
) {
    let params = ProjectionParameters::new(years).with_growth(Schedule::uniform(growth));
    let projection = project(&[TreeRecord::new(start, 100)], &params).unwrap();

    let mut previous = f64::NEG_INFINITY;
    for year in 0..=years {
        let rows: Vec<_> = projection.rows_for_year(year).collect();
        assert_eq!(rows.len(), 1, "year {year}");
        let expected = start + growth * f64::from(year);
        assert!(
            (rows[0].height - expected).abs() < 1e-9,
            "year {year}: {} vs {expected}",
            rows[0].height
        );
        assert!(rows[0].height > previous, "height did not grow in year {year}");
        assert_eq!(rows[0].count, 100.0);
        previous = rows[0].height;
    }
}

#[test]
fn empty_sales_bracket_reports_a_zero_row() {
    let sales = Schedule::bracketed(0.0, vec![Bracket::new(10.0, Some(12.0), 30.0)]);
    let params = ProjectionParameters::new(2)
        .with_growth(Schedule::uniform(1.0))
        .with_sales(sales);

    let projection = project(&[TreeRecord::new(4.0, 10)], &params).unwrap();

    assert_eq!(projection.count_at(10.0, 0), None);
    assert_eq!(projection.count_at(10.0, 1), Some(0.0));
    assert_eq!(projection.count_at(10.0, 2), Some(0.0));
    assert_eq!(projection.count_at(6.0, 2), Some(10.0));
    assert_eq!(projection.total_for_year(2), 10.0);
    assert_eq!(projection.ledger[1].sold, 0.0);
}

use sprucepoint::{
    engine::Engine,
    export,
    projection::Binning,
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
};
use tempfile::tempdir;

#[test]
fn spruce_point_runs_full_horizon() {
    let loader = ScenarioLoader::new(".");
    let scenario = loader
        .load("scenarios/spruce_point.yaml")
        .expect("scenario should load");
    let projection = scenario.run().expect("projection succeeds");

    assert_eq!(projection.scenario, "spruce_point");
    assert_eq!(projection.horizon_years(), 10);
    assert_eq!(projection.calendar_year(10), Some(2035));
    assert_eq!(projection.total_for_year(0), 33_390.0);
    assert_eq!(projection.count_at(25.0, 0), Some(278.0));
    for year in 0..=10 {
        assert!(projection.rows_for_year(year).count() > 0, "year {year} empty");
    }
    assert!(projection.rows.iter().all(|row| row.count >= 0.0));
    assert!(projection
        .ledger
        .iter()
        .all(|ledger| ledger.imbalance().abs() < 1e-6));
}

#[test]
fn lot_inventory_uses_csv_stock_and_sales_history() {
    let loader = ScenarioLoader::new(".");
    let scenario = loader
        .load("scenarios/lot_inventory.yaml")
        .expect("scenario should load");

    let records = scenario.stock().unwrap();
    assert_eq!(records.len(), 11);
    assert_eq!(records.iter().map(|record| record.count).sum::<u64>(), 228);

    let params = scenario.parameters().unwrap();
    assert_eq!(params.sales.lookup(6.0), 18.0);
    assert_eq!(params.sales.lookup(7.9), 18.0);
    assert_eq!(params.sales.lookup(9.5), 3.0);
    assert_eq!(params.sales.lookup(11.0), 0.0);
    assert_eq!(params.sales.lookup(2.0), 0.0);

    let projection = scenario.run().unwrap();
    assert_eq!(projection.count_at(4.0, 0), Some(40.0));
    assert_eq!(projection.ledger.len(), 5);
}

#[test]
fn snapshots_follow_the_interval() {
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load("scenarios/spruce_point.yaml").unwrap();
    let records = scenario.stock().unwrap();
    let params = scenario.parameters().unwrap();
    let temp = tempdir().expect("tempdir");
    let mut writer = SnapshotWriter::new(temp.path(), scenario.snapshot_interval_years);

    let mut engine = Engine::standard(scenario.engine_settings());
    engine
        .project_with_hook(&records, &params, |snapshot| {
            writer.maybe_write(snapshot).expect("snapshot written");
        })
        .expect("run succeeds");

    let dir = temp.path().join("spruce_point");
    let names: Vec<String> = writer
        .written()
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["year_0000.json", "year_0005.json", "year_0010.json"]);
    assert!(dir.join("year_0005.json").exists());
}

#[test]
fn exports_write_to_nested_paths() {
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load("scenarios/spruce_point.yaml").unwrap();
    let projection = scenario.run().unwrap();
    let temp = tempdir().expect("tempdir");

    let wide = temp.path().join("reports").join("wide.csv");
    export::write_wide_csv(&projection, scenario.binning(), export::create_file(&wide).unwrap())
        .unwrap();
    let text = std::fs::read_to_string(&wide).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("Tree Height (ft),2025,2026"));
    assert!(header.ends_with(",2035"));
    let first = text.lines().nth(1).unwrap();
    assert!(first.starts_with("0,"), "{first}");

    let table = export::render_table(&projection, Binning::Width(5.0)).unwrap();
    assert!(table.lines().last().unwrap().starts_with("     total"));
}

use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use sprucepoint::{
    engine::Engine,
    export,
    inventory::{Inventory, InventoryFilter, Quality},
    logging,
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Spruce Point inventory and growth projection")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario and print or export the projection
    Project(ProjectArgs),
    /// Summarise an inventory CSV
    Inventory(InventoryArgs),
    /// Serve the projection and inventory summaries as JSON
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Wide,
    Json,
}

#[derive(Debug, clap::Args)]
struct ProjectArgs {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/spruce_point.yaml")]
    scenario: PathBuf,

    /// Override the number of years to project
    #[arg(long)]
    horizon: Option<i64>,

    /// Override the calendar year of the starting inventory
    #[arg(long)]
    start_year: Option<i32>,

    /// Group heights into bins of this many feet in the report
    #[arg(long)]
    bin_width: Option<f64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Write output here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Directory for yearly stand snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Override snapshot interval in years
    #[arg(long)]
    snapshot_interval: Option<u32>,
}

#[derive(Debug, clap::Args)]
struct InventoryArgs {
    /// Inventory CSV exported from the spreadsheet
    #[arg(long)]
    csv: PathBuf,

    #[arg(long)]
    min_height: Option<f64>,

    #[arg(long)]
    max_height: Option<f64>,

    /// Grades to include; defaults to A, B and C
    #[arg(long, value_delimiter = ',')]
    quality: Vec<String>,

    #[arg(long)]
    lot: Option<String>,

    /// Write the maintenance work list as CSV
    #[arg(long)]
    maintenance_out: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct ServeArgs {
    #[arg(long, default_value = "scenarios/spruce_point.yaml")]
    scenario: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Project(args) => project(args),
        Command::Inventory(args) => inventory(args),
        Command::Serve(args) => serve(args),
    }
}

fn project(args: ProjectArgs) -> Result<()> {
    let loader = ScenarioLoader::new(".");
    let mut scenario = loader.load(&args.scenario)?;
    if let Some(horizon) = args.horizon {
        scenario.horizon_years = horizon;
    }
    if let Some(start_year) = args.start_year {
        scenario.start_year = Some(start_year);
    }
    if args.bin_width.is_some() {
        scenario.report.bin_width_ft = args.bin_width;
    }

    let records = scenario.stock()?;
    let params = scenario.parameters()?;
    let mut engine = Engine::standard(scenario.engine_settings());

    let snapshot_interval = args
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_years);
    let projection = match args.snapshot_dir {
        Some(dir) => {
            let mut writer = SnapshotWriter::new(dir, snapshot_interval);
            let mut write_error = None;
            let projection = engine.project_with_hook(&records, &params, |snapshot| {
                if write_error.is_none() {
                    if let Err(err) = writer.maybe_write(snapshot) {
                        write_error = Some(err);
                    }
                }
            })?;
            if let Some(err) = write_error {
                return Err(err);
            }
            info!(count = writer.written().len(), "snapshots written");
            projection
        }
        None => engine.project(&records, &params)?,
    };

    let binning = scenario.binning();
    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(export::create_file(path)?),
        None => Box::new(io::stdout().lock()),
    };
    match args.format {
        OutputFormat::Table => out.write_all(export::render_table(&projection, binning)?.as_bytes())?,
        OutputFormat::Csv => export::write_rows_csv(&projection, &mut out)?,
        OutputFormat::Wide => export::write_wide_csv(&projection, binning, &mut out)?,
        OutputFormat::Json => export::write_json(&projection, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn inventory(args: InventoryArgs) -> Result<()> {
    let inventory = Inventory::load_csv(&args.csv)?;
    let mut filter = InventoryFilter {
        min_height: args.min_height,
        max_height: args.max_height,
        lot: args.lot,
        ..InventoryFilter::default()
    };
    if !args.quality.is_empty() {
        filter.qualities = args.quality.iter().map(|q| Quality::from(q.as_str())).collect();
    }
    let filtered = inventory.filter(&filter);
    if filtered.is_empty() {
        println!("No trees match the selected filters.");
        return Ok(());
    }

    println!("Total tree count: {}", filtered.total_count());
    if let Some((low, high)) = filtered.height_span() {
        println!("Heights: {low} to {high} ft");
    }
    println!();
    println!("{:>10} {:>8}", "height_ft", "count");
    for entry in filtered.counts_by_height() {
        println!("{:>10} {:>8}", entry.height, entry.count);
    }
    println!();
    for band in filtered.height_bands() {
        println!("{:>10} {:>8}", band.label, band.count);
    }
    println!();
    let (label, groups) = match &filter.lot {
        Some(_) => ("row", filtered.counts_by_row()),
        None => ("lot", filtered.counts_by_lot()),
    };
    println!("{:>10} {:>8}", label, "count");
    for group in groups {
        println!("{:>10} {:>8}", group.label, group.count);
    }

    if let Some(path) = args.maintenance_out {
        let file = export::create_file(&path)?;
        export::write_maintenance_csv(&filtered.maintenance_table(), file)?;
        println!();
        println!("Maintenance table written to {}", path.display());
    }
    Ok(())
}

fn serve(args: ServeArgs) -> Result<()> {
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&args.scenario)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::run(WebServerConfig {
        scenario,
        host: args.host,
        port: args.port,
    }))
}

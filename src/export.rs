use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};

use crate::{
    inventory::{
        MaintenanceRow, COUNT_COLUMN, HEIGHT_COLUMN, LOT_COLUMN, QUALITY_COLUMN, ROW_COLUMN,
    },
    projection::{Binning, Projection},
};

pub const WORK_COMPLETED_COLUMN: &str = "Work Completed?";

/// Long form: one line per (height, year).
pub fn write_rows_csv(projection: &Projection, writer: impl Write) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["height_ft", "year", "calendar_year", "count"])?;
    for row in &projection.rows {
        let calendar = projection
            .calendar_year(row.year)
            .map(|year| year.to_string())
            .unwrap_or_default();
        csv.write_record([
            format_height(row.height),
            row.year.to_string(),
            calendar,
            format_count(row.count),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Height rows by calendar-year columns, counts rounded to whole trees.
pub fn write_wide_csv(projection: &Projection, binning: Binning, writer: impl Write) -> Result<()> {
    let table = projection.table(binning)?;
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec![HEIGHT_COLUMN.to_string()];
    header.extend(table.column_labels());
    csv.write_record(&header)?;
    for (height, counts) in table.heights.iter().zip(&table.counts) {
        let mut record = vec![format_height(*height)];
        record.extend(counts.iter().map(|count| format!("{}", count.round())));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_json(projection: &Projection, writer: impl Write) -> Result<()> {
    serde_json::to_writer_pretty(writer, projection).context("Failed to serialize projection")?;
    Ok(())
}

/// Printable work list with an empty sign-off column.
pub fn write_maintenance_csv(rows: &[MaintenanceRow], writer: impl Write) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        QUALITY_COLUMN,
        LOT_COLUMN,
        ROW_COLUMN,
        HEIGHT_COLUMN,
        COUNT_COLUMN,
        WORK_COMPLETED_COLUMN,
    ])?;
    for row in rows {
        csv.write_record([
            row.quality.label().to_string(),
            row.lot.clone(),
            row.row.clone(),
            format_height(row.height),
            row.count.to_string(),
            String::new(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Renders the wide table as aligned text for the terminal.
pub fn render_table(projection: &Projection, binning: Binning) -> Result<String> {
    let table = projection.table(binning)?;
    let labels = table.column_labels();
    let mut out = format!("{:>10}", "height_ft");
    for label in &labels {
        out.push_str(&format!(" {:>10}", label));
    }
    out.push('\n');
    for (height, counts) in table.heights.iter().zip(&table.counts) {
        out.push_str(&format!("{:>10}", format_height(*height)));
        for count in counts {
            out.push_str(&format!(" {:>10}", count.round()));
        }
        out.push('\n');
    }
    out.push_str(&format!("{:>10}", "total"));
    for total in table.year_totals() {
        out.push_str(&format!(" {:>10}", total.round()));
    }
    out.push('\n');
    Ok(out)
}

fn format_height(height: f64) -> String {
    let rounded = (height * 100.0).round() / 100.0;
    format!("{rounded}")
}

fn format_count(count: f64) -> String {
    let rounded = (count * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

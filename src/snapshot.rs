use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::stand::StandSnapshot;

#[derive(Serialize)]
struct SnapshotFile<'a> {
    generated_at: String,
    #[serde(flatten)]
    snapshot: &'a StandSnapshot,
}

/// Writes every `interval_years`-th yearly stand snapshot as JSON under
/// `<dir>/<scenario>/year_NNNN.json`. An interval of zero disables output.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval_years: u32,
    written: Vec<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_years: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_years,
            written: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_years > 0
    }

    pub fn maybe_write(&mut self, snapshot: &StandSnapshot) -> Result<Option<PathBuf>> {
        if !self.is_enabled() || snapshot.year % self.interval_years != 0 {
            return Ok(None);
        }

        let dir = self.dir.join(&snapshot.scenario);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("year_{:04}.json", snapshot.year));
        let file = SnapshotFile {
            generated_at: chrono::Local::now().to_rfc3339(),
            snapshot,
        };
        let data = serde_json::to_string_pretty(&file)?;
        fs::write(&path, data)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        debug!(year = snapshot.year, path = %path.display(), "snapshot written");
        self.written.push(path.clone());
        Ok(Some(path))
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stand::Stand;

    #[test]
    fn writes_only_on_interval() {
        let temp = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(temp.path(), 2);
        let stand = Stand::from_buckets([(4.0, 12.0)]);

        let mut snapshot = stand.snapshot("plot", Some(2025));
        assert!(writer.maybe_write(&snapshot).unwrap().is_some());
        snapshot.year = 1;
        assert!(writer.maybe_write(&snapshot).unwrap().is_none());
        snapshot.year = 2;
        let path = writer.maybe_write(&snapshot).unwrap().unwrap();

        assert_eq!(path, temp.path().join("plot").join("year_0002.json"));
        let data = fs::read_to_string(path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(json["scenario"], "plot");
        assert_eq!(json["total_trees"], 12.0);
        assert!(json["generated_at"].is_string());
        assert_eq!(writer.written().len(), 2);
    }

    #[test]
    fn zero_interval_disables_output() {
        let temp = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(temp.path(), 0);
        let snapshot = Stand::new().snapshot("plot", None);
        assert!(writer.maybe_write(&snapshot).unwrap().is_none());
        assert!(!temp.path().join("plot").exists());
    }
}

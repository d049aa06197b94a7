//! Local CSV file backend.
//!
//! The whole file is loaded on open. Every mutation rewrites it through a
//! sibling temp file and a rename, so an interrupted run leaves either the
//! old or the new contents on disk, never a torn file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use orgscan_shared::{OrgScanError, Result, Row};

use crate::grid::Grid;
use crate::{ColumnLayout, SheetStore};

/// A CSV file with a header row.
#[derive(Debug)]
pub struct CsvSheet {
    path: PathBuf,
    grid: Mutex<Grid>,
}

impl CsvSheet {
    /// Load a CSV file. Ragged rows are accepted.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| csv_error(&path, e))?;

        let mut cells = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&path, e))?;
            cells.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        debug!(path = %path.display(), rows = cells.len(), "loaded CSV sheet");

        Ok(Self {
            path,
            grid: Mutex::new(Grid::new(cells)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Grid>> {
        self.grid
            .lock()
            .map_err(|_| OrgScanError::Sheet("CSV sheet lock poisoned".into()))
    }

    fn persist(&self, grid: &Grid) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .map_err(|e| csv_error(&tmp, e))?;
            for row in grid.cells() {
                writer.write_record(row).map_err(|e| csv_error(&tmp, e))?;
            }
            writer
                .flush()
                .map_err(|e| OrgScanError::Sheet(format!("{}: {e}", tmp.display())))?;
        }
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| OrgScanError::Sheet(format!("{}: {e}", self.path.display())))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> OrgScanError {
    OrgScanError::Sheet(format!("{}: {e}", path.display()))
}

#[async_trait]
impl SheetStore for CsvSheet {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn ensure_columns(&self, columns: &[&str]) -> Result<()> {
        let mut grid = self.lock()?;
        let mut added = false;
        for column in columns {
            if grid.ensure_column(column) {
                info!(column, "added column");
                added = true;
            }
        }
        if added {
            self.persist(&grid)?;
        }
        Ok(())
    }

    async fn read_rows(&self, layout: &ColumnLayout) -> Result<Vec<Row>> {
        self.lock()?.rows(layout)
    }

    async fn write_result(
        &self,
        row: usize,
        layout: &ColumnLayout,
        verdict: bool,
        evidence: Option<&str>,
    ) -> Result<()> {
        let mut grid = self.lock()?;
        grid.write_result(row, layout, verdict, evidence)?;
        self.persist(&grid)
    }
}

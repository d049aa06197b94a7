//! In-memory sheet.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use orgscan_shared::{OrgScanError, Result, Row};

use crate::grid::Grid;
use crate::{ColumnLayout, SheetStore};

/// A sheet held in memory. Tests use it to observe exactly what a run wrote.
#[derive(Debug, Default)]
pub struct MemorySheet {
    grid: Mutex<Grid>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySheet {
    /// Build from a header and data rows.
    pub fn new(header: &[&str], rows: &[&[&str]]) -> Self {
        let mut cells = vec![header.iter().map(|h| (*h).to_string()).collect::<Vec<_>>()];
        cells.extend(
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).to_string()).collect::<Vec<_>>()),
        );
        Self::from_grid(Grid::new(cells))
    }

    pub fn from_grid(grid: Grid) -> Self {
        Self {
            grid: Mutex::new(grid),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail with a sheet error.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Number of successful `write_result` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the current cells.
    pub fn snapshot(&self) -> Grid {
        self.grid.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Cell by 1-based row number and header name.
    pub fn cell(&self, row_number: usize, column: &str) -> Option<String> {
        let grid = self.grid.lock().ok()?;
        let col = grid.column_index(column)?;
        Some(grid.get(row_number.checked_sub(1)?, col).to_string())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Grid>> {
        self.grid
            .lock()
            .map_err(|_| OrgScanError::Sheet("memory sheet lock poisoned".into()))
    }
}

#[async_trait]
impl SheetStore for MemorySheet {
    fn describe(&self) -> String {
        "memory".into()
    }

    async fn ensure_columns(&self, columns: &[&str]) -> Result<()> {
        let mut grid = self.lock()?;
        for column in columns {
            grid.ensure_column(column);
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
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(OrgScanError::Sheet(format!("write to row {row} rejected")));
        }
        self.lock()?.write_result(row, layout, verdict, evidence)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

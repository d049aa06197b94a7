//! Spreadsheet backends for orgscan.
//!
//! This crate provides:
//! - [`SheetStore`]: read rows, create result columns, write one row's result
//! - [`CsvSheet`]: local CSV file, rewritten atomically on every write
//! - [`GoogleSheet`]: Google Sheets values API with a bearer token
//! - [`MemorySheet`]: in-memory table for tests and dry runs

mod csv_file;
mod google;
mod grid;
mod memory;

use async_trait::async_trait;
use orgscan_shared::{Result, Row, TopicProfile};

pub use csv_file::CsvSheet;
pub use google::{GoogleSheet, GoogleSheetOptions};
pub use grid::{Grid, column_letter};
pub use memory::MemorySheet;

/// Which header names a run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Column holding organization names.
    pub name_column: String,
    /// Column receiving the verdict.
    pub verdict_column: String,
    /// Column receiving the evidence URL.
    pub evidence_column: String,
}

impl ColumnLayout {
    /// Layout for a topic, reading names from `name_column`.
    pub fn for_topic(name_column: impl Into<String>, topic: &TopicProfile) -> Self {
        Self {
            name_column: name_column.into(),
            verdict_column: topic.verdict_column.clone(),
            evidence_column: topic.evidence_column.clone(),
        }
    }

    /// The two columns a run writes to.
    pub fn result_columns(&self) -> [&str; 2] {
        [self.verdict_column.as_str(), self.evidence_column.as_str()]
    }
}

/// A table of organizations that results are written back into.
///
/// Rows are addressed by 1-based sheet row number; row 1 is the header.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Human-readable description for logs (file path, spreadsheet id).
    fn describe(&self) -> String;

    /// Append any of `columns` missing from the header row.
    async fn ensure_columns(&self, columns: &[&str]) -> Result<()>;

    /// Read every data row that has a non-blank name, in table order.
    async fn read_rows(&self, layout: &ColumnLayout) -> Result<Vec<Row>>;

    /// Commit one row's verdict and evidence (empty when `None`).
    async fn write_result(
        &self,
        row: usize,
        layout: &ColumnLayout,
        verdict: bool,
        evidence: Option<&str>,
    ) -> Result<()>;
}

//! Plain row-major cell grid shared by the file and memory backends.

use orgscan_shared::{OrgScanError, Result, Row, VerdictCell};

use crate::ColumnLayout;

/// Convert a 1-based column index to A1 letters (1 → `A`, 27 → `AA`).
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index;
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Row-major cells; `cells[0]` is the header row. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(cells: Vec<Vec<String>>) -> Self {
        Self { cells }
    }

    pub fn cells(&self) -> &[Vec<String>] {
        &self.cells
    }

    pub fn header(&self) -> &[String] {
        self.cells.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// 0-based index of a header, exact match after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header().iter().position(|h| h.trim() == name)
    }

    /// Give `name` a header cell if absent. Returns `true` when it was added.
    ///
    /// A blank header cell is reused only when no data row has a value in
    /// that column; otherwise the column goes after the widest row.
    pub fn ensure_column(&mut self, name: &str) -> bool {
        if self.column_index(name).is_some() {
            return false;
        }
        if self.cells.is_empty() {
            self.cells.push(Vec::new());
        }

        let width = self.cells.iter().map(Vec::len).max().unwrap_or(0);
        let col = (0..width)
            .find(|&c| (0..self.cells.len()).all(|r| self.get(r, c).trim().is_empty()))
            .unwrap_or(width);

        let header = &mut self.cells[0];
        if header.len() <= col {
            header.resize(col + 1, String::new());
        }
        header[col] = name.to_string();
        true
    }

    /// Cell value at 0-based coordinates; missing cells read as empty.
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Set a cell by 1-based sheet row number. The header row cannot be written.
    pub fn set(&mut self, row_number: usize, col: usize, value: &str) -> Result<()> {
        if row_number < 2 || row_number > self.cells.len() {
            return Err(OrgScanError::Sheet(format!(
                "row {row_number} is not a data row (sheet has {} rows)",
                self.cells.len()
            )));
        }
        let row = &mut self.cells[row_number - 1];
        if row.len() <= col {
            row.resize(col + 1, String::new());
        }
        row[col] = value.to_string();
        Ok(())
    }

    /// Data rows with a non-blank name, in table order.
    pub fn rows(&self, layout: &ColumnLayout) -> Result<Vec<Row>> {
        let name_col = self.column_index(&layout.name_column).ok_or_else(|| {
            OrgScanError::validation(format!(
                "'{}' column not found in header row",
                layout.name_column
            ))
        })?;
        let verdict_col = self.column_index(&layout.verdict_column);
        let evidence_col = self.column_index(&layout.evidence_column);

        let rows = self
            .cells
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, _)| {
                let name = self.get(i, name_col).trim();
                if name.is_empty() {
                    return None;
                }
                let verdict = verdict_col
                    .map(|c| VerdictCell::parse(self.get(i, c)))
                    .unwrap_or_default();
                let evidence = evidence_col
                    .map(|c| self.get(i, c).trim())
                    .filter(|e| !e.is_empty())
                    .map(str::to_string);
                Some(Row {
                    number: i + 1,
                    name: name.to_string(),
                    verdict,
                    evidence,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Write a verdict/evidence pair, resolving the columns by header name.
    pub fn write_result(
        &mut self,
        row_number: usize,
        layout: &ColumnLayout,
        verdict: bool,
        evidence: Option<&str>,
    ) -> Result<()> {
        let verdict_col = self.required_column(&layout.verdict_column)?;
        let evidence_col = self.required_column(&layout.evidence_column)?;
        self.set(
            row_number,
            verdict_col,
            orgscan_shared::verdict_cell_value(verdict),
        )?;
        self.set(row_number, evidence_col, evidence.unwrap_or(""))
    }

    fn required_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| OrgScanError::Sheet(format!("column '{name}' does not exist")))
    }
}

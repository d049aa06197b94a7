//! Google Sheets backend (Sheets API v4, values endpoints).
//!
//! Authentication is a caller-supplied OAuth access token; obtaining and
//! refreshing it happens outside this crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use orgscan_shared::{OrgScanError, Result, Row};

use crate::grid::{Grid, column_letter};
use crate::{ColumnLayout, SheetStore};

/// User-Agent string for Sheets API requests.
const USER_AGENT: &str = concat!("orgscan/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`GoogleSheet`].
#[derive(Debug, Clone)]
pub struct GoogleSheetOptions {
    /// API base, e.g. `https://sheets.googleapis.com/v4/spreadsheets`.
    pub endpoint: String,
    pub spreadsheet_id: String,
    /// Worksheet (tab) title.
    pub sheet_name: String,
    /// OAuth bearer token.
    pub access_token: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: Option<GridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    column_count: usize,
}

/// One worksheet of a Google spreadsheet.
pub struct GoogleSheet {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
    /// Header name → 0-based column index, learned from the header row.
    columns: Mutex<HashMap<String, usize>>,
}

impl GoogleSheet {
    pub fn new(options: GoogleSheetOptions) -> Result<Self> {
        let base = Url::parse(&options.endpoint).map_err(|e| {
            OrgScanError::config(format!("invalid sheets endpoint '{}': {e}", options.endpoint))
        })?;
        if options.spreadsheet_id.trim().is_empty() {
            return Err(OrgScanError::config("spreadsheet id is empty"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| OrgScanError::Sheet(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            spreadsheet_id: options.spreadsheet_id,
            sheet_name: options.sheet_name,
            access_token: options.access_token,
            columns: Mutex::new(HashMap::new()),
        })
    }

    /// `'Sheet Name'!A1` style range for this worksheet.
    fn range(&self, cells: &str) -> String {
        let quoted = format!("'{}'", self.sheet_name.replace('\'', "''"));
        if cells.is_empty() {
            quoted
        } else {
            format!("{quoted}!{cells}")
        }
    }

    /// Build `{base}/{spreadsheet_id}{suffix}/{segments...}`.
    fn url(&self, suffix: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| OrgScanError::config("sheets endpoint cannot be a base URL"))?;
            path.pop_if_empty();
            path.push(&format!("{}{suffix}", self.spreadsheet_id));
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn call(&self, method: Method, url: Url, body: Option<Value>) -> Result<Value> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrgScanError::Sheet(format!("Sheets API request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OrgScanError::Sheet(format!("Sheets API body read failed: {e}")))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OrgScanError::Sheet(format!(
                "Sheets API rejected the access token (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(OrgScanError::Sheet(format!(
                "Sheets API HTTP {}: {}",
                status.as_u16(),
                text.chars().take(300).collect::<String>()
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| OrgScanError::Sheet(format!("malformed Sheets API payload: {e}")))
    }

    async fn fetch_grid(&self, cells: &str) -> Result<Grid> {
        let url = self.url("", &["values", &self.range(cells)])?;
        let value = self.call(Method::GET, url, None).await?;
        let range: ValueRange = serde_json::from_value(value)
            .map_err(|e| OrgScanError::Sheet(format!("unexpected values payload: {e}")))?;

        let cells = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        Ok(Grid::new(cells))
    }

    async fn sheet_properties(&self) -> Result<SheetProperties> {
        let mut url = self.url("", &[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties");
        let value = self.call(Method::GET, url, None).await?;
        let meta: SpreadsheetMeta = serde_json::from_value(value)
            .map_err(|e| OrgScanError::Sheet(format!("unexpected spreadsheet payload: {e}")))?;

        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == self.sheet_name)
            .ok_or_else(|| {
                OrgScanError::Sheet(format!("worksheet '{}' not found", self.sheet_name))
            })
    }

    fn remember_columns(&self, grid: &Grid) {
        if let Ok(mut columns) = self.columns.lock() {
            columns.clear();
            for (i, name) in grid.header().iter().enumerate() {
                let name = name.trim();
                if !name.is_empty() {
                    columns.entry(name.to_string()).or_insert(i);
                }
            }
        }
    }

    fn cached_column(&self, name: &str) -> Option<usize> {
        self.columns.lock().ok()?.get(name).copied()
    }

    /// Column letters for the verdict and evidence columns. The header row is
    /// fetched only when a column has not been seen yet.
    async fn result_letters(&self, layout: &ColumnLayout) -> Result<(String, String)> {
        let names = [&layout.verdict_column, &layout.evidence_column];
        if names.iter().any(|n| self.cached_column(n).is_none()) {
            let header = self.fetch_grid("1:1").await?;
            self.remember_columns(&header);
        }
        let letter = |name: &str| {
            self.cached_column(name)
                .map(|i| column_letter(i + 1))
                .ok_or_else(|| OrgScanError::Sheet(format!("column '{name}' does not exist")))
        };
        Ok((
            letter(layout.verdict_column.as_str())?,
            letter(layout.evidence_column.as_str())?,
        ))
    }

    async fn update_cells(&self, data: Vec<(String, String)>) -> Result<()> {
        let url = self.url("", &["values:batchUpdate"])?;
        let data: Vec<Value> = data
            .into_iter()
            .map(|(range, value)| json!({ "range": range, "values": [[value]] }))
            .collect();
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });
        self.call(Method::POST, url, Some(body)).await?;
        Ok(())
    }
}

/// Render a JSON cell value the way the sheet displays it.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Bool(b) => orgscan_shared::verdict_cell_value(b).to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetStore for GoogleSheet {
    fn describe(&self) -> String {
        format!("google:{}/{}", self.spreadsheet_id, self.sheet_name)
    }

    #[instrument(skip_all, fields(sheet = %self.sheet_name))]
    async fn ensure_columns(&self, columns: &[&str]) -> Result<()> {
        // The whole grid, so data under unlabeled columns is never claimed.
        let mut grid = self.fetch_grid("").await?;

        let mut added = Vec::new();
        for column in columns {
            if grid.ensure_column(column) {
                added.push(*column);
            }
        }
        self.remember_columns(&grid);
        if added.is_empty() {
            return Ok(());
        }

        let positions: Vec<(usize, &str)> = added
            .iter()
            .filter_map(|name| grid.column_index(name).map(|i| (i, *name)))
            .collect();
        let needed = positions.iter().map(|(i, _)| i + 1).max().unwrap_or(0);

        let props = self.sheet_properties().await?;
        let have = props.grid_properties.map(|g| g.column_count).unwrap_or(0);
        if needed > have {
            let url = self.url(":batchUpdate", &[])?;
            let body = json!({
                "requests": [{
                    "appendDimension": {
                        "sheetId": props.sheet_id,
                        "dimension": "COLUMNS",
                        "length": needed - have,
                    }
                }]
            });
            self.call(Method::POST, url, Some(body)).await?;
            debug!(added = needed - have, "expanded sheet grid");
        }

        let updates = positions
            .iter()
            .map(|(i, name)| {
                (
                    self.range(&format!("{}1", column_letter(i + 1))),
                    (*name).to_string(),
                )
            })
            .collect();
        self.update_cells(updates).await?;

        info!(?added, "added columns");
        Ok(())
    }

    async fn read_rows(&self, layout: &ColumnLayout) -> Result<Vec<Row>> {
        let grid = self.fetch_grid("").await?;
        self.remember_columns(&grid);
        grid.rows(layout)
    }

    async fn write_result(
        &self,
        row: usize,
        layout: &ColumnLayout,
        verdict: bool,
        evidence: Option<&str>,
    ) -> Result<()> {
        if row < 2 {
            return Err(OrgScanError::Sheet(format!("row {row} is not a data row")));
        }
        let (verdict_col, evidence_col) = self.result_letters(layout).await?;

        self.update_cells(vec![
            (
                self.range(&format!("{verdict_col}{row}")),
                orgscan_shared::verdict_cell_value(verdict).to_string(),
            ),
            (
                self.range(&format!("{evidence_col}{row}")),
                evidence.unwrap_or("").to_string(),
            ),
        ])
        .await
    }
}

//! Google Sheets v4 backend (values API) over a pre-authorised bearer token.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use attendsync_core::StoreConfig;

use crate::error::StoreError;
use crate::store::{RecordStore, Row, StoreInfo, COLUMNS};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SheetsStore {
    agent: ureq::Agent,
    api_base: String,
    spreadsheet_id: String,
    sheet_name: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    #[serde(default)]
    spreadsheet_id: String,
    #[serde(default)]
    properties: SheetProperties,
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Default, Deserialize)]
struct SheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    #[serde(default)]
    properties: SheetProperties,
}

impl SheetsStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            token: config.access_token.clone(),
        }
    }

    fn spreadsheet_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}",
            self.api_base,
            urlencoding::encode(&self.spreadsheet_id)
        )
    }

    /// `…/values/<sheet>!<cells><suffix>`. Only the sheet name is encoded;
    /// `!` and `:` in the A1 cells are valid path characters.
    fn values_url(&self, cells: &str, suffix: &str) -> String {
        format!(
            "{}/values/{}!{cells}{suffix}",
            self.spreadsheet_url(),
            urlencoding::encode(&quote_sheet_name(&self.sheet_name))
        )
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/json")
    }

    fn get_values(&self, cells: &str, columns: bool) -> Result<ValueRange, StoreError> {
        let mut request = self.authorize(self.agent.get(&self.values_url(cells, "")));
        if columns {
            request = request.query("majorDimension", "COLUMNS");
        }
        let response = request.call().map_err(store_error)?;
        decode(response)
    }
}

impl RecordStore for SheetsStore {
    fn read_keys(&self) -> Result<Vec<String>, StoreError> {
        let range = self.get_values("A2:A", true)?;
        Ok(range
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(cell_text)
            .filter(|key| !key.is_empty())
            .collect())
    }

    fn append_rows(&self, rows: &[Row]) -> Result<usize, StoreError> {
        let last_column = column_letter(COLUMNS.len());
        let url = self.values_url(&format!("A:{last_column}"), ":append");
        let response = self
            .authorize(self.agent.post(&url))
            .query("valueInputOption", "RAW")
            .query("insertDataOption", "INSERT_ROWS")
            .send_json(json!({ "majorDimension": "ROWS", "values": rows }))
            .map_err(store_error)?;
        let body: AppendResponse = decode(response)?;
        let written = body
            .updates
            .and_then(|u| u.updated_rows)
            .unwrap_or(rows.len());
        tracing::info!("appended {written} row(s) to sheet '{}'", self.sheet_name);
        Ok(written)
    }

    fn read_header(&self) -> Result<Option<Row>, StoreError> {
        let last_column = column_letter(COLUMNS.len());
        let range = self.get_values(&format!("A1:{last_column}1"), false)?;
        Ok(range
            .values
            .into_iter()
            .next()
            .map(|row| row.iter().map(cell_text).collect()))
    }

    fn write_header(&self, header: &[&str]) -> Result<(), StoreError> {
        let last_column = column_letter(header.len().max(1));
        let url = self.values_url(&format!("A1:{last_column}1"), "");
        self.authorize(self.agent.put(&url))
            .query("valueInputOption", "RAW")
            .send_json(json!({ "majorDimension": "ROWS", "values": [header] }))
            .map_err(store_error)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let last_column = column_letter(COLUMNS.len());
        let url = self.values_url(&format!("A2:{last_column}"), ":clear");
        self.authorize(self.agent.post(&url))
            .send_json(json!({}))
            .map_err(store_error)?;
        tracing::warn!("cleared all data rows in sheet '{}'", self.sheet_name);
        Ok(())
    }

    fn describe(&self) -> Result<StoreInfo, StoreError> {
        let response = self
            .authorize(self.agent.get(&self.spreadsheet_url()))
            .query(
                "fields",
                "spreadsheetId,properties.title,sheets.properties.title",
            )
            .call()
            .map_err(store_error)?;
        let sheet: Spreadsheet = decode(response)?;
        Ok(StoreInfo {
            backend: "sheets".to_string(),
            id: sheet.spreadsheet_id,
            title: sheet.properties.title,
            sheets: sheet
                .sheets
                .into_iter()
                .map(|s| s.properties.title)
                .collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, StoreError> {
    response
        .into_json()
        .map_err(|e| StoreError::Decode(e.to_string()))
}

fn store_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(body);
            StoreError::Http { status, message }
        }
        ureq::Error::Transport(transport) => StoreError::Transport(transport.to_string()),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 1 → A, 13 → M, 27 → AA.
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A1 notation needs quotes around names that are not plain identifiers.
fn quote_sheet_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

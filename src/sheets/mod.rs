//! Google Sheets v4 gateway authenticated with a service-account key.

pub mod auth;
pub mod credentials;
pub mod types;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::table::{Table, TableError};
use auth::TokenProvider;
use credentials::ServiceAccountKey;
use types::{CreateSpreadsheet, ErrorBody, Spreadsheet, SpreadsheetProperties, ValueRange};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET_URL_BASE: &str = "https://docs.google.com/spreadsheets/d";
/// Range written by [`SpreadsheetGateway::write`].
pub const WRITE_RANGE: &str = "Sheet1!A1";
pub const DEFAULT_READ_RANGE: &str = "Sheet1";

/// Characters escaped when a range like `Sheet 1!A1:C` goes into a URL path segment.
const RANGE_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("No data found in the specified sheet")]
    NoData,

    #[error("Spreadsheet not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}. Share the spreadsheet with the service account email")]
    Forbidden(String),

    #[error("Sheets API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Cannot sign service-account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Sheet contents are not a valid table: {0}")]
    Table(#[from] TableError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Spreadsheet storage used for table import and result export.
/// Implemented by `SheetsClient` for production; mock implementations used in tests.
pub trait SpreadsheetGateway {
    /// Reads `range`; the first row becomes the header.
    async fn read(&self, spreadsheet_id: &str, range: &str) -> Result<Table, SheetsError>;

    /// Creates an empty spreadsheet and returns its id.
    async fn create(&self) -> Result<String, SheetsError>;

    /// Overwrites the first sheet from `A1` with the header and rows as raw values.
    /// Returns the spreadsheet URL.
    async fn write(&self, spreadsheet_id: &str, table: &Table) -> Result<String, SheetsError>;
}

pub struct SheetsClient {
    http: Client,
    auth: TokenProvider,
    base_url: String,
}

impl SheetsClient {
    pub fn new(http: Client, key: ServiceAccountKey) -> Result<Self, SheetsError> {
        let auth = TokenProvider::new(http.clone(), key)?;
        info!("Google Sheets client initialized");
        Ok(Self {
            http,
            auth,
            base_url: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, key: ServiceAccountKey, base_url: &str) -> Self {
        let auth = TokenProvider::new(http.clone(), key).unwrap();
        Self {
            http,
            auth,
            base_url: base_url.to_string(),
        }
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.base_url,
            utf8_percent_encode(spreadsheet_id, RANGE_SEGMENT),
            utf8_percent_encode(range, RANGE_SEGMENT)
        )
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, SheetsError> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .header("User-Agent", crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| {
                let end = text.floor_char_boundary(200);
                format!("HTTP {status}: {}", &text[..end])
            });
        warn!(status = %status, %message, "Sheets API error during {what}");

        Err(match status.as_u16() {
            404 => SheetsError::NotFound(message),
            403 => SheetsError::Forbidden(message),
            code => SheetsError::Api { code, message },
        })
    }
}

impl SpreadsheetGateway for SheetsClient {
    async fn read(&self, spreadsheet_id: &str, range: &str) -> Result<Table, SheetsError> {
        let url = self.values_url(spreadsheet_id, range);
        let body: ValueRange = self.send(self.http.get(&url), "read").await?;
        let table = values_to_table(body.values.unwrap_or_default())?;
        info!(rows = table.len(), "read rows from Google Sheets");
        Ok(table)
    }

    async fn create(&self) -> Result<String, SheetsError> {
        let title = format!(
            "AI Extracted Information - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let request = self.http.post(&self.base_url).json(&CreateSpreadsheet {
            properties: SpreadsheetProperties { title },
        });

        let created: Spreadsheet = self.send(request, "create").await?;
        let id = created
            .spreadsheet_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SheetsError::Api {
                code: 200,
                message: "create response carried no spreadsheetId".into(),
            })?;
        info!(spreadsheet_id = %id, "created spreadsheet");
        Ok(id)
    }

    async fn write(&self, spreadsheet_id: &str, table: &Table) -> Result<String, SheetsError> {
        let url = format!(
            "{}?valueInputOption=RAW",
            self.values_url(spreadsheet_id, WRITE_RANGE)
        );
        let body = ValueRange {
            range: Some(WRITE_RANGE.to_string()),
            major_dimension: Some("ROWS".to_string()),
            values: Some(table_to_values(table)),
        };

        let _: serde_json::Value = self.send(self.http.put(&url).json(&body), "write").await?;
        let sheet_url = sheet_url(spreadsheet_id);
        debug!(rows = table.len(), "values written");
        info!(url = %sheet_url, "data exported to spreadsheet");
        Ok(sheet_url)
    }
}

pub fn sheet_url(spreadsheet_id: &str) -> String {
    format!("{SHEET_URL_BASE}/{spreadsheet_id}")
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn values_to_table(values: Vec<Vec<serde_json::Value>>) -> Result<Table, SheetsError> {
    let mut rows = values
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect::<Vec<_>>());

    let headers = rows.next().filter(|h| !h.is_empty()).ok_or(SheetsError::NoData)?;
    Ok(Table::new(headers, rows.collect())?)
}

fn table_to_values(table: &Table) -> Vec<Vec<serde_json::Value>> {
    std::iter::once(&table.headers)
        .chain(table.rows.iter())
        .map(|row| row.iter().cloned().map(serde_json::Value::String).collect())
        .collect()
}

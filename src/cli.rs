use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};
use tracing::debug;

use crate::export::DEFAULT_CSV_PATH;
use crate::pipeline::DEFAULT_DELAY;
use crate::sheets::DEFAULT_READ_RANGE;
use crate::sheets::credentials::{CredentialsError, ServiceAccountKey};

pub const DEFAULT_TEMPLATE: &str = "Get the email address and website for {entity}";

/// Look up a fact about every entity in a table using web search and an LLM.
///
/// API keys come from the environment (or a .env file): SERPAPI_KEY and
/// GROQ_API_KEY. LLM_MODEL and LLM_BASE_URL override the model and endpoint.
#[derive(Debug, Parser)]
#[command(name = "gleaner", version)]
pub struct Cli {
    #[command(flatten)]
    pub input: InputSource,

    /// Range to read when using --sheet
    #[arg(long, default_value = DEFAULT_READ_RANGE)]
    pub range: String,

    /// Column holding the entity names (default: first column)
    #[arg(long)]
    pub column: Option<String>,

    /// Query template; every {entity} is replaced by the entity name
    #[arg(long, short, default_value = DEFAULT_TEMPLATE)]
    pub template: String,

    /// Where to export the results
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub export: ExportFormat,

    /// CSV output path (also the fallback when a Sheets export fails)
    #[arg(long, short, default_value = DEFAULT_CSV_PATH)]
    pub output: PathBuf,

    /// Google service-account key JSON (needed for --sheet and --export sheets)
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Pause between rows, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DELAY.as_millis() as u64)]
    pub delay_ms: u64,

    /// Copy every input column into the results, not just the entity column
    #[arg(long)]
    pub keep_columns: bool,

    /// Export nothing if the run is interrupted
    #[arg(long)]
    pub strict: bool,

    /// Skip the startup request that verifies the LLM key and model
    #[arg(long)]
    pub skip_llm_check: bool,

    /// Rows shown in the data and live previews
    #[arg(long, default_value_t = 5)]
    pub preview_rows: usize,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct InputSource {
    /// Read the entity table from a CSV file
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Read the entity table from a Google Sheet (spreadsheet id)
    #[arg(long, value_name = "SPREADSHEET_ID")]
    pub sheet: Option<String>,

    /// Enter entities directly; repeat for several
    #[arg(long = "entity", value_name = "NAME")]
    pub entities: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsSetupError {
    #[error("Google Sheets access needs --credentials <service-account.json>")]
    Missing,

    #[error("{0}")]
    Invalid(#[from] CredentialsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Sheets,
}

impl Cli {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn needs_credentials(&self) -> bool {
        self.input.sheet.is_some() || self.export == ExportFormat::Sheets
    }

    /// Loads the service-account key, but only for runs that touch Google Sheets.
    /// A path inherited from `GOOGLE_APPLICATION_CREDENTIALS` is never opened otherwise.
    pub fn service_account_key(&self) -> Result<Option<ServiceAccountKey>, CredentialsSetupError> {
        if !self.needs_credentials() {
            if let Some(path) = &self.credentials {
                debug!(path = %path.display(), "Google Sheets not used; credentials not loaded");
            }
            return Ok(None);
        }
        let path = self
            .credentials
            .as_ref()
            .ok_or(CredentialsSetupError::Missing)?;
        Ok(Some(ServiceAccountKey::from_path(path)?))
    }
}

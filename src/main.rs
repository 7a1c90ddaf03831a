mod cli;
mod config;
mod export;
mod llm;
mod pipeline;
mod render;
mod search;
mod sheets;
mod table;

pub const USER_AGENT: &str = concat!("gleaner/", env!("CARGO_PKG_VERSION"));

use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::{Cli, ExportFormat};
use config::Config;
use export::ExportOutcome;
use llm::ChatClient;
use pipeline::{PipelineOptions, ProgressEvent};
use search::SerpApiClient;
use sheets::{SheetsClient, SpreadsheetGateway};
use table::Table;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Column name used for entities typed on the command line.
const MANUAL_ENTITY_COLUMN: &str = "entity";
/// Conventional exit status for termination by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "gleaner=debug" } else { "gleaner=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    // Credential shape problems must surface before any network call.
    let sheets_key = cli.service_account_key()?;

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;

    let sheets = sheets_key
        .map(|key| SheetsClient::new(http.clone(), key))
        .transpose()?;

    let llm = ChatClient::new(http.clone(), &config.llm);
    if !cli.skip_llm_check {
        llm.check().await?;
        info!(model = %llm.model(), "LLM client initialized");
    }
    let search = SerpApiClient::new(http.clone(), config.serpapi_key.clone());

    let input = load_input(&cli, sheets.as_ref()).await?;
    eprintln!("Loaded {} rows.\n", input.len());
    eprintln!("{}", render::format_table(&input.head(cli.preview_rows)));

    if input.is_empty() {
        warn!("input table has no data rows");
    }

    let entity_column = match &cli.column {
        Some(column) => column.clone(),
        None => input
            .headers
            .first()
            .cloned()
            .ok_or("input table has no columns")?,
    };
    if !cli.template.contains(llm::prompt::ENTITY_PLACEHOLDER) {
        warn!(template = %cli.template, "template has no {{entity}} placeholder; every row sends the same query");
    }

    let options = PipelineOptions {
        entity_column: entity_column.clone(),
        template: cli.template.clone(),
        delay: cli.delay(),
        strict: cli.strict,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_interrupt).await {
            std::process::exit(EXIT_INTERRUPTED);
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(rx, entity_column.clone(), cli.preview_rows));

    let outcome = pipeline::run(&search, &llm, &input, &options, &tx, &cancel).await;
    drop(tx);
    finish_renderer(renderer).await;
    let report = outcome?;

    if report.is_complete() {
        eprintln!("Extraction completed!");
    } else {
        eprintln!(
            "Run interrupted: exporting {} of {} rows.",
            report.rows.len(),
            report.total
        );
    }

    let results = export::results_table(&input, &entity_column, &report.rows, cli.keep_columns);
    let exported = match (cli.export, sheets.as_ref()) {
        (ExportFormat::Sheets, Some(gateway)) => {
            export::export_sheet(gateway, &results, &cli.output).await?
        }
        _ => export::export_csv(&results, &cli.output)?,
    };

    match exported {
        ExportOutcome::Csv { path } => println!("Results saved to {}", path.display()),
        ExportOutcome::Sheet { url } => println!("Data exported successfully: {url}"),
        ExportOutcome::CsvFallback { path, reason } => {
            eprintln!("Google Sheets export failed ({reason}); fell back to CSV.");
            println!("Results saved to {}", path.display());
        }
    }
    Ok(())
}

async fn load_input(
    cli: &Cli,
    sheets: Option<&SheetsClient>,
) -> Result<Table, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.input.csv {
        return Ok(Table::from_csv_path(path)?);
    }
    if let Some(id) = &cli.input.sheet {
        let gateway = sheets.ok_or("reading a Google Sheet needs --credentials")?;
        return Ok(gateway.read(id, &cli.range).await?);
    }
    if cli.input.entities.is_empty() {
        return Err("no input given: use --csv, --sheet or --entity".into());
    }
    Ok(Table::from_entities(MANUAL_ENTITY_COLUMN, &cli.input.entities))
}

async fn render_progress(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    entity_column: String,
    preview_rows: usize,
) {
    let mut rows = Vec::new();
    while let Some(event) = rx.recv().await {
        eprintln!("{}", render::format_progress(&event));
        if let ProgressEvent::RowCompleted { row, .. } = event {
            rows.push(row);
            if preview_rows > 0 {
                eprintln!(
                    "{}",
                    render::format_live_preview(&entity_column, &rows, preview_rows)
                );
            }
        }
    }
}

/// First interrupt cancels the run gracefully; returns `true` on a second one.
/// Returns `false` if the signal source fails.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancel: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("interrupt received, stopping after the current row (press Ctrl-C again to quit)");
    cancel.cancel();

    if next_interrupt().await.is_err() {
        return false;
    }
    warn!("second interrupt received, exiting");
    true
}

async fn finish_renderer(renderer: JoinHandle<()>) {
    if let Err(e) = renderer.await {
        warn!(error = %e, "progress renderer stopped abnormally");
    }
}

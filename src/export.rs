//! Result table assembly and export to CSV or a new spreadsheet.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::pipeline::ExtractionRow;
use crate::sheets::{SheetsError, SpreadsheetGateway};
use crate::table::{Table, TableError};

pub const EXTRACTED_COLUMN: &str = "Extracted Information";
pub const SOURCES_COLUMN: &str = "Number of Sources";
pub const DEFAULT_CSV_PATH: &str = "extracted_results.csv";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("cannot write CSV to {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: TableError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Csv { path: PathBuf },
    Sheet { url: String },
    /// Spreadsheet export failed and the CSV file was written instead.
    CsvFallback { path: PathBuf, reason: String },
}

/// Builds the exported table: the entity column (or every input column when
/// `keep_columns` is set) followed by the extracted text and source count.
///
/// `rows[i]` must come from `input.rows[i]`.
pub fn results_table(
    input: &Table,
    entity_column: &str,
    rows: &[ExtractionRow],
    keep_columns: bool,
) -> Table {
    let mut headers = if keep_columns {
        input.headers.clone()
    } else {
        vec![entity_column.to_string()]
    };
    headers.push(EXTRACTED_COLUMN.to_string());
    headers.push(SOURCES_COLUMN.to_string());

    let rows = rows
        .iter()
        .zip(&input.rows)
        .map(|(result, source)| {
            let mut row = if keep_columns {
                source.clone()
            } else {
                vec![result.entity.clone()]
            };
            row.push(result.extracted_information.clone());
            row.push(result.source_count.to_string());
            row
        })
        .collect();

    Table { headers, rows }
}

pub fn export_csv(table: &Table, path: &Path) -> Result<ExportOutcome, ExportError> {
    table.write_csv_path(path).map_err(|source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = table.len(), "results written to CSV");
    Ok(ExportOutcome::Csv {
        path: path.to_path_buf(),
    })
}

/// Creates a new spreadsheet and writes `table` into it. Any gateway failure
/// falls back to writing the CSV file at `fallback_path`.
pub async fn export_sheet(
    gateway: &impl SpreadsheetGateway,
    table: &Table,
    fallback_path: &Path,
) -> Result<ExportOutcome, ExportError> {
    match create_and_write(gateway, table).await {
        Ok(url) => Ok(ExportOutcome::Sheet { url }),
        Err(e) => {
            error!(error = %e, "error during Google Sheets export");
            warn!(path = %fallback_path.display(), "falling back to CSV");
            export_csv(table, fallback_path)?;
            Ok(ExportOutcome::CsvFallback {
                path: fallback_path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }
}

async fn create_and_write(
    gateway: &impl SpreadsheetGateway,
    table: &Table,
) -> Result<String, SheetsError> {
    let id = gateway.create().await?;
    gateway.write(&id, table).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RowStatus;
    use std::sync::Mutex;

    fn row(entity: &str, text: &str, sources: usize) -> ExtractionRow {
        ExtractionRow {
            entity: entity.into(),
            extracted_information: text.into(),
            source_count: sources,
            status: RowStatus::Extracted,
        }
    }

    fn input() -> Table {
        Table::new(
            vec!["name".into(), "city".into()],
            vec![
                vec!["Acme".into(), "Springfield".into()],
                vec!["Globex".into(), "Cypress Creek".into()],
            ],
        )
        .unwrap()
    }

    struct MockGateway {
        fail_write: bool,
        written: Mutex<Vec<(String, Table)>>,
    }

    impl SpreadsheetGateway for MockGateway {
        async fn read(&self, _: &str, _: &str) -> Result<Table, SheetsError> {
            Err(SheetsError::NoData)
        }

        async fn create(&self) -> Result<String, SheetsError> {
            Ok("sheet-42".into())
        }

        async fn write(&self, id: &str, table: &Table) -> Result<String, SheetsError> {
            if self.fail_write {
                return Err(SheetsError::Forbidden("caller lacks permission".into()));
            }
            self.written.lock().unwrap().push((id.into(), table.clone()));
            Ok(crate::sheets::sheet_url(id))
        }
    }

    #[test]
    fn results_table_uses_entity_column_name() {
        let table = results_table(
            &input(),
            "name",
            &[row("Acme", "a@acme.test", 3), row("Globex", "Not available", 0)],
            false,
        );

        assert_eq!(table.headers, vec!["name", EXTRACTED_COLUMN, SOURCES_COLUMN]);
        assert_eq!(table.rows[0], vec!["Acme", "a@acme.test", "3"]);
        assert_eq!(table.rows[1], vec!["Globex", "Not available", "0"]);
    }

    #[test]
    fn results_table_can_keep_all_columns() {
        let table = results_table(&input(), "name", &[row("Acme", "x", 1)], true);

        assert_eq!(
            table.headers,
            vec!["name", "city", EXTRACTED_COLUMN, SOURCES_COLUMN]
        );
        assert_eq!(table.rows, vec![vec!["Acme", "Springfield", "x", "1"]]);
    }

    #[test]
    fn csv_export_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CSV_PATH);
        let table = results_table(&input(), "name", &[row("Acme", "a, b", 1)], false);

        let outcome = export_csv(&table, &path).unwrap();

        assert_eq!(outcome, ExportOutcome::Csv { path: path.clone() });
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "name,Extracted Information,Number of Sources\nAcme,\"a, b\",1\n"
        );
    }

    #[tokio::test]
    async fn sheet_export_writes_to_created_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MockGateway {
            fail_write: false,
            written: Mutex::new(Vec::new()),
        };
        let table = results_table(&input(), "name", &[row("Acme", "x", 1)], false);

        let outcome = export_sheet(&gateway, &table, &dir.path().join("out.csv"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Sheet {
                url: "https://docs.google.com/spreadsheets/d/sheet-42".into()
            }
        );
        let written = gateway.written.lock().unwrap();
        assert_eq!(written[0].0, "sheet-42");
        assert_eq!(written[0].1, table);
        assert!(!dir.path().join("out.csv").exists());
    }

    #[tokio::test]
    async fn sheet_failure_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let gateway = MockGateway {
            fail_write: true,
            written: Mutex::new(Vec::new()),
        };
        let table = results_table(&input(), "name", &[row("Acme", "x", 1)], false);

        let outcome = export_sheet(&gateway, &table, &path).await.unwrap();

        match outcome {
            ExportOutcome::CsvFallback { path: p, reason } => {
                assert_eq!(p, path);
                assert!(reason.contains("caller lacks permission"), "got: {reason}");
            }
            other => panic!("expected CsvFallback, got: {other:?}"),
        }
        assert!(path.exists());
    }
}

//! Per-row extraction: search, prompt the model, accumulate one result per row.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::{self, CompletionClient, Extraction};
use crate::llm::prompt::substitute_entity;
use crate::search::SearchProvider;
use crate::table::{Table, TableError};

pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Table(#[from] TableError),

    #[error("run cancelled after {completed} of {total} rows")]
    Cancelled { completed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Extracted,
    /// Search came back empty; the model was still asked.
    NoSources,
    Failed { reason: String },
}

/// One output record per processed input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRow {
    pub entity: String,
    pub extracted_information: String,
    pub source_count: usize,
    pub status: RowStatus,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub entity_column: String,
    pub template: String,
    /// Pause after each row except the last.
    pub delay: Duration,
    /// Treat cancellation as a failure instead of returning completed rows.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    RowStarted {
        index: usize,
        total: usize,
        entity: String,
    },
    RowCompleted {
        completed: usize,
        total: usize,
        row: ExtractionRow,
    },
}

impl ProgressEvent {
    /// Fraction of rows finished, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        match self {
            ProgressEvent::RowStarted { index, total, .. } => ratio(*index, *total),
            ProgressEvent::RowCompleted {
                completed, total, ..
            } => ratio(*completed, *total),
        }
    }
}

fn ratio(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub rows: Vec<ExtractionRow>,
    pub total: usize,
    pub cancelled: bool,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.rows.len() == self.total
    }
}

/// Runs the extraction over every row of `table`, in order.
///
/// Progress goes to `progress` (a dropped receiver is ignored). Cancelling
/// `cancel` stops the loop between rows; completed rows are returned unless
/// `options.strict` is set.
pub async fn run(
    search: &impl SearchProvider,
    llm: &impl CompletionClient,
    table: &Table,
    options: &PipelineOptions,
    progress: &UnboundedSender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<PipelineReport, PipelineError> {
    let column = table.column_index(&options.entity_column)?;
    let total = table.len();
    let mut rows = Vec::with_capacity(total);

    info!(total, column = %options.entity_column, "starting extraction");

    for (index, input) in table.rows.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let entity = input.get(column).map_or("", String::as_str);
        let _ = progress.send(ProgressEvent::RowStarted {
            index,
            total,
            entity: entity.to_string(),
        });

        let row = process_row(search, llm, entity, &options.template).await;
        rows.push(row.clone());
        let _ = progress.send(ProgressEvent::RowCompleted {
            completed: rows.len(),
            total,
            row,
        });

        if index + 1 < total && !options.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(options.delay) => {}
            }
        }
    }

    let cancelled = rows.len() < total;
    if cancelled {
        warn!(completed = rows.len(), total, "extraction cancelled");
        if options.strict {
            return Err(PipelineError::Cancelled {
                completed: rows.len(),
                total,
            });
        }
    } else {
        info!(total, "extraction completed");
    }

    Ok(PipelineReport {
        rows,
        total,
        cancelled,
    })
}

async fn process_row(
    search: &impl SearchProvider,
    llm: &impl CompletionClient,
    entity: &str,
    template: &str,
) -> ExtractionRow {
    let query = substitute_entity(template, entity);
    let records = search.search(&query).await;
    if records.is_empty() {
        warn!(entity, "no search results found");
    }
    debug!(entity, sources = records.len(), "search results collected");

    let extraction = llm::extract(llm, entity, &records, template).await;
    let extracted_information = extraction.text();
    let status = match extraction {
        Extraction::Failed(reason) => RowStatus::Failed { reason },
        Extraction::Extracted(_) if records.is_empty() => RowStatus::NoSources,
        Extraction::Extracted(_) => RowStatus::Extracted,
    };

    ExtractionRow {
        entity: entity.to_string(),
        extracted_information,
        source_count: records.len(),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::LlmError;
    use crate::llm::types::{Message, Sampling};
    use crate::search::SearchRecord;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Returns `per_query` records for every query and remembers the queries.
    struct MockSearch {
        per_query: usize,
        queries: Mutex<Vec<String>>,
    }

    impl MockSearch {
        fn returning(per_query: usize) -> Self {
            Self {
                per_query,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn captured_queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl SearchProvider for MockSearch {
        async fn search(&self, query: &str) -> Vec<SearchRecord> {
            self.queries.lock().unwrap().push(query.to_string());
            (0..self.per_query)
                .map(|i| SearchRecord {
                    title: format!("result {i}"),
                    snippet: format!("snippet about {query}"),
                    link: format!("https://example.com/{i}"),
                })
                .collect()
        }
    }

    /// Echoes the entity line of the user prompt, or fails for listed entities.
    struct EchoLlm {
        fail_for: Vec<&'static str>,
        cancel_after: Option<(usize, CancellationToken)>,
        calls: Mutex<usize>,
    }

    impl EchoLlm {
        fn new() -> Self {
            Self {
                fail_for: Vec::new(),
                cancel_after: None,
                calls: Mutex::new(0),
            }
        }
    }

    impl CompletionClient for EchoLlm {
        async fn complete(&self, messages: &[Message], _: Sampling) -> Result<String, LlmError> {
            let calls = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if let Some((after, token)) = &self.cancel_after
                && calls == *after
            {
                token.cancel();
            }

            let entity = messages[1]
                .content
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("Entity: "))
                .unwrap_or_default()
                .to_string();

            if self.fail_for.contains(&entity.as_str()) {
                return Err(LlmError::Api {
                    code: 500,
                    message: "model overloaded".into(),
                });
            }
            Ok(format!("contact info for {entity}"))
        }
    }

    fn options(template: &str) -> PipelineOptions {
        PipelineOptions {
            entity_column: "name".into(),
            template: template.into(),
            delay: Duration::ZERO,
            strict: false,
        }
    }

    fn companies(names: &[&str]) -> Table {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Table::from_entities("name", &names)
    }

    #[tokio::test]
    async fn two_entities_end_to_end() {
        let search = MockSearch::returning(1);
        let llm = EchoLlm::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run(
            &search,
            &llm,
            &companies(&["Acme", "Globex"]),
            &options("Get the email for {entity}"),
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].entity, "Acme");
        assert_eq!(report.rows[1].entity, "Globex");
        for row in &report.rows {
            assert_eq!(row.source_count, 1);
            assert!(row.extracted_information.contains(&row.entity));
            assert_eq!(row.status, RowStatus::Extracted);
        }
        assert_eq!(
            search.captured_queries(),
            vec!["Get the email for Acme", "Get the email for Globex"]
        );
    }

    #[tokio::test]
    async fn failures_and_empty_searches_keep_one_row_per_input() {
        let search = MockSearch::returning(0);
        let llm = EchoLlm {
            fail_for: vec!["Initech"],
            ..EchoLlm::new()
        };
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run(
            &search,
            &llm,
            &companies(&["Acme", "Initech", "Globex"]),
            &options("{entity}"),
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let entities: Vec<_> = report.rows.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["Acme", "Initech", "Globex"]);
        assert_eq!(report.rows[0].status, RowStatus::NoSources);
        assert_eq!(report.rows[0].source_count, 0);

        let failed = &report.rows[1];
        assert!(failed.extracted_information.starts_with("Error processing:"));
        assert!(matches!(&failed.status, RowStatus::Failed { reason } if reason.contains("model overloaded")));
    }

    #[tokio::test]
    async fn progress_events_track_each_row() {
        let search = MockSearch::returning(2);
        let llm = EchoLlm::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        run(
            &search,
            &llm,
            &companies(&["Acme", "Globex"]),
            &options("{entity}"),
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ProgressEvent::RowStarted { index: 0, total: 2, entity } if entity == "Acme"));
        assert_eq!(events[1].fraction(), 0.5);
        assert_eq!(events[3].fraction(), 1.0);
        match &events[3] {
            ProgressEvent::RowCompleted { row, .. } => assert_eq!(row.source_count, 2),
            other => panic!("expected RowCompleted, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_entity_column_fails_before_any_call() {
        let search = MockSearch::returning(1);
        let llm = EchoLlm::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut opts = options("{entity}");
        opts.entity_column = "company".into();

        let err = run(
            &search,
            &llm,
            &companies(&["Acme"]),
            &opts,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("company"));
        assert!(search.captured_queries().is_empty());
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_rows() {
        let cancel = CancellationToken::new();
        let search = MockSearch::returning(1);
        let llm = EchoLlm {
            cancel_after: Some((1, cancel.clone())),
            ..EchoLlm::new()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut opts = options("{entity}");
        opts.delay = Duration::from_secs(60);

        let report = run(
            &search,
            &llm,
            &companies(&["Acme", "Globex", "Initech"]),
            &opts,
            &tx,
            &cancel,
        )
        .await
        .unwrap();

        assert!(report.cancelled);
        assert!(!report.is_complete());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].entity, "Acme");
    }

    #[tokio::test]
    async fn strict_cancellation_is_an_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let search = MockSearch::returning(1);
        let llm = EchoLlm::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut opts = options("{entity}");
        opts.strict = true;

        let err = run(&search, &llm, &companies(&["Acme"]), &opts, &tx, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled {
                completed: 0,
                total: 1
            }
        ));
    }

    #[tokio::test]
    async fn empty_table_is_complete() {
        let search = MockSearch::returning(1);
        let llm = EchoLlm::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = run(
            &search,
            &llm,
            &companies(&[]),
            &options("{entity}"),
            &tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.rows.is_empty());
        assert!(report.is_complete());
    }
}

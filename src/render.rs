//! Plain-text rendering of table previews and progress lines for the terminal.

use crate::export::{EXTRACTED_COLUMN, SOURCES_COLUMN};
use crate::pipeline::{ExtractionRow, ProgressEvent, RowStatus};
use crate::table::Table;

const MAX_CELL_CHARS: usize = 60;

/// Collapses newlines so a cell stays on one line.
pub(crate) fn sanitize_cell(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

pub(crate) fn truncate_cell(s: &str, max: usize) -> String {
    let clean = sanitize_cell(s);
    if clean.len() <= max {
        return clean;
    }
    let end = clean.floor_char_boundary(max);
    format!("{}...", &clean[..end])
}

/// Pipe-separated table with the header underlined.
pub fn format_table(table: &Table) -> String {
    let cells: Vec<Vec<String>> = std::iter::once(&table.headers)
        .chain(table.rows.iter())
        .map(|row| row.iter().map(|c| truncate_cell(c, MAX_CELL_CHARS)).collect())
        .collect();

    let mut widths = vec![0; table.headers.len()];
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    for (i, row) in cells.iter().enumerate() {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        output.push_str(line.join(" | ").trim_end());
        output.push('\n');
        if i == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            output.push_str(&rule.join("-+-"));
            output.push('\n');
        }
    }
    output
}

/// The last `limit` accumulated results as a table.
pub fn format_live_preview(entity_column: &str, rows: &[ExtractionRow], limit: usize) -> String {
    let skip = rows.len().saturating_sub(limit);
    let table = Table {
        headers: vec![
            entity_column.to_string(),
            EXTRACTED_COLUMN.to_string(),
            SOURCES_COLUMN.to_string(),
        ],
        rows: rows[skip..]
            .iter()
            .map(|r| {
                vec![
                    r.entity.clone(),
                    r.extracted_information.clone(),
                    r.source_count.to_string(),
                ]
            })
            .collect(),
    };
    format_table(&table)
}

pub fn format_progress(event: &ProgressEvent) -> String {
    let percent = (event.fraction() * 100.0).round() as u32;
    match event {
        ProgressEvent::RowStarted {
            index,
            total,
            entity,
        } => format!(
            "[{}/{total}] ({percent}%) Processing {}...",
            index + 1,
            truncate_cell(entity, MAX_CELL_CHARS)
        ),
        ProgressEvent::RowCompleted {
            completed,
            total,
            row,
        } => format!("[{completed}/{total}] ({percent}%) {}", format_row_summary(row)),
    }
}

fn format_row_summary(row: &ExtractionRow) -> String {
    let entity = truncate_cell(&row.entity, MAX_CELL_CHARS);
    match &row.status {
        RowStatus::Extracted => format!(
            "{entity}: {} ({} sources)",
            truncate_cell(&row.extracted_information, MAX_CELL_CHARS),
            row.source_count
        ),
        RowStatus::NoSources => format!(
            "{entity}: {} (no search results)",
            truncate_cell(&row.extracted_information, MAX_CELL_CHARS)
        ),
        RowStatus::Failed { reason } => {
            format!("{entity}: FAILED ({})", truncate_cell(reason, MAX_CELL_CHARS))
        }
    }
}

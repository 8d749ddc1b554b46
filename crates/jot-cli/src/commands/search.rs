//! Search command - full-text search over indexed notes.

use crate::app::App;
use crate::OutputFormat;
use jot_core::{JotError, SearchHit, Searcher};
use std::time::Instant;

/// Engine behind the search command.
pub trait NoteSearch {
    fn search(&self, query: &str, max_results: usize) -> jot_core::Result<Vec<SearchHit>>;
}

impl NoteSearch for Searcher {
    fn search(&self, query: &str, max_results: usize) -> jot_core::Result<Vec<SearchHit>> {
        Searcher::search(self, query, max_results)
    }
}

/// Validate `query` and hand it to `engine`.
///
/// Empty or whitespace-only queries are rejected without calling the engine.
pub fn find(
    engine: &dyn NoteSearch,
    query: &str,
    max_results: usize,
) -> anyhow::Result<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(JotError::InvalidArgument("search query must not be empty".to_string()).into());
    }
    Ok(engine.search(query, max_results)?)
}

/// Run the search command.
pub fn run(
    app: &App,
    query: &str,
    count: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let searcher = app.config.searcher()?;
    let max_results = count.unwrap_or(app.config.search.max_results);

    let start = Instant::now();
    let hits = find(&searcher, query, max_results)?;
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No notes match {:?}.", query.trim());
            } else {
                print!("{}", render_table(&hits));
            }

            eprintln!();
            eprintln!(
                "Found {} results in {:.3}ms",
                hits.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
    }

    Ok(())
}

const HEADERS: [&str; 5] = ["FileName", "Line#", "Created", "LastModified", "Context"];

/// Lay hits out as an aligned text table.
fn render_table(hits: &[SearchHit]) -> String {
    let rows: Vec<[String; 5]> = hits
        .iter()
        .map(|hit| {
            [
                hit.file_name.clone(),
                hit.line_number.map(|n| n.to_string()).unwrap_or_default(),
                hit.created.to_string(),
                hit.modified.to_string(),
                hit.excerpt.split_whitespace().collect::<Vec<_>>().join(" "),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("-+-"));
    out.push('\n');
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

//! Index command - rebuild or extend the note index.

use crate::app::App;
use std::time::Instant;

/// Run the index command.
pub fn run(app: &App, preserve: bool) -> anyhow::Result<()> {
    let source = app.config.document_source()?;
    let mut indexer = app.indexer()?;

    let start = Instant::now();
    let count = if preserve {
        indexer.append(&source)?
    } else {
        indexer.rebuild(&source)?
    };
    let elapsed = start.elapsed();

    println!("Indexed {} notes.", count);
    eprintln!("  Time: {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

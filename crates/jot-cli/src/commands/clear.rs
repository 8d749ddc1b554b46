//! Clear command - remove the index.

use crate::app::App;
use std::io::{self, Write};

/// Run the clear command.
pub fn run(app: &App, skip_confirm: bool) -> anyhow::Result<()> {
    let mut store = app.config.index_store()?;

    if !store.dir().exists() {
        println!("No index found. Nothing to clear.");
        return Ok(());
    }

    if !skip_confirm {
        print!("This will delete the search index. Notes are not touched. Continue? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.clear()?;
    println!("Index cleared.");

    Ok(())
}

//! Status command - show index status and statistics.

use crate::app::App;

/// Run the status command.
pub fn run(app: &App) -> anyhow::Result<()> {
    let store = app.config.index_store()?;

    println!("Jot Index Status");
    println!("================");
    println!();

    if !store.exists() {
        println!("No index found. Run 'jot index' to build the index.");
    } else {
        let stats = store.stats()?;
        println!("Summary:");
        println!("  Notes:           {}", stats.documents);
        println!("  Distinct terms:  {}", stats.terms);
        println!("  Segments:        {}", stats.segments);
        println!("  Generation:      {}", stats.generation);
        println!("  Index version:   {}", stats.version);

        if let Some(committed) = stats.committed_at {
            let local = committed.with_timezone(&chrono::Local);
            println!("  Last indexed:    {}", local.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    println!();
    println!("Notes folder:    {}", app.config.notes_dir()?.display());
    println!("Note pattern:    {}", app.config.general.document_pattern);
    println!("Index directory: {}", store.dir().display());

    Ok(())
}

use crate::cli::open_initialized;
use crate::error::Result;
use crate::importer::last_imports;
use crate::settings::{load_settings, settings_path};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("Settings:   {}", settings_path().display());
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!("Threshold:  {}", settings.match_threshold);

    println!();
    let Some(conn) = open_initialized(&settings)? else {
        return Ok(());
    };
    let transactions: i64 = conn.query_row("SELECT count(*) FROM txn", [], |r| r.get(0))?;
    let pending: i64 = conn.query_row("SELECT count(*) FROM txn WHERE pending = 1", [], |r| r.get(0))?;
    let allocations: i64 = conn.query_row("SELECT count(*) FROM allocation", [], |r| r.get(0))?;

    println!("Transactions:  {transactions}");
    println!("Pending:       {pending}");
    println!("Allocations:   {allocations}");

    let imports = last_imports(&conn)?;
    if !imports.is_empty() {
        println!();
        println!("Last imports:");
        for (source, when, inserted, updated, deleted) in imports {
            println!("  {source:<20} {when}  +{inserted} ~{updated} -{deleted}");
        }
    }
    if !settings.sources.is_empty() {
        let names: Vec<&str> = settings.sources.keys().map(String::as_str).collect();
        println!();
        println!("Sources:       {}", names.join(", "));
    }
    Ok(())
}

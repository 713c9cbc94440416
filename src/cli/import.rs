use std::path::Path;

use chrono::NaiveDate;
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::{get_connection, init_db};
use crate::error::{Result, TallyError};
use crate::fmt::money;
use crate::importer::{import_all, import_batch, import_source, read_batch_file, resolve_cutoff, ImportResult};
use crate::settings::load_settings;

pub fn run(source: Option<&str>, file: Option<&str>, since: Option<NaiveDate>) -> Result<()> {
    let settings = load_settings();
    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    let results = match (source, file) {
        (Some(name), Some(path)) => {
            let configured = settings.sources.get(name).cloned().unwrap_or_default();
            let batch = read_batch_file(Path::new(path))?;
            vec![import_batch(
                &conn,
                settings.reconcile_config(),
                name,
                batch,
                configured.opening_balance,
                resolve_cutoff(&configured, since)?,
            )?]
        }
        (Some(name), None) => vec![import_source(&conn, &settings, name, since)?],
        (None, Some(_)) => return Err(TallyError::Other("--file requires --source".into())),
        (None, None) => {
            if settings.sources.is_empty() {
                println!("No sources configured. Add scrapers under \"sources\" in settings.json.");
                return Ok(());
            }
            import_all(&conn, &settings, since)?
        }
    };

    print_results(&results);
    Ok(())
}

fn print_results(results: &[ImportResult]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Source", "Records", "Skipped", "Inserted", "Updated", "Unchanged", "Deleted", "Anomalies", "Balances",
        "Closing",
    ]);
    for r in results {
        let anomalies = if r.anomalies > 0 {
            r.anomalies.to_string().yellow().bold().to_string()
        } else {
            r.anomalies.to_string()
        };
        table.add_row(vec![
            Cell::new(&r.source),
            Cell::new(r.record_count),
            Cell::new(r.skipped_before_cutoff),
            Cell::new(r.inserted),
            Cell::new(r.updated),
            Cell::new(r.unchanged),
            Cell::new(r.deleted),
            Cell::new(anomalies),
            Cell::new(r.balances_updated),
            Cell::new(money(r.closing_balance)),
        ]);
    }
    println!("Import\n{table}");

    if results.iter().any(|r| r.anomalies > 0) {
        println!(
            "{}",
            "Some posted transactions are missing from the feed. They were kept; see the log for ids.".yellow()
        );
    }
    for r in results {
        if let Some(reported) = r.reported_balance.filter(|_| r.balance_mismatch()) {
            println!(
                "{}",
                format!(
                    "{}: bank reports {}, stored history adds up to {}.",
                    r.source,
                    money(reported),
                    money(r.closing_balance)
                )
                .yellow()
            );
        }
    }
}

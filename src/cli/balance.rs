use crate::balance::recalculate_balances;
use crate::cli::open_initialized;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::load_settings;

pub fn run(source: &str, opening: Option<i64>) -> Result<()> {
    let settings = load_settings();
    let Some(conn) = open_initialized(&settings)? else {
        return Ok(());
    };
    let opening = opening
        .or_else(|| settings.sources.get(source).map(|s| s.opening_balance))
        .unwrap_or(0);

    let run = recalculate_balances(&conn, source, opening)?;
    println!(
        "{} balances updated for {source}, closing balance {}",
        run.updated,
        money(run.closing_balance)
    );
    Ok(())
}

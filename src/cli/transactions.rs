use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_initialized;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::load_settings;
use crate::store::{TransactionFilter, TransactionStore};

pub fn list(filter: TransactionFilter) -> Result<()> {
    let Some(conn) = open_initialized(&load_settings())? else {
        return Ok(());
    };
    let txns = conn.query_transactions(&filter)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Source", "Description", "Amount", "Balance", "Status"]);
    for txn in &txns {
        let amount = if txn.amount < 0 {
            money(txn.amount).red().to_string()
        } else {
            money(txn.amount).green().to_string()
        };
        table.add_row(vec![
            Cell::new(txn.id.unwrap_or_default()),
            Cell::new(txn.date),
            Cell::new(&txn.source),
            Cell::new(&txn.description),
            Cell::new(amount),
            Cell::new(money(txn.balance)),
            Cell::new(if txn.pending { "pending" } else { "posted" }),
        ]);
    }
    println!("Transactions ({})\n{table}", txns.len());
    Ok(())
}

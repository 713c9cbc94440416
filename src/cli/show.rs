use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_initialized;
use crate::error::{Result, TallyError};
use crate::fmt::money;
use crate::settings::load_settings;
use crate::store::{allocations_for, TransactionStore};

/// Print one transaction and how it is split across categories.
pub fn run(id: i64) -> Result<()> {
    let Some(conn) = open_initialized(&load_settings())? else {
        return Ok(());
    };
    let txn = conn
        .get_transaction(id)?
        .ok_or_else(|| TallyError::Other(format!("no transaction with id {id}")))?;

    println!("{} #{id}", "Transaction".bold());
    println!("  Date:         {}", txn.date);
    println!("  Source:       {}", txn.source);
    println!("  Description:  {}", txn.description);
    println!("  Amount:       {}", money(txn.amount));
    println!("  Balance:      {}", money(txn.balance));
    println!("  Status:       {}", if txn.pending { "pending" } else { "posted" });

    let allocations = allocations_for(&conn, id)?;
    let mut table = Table::new();
    table.set_header(vec!["Alloc", "Amount", "Category", "Location", "Note"]);
    for alloc in &allocations {
        table.add_row(vec![
            Cell::new(alloc.id),
            Cell::new(money(alloc.amount)),
            Cell::new(&alloc.category),
            Cell::new(&alloc.location),
            Cell::new(alloc.note.as_deref().unwrap_or("")),
        ]);
    }
    println!("\nAllocations ({})\n{table}", allocations.len());
    Ok(())
}

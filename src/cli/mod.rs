pub mod balance;
pub mod import;
pub mod init;
pub mod show;
pub mod status;
pub mod transactions;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "tally", about = "Reconcile scraped bank transactions into a budget database.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for tally data (default: ~/.local/share/tally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Fetch and reconcile transactions for configured sources.
    Import {
        /// Only import this source
        #[arg(long)]
        source: Option<String>,
        /// Read the batch from a JSON file instead of running the scraper
        #[arg(long, requires = "source")]
        file: Option<String>,
        /// Only reconcile history from this date: YYYY-MM-DD
        #[arg(long)]
        since: Option<NaiveDate>,
    },
    /// Recompute running balances for a source.
    Balance {
        /// Source name
        source: String,
        /// Opening balance in cents (default: from settings, else 0)
        #[arg(long, allow_hyphen_values = true)]
        opening: Option<i64>,
    },
    /// List stored transactions.
    Transactions {
        #[arg(long)]
        source: Option<String>,
        /// Start date: YYYY-MM-DD
        #[arg(long)]
        since: Option<NaiveDate>,
        /// End date: YYYY-MM-DD
        #[arg(long)]
        until: Option<NaiveDate>,
        /// Only rows with this exact amount in cents
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<i64>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one transaction with its allocations.
    Show {
        /// Transaction id
        id: i64,
    },
    /// Show current database and summary statistics.
    Status,
}

/// Open the database, or print how to create it and return `None` when
/// `tally init` has not run yet.
pub fn open_initialized(settings: &Settings) -> Result<Option<Connection>> {
    let db_path = settings.db_path();
    if !db_path.exists() {
        println!("Database not found. Run `tally init` to set up.");
        return Ok(None);
    }
    Ok(Some(get_connection(&db_path)?))
}

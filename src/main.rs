mod balance;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod models;
mod reconciler;
mod settings;
mod similarity;
mod store;
mod working_set;

use std::fs::OpenOptions;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;
use settings::load_settings;
use store::TransactionFilter;

/// Install the global subscriber. Returns whether events go to a log file
/// rather than stderr.
fn init_tracing() -> Result<bool> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "tally=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    match load_settings().log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
            Ok(true)
        }
        None => {
            builder.with_writer(std::io::stderr).init();
            Ok(false)
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { source, file, since } => {
            cli::import::run(source.as_deref(), file.as_deref(), since)
        }
        Commands::Balance { source, opening } => cli::balance::run(&source, opening),
        Commands::Transactions {
            source,
            since,
            until,
            amount,
            limit,
        } => cli::transactions::list(TransactionFilter {
            source,
            since,
            until,
            amount,
            limit,
        }),
        Commands::Show { id } => cli::show::run(id),
        Commands::Status => cli::status::run(),
    }
}

fn main() {
    let cli = Cli::parse();

    let logs_to_file = match init_tracing() {
        Ok(to_file) => to_file,
        Err(e) => {
            eprintln!("Error: could not open log file: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command) {
        // Without a log file the subscriber already writes to stderr.
        if logs_to_file {
            tracing::error!("{e}");
        }
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

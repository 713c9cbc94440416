use std::path::Path;
use std::process::Command;

use chrono::{Duration, Local, NaiveDate};
use rusqlite::Connection;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::balance::recalculate_balances;
use crate::error::{Result, TallyError};
use crate::models::{validate_batch, ImportRecord, RawTransaction, ScraperOutput, DATE_FORMAT};
use crate::reconciler::{MatchPass, ReconcileConfig, Reconciler};
use crate::settings::{Settings, SourceSettings};

// ---------------------------------------------------------------------------
// Batch sources
// ---------------------------------------------------------------------------

/// Scrapers print either a `{"transactions": [...]}` document or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchDocument {
    Wrapped(ScraperOutput),
    Bare(Vec<RawTransaction>),
}

pub fn parse_batch(data: &[u8]) -> Result<ScraperOutput> {
    let doc: BatchDocument = serde_json::from_slice(data)?;
    Ok(match doc {
        BatchDocument::Wrapped(out) => out,
        BatchDocument::Bare(transactions) => ScraperOutput {
            balance: None,
            transactions,
        },
    })
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A batch as read from disk or a scraper, with the checksum of its bytes.
pub struct Batch {
    pub transactions: Vec<RawTransaction>,
    /// Account balance the bank reported alongside the batch, if any.
    pub reported_balance: Option<i64>,
    pub checksum: String,
}

impl Batch {
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let output = parse_batch(data)?;
        Ok(Self {
            transactions: output.transactions,
            reported_balance: output.balance,
            checksum: compute_checksum(data),
        })
    }
}

pub fn read_batch_file(path: &Path) -> Result<Batch> {
    Batch::from_bytes(&std::fs::read(path)?)
}

/// Run a source's scraper command and parse what it prints on stdout.
pub fn run_scraper(name: &str, source: &SourceSettings) -> Result<Batch> {
    let scraper_error = |message: String| TallyError::Scraper {
        source_name: name.to_string(),
        message,
    };
    let (program, args) = source
        .command
        .split_first()
        .ok_or_else(|| scraper_error("no command configured".to_string()))?;

    info!(source = name, program = %program, "running scraper");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| scraper_error(format!("could not start {program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(scraper_error(format!("{} {}", output.status, stderr.trim())));
    }
    Batch::from_bytes(&output.stdout)
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub source: String,
    pub record_count: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Updates that needed a fuzzy description match.
    pub fuzzy_matched: usize,
    /// Updates that moved a record to a different day.
    pub moved: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub anomalies: usize,
    pub skipped_before_cutoff: usize,
    pub balances_updated: usize,
    pub closing_balance: i64,
    pub reported_balance: Option<i64>,
}

impl ImportResult {
    /// True when the bank reported a balance that the stored history does not add up to.
    pub fn balance_mismatch(&self) -> bool {
        self.reported_balance
            .is_some_and(|reported| reported != self.closing_balance)
    }
}

/// Largest accepted `cutoff_days`.
pub const MAX_CUTOFF_DAYS: i64 = 36500;

/// Start of the reconciliation window: an explicit date wins over the
/// source's `cutoff_days`.
pub fn resolve_cutoff(source: &SourceSettings, since: Option<NaiveDate>) -> Result<Option<NaiveDate>> {
    if since.is_some() {
        return Ok(since);
    }
    match source.cutoff_days {
        None => Ok(None),
        Some(days) if (0..=MAX_CUTOFF_DAYS).contains(&days) => {
            Ok(Some(Local::now().date_naive() - Duration::days(days)))
        }
        Some(days) => Err(TallyError::Settings(format!(
            "cutoff_days must be between 0 and {MAX_CUTOFF_DAYS}, got {days}"
        ))),
    }
}

/// Reconcile one batch for `source`, commit it, and refresh balances.
pub fn import_batch(
    conn: &Connection,
    config: ReconcileConfig,
    source: &str,
    batch: Batch,
    opening_balance: i64,
    cutoff: Option<NaiveDate>,
) -> Result<ImportResult> {
    let record_count = batch.transactions.len();
    info!(source, records = record_count, checksum = %batch.checksum, "processing batch");
    let incoming = validate_batch(batch.transactions)?;

    let date_range_start = incoming.iter().map(|t| t.date).min();
    let date_range_end = incoming.iter().map(|t| t.date).max();

    let reconciler = Reconciler::new(config);
    let mut outcome = reconciler.reconcile(conn, incoming, source, cutoff)?;
    let deleted = reconciler.apply(conn, &mut outcome)?;
    let balances = recalculate_balances(conn, source, opening_balance)?;

    if !outcome.anomalies.is_empty() {
        warn!(source, count = outcome.anomalies.len(), ids = ?outcome.anomalies, "posted transactions missing from feed");
    }

    let result = ImportResult {
        source: source.to_string(),
        record_count,
        inserted: outcome.to_insert.len(),
        updated: outcome.updates.len(),
        fuzzy_matched: outcome
            .updates
            .iter()
            .filter(|u| matches!(u.pass, MatchPass::SameDayFuzzy | MatchPass::CrossDayFuzzy))
            .count(),
        moved: outcome.updates.iter().filter(|u| u.date_changed).count(),
        unchanged: outcome.unchanged,
        deleted,
        anomalies: outcome.anomalies.len(),
        skipped_before_cutoff: outcome.skipped_before_cutoff,
        balances_updated: balances.updated,
        closing_balance: balances.closing_balance,
        reported_balance: batch.reported_balance,
    };
    if let Some(reported) = result.reported_balance.filter(|_| result.balance_mismatch()) {
        warn!(
            source,
            reported,
            computed = result.closing_balance,
            "reported balance differs from stored history"
        );
    }

    record_import(
        conn,
        &ImportRecord {
            source: source.to_string(),
            record_count: record_count as i64,
            inserted: result.inserted as i64,
            updated: result.updated as i64,
            unchanged: result.unchanged as i64,
            deleted: result.deleted as i64,
            anomalies: result.anomalies as i64,
            date_range_start: date_range_start.map(|d| d.format(DATE_FORMAT).to_string()),
            date_range_end: date_range_end.map(|d| d.format(DATE_FORMAT).to_string()),
            checksum: batch.checksum,
        },
    )?;

    info!(
        source,
        inserted = result.inserted,
        updated = result.updated,
        fuzzy_matched = result.fuzzy_matched,
        moved = result.moved,
        unchanged = result.unchanged,
        deleted = result.deleted,
        anomalies = result.anomalies,
        skipped = result.skipped_before_cutoff,
        balances_updated = result.balances_updated,
        "import complete"
    );
    Ok(result)
}

/// Scrape and import one configured source.
pub fn import_source(
    conn: &Connection,
    settings: &Settings,
    name: &str,
    since: Option<NaiveDate>,
) -> Result<ImportResult> {
    let source = settings.source(name)?;
    let batch = run_scraper(name, source)?;
    import_batch(
        conn,
        settings.reconcile_config(),
        name,
        batch,
        source.opening_balance,
        resolve_cutoff(source, since)?,
    )
}

/// Import every configured source in turn. Stops at the first failure;
/// sources already imported stay committed.
pub fn import_all(conn: &Connection, settings: &Settings, since: Option<NaiveDate>) -> Result<Vec<ImportResult>> {
    let mut results = Vec::new();
    for name in settings.sources.keys() {
        results.push(import_source(conn, settings, name, since)?);
    }
    Ok(results)
}

fn record_import(conn: &Connection, record: &ImportRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO imports (source, record_count, inserted, updated, unchanged, deleted, anomalies, date_range_start, date_range_end, checksum) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            record.source,
            record.record_count,
            record.inserted,
            record.updated,
            record.unchanged,
            record.deleted,
            record.anomalies,
            record.date_range_start,
            record.date_range_end,
            record.checksum,
        ],
    )?;
    Ok(())
}

/// Most recent import per source: (source, import date, inserted, updated, deleted).
pub fn last_imports(conn: &Connection) -> Result<Vec<(String, String, i64, i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT source, import_date, inserted, updated, deleted FROM imports \
         WHERE id IN (SELECT MAX(id) FROM imports GROUP BY source) ORDER BY source",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::models::Transaction;
    use crate::store::{TransactionFilter, TransactionStore};

    const FOO_BATCH: &str = r#"{"balance": 0, "transactions": [
        {"date": "2023-08-03", "amount": -3140, "description": "FOO BAR PTY LTD        SOMETOWN    AU", "source": "bank of foo"},
        {"date": "2023-08-03", "amount": -3423, "description": "PAYPAL *MENULOGPTYL      2938473727   AU", "source": "bank of foo"},
        {"date": "2023-08-05", "amount": -7745, "description": "ALLDAY PET INSURANC    FOOVILLE    AU", "source": "bank of foo", "pending": true}
    ]}"#;

    fn batch(json: &str) -> Batch {
        Batch::from_bytes(json.as_bytes()).unwrap()
    }

    fn import(conn: &Connection, json: &str) -> Result<ImportResult> {
        import_batch(conn, ReconcileConfig::default(), "bank of foo", batch(json), 2234, None)
    }

    #[test]
    fn test_parse_batch_wrapped_and_bare() {
        let wrapped = parse_batch(FOO_BATCH.as_bytes()).unwrap();
        assert_eq!(wrapped.transactions.len(), 3);
        assert_eq!(wrapped.balance, Some(0));
        let bare = r#"[{"date": "2023-08-07", "amount": -15400, "description": "Osko", "source": "Bar Inc"}]"#;
        let bare = parse_batch(bare.as_bytes()).unwrap();
        assert_eq!(bare.transactions.len(), 1);
        assert_eq!(bare.balance, None);
        assert!(parse_batch(b"not json").is_err());
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(batch(FOO_BATCH).checksum, batch(FOO_BATCH).checksum);
        assert_eq!(batch(FOO_BATCH).checksum.len(), 64);
    }

    #[test]
    fn test_import_batch_inserts_and_balances() {
        let (_dir, conn) = test_db();
        let result = import(&conn, FOO_BATCH).unwrap();
        assert_eq!(result.record_count, 3);
        assert_eq!(result.inserted, 3);
        assert_eq!(result.balances_updated, 3);
        assert_eq!(result.closing_balance, 2234 - 3140 - 3423 - 7745);
        assert_eq!(result.reported_balance, Some(0));
        assert!(result.balance_mismatch());

        let txns = conn.query_transactions(&TransactionFilter::for_source("bank of foo")).unwrap();
        let balances: Vec<i64> = txns.iter().map(|t| t.balance).collect();
        assert_eq!(balances, vec![2234 - 3140, 2234 - 3140 - 3423, 2234 - 3140 - 3423 - 7745]);

        let recorded: i64 = conn.query_row("SELECT inserted FROM imports", [], |r| r.get(0)).unwrap();
        assert_eq!(recorded, 3);
    }

    #[test]
    fn test_reimport_changes_nothing() {
        let (_dir, conn) = test_db();
        import(&conn, FOO_BATCH).unwrap();
        let again = import(&conn, FOO_BATCH).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.deleted, 0);
        assert_eq!(again.unchanged, 3);
        assert_eq!(again.balances_updated, 0);
        let runs = last_imports(&conn).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].2, 0);
    }

    #[test]
    fn test_malformed_batch_leaves_store_untouched() {
        let (_dir, conn) = test_db();
        let pending = conn
            .insert_transaction(&Transaction::new(
                NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
                -500,
                "HOLD",
                "bank of foo",
                true,
            ))
            .unwrap();
        let bad = r#"[
            {"date": "2023-08-03", "amount": -3140, "description": "FOO", "source": "bank of foo"},
            {"date": "2023-08-03", "description": "NO AMOUNT", "source": "bank of foo"}
        ]"#;
        let err = import(&conn, bad).unwrap_err();
        assert!(matches!(err, TallyError::MalformedTransaction { index: 1, .. }));
        assert!(conn.get_transaction(pending).unwrap().is_some());
        let count: i64 = conn.query_row("SELECT count(*) FROM txn", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_resolve_cutoff() {
        let explicit = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let source = SourceSettings {
            cutoff_days: Some(30),
            ..SourceSettings::default()
        };
        assert_eq!(resolve_cutoff(&source, Some(explicit)).unwrap(), Some(explicit));
        assert_eq!(
            resolve_cutoff(&source, None).unwrap(),
            Some(Local::now().date_naive() - Duration::days(30))
        );
        assert_eq!(resolve_cutoff(&SourceSettings::default(), None).unwrap(), None);
    }

    #[test]
    fn test_resolve_cutoff_rejects_out_of_range_days() {
        for days in [-1, MAX_CUTOFF_DAYS + 1, i64::MAX] {
            let source = SourceSettings {
                cutoff_days: Some(days),
                ..SourceSettings::default()
            };
            assert!(matches!(resolve_cutoff(&source, None), Err(TallyError::Settings(_))));
        }
        let explicit = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let source = SourceSettings {
            cutoff_days: Some(-5),
            ..SourceSettings::default()
        };
        assert_eq!(resolve_cutoff(&source, Some(explicit)).unwrap(), Some(explicit));
    }

    #[test]
    fn test_reported_balance_that_adds_up() {
        let (_dir, conn) = test_db();
        let json = FOO_BATCH.replace(r#""balance": 0"#, r#""balance": -12074"#);
        let result = import(&conn, &json).unwrap();
        assert_eq!(result.closing_balance, -12074);
        assert!(!result.balance_mismatch());

        let bare = r#"[{"date": "2023-08-07", "amount": -15400, "description": "Osko", "source": "bank of foo"}]"#;
        let result = import(&conn, bare).unwrap();
        assert_eq!(result.reported_balance, None);
        assert!(!result.balance_mismatch());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_scraper_reads_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, FOO_BATCH).unwrap();
        let source = SourceSettings {
            command: vec!["cat".to_string(), path.to_string_lossy().to_string()],
            ..SourceSettings::default()
        };
        let batch = run_scraper("bank of foo", &source).unwrap();
        assert_eq!(batch.transactions.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_scraper_failure() {
        let source = SourceSettings {
            command: vec!["false".to_string()],
            ..SourceSettings::default()
        };
        assert!(matches!(run_scraper("x", &source), Err(TallyError::Scraper { .. })));
        assert!(matches!(
            run_scraper("x", &SourceSettings::default()),
            Err(TallyError::Scraper { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_import_all_runs_every_source() {
        let (dir, conn) = test_db();
        let foo_path = dir.path().join("foo.json");
        let bar_path = dir.path().join("bar.json");
        std::fs::write(&foo_path, FOO_BATCH).unwrap();
        std::fs::write(
            &bar_path,
            r#"[{"date": "2023-08-07", "amount": -15400, "description": "Osko Withdrawal", "source": "Bar Inc"}]"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        for (name, path, opening) in [("bank of foo", &foo_path, 2234), ("Bar Inc", &bar_path, -48392)] {
            settings.sources.insert(
                name.to_string(),
                SourceSettings {
                    command: vec!["cat".to_string(), path.to_string_lossy().to_string()],
                    opening_balance: opening,
                    cutoff_days: None,
                },
            );
        }

        let results = import_all(&conn, &settings, None).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(names, vec!["Bar Inc", "bank of foo"]);
        assert_eq!(results[0].inserted, 1);
        assert_eq!(results[0].closing_balance, -48392 - 15400);
        assert_eq!(results[1].inserted, 3);
        assert_eq!(last_imports(&conn).unwrap().len(), 2);

        std::fs::write(&foo_path, "[]").unwrap();
        settings.sources.insert(
            "broken".to_string(),
            SourceSettings {
                command: vec!["false".to_string()],
                ..SourceSettings::default()
            },
        );
        let err = import_all(&conn, &settings, None).unwrap_err();
        assert!(matches!(err, TallyError::Scraper { ref source_name, .. } if source_name == "broken"));
    }
}

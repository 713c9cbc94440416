use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{Result, TallyError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Option<i64>,
    pub date: NaiveDate,
    /// Signed minor currency units; negative is a debit.
    pub amount: i64,
    pub description: String,
    pub source: String,
    pub pending: bool,
    pub balance: i64,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        amount: i64,
        description: impl Into<String>,
        source: impl Into<String>,
        pending: bool,
    ) -> Self {
        Self {
            id: None,
            date,
            amount,
            description: description.into(),
            source: source.into(),
            pending,
            balance: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub id: i64,
    pub amount: i64,
    pub category: String,
    pub location: String,
    pub note: Option<String>,
}

/// One row of the import audit log.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub source: String,
    pub record_count: i64,
    pub inserted: i64,
    pub updated: i64,
    pub unchanged: i64,
    pub deleted: i64,
    pub anomalies: i64,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
    pub checksum: String,
}

/// A transaction as emitted by a scraper, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    pub date: Option<String>,
    pub amount: Option<i64>,
    pub description: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub pending: bool,
}

impl RawTransaction {
    fn validate(self, index: usize) -> Result<Transaction> {
        let malformed = |reason: &str| TallyError::MalformedTransaction {
            index,
            reason: reason.to_string(),
        };
        let raw_date = self.date.ok_or_else(|| malformed("missing date"))?;
        let date = NaiveDate::parse_from_str(raw_date.trim(), DATE_FORMAT)
            .map_err(|_| malformed(&format!("invalid date '{raw_date}'")))?;
        let amount = self.amount.ok_or_else(|| malformed("missing amount"))?;
        let description = self.description.ok_or_else(|| malformed("missing description"))?;
        let source = self.source.ok_or_else(|| malformed("missing source"))?;
        Ok(Transaction::new(date, amount, description, source, self.pending))
    }
}

/// Validate a whole batch. The first malformed record fails the batch.
pub fn validate_batch(raw: Vec<RawTransaction>) -> Result<Vec<Transaction>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, txn)| txn.validate(index))
        .collect()
}

/// JSON document written to stdout by a scraper command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScraperOutput {
    #[serde(default)]
    pub balance: Option<i64>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

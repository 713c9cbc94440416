use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::error::Result;
use crate::models::{Allocation, Transaction, DATE_FORMAT};

/// Restricts a transaction query. Results are always ordered by date, then id.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub source: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub amount: Option<i64>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn for_source(source: &str) -> Self {
        Self {
            source: Some(source.to_string()),
            ..Self::default()
        }
    }

    pub fn since(mut self, date: Option<NaiveDate>) -> Self {
        self.since = date;
        self
    }
}

/// Persistence seam used by the reconciler and the balance recalculator.
pub trait TransactionStore {
    /// Insert a transaction plus its default allocation, returning the new id.
    fn insert_transaction(&self, txn: &Transaction) -> Result<i64>;

    /// Overwrite date, amount, description, source, balance and pending of `id`.
    fn update_transaction(&self, id: i64, txn: &Transaction) -> Result<()>;

    fn query_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    fn get_transaction(&self, id: i64) -> Result<Option<Transaction>>;

    /// Delete transactions and their allocations. Returns the number of transactions removed.
    fn delete_transactions(&self, ids: &[i64]) -> Result<usize>;
}

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: Some(row.get(0)?),
        date: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        source: row.get(4)?,
        balance: row.get(5)?,
        pending: row.get(6)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl TransactionStore for Connection {
    fn insert_transaction(&self, txn: &Transaction) -> Result<i64> {
        self.execute(
            "INSERT INTO txn (date, amount, description, source, balance, pending) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![txn.date, txn.amount, txn.description, txn.source, txn.balance, txn.pending],
        )?;
        let id = self.last_insert_rowid();
        self.execute(
            "INSERT INTO allocation (amount, txn_id, category_id, location_id) VALUES (?1, ?2, 1, 1)",
            rusqlite::params![txn.amount, id],
        )?;
        Ok(id)
    }

    fn update_transaction(&self, id: i64, txn: &Transaction) -> Result<()> {
        self.execute(
            "UPDATE txn SET date = ?1, amount = ?2, description = ?3, source = ?4, balance = ?5, pending = ?6 WHERE id = ?7",
            rusqlite::params![txn.date, txn.amount, txn.description, txn.source, txn.balance, txn.pending, id],
        )?;
        Ok(())
    }

    fn query_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(source) = &filter.source {
            clauses.push("source = ?");
            params.push(Value::Text(source.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("date >= ?");
            params.push(Value::Text(since.format(DATE_FORMAT).to_string()));
        }
        if let Some(until) = filter.until {
            clauses.push("date <= ?");
            params.push(Value::Text(until.format(DATE_FORMAT).to_string()));
        }
        if let Some(amount) = filter.amount {
            clauses.push("amount = ?");
            params.push(Value::Integer(amount));
        }

        let mut sql = String::from("SELECT id, date, amount, description, source, balance, pending FROM txn");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date ASC, id ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let mut stmt = self.prepare(
            "SELECT id, date, amount, description, source, balance, pending FROM txn WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_transaction)?;
        Ok(rows.next().transpose()?)
    }

    fn delete_transactions(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let marks = placeholders(ids.len());
        self.execute(
            &format!("DELETE FROM allocation WHERE txn_id IN ({marks})"),
            params_from_iter(ids.iter()),
        )?;
        let removed = self.execute(
            &format!("DELETE FROM txn WHERE id IN ({marks})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(removed)
    }
}

pub fn allocations_for(conn: &Connection, txn_id: i64) -> Result<Vec<Allocation>> {
    let mut stmt = conn.prepare(
        "SELECT allocation.id, allocation.amount, category.name, location.name, allocation.note \
         FROM allocation \
         LEFT JOIN category ON category_id = category.id \
         LEFT JOIN location ON location_id = location.id \
         WHERE txn_id = ?1 ORDER BY allocation.id",
    )?;
    let rows = stmt
        .query_map([txn_id], |row| {
            Ok(Allocation {
                id: row.get(0)?,
                amount: row.get(1)?,
                category: row.get(2)?,
                location: row.get(3)?,
                note: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

use tracing::{debug, info};

use crate::error::{Result, TallyError};
use crate::store::{TransactionFilter, TransactionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceRun {
    /// Records whose stored balance was rewritten.
    pub updated: usize,
    /// Running total after the last record.
    pub closing_balance: i64,
}

/// Recompute the running balance of every transaction of `source`.
///
/// Transactions are walked in (date, id) order starting from
/// `opening_balance`. Only records whose stored balance differs are written,
/// so a second run with the same inputs writes nothing.
pub fn recalculate_balances<S: TransactionStore + ?Sized>(
    store: &S,
    source: &str,
    opening_balance: i64,
) -> Result<BalanceRun> {
    let txns = store.query_transactions(&TransactionFilter::for_source(source))?;
    debug!(source, count = txns.len(), opening_balance, "recalculating balances");

    let mut running_total = opening_balance;
    let mut updated = 0usize;
    for mut txn in txns {
        running_total = running_total.checked_add(txn.amount).ok_or_else(|| {
            TallyError::Other(format!(
                "balance of {source} overflows at transaction {:?} ({} on {})",
                txn.id, txn.amount, txn.date
            ))
        })?;
        if txn.balance == running_total {
            continue;
        }
        let Some(id) = txn.id else { continue };
        let old_balance = txn.balance;
        txn.balance = running_total;
        store.update_transaction(id, &txn)?;
        debug!(
            id,
            source,
            date = %txn.date,
            amount = txn.amount,
            description = %txn.description,
            old_balance,
            new_balance = txn.balance,
            "updated balance"
        );
        updated += 1;
    }

    info!(source, updated, closing_balance = running_total, "balances recalculated");
    Ok(BalanceRun {
        updated,
        closing_balance: running_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::models::Transaction;
    use chrono::NaiveDate;

    fn add(conn: &rusqlite::Connection, d: u32, amount: i64, source: &str) -> i64 {
        let date = NaiveDate::from_ymd_opt(2023, 8, d).unwrap();
        conn.insert_transaction(&Transaction::new(date, amount, "TXN", source, false))
            .unwrap()
    }

    #[test]
    fn test_running_total_in_date_then_id_order() {
        let (_dir, conn) = test_db();
        let c = add(&conn, 7, -15400, "foo");
        let a = add(&conn, 3, -3140, "foo");
        let b = add(&conn, 3, 500, "foo");

        let run = recalculate_balances(&conn, "foo", 2234).unwrap();
        assert_eq!(run.updated, 3);
        assert_eq!(run.closing_balance, 2234 - 3140 + 500 - 15400);
        assert_eq!(conn.get_transaction(a).unwrap().unwrap().balance, 2234 - 3140);
        assert_eq!(conn.get_transaction(b).unwrap().unwrap().balance, 2234 - 3140 + 500);
        assert_eq!(conn.get_transaction(c).unwrap().unwrap().balance, 2234 - 3140 + 500 - 15400);
    }

    #[test]
    fn test_rerun_writes_nothing() {
        let (_dir, conn) = test_db();
        add(&conn, 3, -3140, "foo");
        add(&conn, 4, -3423, "foo");
        assert_eq!(recalculate_balances(&conn, "foo", 0).unwrap().updated, 2);
        assert_eq!(recalculate_balances(&conn, "foo", 0).unwrap().updated, 0);
    }

    #[test]
    fn test_only_changed_records_written() {
        let (_dir, conn) = test_db();
        add(&conn, 3, -100, "foo");
        add(&conn, 5, -200, "foo");
        recalculate_balances(&conn, "foo", 1000).unwrap();
        add(&conn, 4, -50, "foo");
        // The new record and everything after it shift; the first record does not.
        assert_eq!(recalculate_balances(&conn, "foo", 1000).unwrap().updated, 2);
    }

    #[test]
    fn test_sources_are_independent() {
        let (_dir, conn) = test_db();
        let foo = add(&conn, 3, -3140, "foo");
        let bar = add(&conn, 3, -6000, "bar");
        recalculate_balances(&conn, "foo", 2234).unwrap();
        recalculate_balances(&conn, "bar", -48392).unwrap();
        assert_eq!(conn.get_transaction(foo).unwrap().unwrap().balance, 2234 - 3140);
        assert_eq!(conn.get_transaction(bar).unwrap().unwrap().balance, -48392 - 6000);
    }

    #[test]
    fn test_unknown_source_is_noop() {
        let (_dir, conn) = test_db();
        add(&conn, 3, -3140, "foo");
        let run = recalculate_balances(&conn, "nobody", 7).unwrap();
        assert_eq!(run, BalanceRun { updated: 0, closing_balance: 7 });
    }

    #[test]
    fn test_overflow_is_an_error() {
        let (_dir, conn) = test_db();
        add(&conn, 3, i64::MAX, "foo");
        let b = add(&conn, 4, 1, "foo");
        let err = recalculate_balances(&conn, "foo", 0).unwrap_err();
        assert!(matches!(err, TallyError::Other(ref msg) if msg.contains("overflows")));
        assert_eq!(conn.get_transaction(b).unwrap().unwrap().balance, 0);
    }
}

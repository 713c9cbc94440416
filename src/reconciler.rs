use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::{Result, TallyError};
use crate::models::Transaction;
use crate::similarity::{best_match, DESCRIPTION_MATCH_THRESHOLD};
use crate::store::{TransactionFilter, TransactionStore};
use crate::working_set::WorkingSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    /// Minimum description similarity accepted by the fuzzy passes.
    pub match_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            match_threshold: DESCRIPTION_MATCH_THRESHOLD,
        }
    }
}

/// Matching passes, strictest first. Each pass only sees what earlier passes
/// left unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// Same date, amount, description and pending flag.
    Exact,
    /// Same date, amount and description; pending flag ignored.
    StateTransition,
    /// Same date and amount, similar description.
    SameDayFuzzy,
    /// Same amount and description, any date.
    CrossDayExact,
    /// Same amount, similar description, any date.
    CrossDayFuzzy,
}

impl MatchPass {
    pub const TRANSITIONS: [MatchPass; 4] = [
        MatchPass::StateTransition,
        MatchPass::SameDayFuzzy,
        MatchPass::CrossDayExact,
        MatchPass::CrossDayFuzzy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::StateTransition => "state_transition",
            Self::SameDayFuzzy => "same_day_fuzzy",
            Self::CrossDayExact => "cross_day_exact",
            Self::CrossDayFuzzy => "cross_day_fuzzy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedUpdate {
    pub id: i64,
    pub pass: MatchPass,
    pub date_changed: bool,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Genuinely new records, in batch order. Ids are filled in by `apply`.
    pub to_insert: Vec<Transaction>,
    /// Pending records that vanished from the feed.
    pub to_delete: Vec<i64>,
    /// Records already stored exactly as received.
    pub unchanged: usize,
    /// Records updated in place during reconciliation.
    pub updates: Vec<MatchedUpdate>,
    /// Posted records missing from the feed. Logged, never deleted.
    pub anomalies: Vec<i64>,
    pub skipped_before_cutoff: usize,
}

pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// Merge a freshly scraped batch for one source into the store.
    ///
    /// State transitions (pending to posted, description drift, date moves)
    /// are written immediately. Inserts and deletes are returned in the
    /// outcome and committed with [`Reconciler::apply`].
    pub fn reconcile<S: TransactionStore + ?Sized>(
        &self,
        store: &S,
        incoming: Vec<Transaction>,
        source: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<ReconcileOutcome> {
        if let Some(stray) = incoming.iter().find(|t| t.source != source) {
            return Err(TallyError::SourceMismatch {
                expected: source.to_string(),
                found: stray.source.clone(),
            });
        }

        let total = incoming.len();
        let incoming: Vec<Transaction> = match cutoff {
            Some(cutoff) => incoming.into_iter().filter(|t| t.date >= cutoff).collect(),
            None => incoming,
        };
        let mut outcome = ReconcileOutcome {
            skipped_before_cutoff: total - incoming.len(),
            ..ReconcileOutcome::default()
        };
        if outcome.skipped_before_cutoff > 0 {
            debug!(source, skipped = outcome.skipped_before_cutoff, "ignoring records before cutoff");
        }

        let existing = store.query_transactions(&TransactionFilter::for_source(source).since(cutoff))?;
        info!(source, incoming = incoming.len(), existing = existing.len(), "reconciling batch");

        let mut incoming = WorkingSet::new(incoming);
        let mut existing = WorkingSet::new(existing);

        self.run_pass(store, MatchPass::Exact, &mut incoming, &mut existing, &mut outcome)?;

        if !existing.is_empty() {
            for stale in existing.take_where(|t| !t.pending) {
                warn!(
                    id = stale.id,
                    source,
                    date = %stale.date,
                    amount = stale.amount,
                    description = %stale.description,
                    "posted transaction missing from feed"
                );
                outcome.anomalies.extend(stale.id);
            }
        }

        for pass in MatchPass::TRANSITIONS {
            if existing.is_empty() || incoming.is_empty() {
                break;
            }
            self.run_pass(store, pass, &mut incoming, &mut existing, &mut outcome)?;
        }

        outcome.to_insert = incoming.into_remaining();
        for txn in &outcome.to_insert {
            debug!(
                source,
                date = %txn.date,
                amount = txn.amount,
                description = %txn.description,
                pending = txn.pending,
                "no match, queued for insert"
            );
        }
        for stale in existing.into_remaining() {
            debug!(
                id = stale.id,
                source,
                date = %stale.date,
                amount = stale.amount,
                description = %stale.description,
                "pending transaction vanished from feed, queued for delete"
            );
            outcome.to_delete.extend(stale.id);
        }

        info!(
            source,
            unchanged = outcome.unchanged,
            updated = outcome.updates.len(),
            to_insert = outcome.to_insert.len(),
            to_delete = outcome.to_delete.len(),
            anomalies = outcome.anomalies.len(),
            "reconciliation complete"
        );
        Ok(outcome)
    }

    /// Commit the inserts and deletes decided by [`Reconciler::reconcile`].
    /// Returns the number of deleted records.
    pub fn apply<S: TransactionStore + ?Sized>(&self, store: &S, outcome: &mut ReconcileOutcome) -> Result<usize> {
        for txn in &mut outcome.to_insert {
            let id = store.insert_transaction(txn)?;
            txn.id = Some(id);
            info!(
                id,
                source = %txn.source,
                date = %txn.date,
                amount = txn.amount,
                description = %txn.description,
                pending = txn.pending,
                "inserted new transaction"
            );
        }
        let deleted = store.delete_transactions(&outcome.to_delete)?;
        for id in &outcome.to_delete {
            info!(id, "deleted vanished pending transaction");
        }
        Ok(deleted)
    }

    fn run_pass<S: TransactionStore + ?Sized>(
        &self,
        store: &S,
        pass: MatchPass,
        incoming: &mut WorkingSet<Transaction>,
        existing: &mut WorkingSet<Transaction>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<()> {
        for i in incoming.indices() {
            let candidate = match incoming.get(i) {
                Some(txn) => self.find_candidate(pass, txn, existing),
                None => None,
            };
            let Some((j, similarity)) = candidate else {
                continue;
            };
            // Claim the stored record first so a miss leaves the incoming one queued.
            let Some(old) = existing.take(j) else {
                continue;
            };
            let Some(txn) = incoming.take(i) else {
                continue;
            };
            if pass == MatchPass::Exact {
                debug!(
                    id = old.id,
                    source = %old.source,
                    date = %old.date,
                    amount = old.amount,
                    description = %old.description,
                    "transaction already stored"
                );
                outcome.unchanged += 1;
            } else {
                outcome.updates.push(self.transition(store, pass, txn, old, similarity)?);
            }
        }
        debug!(
            pass = pass.name(),
            incoming_left = incoming.len(),
            existing_left = existing.len(),
            "pass complete"
        );
        Ok(())
    }

    /// Index into `existing` of the record `txn` matches in `pass`, with the
    /// description similarity that justified it.
    fn find_candidate(
        &self,
        pass: MatchPass,
        txn: &Transaction,
        existing: &WorkingSet<Transaction>,
    ) -> Option<(usize, f64)> {
        let exact = |pred: &dyn Fn(&Transaction) -> bool| {
            existing.iter().find(|(_, e)| pred(*e)).map(|(j, _)| (j, 1.0_f64))
        };
        let fuzzy = |pred: &dyn Fn(&Transaction) -> bool| {
            let candidates = existing
                .iter()
                .filter(|(_, e)| pred(*e))
                .map(|(j, e)| (j, e.description.as_str()));
            best_match(&txn.description, candidates, self.config.match_threshold)
        };

        match pass {
            MatchPass::Exact => exact(&|e: &Transaction| {
                e.date == txn.date
                    && e.amount == txn.amount
                    && e.description == txn.description
                    && e.pending == txn.pending
            }),
            MatchPass::StateTransition => {
                exact(&|e: &Transaction| e.date == txn.date && e.amount == txn.amount && e.description == txn.description)
            }
            MatchPass::SameDayFuzzy => fuzzy(&|e: &Transaction| e.date == txn.date && e.amount == txn.amount),
            MatchPass::CrossDayExact => exact(&|e: &Transaction| e.amount == txn.amount && e.description == txn.description),
            MatchPass::CrossDayFuzzy => fuzzy(&|e: &Transaction| e.amount == txn.amount),
        }
    }

    /// Overwrite a stored pending record with the state the bank now reports.
    fn transition<S: TransactionStore + ?Sized>(
        &self,
        store: &S,
        pass: MatchPass,
        mut txn: Transaction,
        old: Transaction,
        similarity: f64,
    ) -> Result<MatchedUpdate> {
        let id = old
            .id
            .ok_or_else(|| TallyError::Other("stored transaction without id".to_string()))?;
        txn.id = Some(id);
        store.update_transaction(id, &txn)?;

        let date_changed = old.date != txn.date;
        info!(
            pass = pass.name(),
            id,
            source = %txn.source,
            amount = txn.amount,
            old_date = %old.date,
            new_date = %txn.date,
            old_description = %old.description,
            new_description = %txn.description,
            pending = txn.pending,
            similarity,
            "updated existing transaction"
        );
        if date_changed {
            info!(id, from = %old.date, to = %txn.date, "transaction moved to a different day");
        }
        Ok(MatchedUpdate { id, pass, date_changed })
    }
}

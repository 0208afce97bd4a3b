//! YNAB→Splitwise: sharing flagged budget transactions with the group.

use super::SyncEngine;
use crate::convert::to_new_expense;
use crate::ledger::{BudgetLedger, SharedLedger};
use crate::model::{BudgetTransaction, FlagColor, GroupId};
use crate::state::SyncCursor;
use crate::{Direction, Result, Tz};
use anyhow::Context;
use chrono::DateTime;
use std::fmt;
use tracing::{debug, error, info, warn};

const DIRECTION: Direction = Direction::YnabToSplitwise;

#[derive(Debug)]
pub enum ToSplitwiseReport {
    Skipped(SkipReason),
    Completed(BatchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoFlagColor,
    NoGroup,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoFlagColor => f.write_str("no flag color configured"),
            SkipReason::NoGroup => f.write_str("Splitwise group not found"),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub window_start: DateTime<Tz>,
    pub fetched: usize,
    pub records: Vec<RecordResult>,
}

impl BatchOutcome {
    pub fn synced(&self) -> impl Iterator<Item = &RecordResult> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, RecordOutcome::Synced { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordResult> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, RecordOutcome::Failed { .. }))
    }
}

#[derive(Debug)]
pub struct RecordResult {
    pub transaction_id: String,
    pub outcome: RecordOutcome,
}

#[derive(Debug)]
pub enum RecordOutcome {
    /// The expense exists in Splitwise; the transaction is never exported again.
    Synced {
        expense_id: String,
        flag_cleared: bool,
    },
    /// Creating the expense failed; the transaction is retried next run.
    Failed { error: anyhow::Error },
}

fn select_flagged<'a>(
    transactions: &'a [BudgetTransaction],
    cursor: &SyncCursor,
    flag_color: FlagColor,
) -> Vec<&'a BudgetTransaction> {
    let mut selected: Vec<&BudgetTransaction> = Vec::new();
    for transaction in transactions {
        if transaction.flag_color != Some(flag_color) || transaction.deleted {
            continue;
        }
        if cursor.is_synced(&transaction.id) {
            debug!("Skipping already exported transaction {}", transaction.id);
            continue;
        }
        if selected.iter().any(|other| other.id == transaction.id) {
            continue;
        }
        selected.push(transaction);
    }
    selected
}

impl<S: SharedLedger, B: BudgetLedger> SyncEngine<S, B> {
    /// Exports YNAB transactions carrying the configured flag to Splitwise.
    ///
    /// Each transaction is handled on its own: a failed export is reported and
    /// retried next run, a failure to clear the flag afterwards only warns.
    pub fn sync_to_splitwise(&self, now: DateTime<Tz>) -> Result<ToSplitwiseReport> {
        let Some(flag_color) = self.settings.flag_color else {
            info!("No flag color configured, skipping {DIRECTION}");
            return Ok(ToSplitwiseReport::Skipped(SkipReason::NoFlagColor));
        };
        let Some(group_id) = self.settings.group_id else {
            warn!("Splitwise group not found, skipping {DIRECTION}");
            return Ok(ToSplitwiseReport::Skipped(SkipReason::NoGroup));
        };

        let cursor = self.store.load_cursor(DIRECTION);
        let window_start = cursor.window_start(now);
        let since = window_start.date_naive();
        info!("Fetching YNAB transactions since {since} flagged {flag_color}");

        let transactions = self
            .budget
            .fetch_transactions_since(&self.settings.budget_id, since)
            .context("Failed to fetch YNAB transactions")?;
        let flagged = select_flagged(&transactions, &cursor, flag_color);
        info!("Exporting {} transaction(s) to Splitwise", flagged.len());

        let records: Vec<RecordResult> = flagged
            .into_iter()
            .map(|transaction| RecordResult {
                transaction_id: transaction.id.clone(),
                outcome: self.export_transaction(transaction, group_id),
            })
            .collect();

        let synced_ids = records
            .iter()
            .filter(|record| matches!(record.outcome, RecordOutcome::Synced { .. }))
            .map(|record| record.transaction_id.clone());
        self.store.mark_synced(DIRECTION, synced_ids)?;
        self.store.save_timestamp(DIRECTION, now)?;

        Ok(ToSplitwiseReport::Completed(BatchOutcome {
            window_start,
            fetched: transactions.len(),
            records,
        }))
    }

    fn export_transaction(
        &self,
        transaction: &BudgetTransaction,
        group_id: GroupId,
    ) -> RecordOutcome {
        let expense = to_new_expense(transaction, group_id);
        let expense_id = match self.shared.create_expense(&expense) {
            Ok(expense_id) => expense_id,
            Err(error) => {
                error!(
                    "Failed to export transaction {} ({}): {error:#}",
                    transaction.id, expense.description
                );
                return RecordOutcome::Failed { error };
            }
        };
        info!(
            "Exported transaction {} as Splitwise expense {expense_id} ({} {})",
            transaction.id, expense.description, expense.cost
        );

        let flag_cleared = match self
            .budget
            .update_flag(&self.settings.budget_id, &transaction.id, None)
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Exported transaction {} but failed to clear its flag: {e:#}",
                    transaction.id
                );
                false
            }
        };

        RecordOutcome::Synced {
            expense_id,
            flag_cleared,
        }
    }
}

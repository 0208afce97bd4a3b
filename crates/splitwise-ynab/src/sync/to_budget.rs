//! Splitwise→YNAB: importing shared expenses into the budget account.

use super::SyncEngine;
use crate::convert::to_budget_transaction;
use crate::ledger::{BudgetLedger, SharedLedger};
use crate::model::{Expense, NewBudgetTransaction};
use crate::state::SyncCursor;
use crate::{Direction, Result, Tz};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info};

const DIRECTION: Direction = Direction::SplitwiseToYnab;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToBudgetReport {
    pub window_start: DateTime<Tz>,
    pub fetched: usize,
    pub deleted: usize,
    pub already_synced: usize,
    /// Expenses that could not be decoded or whose amount could not be
    /// represented in YNAB.
    pub invalid: usize,
    pub created: usize,
}

/// The transactions to create for one window, and what was left out.
#[derive(Debug, Default, PartialEq, Eq)]
struct BudgetImport {
    transactions: Vec<NewBudgetTransaction>,
    expense_ids: Vec<String>,
    deleted: usize,
    already_synced: usize,
    invalid: usize,
}

fn plan_budget_import(expenses: &[Expense], cursor: &SyncCursor, account_id: &str) -> BudgetImport {
    let mut import = BudgetImport::default();
    let mut seen = HashSet::new();

    for expense in expenses {
        if expense.is_deleted() {
            debug!("Skipping deleted expense {}", expense.id);
            import.deleted += 1;
            continue;
        }
        if cursor.is_synced(&expense.id) || !seen.insert(expense.id.as_str()) {
            debug!("Skipping already synced expense {}", expense.id);
            import.already_synced += 1;
            continue;
        }

        match to_budget_transaction(expense, account_id) {
            Ok(transaction) => {
                import.transactions.push(transaction);
                import.expense_ids.push(expense.id.clone());
            }
            Err(e) => {
                error!("Skipping expense {}: {e:#}", expense.id);
                import.invalid += 1;
            }
        }
    }

    import
}

impl<S: SharedLedger, B: BudgetLedger> SyncEngine<S, B> {
    /// Imports Splitwise expenses updated since the last run into YNAB.
    ///
    /// All new expenses are created in a single request. If it fails, no
    /// progress is saved and the next run retries the same window.
    ///
    /// The fetch has no upper bound, so expenses created earlier in the same
    /// run are included. Records seen again next time are already synced.
    pub fn sync_to_budget(&self, now: DateTime<Tz>) -> Result<ToBudgetReport> {
        let cursor = self.store.load_cursor(DIRECTION);
        let window_start = cursor.window_start(now);
        info!("Fetching Splitwise expenses updated since {window_start}");

        let fetched = self
            .shared
            .fetch_expenses(window_start.with_timezone(&Utc))
            .context("Failed to fetch Splitwise expenses")?;
        if fetched.undecodable > 0 {
            error!("Skipped {} undecodable Splitwise expense(s)", fetched.undecodable);
        }
        let import = plan_budget_import(&fetched.expenses, &cursor, &self.settings.account_id);

        let created = import.transactions.len();
        if import.transactions.is_empty() {
            info!("No new expenses to write to YNAB");
        } else {
            info!("Writing {created} transaction(s) to YNAB");
            let transaction_ids = self
                .budget
                .create_transactions(&self.settings.budget_id, &import.transactions)
                .context("Failed to create YNAB transactions")?;
            debug!("Created YNAB transactions {transaction_ids:?}");
            self.store.mark_synced(DIRECTION, import.expense_ids)?;
        }
        self.store.save_timestamp(DIRECTION, now)?;

        Ok(ToBudgetReport {
            window_start,
            fetched: fetched.len(),
            deleted: import.deleted,
            already_synced: import.already_synced,
            invalid: import.invalid + fetched.undecodable,
            created,
        })
    }
}

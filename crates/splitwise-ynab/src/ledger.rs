//! The seams between the sync engine and the two external ledgers.
//!
//! [`crate::splitwise::SplitwiseClient`] and [`crate::ynab::YnabClient`] talk to
//! the real APIs; tests plug in in-memory ledgers.

use crate::Result;
use crate::model::{BudgetTransaction, Expense, FlagColor, GroupId, NewBudgetTransaction, NewExpense};
use chrono::{DateTime, NaiveDate, Utc};

/// The result of one expense fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedExpenses {
    pub expenses: Vec<Expense>,
    /// Records left out because they could not be decoded.
    pub undecodable: usize,
}

impl FetchedExpenses {
    /// Number of records the ledger returned, decodable or not.
    pub fn len(&self) -> usize {
        self.expenses.len() + self.undecodable
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The shared-expense tracker (Splitwise).
pub trait SharedLedger {
    /// All expenses visible to the current user updated at or after `updated_after`.
    fn fetch_expenses(&self, updated_after: DateTime<Utc>) -> Result<FetchedExpenses>;

    fn resolve_group_id(&self, name: &str) -> Result<Option<GroupId>>;

    /// Creates an equally split expense and returns its id.
    fn create_expense(&self, expense: &NewExpense) -> Result<String>;
}

/// The personal budget (YNAB).
pub trait BudgetLedger {
    fn resolve_budget_id(&self, name: &str) -> Result<Option<String>>;

    fn resolve_account_id(&self, budget_id: &str, name: &str) -> Result<Option<String>>;

    /// Transactions dated on or after `since`, including deleted ones.
    fn fetch_transactions_since(
        &self,
        budget_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<BudgetTransaction>>;

    /// Creates all transactions in one request and returns their ids.
    fn create_transactions(
        &self,
        budget_id: &str,
        transactions: &[NewBudgetTransaction],
    ) -> Result<Vec<String>>;

    /// Sets or clears (`None`) a transaction's flag.
    fn update_flag(
        &self,
        budget_id: &str,
        transaction_id: &str,
        flag_color: Option<FlagColor>,
    ) -> Result<()>;
}

impl<T: SharedLedger + ?Sized> SharedLedger for &T {
    fn fetch_expenses(&self, updated_after: DateTime<Utc>) -> Result<FetchedExpenses> {
        (**self).fetch_expenses(updated_after)
    }

    fn resolve_group_id(&self, name: &str) -> Result<Option<GroupId>> {
        (**self).resolve_group_id(name)
    }

    fn create_expense(&self, expense: &NewExpense) -> Result<String> {
        (**self).create_expense(expense)
    }
}

impl<T: BudgetLedger + ?Sized> BudgetLedger for &T {
    fn resolve_budget_id(&self, name: &str) -> Result<Option<String>> {
        (**self).resolve_budget_id(name)
    }

    fn resolve_account_id(&self, budget_id: &str, name: &str) -> Result<Option<String>> {
        (**self).resolve_account_id(budget_id, name)
    }

    fn fetch_transactions_since(
        &self,
        budget_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<BudgetTransaction>> {
        (**self).fetch_transactions_since(budget_id, since)
    }

    fn create_transactions(
        &self,
        budget_id: &str,
        transactions: &[NewBudgetTransaction],
    ) -> Result<Vec<String>> {
        (**self).create_transactions(budget_id, transactions)
    }

    fn update_flag(
        &self,
        budget_id: &str,
        transaction_id: &str,
        flag_color: Option<FlagColor>,
    ) -> Result<()> {
        (**self).update_flag(budget_id, transaction_id, flag_color)
    }
}

//! In-memory ledgers for engine tests.

use super::{SyncEngine, SyncSettings};
use crate::ledger::{BudgetLedger, FetchedExpenses, SharedLedger};
use crate::model::{
    BudgetTransaction, Expense, FlagColor, GroupId, NewBudgetTransaction, NewExpense,
};
use crate::state::StateStore;
use crate::{Decimal, Result, Tz};
use anyhow::bail;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Australia::Sydney;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

pub fn sydney(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
    Sydney.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn expense(id: &str, description: &str, net_amount: &str, updated_at: DateTime<Tz>) -> Expense {
    let updated_at = updated_at.with_timezone(&Utc);
    Expense {
        id: id.into(),
        description: description.into(),
        net_amount: Decimal::from_str(net_amount).unwrap(),
        date: updated_at.date_naive(),
        deleted_at: None,
        created_at: updated_at,
        updated_at,
    }
}

pub fn transaction(id: &str, amount: i64, flag_color: Option<FlagColor>) -> BudgetTransaction {
    BudgetTransaction {
        id: id.into(),
        payee_name: Some(format!("Payee {id}")),
        amount,
        date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
        flag_color,
        deleted: false,
    }
}

pub fn engine<'a>(
    splitwise: &'a FakeSplitwise,
    ynab: &'a FakeYnab,
    state_dir: &Path,
) -> SyncEngine<&'a FakeSplitwise, &'a FakeYnab> {
    engine_with(splitwise, ynab, state_dir, Some(FlagColor::Purple), Some(77))
}

pub fn engine_with<'a>(
    splitwise: &'a FakeSplitwise,
    ynab: &'a FakeYnab,
    state_dir: &Path,
    flag_color: Option<FlagColor>,
    group_id: Option<GroupId>,
) -> SyncEngine<&'a FakeSplitwise, &'a FakeYnab> {
    SyncEngine::new(
        splitwise,
        ynab,
        StateStore::new(state_dir, Sydney),
        SyncSettings {
            budget_id: "budget-1".into(),
            account_id: "account-1".into(),
            group_id,
            flag_color,
        },
    )
}

/// Splitwise with a single group "Household" (id 77).
///
/// Created expenses are split in half with the current user as payer, and
/// stamped with the fake's clock.
pub struct FakeSplitwise {
    clock: Cell<DateTime<Utc>>,
    expenses: RefCell<Vec<Expense>>,
    created: RefCell<Vec<NewExpense>>,
    failing_descriptions: RefCell<HashSet<String>>,
    undecodable: Cell<usize>,
    fail_fetches: Cell<bool>,
    fail_group_lookup: Cell<bool>,
}

impl FakeSplitwise {
    pub fn new(clock: DateTime<Tz>) -> Self {
        FakeSplitwise {
            clock: Cell::new(clock.with_timezone(&Utc)),
            expenses: RefCell::default(),
            created: RefCell::default(),
            failing_descriptions: RefCell::default(),
            undecodable: Cell::new(0),
            fail_fetches: Cell::new(false),
            fail_group_lookup: Cell::new(false),
        }
    }

    pub fn set_clock(&self, clock: DateTime<Tz>) {
        self.clock.set(clock.with_timezone(&Utc));
    }

    pub fn add(&self, expense: Expense) {
        self.expenses.borrow_mut().push(expense);
    }

    /// Simulates an edit of the expense at `at`.
    pub fn touch(&self, id: &str, at: DateTime<Tz>) {
        for expense in self.expenses.borrow_mut().iter_mut() {
            if expense.id == id {
                expense.updated_at = at.with_timezone(&Utc);
            }
        }
    }

    /// Records every fetch reports as unreadable.
    pub fn add_undecodable(&self, count: usize) {
        self.undecodable.set(self.undecodable.get() + count);
    }

    pub fn created(&self) -> Vec<NewExpense> {
        self.created.borrow().clone()
    }

    pub fn fail_creates_for(&self, description: &str) {
        self.failing_descriptions
            .borrow_mut()
            .insert(description.to_owned());
    }

    pub fn fail_fetches(&self) {
        self.fail_fetches.set(true);
    }

    pub fn fail_group_lookup(&self) {
        self.fail_group_lookup.set(true);
    }
}

impl SharedLedger for FakeSplitwise {
    fn fetch_expenses(&self, updated_after: DateTime<Utc>) -> Result<FetchedExpenses> {
        if self.fail_fetches.get() {
            bail!("connection reset");
        }
        Ok(FetchedExpenses {
            expenses: self
                .expenses
                .borrow()
                .iter()
                .filter(|expense| expense.updated_at >= updated_after)
                .cloned()
                .collect(),
            undecodable: self.undecodable.get(),
        })
    }

    fn resolve_group_id(&self, name: &str) -> Result<Option<GroupId>> {
        if self.fail_group_lookup.get() {
            bail!("group lookup should not happen");
        }
        Ok((name == "Household").then_some(77))
    }

    fn create_expense(&self, expense: &NewExpense) -> Result<String> {
        if self.failing_descriptions.borrow().contains(&expense.description) {
            bail!("HTTP 500");
        }
        self.created.borrow_mut().push(expense.clone());

        let id = (5000 + self.expenses.borrow().len()).to_string();
        let now = self.clock.get();
        self.expenses.borrow_mut().push(Expense {
            id: id.clone(),
            description: expense.description.clone(),
            net_amount: -expense.cost / Decimal::TWO,
            date: expense.date,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }
}

/// YNAB with budget "My Budget" (`budget-1`) holding account "Splitwise" (`account-1`).
pub struct FakeYnab {
    transactions: RefCell<Vec<BudgetTransaction>>,
    created: RefCell<Vec<NewBudgetTransaction>>,
    fetched_since: RefCell<Vec<NaiveDate>>,
    fail_creates: Cell<bool>,
    fail_fetches: Cell<bool>,
    fail_flag_updates: Cell<bool>,
}

impl FakeYnab {
    pub fn new() -> Self {
        FakeYnab {
            transactions: RefCell::default(),
            created: RefCell::default(),
            fetched_since: RefCell::default(),
            fail_creates: Cell::new(false),
            fail_fetches: Cell::new(false),
            fail_flag_updates: Cell::new(false),
        }
    }

    pub fn add(&self, transaction: BudgetTransaction) {
        self.transactions.borrow_mut().push(transaction);
    }

    pub fn created(&self) -> Vec<NewBudgetTransaction> {
        self.created.borrow().clone()
    }

    pub fn fetched_since(&self) -> Vec<NaiveDate> {
        self.fetched_since.borrow().clone()
    }

    pub fn flag(&self, transaction_id: &str) -> Option<FlagColor> {
        self.transactions
            .borrow()
            .iter()
            .find(|transaction| transaction.id == transaction_id)
            .and_then(|transaction| transaction.flag_color)
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.set(fail);
    }

    pub fn fail_fetches(&self) {
        self.fail_fetches.set(true);
    }

    pub fn fail_flag_updates(&self) {
        self.fail_flag_updates.set(true);
    }
}

impl BudgetLedger for FakeYnab {
    fn resolve_budget_id(&self, name: &str) -> Result<Option<String>> {
        Ok((name == "My Budget").then(|| "budget-1".to_owned()))
    }

    fn resolve_account_id(&self, budget_id: &str, name: &str) -> Result<Option<String>> {
        Ok((budget_id == "budget-1" && name.trim() == "Splitwise").then(|| "account-1".to_owned()))
    }

    fn fetch_transactions_since(
        &self,
        _budget_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<BudgetTransaction>> {
        if self.fail_fetches.get() {
            bail!("timed out");
        }
        self.fetched_since.borrow_mut().push(since);
        Ok(self
            .transactions
            .borrow()
            .iter()
            .filter(|transaction| transaction.date >= since)
            .cloned()
            .collect())
    }

    fn create_transactions(
        &self,
        _budget_id: &str,
        transactions: &[NewBudgetTransaction],
    ) -> Result<Vec<String>> {
        if self.fail_creates.get() {
            bail!("HTTP 503");
        }
        let mut created = self.created.borrow_mut();
        let ids = (created.len()..created.len() + transactions.len())
            .map(|n| format!("n-{n}"))
            .collect();
        created.extend_from_slice(transactions);
        Ok(ids)
    }

    fn update_flag(
        &self,
        _budget_id: &str,
        transaction_id: &str,
        flag_color: Option<FlagColor>,
    ) -> Result<()> {
        if self.fail_flag_updates.get() {
            bail!("HTTP 429");
        }
        let mut transactions = self.transactions.borrow_mut();
        let Some(transaction) = transactions
            .iter_mut()
            .find(|transaction| transaction.id == transaction_id)
        else {
            bail!("transaction {transaction_id} not found");
        };
        transaction.flag_color = flag_color;
        Ok(())
    }
}

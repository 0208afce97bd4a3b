//! Converting records between the Splitwise and YNAB data models.

use crate::model::{
    BudgetTransaction, ClearedStatus, Expense, GroupId, NewBudgetTransaction, NewExpense,
};
use crate::{Decimal, Result};
use anyhow::Context;
use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::ToPrimitive;

/// Description used for exported expenses whose YNAB payee is missing.
pub const FALLBACK_DESCRIPTION: &str = "Expense";

const MILLIUNITS_PER_UNIT: i64 = 1000;

/// Currency units to YNAB milliunits, rounding half away from zero.
pub fn to_milliunits(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::from(MILLIUNITS_PER_UNIT))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// YNAB milliunits to currency units, exactly.
pub fn from_milliunits(milliunits: i64) -> Decimal {
    Decimal::new(milliunits, 3)
}

/// Splitwise expense to the YNAB transaction that records it.
pub fn to_budget_transaction(expense: &Expense, account_id: &str) -> Result<NewBudgetTransaction> {
    let amount = to_milliunits(expense.net_amount).with_context(|| {
        format!(
            "amount {} of expense {} does not fit into milliunits",
            expense.net_amount, expense.id
        )
    })?;

    Ok(NewBudgetTransaction {
        account_id: account_id.to_owned(),
        date: expense.date,
        amount,
        payee_name: expense.description.trim().to_owned(),
        cleared: ClearedStatus::Cleared,
    })
}

/// Flagged YNAB transaction to the Splitwise expense that shares it.
///
/// YNAB outflows are negative while Splitwise expects a positive cost, so the sign is dropped.
pub fn to_new_expense(transaction: &BudgetTransaction, group_id: GroupId) -> NewExpense {
    let description = transaction
        .payee_name
        .as_deref()
        .map(str::trim)
        .filter(|payee| !payee.is_empty())
        .unwrap_or(FALLBACK_DESCRIPTION);

    NewExpense {
        group_id,
        description: description.to_owned(),
        cost: from_milliunits(transaction.amount).abs(),
        date: transaction.date,
    }
}

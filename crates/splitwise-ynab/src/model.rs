//! Records as the two ledgers see them, after validation at the adapter boundary.

use crate::Decimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Splitwise group id.
pub type GroupId = u64;

/// A Splitwise expense, reduced to its impact on the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    pub id: String,
    pub description: String,
    /// Negative when the current user fronted the expense and is owed money,
    /// positive when they owe.
    pub net_amount: Decimal,
    pub date: NaiveDate,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A YNAB transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetTransaction {
    pub id: String,
    pub payee_name: Option<String>,
    /// Amount in milliunits; outflows are negative.
    pub amount: i64,
    pub date: NaiveDate,
    pub flag_color: Option<FlagColor>,
    pub deleted: bool,
}

/// YNAB's transaction flag colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
}

impl FlagColor {
    pub const ALL: [FlagColor; 6] = [
        FlagColor::Red,
        FlagColor::Orange,
        FlagColor::Yellow,
        FlagColor::Green,
        FlagColor::Blue,
        FlagColor::Purple,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FlagColor::Red => "red",
            FlagColor::Orange => "orange",
            FlagColor::Yellow => "yellow",
            FlagColor::Green => "green",
            FlagColor::Blue => "blue",
            FlagColor::Purple => "purple",
        }
    }
}

impl fmt::Display for FlagColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        FlagColor::ALL
            .into_iter()
            .find(|color| color.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "unknown flag color '{s}', expected one of: red, orange, yellow, green, blue, purple"
                )
            })
    }
}

/// Cleared status sent with imported transactions. Imports are always `cleared`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearedStatus {
    Cleared,
}

/// Payload for creating a YNAB transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBudgetTransaction {
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub payee_name: String,
    pub cleared: ClearedStatus,
}

/// Payload for creating an equally split Splitwise expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub description: String,
    /// Positive cost in currency units.
    pub cost: Decimal,
    pub date: NaiveDate,
}

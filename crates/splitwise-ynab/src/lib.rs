//! Two-way sync between a Splitwise group and a YNAB budget.
//!
//! Shared expenses from Splitwise are imported into a YNAB account, and YNAB
//! transactions carrying a configured flag are exported as equally split
//! Splitwise expenses. Progress is tracked per [`Direction`] by the
//! [`state::StateStore`], so repeated or interrupted runs never create
//! duplicates.

pub mod convert;
mod error;
mod http;
pub mod ledger;
pub mod model;
pub mod splitwise;
pub mod state;
pub mod sync;
pub mod ynab;

pub type Decimal = rust_decimal::Decimal;
pub type Tz = chrono_tz::Tz;

pub use anyhow::Result;
pub use error::ApiError;
pub use http::REQUEST_TIMEOUT;

use std::fmt;

/// One of the two one-way sync flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// YNAB transactions flagged for sharing become Splitwise expenses.
    YnabToSplitwise,
    /// Splitwise expenses become YNAB transactions.
    SplitwiseToYnab,
}

impl Direction {
    /// Both directions, in the order a full run executes them.
    ///
    /// Exporting first lets the freshly created Splitwise expenses be
    /// imported back into YNAB within the same run.
    pub const ALL: [Direction; 2] = [Direction::YnabToSplitwise, Direction::SplitwiseToYnab];

    pub fn name(self) -> &'static str {
        match self {
            Direction::YnabToSplitwise => "ynab_to_splitwise",
            Direction::SplitwiseToYnab => "splitwise_to_ynab",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::YnabToSplitwise => f.write_str("YNAB → Splitwise"),
            Direction::SplitwiseToYnab => f.write_str("Splitwise → YNAB"),
        }
    }
}

//! The synchronization engine.
//!
//! A run executes YNAB→Splitwise first and Splitwise→YNAB second, so that
//! expenses exported from YNAB are imported back as the user's share within
//! the same run. Each direction fetches its window from the source ledger,
//! writes to the target ledger and only then persists progress in the
//! [`StateStore`]. A failing direction is reported without affecting the other.

mod to_budget;
mod to_splitwise;

#[cfg(test)]
mod testing;

pub use to_budget::ToBudgetReport;
pub use to_splitwise::{BatchOutcome, RecordOutcome, RecordResult, SkipReason, ToSplitwiseReport};

use crate::ledger::{BudgetLedger, SharedLedger};
use crate::model::{FlagColor, GroupId};
use crate::state::StateStore;
use crate::{ApiError, Direction, Result, Tz};
use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

/// Ids the engine works with, resolved from the configured names once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub budget_id: String,
    pub account_id: String,
    /// `None` disables YNAB→Splitwise.
    pub group_id: Option<GroupId>,
    /// `None` disables YNAB→Splitwise.
    pub flag_color: Option<FlagColor>,
}

/// Names of the budget, account and group to sync, as configured by the user.
#[derive(Debug, Clone, Copy)]
pub struct LedgerNames<'a> {
    pub budget: &'a str,
    pub account: &'a str,
    pub group: &'a str,
}

/// Looks up the ids for `names`.
///
/// An unknown budget or account is an error. An unknown group only disables
/// YNAB→Splitwise, and is not looked up at all without a flag color.
pub fn resolve_settings(
    shared: &impl SharedLedger,
    budget: &impl BudgetLedger,
    names: LedgerNames<'_>,
    flag_color: Option<FlagColor>,
) -> Result<SyncSettings> {
    let budget_id = budget
        .resolve_budget_id(names.budget)
        .context("Failed to look up YNAB budgets")?
        .with_context(|| format!("YNAB budget '{}' not found", names.budget))?;
    let account_id = budget
        .resolve_account_id(&budget_id, names.account)
        .context("Failed to look up YNAB accounts")?
        .with_context(|| {
            format!(
                "YNAB account '{}' not found in budget '{}'",
                names.account, names.budget
            )
        })?;

    let group_id = match flag_color {
        None => None,
        Some(_) => {
            let group_id = shared
                .resolve_group_id(names.group)
                .context("Failed to look up Splitwise groups")?;
            if group_id.is_none() {
                warn!(
                    "Splitwise group '{}' not found, flagged YNAB transactions will not be exported",
                    names.group
                );
            }
            group_id
        }
    };

    Ok(SyncSettings {
        budget_id,
        account_id,
        group_id,
        flag_color,
    })
}

/// Outcome of one run, `None` for directions that were not requested.
#[derive(Debug, Default)]
pub struct RunReport {
    pub to_splitwise: Option<Result<ToSplitwiseReport>>,
    pub to_budget: Option<Result<ToBudgetReport>>,
}

impl RunReport {
    /// False if a requested direction failed as a whole.
    ///
    /// Individual records that failed to export do not count.
    pub fn is_success(&self) -> bool {
        self.to_splitwise.as_ref().is_none_or(Result::is_ok)
            && self.to_budget.as_ref().is_none_or(Result::is_ok)
    }
}

pub struct SyncEngine<S, B> {
    shared: S,
    budget: B,
    store: StateStore,
    settings: SyncSettings,
}

impl<S: SharedLedger, B: BudgetLedger> SyncEngine<S, B> {
    pub fn new(shared: S, budget: B, store: StateStore, settings: SyncSettings) -> Self {
        SyncEngine {
            shared,
            budget,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// The current time in the configured timezone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.store.timezone())
    }

    /// Runs both directions with `now` as the end of their windows.
    pub fn run(&self, now: DateTime<Tz>) -> RunReport {
        self.run_directions(&Direction::ALL, now)
    }

    /// Runs the given directions, always in [`Direction::ALL`] order.
    pub fn run_directions(&self, directions: &[Direction], now: DateTime<Tz>) -> RunReport {
        let mut report = RunReport::default();
        for direction in Direction::ALL {
            if !directions.contains(&direction) {
                continue;
            }
            info!("Syncing {direction}");
            match direction {
                Direction::YnabToSplitwise => {
                    let result = self.sync_to_splitwise(now);
                    log_direction_result(direction, &result);
                    report.to_splitwise = Some(result);
                }
                Direction::SplitwiseToYnab => {
                    let result = self.sync_to_budget(now);
                    log_direction_result(direction, &result);
                    report.to_budget = Some(result);
                }
            }
        }
        report
    }
}

fn log_direction_result<T>(direction: Direction, result: &Result<T>) {
    let Err(e) = result else {
        return;
    };
    let retryable = e
        .downcast_ref::<ApiError>()
        .is_some_and(ApiError::is_retryable);
    if retryable {
        error!("{direction} failed, will retry the same window next run: {e:#}");
    } else {
        error!("{direction} failed: {e:#}");
    }
}

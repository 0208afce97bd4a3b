//! YNAB API client.

use crate::Result;
use crate::error::ApiError;
use crate::http::JsonClient;
use crate::ledger::BudgetLedger;
use crate::model::{BudgetTransaction, FlagColor, NewBudgetTransaction};
use chrono::NaiveDate;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const BASE_URL: &str = "https://api.youneedabudget.com/v1";

pub struct YnabClient {
    http: JsonClient,
}

impl YnabClient {
    pub fn new(access_token: &str) -> Result<Self> {
        Self::with_base_url(BASE_URL, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: &str) -> Result<Self> {
        let http = JsonClient::new(base_url, access_token)?;
        debug!("Using YNAB API at {}", http.base_url());
        Ok(YnabClient { http })
    }

    pub fn get_budgets(&self) -> Result<Vec<Named>, ApiError> {
        let response: Envelope<BudgetsData> = self.http.get("budgets", &[])?;
        Ok(response.data.budgets)
    }

    pub fn get_accounts(&self, budget_id: &str) -> Result<Vec<Named>, ApiError> {
        let response: Envelope<AccountsData> = self
            .http
            .get(&format!("budgets/{budget_id}/accounts"), &[])?;
        Ok(response.data.accounts)
    }
}

impl BudgetLedger for YnabClient {
    fn resolve_budget_id(&self, name: &str) -> Result<Option<String>> {
        Ok(find_by_name(self.get_budgets()?, name, |a, b| a == b))
    }

    fn resolve_account_id(&self, budget_id: &str, name: &str) -> Result<Option<String>> {
        Ok(find_by_name(self.get_accounts(budget_id)?, name, |a, b| {
            a.trim() == b.trim()
        }))
    }

    fn fetch_transactions_since(
        &self,
        budget_id: &str,
        since: NaiveDate,
    ) -> Result<Vec<BudgetTransaction>> {
        let endpoint = format!("budgets/{budget_id}/transactions");
        let response: Envelope<TransactionsData> = self.http.get(
            &endpoint,
            &[("since_date", since.format("%Y-%m-%d").to_string())],
        )?;

        let transactions: Vec<_> = response
            .data
            .transactions
            .into_iter()
            .map(WireTransaction::into_transaction)
            .collect();
        debug!("Fetched {} YNAB transaction(s)", transactions.len());
        Ok(transactions)
    }

    fn create_transactions(
        &self,
        budget_id: &str,
        transactions: &[NewBudgetTransaction],
    ) -> Result<Vec<String>> {
        let endpoint = format!("budgets/{budget_id}/transactions");
        let response: Envelope<SaveTransactionsData> = self
            .http
            .post(&endpoint, &CreateTransactionsRequest { transactions })?;

        if !response.data.duplicate_import_ids.is_empty() {
            warn!(
                "YNAB skipped {} duplicate import(s)",
                response.data.duplicate_import_ids.len()
            );
        }
        Ok(response.data.transaction_ids)
    }

    fn update_flag(
        &self,
        budget_id: &str,
        transaction_id: &str,
        flag_color: Option<FlagColor>,
    ) -> Result<()> {
        let endpoint = format!("budgets/{budget_id}/transactions/{transaction_id}");
        let _: IgnoredAny = self.http.put(
            &endpoint,
            &UpdateTransactionRequest {
                transaction: FlagPatch { flag_color },
            },
        )?;
        Ok(())
    }
}

fn find_by_name(
    items: Vec<Named>,
    name: &str,
    matches: impl Fn(&str, &str) -> bool,
) -> Option<String> {
    items
        .into_iter()
        .find(|item| matches(&item.name, name))
        .map(|item| item.id)
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// A budget or account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct BudgetsData {
    budgets: Vec<Named>,
}

#[derive(Deserialize)]
struct AccountsData {
    accounts: Vec<Named>,
}

#[derive(Deserialize)]
struct TransactionsData {
    transactions: Vec<WireTransaction>,
}

#[derive(Deserialize)]
struct WireTransaction {
    id: String,
    date: NaiveDate,
    amount: i64,
    payee_name: Option<String>,
    flag_color: Option<String>,
    #[serde(default)]
    deleted: bool,
}

impl WireTransaction {
    fn into_transaction(self) -> BudgetTransaction {
        let flag_color = self
            .flag_color
            .as_deref()
            .filter(|token| !token.is_empty())
            .and_then(|token| match token.parse() {
                Ok(color) => Some(color),
                Err(e) => {
                    warn!("transaction {}: {e}", self.id);
                    None
                }
            });

        BudgetTransaction {
            id: self.id,
            payee_name: self.payee_name,
            amount: self.amount,
            date: self.date,
            flag_color,
            deleted: self.deleted,
        }
    }
}

#[derive(Serialize)]
struct CreateTransactionsRequest<'a> {
    transactions: &'a [NewBudgetTransaction],
}

#[derive(Deserialize)]
struct SaveTransactionsData {
    #[serde(default)]
    transaction_ids: Vec<String>,
    #[serde(default)]
    duplicate_import_ids: Vec<String>,
}

#[derive(Serialize)]
struct UpdateTransactionRequest {
    transaction: FlagPatch,
}

#[derive(Serialize)]
struct FlagPatch {
    flag_color: Option<FlagColor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClearedStatus;

    const TRANSACTIONS_FIXTURE: &str = r#"{
      "data": {
        "transactions": [
          {
            "id": "t-1",
            "date": "2024-06-03",
            "amount": -12500,
            "memo": null,
            "cleared": "cleared",
            "approved": true,
            "flag_color": "purple",
            "account_id": "acc-1",
            "payee_name": "Cinema",
            "deleted": false
          },
          {
            "id": "t-2",
            "date": "2024-06-04",
            "amount": -3000,
            "flag_color": null,
            "payee_name": null,
            "deleted": true
          },
          {
            "id": "t-3",
            "date": "2024-06-05",
            "amount": 1000,
            "flag_color": "teal",
            "payee_name": "Refund"
          }
        ],
        "server_knowledge": 42
      }
    }"#;

    #[test]
    fn decode_transactions() {
        let response: Envelope<TransactionsData> =
            serde_json::from_str(TRANSACTIONS_FIXTURE).unwrap();
        let transactions: Vec<_> = response
            .data
            .transactions
            .into_iter()
            .map(WireTransaction::into_transaction)
            .collect();

        assert_eq!(
            transactions[0],
            BudgetTransaction {
                id: "t-1".into(),
                payee_name: Some("Cinema".into()),
                amount: -12500,
                date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                flag_color: Some(FlagColor::Purple),
                deleted: false,
            }
        );
        assert!(transactions[1].deleted);
        assert_eq!(transactions[1].payee_name, None);
        // unknown colors are treated as unflagged
        assert_eq!(transactions[2].flag_color, None);
        assert!(!transactions[2].deleted);
    }

    #[test]
    fn find_by_name_compares_trimmed_account_names() {
        let accounts = vec![
            Named {
                id: "a-1".into(),
                name: "Checking".into(),
            },
            Named {
                id: "a-2".into(),
                name: "Splitwise ".into(),
            },
        ];
        let trimmed = |a: &str, b: &str| a.trim() == b.trim();
        assert_eq!(
            find_by_name(accounts.clone(), " Splitwise", trimmed),
            Some("a-2".to_owned())
        );
        assert_eq!(find_by_name(accounts, "Savings", trimmed), None);
    }

    #[test]
    fn create_request_body() {
        let transactions = [NewBudgetTransaction {
            account_id: "acc-1".into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            amount: -12500,
            payee_name: "Dinner".into(),
            cleared: ClearedStatus::Cleared,
        }];
        insta::assert_json_snapshot!(CreateTransactionsRequest { transactions: &transactions }, @r#"
        {
          "transactions": [
            {
              "account_id": "acc-1",
              "date": "2024-06-01",
              "amount": -12500,
              "payee_name": "Dinner",
              "cleared": "cleared"
            }
          ]
        }
        "#);
    }

    #[test]
    fn clearing_a_flag_sends_null() {
        let body = UpdateTransactionRequest {
            transaction: FlagPatch { flag_color: None },
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"transaction":{"flag_color":null}}"#
        );
    }

    #[test]
    fn decode_save_response() {
        let response: Envelope<SaveTransactionsData> = serde_json::from_str(
            r#"{ "data": { "transaction_ids": ["n-1", "n-2"], "duplicate_import_ids": [], "server_knowledge": 7 } }"#,
        )
        .unwrap();
        assert_eq!(response.data.transaction_ids, ["n-1", "n-2"]);
    }
}

//! Splitwise API client.

use crate::error::ApiError;
use crate::http::JsonClient;
use crate::ledger::{FetchedExpenses, SharedLedger};
use crate::model::{Expense, GroupId, NewExpense};
use crate::{Decimal, Result, Tz};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error};

pub const BASE_URL: &str = "https://secure.splitwise.com/api/v3.0";

const PAGE_SIZE: usize = 100;

/// Splitwise app registration and the user's API key.
///
/// Requests authenticate with the API key as bearer token; the consumer pair
/// identifies the registered app.
#[derive(Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// A debt between two users inside one expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repayment {
    /// The user who fronted the money.
    pub from: u64,
    /// The user who owes it.
    pub to: u64,
    pub amount: Decimal,
}

/// Sum of the current user's side of all repayments: negative when they are
/// owed money, positive when they owe, zero when they are not involved.
pub fn net_amount(user_id: u64, repayments: &[Repayment]) -> Decimal {
    repayments
        .iter()
        .map(|debt| {
            if debt.from == user_id {
                -debt.amount
            } else if debt.to == user_id {
                debt.amount
            } else {
                Decimal::ZERO
            }
        })
        .sum()
}

pub struct SplitwiseClient {
    http: JsonClient,
    consumer_key: String,
    /// Zone in which expense dates are read.
    timezone: Tz,
    current_user_id: Cell<Option<u64>>,
}

impl SplitwiseClient {
    pub fn new(credentials: &Credentials, timezone: Tz) -> Result<Self> {
        Self::with_base_url(BASE_URL, credentials, timezone)
    }

    pub fn with_base_url(base_url: &str, credentials: &Credentials, timezone: Tz) -> Result<Self> {
        let http = JsonClient::new(base_url, &credentials.api_key)?;
        debug!("Using Splitwise API at {} ({timezone})", http.base_url());
        Ok(SplitwiseClient {
            http,
            consumer_key: credentials.consumer_key.clone(),
            timezone,
            current_user_id: Cell::new(None),
        })
    }

    /// Id of the user the API key belongs to, fetched once.
    pub fn current_user_id(&self) -> Result<u64, ApiError> {
        if let Some(id) = self.current_user_id.get() {
            return Ok(id);
        }

        let response: CurrentUserResponse = self.http.get("get_current_user", &[])?;
        debug!(
            app = %self.consumer_key,
            "Splitwise user {} ({})",
            response.user.id,
            response.user.first_name.as_deref().unwrap_or("unnamed")
        );
        self.current_user_id.set(Some(response.user.id));
        Ok(response.user.id)
    }

    pub fn get_groups(&self) -> Result<Vec<Group>, ApiError> {
        let response: GroupsResponse = self.http.get("get_groups", &[])?;
        Ok(response.groups)
    }

    fn get_expenses_page(
        &self,
        updated_after: DateTime<Utc>,
        offset: usize,
    ) -> Result<Vec<serde_json::Value>, ApiError> {
        let query = [
            ("updated_after", format_instant(updated_after)),
            ("limit", PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        let response: ExpensesResponse = self.http.get("get_expenses", &query)?;
        Ok(response.expenses)
    }
}

impl SharedLedger for SplitwiseClient {
    fn fetch_expenses(&self, updated_after: DateTime<Utc>) -> Result<FetchedExpenses> {
        let user_id = self.current_user_id()?;

        let mut fetched = FetchedExpenses::default();
        let mut offset = 0;
        loop {
            let page = self.get_expenses_page(updated_after, offset)?;
            let page_len = page.len();
            let decoded = decode_page(page, user_id, self.timezone);
            fetched.expenses.extend(decoded.expenses);
            fetched.undecodable += decoded.undecodable;

            if page_len < PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        debug!(
            "Fetched {} Splitwise expense(s), {} undecodable",
            fetched.expenses.len(),
            fetched.undecodable
        );
        Ok(fetched)
    }

    fn resolve_group_id(&self, name: &str) -> Result<Option<GroupId>> {
        let groups = self.get_groups()?;
        Ok(groups
            .into_iter()
            .find(|group| group.name == name)
            .map(|group| group.id))
    }

    fn create_expense(&self, expense: &NewExpense) -> Result<String> {
        let body = CreateExpenseRequest::from(expense);
        let response: CreateExpenseResponse = self.http.post("create_expense", &body)?;
        Ok(response.into_created_id()?)
    }
}

/// Decodes every record of one page on its own. A record that cannot be read
/// is logged and counted, and does not affect the rest of the page.
fn decode_page(page: Vec<serde_json::Value>, user_id: u64, timezone: Tz) -> FetchedExpenses {
    let mut decoded = FetchedExpenses::default();
    for value in page {
        match decode_expense(value, user_id, timezone) {
            Ok(expense) => decoded.expenses.push(expense),
            Err(e) => {
                error!("Skipping Splitwise expense: {e}");
                decoded.undecodable += 1;
            }
        }
    }
    decoded
}

fn decode_expense(
    value: serde_json::Value,
    user_id: u64,
    timezone: Tz,
) -> Result<Expense, ApiError> {
    let id = value
        .get("id")
        .map_or_else(|| "without id".to_owned(), ToString::to_string);
    let raw: WireExpense = serde_json::from_value(value)
        .map_err(|e| ApiError::decode("get_expenses", format!("expense {id}: {e}")))?;
    raw.into_expense(user_id, timezone)
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Deserialize)]
struct CurrentUserResponse {
    user: WireUser,
}

#[derive(Deserialize)]
struct WireUser {
    id: u64,
    first_name: Option<String>,
}

#[derive(Deserialize)]
struct GroupsResponse {
    groups: Vec<Group>,
}

#[derive(Deserialize)]
struct ExpensesResponse {
    expenses: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireExpense {
    id: u64,
    description: Option<String>,
    date: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    #[serde(default)]
    repayments: Vec<WireRepayment>,
}

#[derive(Deserialize)]
struct WireRepayment {
    from: u64,
    to: u64,
    amount: String,
}

impl WireExpense {
    fn into_expense(self, user_id: u64, timezone: Tz) -> Result<Expense, ApiError> {
        const ENDPOINT: &str = "get_expenses";
        let id = self.id;
        let invalid = |field: &str, value: &str| {
            ApiError::decode(ENDPOINT, format!("expense {id}: invalid {field} '{value}'"))
        };

        let repayments = self
            .repayments
            .iter()
            .map(|debt| {
                Ok(Repayment {
                    from: debt.from,
                    to: debt.to,
                    amount: Decimal::from_str(&debt.amount)
                        .map_err(|_| invalid("repayment amount", debt.amount.as_str()))?,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        // `date` is normally a UTC instant; the calendar day is the local one.
        let date = match DateTime::parse_from_rfc3339(&self.date) {
            Ok(instant) => instant.with_timezone(&timezone).date_naive(),
            Err(_) => NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
                .map_err(|_| invalid("date", self.date.as_str()))?,
        };
        let parse_instant = |field: &str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|instant| instant.with_timezone(&Utc))
                .map_err(|_| invalid(field, value))
        };

        Ok(Expense {
            id: id.to_string(),
            description: self.description.unwrap_or_default(),
            net_amount: net_amount(user_id, &repayments),
            date,
            deleted_at: self
                .deleted_at
                .as_deref()
                .map(|value| parse_instant("deleted_at", value))
                .transpose()?,
            created_at: parse_instant("created_at", self.created_at.as_str())?,
            updated_at: parse_instant("updated_at", self.updated_at.as_str())?,
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateExpenseRequest<'a> {
    cost: String,
    description: &'a str,
    date: String,
    group_id: GroupId,
    split_equally: bool,
}

impl<'a> From<&'a NewExpense> for CreateExpenseRequest<'a> {
    fn from(expense: &'a NewExpense) -> Self {
        CreateExpenseRequest {
            cost: expense.cost.normalize().to_string(),
            description: &expense.description,
            date: expense.date.format("%Y-%m-%d").to_string(),
            group_id: expense.group_id,
            split_equally: true,
        }
    }
}

#[derive(Deserialize)]
struct CreateExpenseResponse {
    #[serde(default)]
    expenses: Vec<CreatedExpense>,
    #[serde(default)]
    errors: serde_json::Value,
}

#[derive(Deserialize)]
struct CreatedExpense {
    id: u64,
}

impl CreateExpenseResponse {
    /// Splitwise reports validation failures in `errors` with HTTP 200.
    fn into_created_id(self) -> Result<String, ApiError> {
        const ENDPOINT: &str = "create_expense";
        if has_errors(&self.errors) {
            return Err(ApiError::Rejected {
                endpoint: ENDPOINT.to_owned(),
                errors: self.errors.to_string(),
            });
        }

        self.expenses
            .first()
            .map(|expense| expense.id.to_string())
            .ok_or_else(|| ApiError::decode(ENDPOINT, "no expense in response"))
    }
}

fn has_errors(errors: &serde_json::Value) -> bool {
    use serde_json::Value;
    match errors {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(message) => !message.is_empty(),
        Value::Array(items) => items.iter().any(has_errors),
        Value::Object(fields) => fields.values().any(has_errors),
        Value::Number(_) => true,
    }
}

//! Blocking JSON-over-HTTP plumbing shared by the API clients.

use crate::error::ApiError;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Upper bound for a single API request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A bearer-authenticated client rooted at an API base url.
pub(crate) struct JsonClient {
    base_url: String,
    token: String,
    client: Client,
}

impl JsonClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ApiError::Transport {
                endpoint: base_url.clone(),
                source,
            })?;

        Ok(JsonClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, query)?;
        self.execute(endpoint, self.client.get(url))
    }

    pub fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, &[])?;
        self.execute(endpoint, self.client.post(url).json(body))
    }

    pub fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(endpoint, &[])?;
        self.execute(endpoint, self.client.put(url).json(body))
    }

    fn url(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.base_url, endpoint);
        let parsed = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        parsed.map_err(|e| ApiError::InvalidUrl {
            url: raw,
            message: e.to_string(),
        })
    }

    fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let transport = |source| ApiError::Transport {
            endpoint: endpoint.to_owned(),
            source,
        };

        let response = request.bearer_auth(&self.token).send().map_err(transport)?;
        let status = response.status();
        let body = response.text().map_err(transport)?;

        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::decode(endpoint, e.to_string()))
    }
}

use thiserror::Error;

/// Failure talking to the Splitwise or YNAB API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Connection failure or timeout.
    #[error("request to {endpoint} failed")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    /// The request succeeded on the HTTP level but the API reported errors in the body.
    #[error("{endpoint} rejected the request: {errors}")]
    Rejected { endpoint: String, errors: String },

    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl ApiError {
    pub(crate) fn decode(endpoint: &str, message: impl Into<String>) -> Self {
        ApiError::Decode {
            endpoint: endpoint.to_owned(),
            message: message.into(),
        }
    }

    /// Whether running again later can be expected to succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Decode { .. } | ApiError::Rejected { .. } | ApiError::InvalidUrl { .. } => {
                false
            }
        }
    }
}

//! Flow error types.

use thiserror::Error;

/// Error type for every flow, exchange, and persistence operation.
#[derive(Error, Debug)]
pub enum FlowError {
    /// The OpenID configuration document could not be fetched or parsed.
    #[error("Remote configuration error: {0}")]
    ConfigFetch(String),

    /// A persisted account blob exists but cannot be read back.
    #[error("Persisted account state is unreadable: {0}")]
    Deserialize(String),

    /// The redirect's `state` does not match the flow most recently started.
    #[error("OAuth state mismatch: redirect does not belong to the current flow")]
    StateMismatch,

    /// The token endpoint rejected the code or answered with garbage.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The profile endpoint failed.
    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    /// Transport failure underneath any of the above.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The state store failed to read or write.
    #[error("Persistence error: {0}")]
    Persistence(#[from] fxa_storage::StorageError),

    /// The operation needs session credentials the account does not have.
    #[error("Account is not authenticated")]
    NotAuthenticated,

    /// The flow state machine refused the requested step.
    #[error("Invalid flow state transition: {0}")]
    InvalidStateTransition(String),

    /// The account was discarded by logout or shutdown.
    #[error("Account has been discarded")]
    AccountDiscarded,

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The redirect carried an error or lacked `code`/`state`.
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,
}

impl FlowError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            FlowError::Timeout => true,
            FlowError::Network(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using FlowError.
pub type FlowResult<T> = Result<T, FlowError>;

use thiserror::Error;

/// Failures of the session subsystem.
///
/// `Clone` because a single renewal outcome is delivered to every caller
/// queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Credential storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Token could not be decoded: {0}")]
    DecodeFailure(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No account exists with this email address")]
    AccountNotFound,

    #[error("An account with this email already exists")]
    AccountExists,

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Refresh token has expired")]
    RefreshTokenExpired,

    #[error("Refresh token is invalid")]
    RefreshTokenInvalid,

    #[error("Credential service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Invalid inactivity timeouts: {0}")]
    InvalidTimeouts(String),
}

impl AuthError {
    /// Whether a renewal failing with this error is worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

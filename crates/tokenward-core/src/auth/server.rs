//! Contract of the remote credential server.

use async_trait::async_trait;
use serde::Serialize;

use super::{AuthError, CredentialPair};
use crate::models::AccountSummary;

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub pair: CredentialPair,
    pub account: Option<AccountSummary>,
}

/// Issues and renews credential pairs.
///
/// Implementations translate transport problems into
/// `AuthError::ServiceUnavailable`; every other failure is one of the
/// issue/renew kinds of `AuthError`.
#[async_trait]
pub trait CredentialServer: Send + Sync {
    async fn issue(&self, credentials: &LoginCredentials) -> Result<IssuedSession, AuthError>;

    async fn register(&self, registration: &Registration) -> Result<IssuedSession, AuthError>;

    /// Exchange `refresh_token` for a new pair. A server that does not
    /// rotate refresh tokens returns the old one in the new pair.
    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, AuthError>;
}

//! Test helpers: JWT minting and a scripted credential server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use parking_lot::Mutex;

use super::server::{CredentialServer, IssuedSession, LoginCredentials, Registration};
use super::{AuthError, CredentialPair};
use crate::models::AccountSummary;

pub fn mint_token_with_payload(payload: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode("signature")
    )
}

pub fn mint_token(exp: i64) -> String {
    mint_token_with_payload(&format!(r#"{{"token_type":"access","exp":{},"user_id":1}}"#, exp))
}

/// Token expiring `secs` seconds from now (negative for the past).
pub fn token_expiring_in(secs: i64) -> String {
    mint_token(Utc::now().timestamp() + secs)
}

/// Distinct fresh access token; the jti keeps successive tokens unequal.
pub fn fresh_token(tag: &str) -> String {
    mint_token_with_payload(&format!(
        r#"{{"exp":{},"user_id":1,"jti":"{}"}}"#,
        Utc::now().timestamp() + 3600,
        tag
    ))
}

/// Credential server whose renew responses are scripted in order. When the
/// script runs out every renewal succeeds with a fresh pair.
#[derive(Default)]
pub struct ScriptedServer {
    renew_script: Mutex<VecDeque<Result<CredentialPair, AuthError>>>,
    issue_result: Mutex<Option<Result<IssuedSession, AuthError>>>,
    renew_delay: Mutex<Duration>,
    renew_calls: AtomicUsize,
    issue_calls: AtomicUsize,
    seen_refresh_tokens: Mutex<Vec<String>>,
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_renewal(&self, outcome: Result<CredentialPair, AuthError>) {
        self.renew_script.lock().push_back(outcome);
    }

    pub fn set_issue_result(&self, outcome: Result<IssuedSession, AuthError>) {
        *self.issue_result.lock() = Some(outcome);
    }

    pub fn set_renew_delay(&self, delay: Duration) {
        *self.renew_delay.lock() = delay;
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens.lock().clone()
    }
}

pub fn issued(pair: CredentialPair) -> IssuedSession {
    IssuedSession {
        pair,
        account: Some(AccountSummary {
            id: 1,
            username: "tester".into(),
            email: "tester@example.com".into(),
            name: "Tester".into(),
        }),
    }
}

#[async_trait]
impl CredentialServer for ScriptedServer {
    async fn issue(&self, _credentials: &LoginCredentials) -> Result<IssuedSession, AuthError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.issue_result.lock().clone().unwrap_or_else(|| {
            Ok(issued(CredentialPair::new(fresh_token("issued"), "refresh-issued")))
        })
    }

    async fn register(&self, registration: &Registration) -> Result<IssuedSession, AuthError> {
        self.issue(&LoginCredentials {
            email: registration.email.clone(),
            password: registration.password.clone(),
        })
        .await
    }

    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, AuthError> {
        let call = self.renew_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_refresh_tokens.lock().push(refresh_token.to_string());

        let delay = *self.renew_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.renew_script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(CredentialPair::new(
                fresh_token(&format!("renewed-{}", call)),
                format!("refresh-{}", call),
            ))
        })
    }
}

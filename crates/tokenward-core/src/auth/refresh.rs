//! Single-flight renewal of the access token.
//!
//! At most one renewal is in flight per coordinator. Callers that find the
//! stored access token stale while a renewal is running queue a `oneshot`
//! receiver behind it instead of starting another one, and all of them are
//! released with the same outcome in the order they queued.
//!
//! The renewal itself runs in a spawned task, so a caller being dropped
//! mid-await cannot leave the coordinator stuck in `InFlight`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::claims;
use super::server::CredentialServer;
use super::session::LogoutReason;
use super::{AuthError, CredentialPair, TokenStore};
use crate::config::SessionSettings;

type Waiter = oneshot::Sender<Result<String, AuthError>>;

/// Called when the session can no longer be kept alive.
pub type ExpiryHook = Arc<dyn Fn(LogoutReason) + Send + Sync>;

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    /// Waiters in enqueue order; the caller that started the renewal is first.
    InFlight { waiters: Vec<Waiter> },
}

/// Clone is cheap and every clone shares the same renewal state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<TokenStore>,
    server: Arc<dyn CredentialServer>,
    skew_secs: i64,
    retries: u32,
    backoff: Duration,
    state: Mutex<RefreshState>,
    on_expired: Mutex<Option<ExpiryHook>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        server: Arc<dyn CredentialServer>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                server,
                skew_secs: settings.expiry_skew_secs,
                retries: settings.renewal_retries,
                backoff: settings.renewal_backoff,
                state: Mutex::new(RefreshState::Idle),
                on_expired: Mutex::new(None),
            }),
        }
    }

    pub fn set_expiry_hook(&self, hook: impl Fn(LogoutReason) + Send + Sync + 'static) {
        *self.inner.on_expired.lock() = Some(Arc::new(hook));
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    /// Return a usable access token, renewing it first if it is expired
    /// (or within the configured skew of expiring).
    ///
    /// Fails with `NotAuthenticated` when no credentials are stored and with
    /// `SessionExpired` when renewal failed for good; in the latter case the
    /// store has been cleared and the expiry hook has fired.
    pub async fn ensure_fresh_access_token(&self) -> Result<String, AuthError> {
        self.acquire(None).await
    }

    /// Like `ensure_fresh_access_token`, but also renews when the server
    /// rejected `rejected_token` and it is still the stored one. If another
    /// caller already replaced it, the newer token is returned as is.
    pub async fn renew_rejected(&self, rejected_token: &str) -> Result<String, AuthError> {
        self.acquire(Some(rejected_token)).await
    }

    pub fn is_renewing(&self) -> bool {
        matches!(*self.inner.state.lock(), RefreshState::InFlight { .. })
    }

    /// Drop the stored credentials and report the session as over.
    pub fn invalidate_session(&self, reason: LogoutReason) {
        self.inner.clear_store();
        self.inner.notify_expired(reason);
    }

    async fn acquire(&self, rejected: Option<&str>) -> Result<String, AuthError> {
        let receiver = {
            let mut state = self.inner.state.lock();
            let (tx, rx) = oneshot::channel();
            match &mut *state {
                RefreshState::InFlight { waiters } => {
                    waiters.push(tx);
                    debug!(queued = waiters.len(), "Renewal in flight, waiting on it");
                }
                RefreshState::Idle => {
                    let pair = self.inner.store.get().ok_or(AuthError::NotAuthenticated)?;
                    let rejected_current = rejected.is_some_and(|t| t == pair.access_token);
                    if !rejected_current
                        && !claims::is_expired(&pair.access_token, self.inner.skew_secs)
                    {
                        return Ok(pair.access_token);
                    }
                    debug!(after_rejection = rejected_current, "Access token stale, starting renewal");
                    *state = RefreshState::InFlight { waiters: vec![tx] };
                    tokio::spawn(Arc::clone(&self.inner).run_renewal(pair));
                }
            }
            rx
        };

        // A dropped sender means the renewal task died without reporting.
        receiver.await.unwrap_or(Err(AuthError::SessionExpired))
    }
}

impl Inner {
    /// Renew from `started_from`. The outcome only touches the store (and
    /// only reports expiry) while `started_from` is still the stored pair; a
    /// logout or fresh login in the meantime turns the result stale.
    async fn run_renewal(self: Arc<Self>, started_from: CredentialPair) {
        let renewed = self.renew_with_retry(&started_from.refresh_token).await;

        let mut expired = false;
        let outcome = match renewed {
            Ok(pair) => {
                let access = pair.access_token.clone();
                match self.store.save_if_current(&started_from, pair) {
                    Ok(true) => {
                        info!("Access token renewed");
                        Ok(access)
                    }
                    Ok(false) => {
                        debug!("Credentials replaced during renewal, discarding renewed pair");
                        Err(AuthError::NotAuthenticated)
                    }
                    Err(e) => {
                        warn!(error = %e, "Renewed credentials kept in memory only");
                        Ok(access)
                    }
                }
            }
            Err(e) => {
                match self.store.clear_if_current(&started_from) {
                    Ok(true) => {
                        warn!(error = %e, "Credential renewal failed, ending session");
                        expired = true;
                    }
                    Ok(false) => {
                        debug!(error = %e, "Renewal of replaced credentials failed, ignoring");
                    }
                    Err(clear_err) => {
                        warn!(error = %e, "Credential renewal failed, ending session");
                        warn!(error = %clear_err, "Failed to remove persisted credentials");
                        expired = true;
                    }
                }
                Err(AuthError::SessionExpired)
            }
        };

        let waiters = match std::mem::take(&mut *self.state.lock()) {
            RefreshState::InFlight { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };

        if expired {
            self.notify_expired(LogoutReason::RenewalFailed);
        }

        debug!(waiters = waiters.len(), "Releasing callers queued on renewal");
        for waiter in waiters {
            // Receiver gone means that caller was cancelled; nothing to do.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn renew_with_retry(&self, refresh_token: &str) -> Result<CredentialPair, AuthError> {
        if claims::decode_claims(refresh_token)
            .is_ok_and(|c| c.is_expired_at(Utc::now().timestamp(), 0))
        {
            return Err(AuthError::RefreshTokenExpired);
        }

        let mut attempt = 0;
        loop {
            match self.server.renew(refresh_token).await {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "Credential server unavailable, retrying renewal"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                other => return other,
            }
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted credentials");
        }
    }

    fn notify_expired(&self, reason: LogoutReason) {
        let hook = self.on_expired.lock().clone();
        if let Some(hook) = hook {
            hook(reason);
        }
    }
}

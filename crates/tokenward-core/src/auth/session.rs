//! Session state machine.
//!
//! `SessionController` ties the token store, the renewal coordinator and the
//! activity monitor together and publishes a `SessionStatus` for the UI
//! layer through a `watch` channel.
//!
//! ```text
//! LoggedOut --login/restore--> Authenticated --warning deadline--> Warning
//!     ^                            ^    |                             |
//!     |                            |    +--- activity / confirm <-----+
//!     +-- Expired <-- logout deadline / renewal failure / rejection --+
//! ```
//!
//! `Expired` is never observable from outside: it resolves to `LoggedOut`
//! before the controller releases its lock.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::activity::{ActivityMonitor, InputSignal};
use super::refresh::RefreshCoordinator;
use super::server::{CredentialServer, IssuedSession, LoginCredentials, Registration};
use super::{AuthError, TokenStore};
use crate::config::SessionSettings;
use crate::models::AccountSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    Authenticated,
    Warning,
    Expired,
}

/// Why a session ended without the user asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// No qualifying input before the logout deadline
    Inactivity,
    /// The refresh token was refused or the server stayed unreachable
    RenewalFailed,
    /// A request was refused again right after a successful renewal
    Rejected,
}

impl LogoutReason {
    pub fn notice(&self) -> &'static str {
        match self {
            LogoutReason::Inactivity => "Your session expired due to inactivity. Please log in again.",
            LogoutReason::RenewalFailed => "Your session has expired. Please log in again.",
            LogoutReason::Rejected => "The server no longer accepts your session. Please log in again.",
        }
    }
}

/// What the UI layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated,
    Warning { seconds_remaining: u64 },
    /// `reason` is `None` after an explicit logout or at startup.
    LoggedOut { reason: Option<LogoutReason> },
}

/// Clone is cheap; clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SessionSettings,
    store: Arc<TokenStore>,
    server: Arc<dyn CredentialServer>,
    coordinator: RefreshCoordinator,
    monitor: ActivityMonitor,
    state: Mutex<SessionState>,
    account: Mutex<Option<AccountSummary>>,
    status: watch::Sender<SessionStatus>,
}

impl SessionController {
    pub fn new(
        settings: SessionSettings,
        store: Arc<TokenStore>,
        server: Arc<dyn CredentialServer>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let coordinator = RefreshCoordinator::new(store.clone(), server.clone(), &settings);
            let weak = weak.clone();
            coordinator.set_expiry_hook(move |reason| {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(reason);
                }
            });

            let (status, _) = watch::channel(SessionStatus::LoggedOut { reason: None });
            Inner {
                settings,
                store,
                server,
                coordinator,
                monitor: ActivityMonitor::new(),
                state: Mutex::new(SessionState::LoggedOut),
                account: Mutex::new(None),
                status,
            }
        });
        Self { inner }
    }

    /// Resume a session persisted by an earlier run. Returns whether the
    /// session is usable; on failure the controller stays logged out.
    pub async fn restore(&self) -> bool {
        if self.inner.store.is_empty() {
            debug!("No stored credentials to restore");
            return false;
        }
        match self.inner.coordinator.ensure_fresh_access_token().await {
            Ok(_) => match self.inner.become_authenticated(None) {
                Ok(()) => {
                    info!("Stored session restored");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Could not start inactivity monitor");
                    false
                }
            },
            Err(e) => {
                info!(error = %e, "Stored session could not be restored");
                false
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let credentials = LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let issued = self.inner.server.issue(&credentials).await?;
        self.inner.establish(issued)?;
        info!("Login successful");
        Ok(())
    }

    /// Create an account and log straight into it.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<(), AuthError> {
        let registration = Registration {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        };
        let issued = self.inner.server.register(&registration).await?;
        self.inner.establish(issued)?;
        info!("Registration successful");
        Ok(())
    }

    /// User chose "stay logged in" on the warning dialog.
    pub fn confirm_stay_logged_in(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state != SessionState::Warning {
            return false;
        }
        self.inner.monitor.notify_activity();
        *state = SessionState::Authenticated;
        self.inner.publish(SessionStatus::Authenticated);
        debug!("Session extended by user");
        true
    }

    /// Forward raw input from the UI layer.
    pub fn record_activity(&self, signal: InputSignal) {
        if !signal.is_qualifying() {
            return;
        }
        let mut state = self.inner.state.lock();
        match *state {
            SessionState::Authenticated => self.inner.monitor.notify_activity(),
            SessionState::Warning => {
                self.inner.monitor.notify_activity();
                *state = SessionState::Authenticated;
                self.inner.publish(SessionStatus::Authenticated);
            }
            SessionState::LoggedOut | SessionState::Expired => {}
        }
    }

    /// Explicit logout; no notice is shown.
    pub fn logout(&self) {
        let mut state = self.inner.state.lock();
        self.inner.terminate(&mut state, None);
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Live countdown to the inactivity logout.
    pub fn seconds_remaining(&self) -> Option<u64> {
        self.inner
            .monitor
            .until_logout()
            .map(|left| left.as_secs_f64().ceil() as u64)
    }

    pub fn account(&self) -> Option<AccountSummary> {
        self.inner.account.lock().clone()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }
}

impl Inner {
    fn establish(self: &Arc<Self>, issued: IssuedSession) -> Result<(), AuthError> {
        if let Err(e) = self.store.save(issued.pair) {
            warn!(error = %e, "Credentials kept in memory only for this run");
        }
        self.become_authenticated(issued.account)
    }

    fn become_authenticated(self: &Arc<Self>, account: Option<AccountSummary>) -> Result<(), AuthError> {
        let on_warning = {
            let weak = Arc::downgrade(self);
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.enter_warning();
                }
            }
        };
        let on_timeout = {
            let weak = Arc::downgrade(self);
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(LogoutReason::Inactivity);
                }
            }
        };

        let mut state = self.state.lock();
        self.monitor.start(
            on_warning,
            on_timeout,
            self.settings.warning_lead,
            self.settings.inactivity_timeout,
        )?;
        if account.is_some() {
            *self.account.lock() = account;
        }
        *state = SessionState::Authenticated;
        self.publish(SessionStatus::Authenticated);
        Ok(())
    }

    fn enter_warning(&self) {
        let mut state = self.state.lock();
        if *state != SessionState::Authenticated {
            return;
        }
        // Activity may have restarted the window after the timer fired.
        match self.monitor.window() {
            Some(window) if Instant::now() >= window.warning_deadline => {}
            _ => {
                debug!("Ignoring warning from a superseded activity window");
                return;
            }
        }
        *state = SessionState::Warning;
        let seconds_remaining = self
            .monitor
            .until_logout()
            .map_or(0, |left| left.as_secs_f64().ceil() as u64);
        info!(seconds_remaining, "Session about to expire");
        self.publish(SessionStatus::Warning { seconds_remaining });
    }

    fn expire(&self, reason: LogoutReason) {
        let mut state = self.state.lock();
        if *state == SessionState::LoggedOut {
            // Nothing to end, but leftover credentials must not survive.
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to remove persisted credentials");
            }
            return;
        }
        *state = SessionState::Expired;
        info!(?reason, "Session expired");
        self.terminate(&mut state, Some(reason));
    }

    fn terminate(&self, state: &mut SessionState, reason: Option<LogoutReason>) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove persisted credentials");
        }
        self.monitor.stop();
        *self.account.lock() = None;
        let was = std::mem::replace(state, SessionState::LoggedOut);
        debug!(?was, ?reason, "Session ended");
        self.publish(SessionStatus::LoggedOut { reason });
    }

    fn publish(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{issued, token_expiring_in, ScriptedServer};
    use crate::auth::CredentialPair;
    use std::time::Duration;

    fn controller_with(store: TokenStore) -> (SessionController, Arc<ScriptedServer>) {
        let server = Arc::new(ScriptedServer::new());
        let settings = SessionSettings {
            warning_lead: Duration::from_secs(60),
            inactivity_timeout: Duration::from_secs(900),
            ..SessionSettings::default()
        };
        let controller = SessionController::new(settings, Arc::new(store), server.clone());
        (controller, server)
    }

    async fn advance_secs(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_logged_out() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(controller.status(), SessionStatus::LoggedOut { reason: None });
        assert!(!controller.restore().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_authenticates_and_stores_pair() {
        let (controller, server) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();

        assert_eq!(server.issue_calls(), 1);
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.status(), SessionStatus::Authenticated);
        assert!(controller.store().get().is_some());
        assert_eq!(controller.account().unwrap().username, "tester");
        assert_eq!(controller.seconds_remaining(), Some(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_stays_logged_out() {
        let (controller, server) = controller_with(TokenStore::in_memory());
        server.set_issue_result(Err(AuthError::InvalidCredentials));

        let result = controller.login("tester@example.com", "wrong").await;
        assert_eq!(result, Err(AuthError::InvalidCredentials));
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert!(controller.store().get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_establishes_session() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.register("new@example.com", "longpassword", "New").await.unwrap();
        assert_eq!(controller.state(), SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_warning_then_logout() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();
        let updates = controller.subscribe();

        advance_secs(840).await;
        assert_eq!(controller.state(), SessionState::Warning);
        assert_eq!(
            controller.status(),
            SessionStatus::Warning { seconds_remaining: 60 }
        );
        assert!(updates.has_changed().unwrap());

        advance_secs(60).await;
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(
            controller.status(),
            SessionStatus::LoggedOut { reason: Some(LogoutReason::Inactivity) }
        );
        assert!(controller.store().get().is_none());
        assert!(controller.account().is_none());
        assert_eq!(controller.seconds_remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_stay_logged_in_resets_clock() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();
        assert!(!controller.confirm_stay_logged_in());

        advance_secs(850).await;
        assert_eq!(controller.state(), SessionState::Warning);
        assert!(controller.confirm_stay_logged_in());
        assert_eq!(controller.state(), SessionState::Authenticated);

        advance_secs(100).await;
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.seconds_remaining(), Some(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_during_warning_returns_to_authenticated() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();

        advance_secs(845).await;
        controller.record_activity(InputSignal::Resize);
        assert_eq!(controller.state(), SessionState::Warning);

        controller.record_activity(InputSignal::PointerMove);
        assert_eq!(controller.state(), SessionState::Authenticated);
        advance_secs(500).await;
        assert_eq!(controller.state(), SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_logout_has_no_notice() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();

        controller.logout();
        assert_eq!(controller.status(), SessionStatus::LoggedOut { reason: None });
        assert!(controller.store().get().is_none());

        advance_secs(2000).await;
        assert_eq!(controller.status(), SessionStatus::LoggedOut { reason: None });
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_with_expired_access_token_renews() {
        let store = TokenStore::in_memory();
        store
            .save(CredentialPair::new(token_expiring_in(-1), "refresh-0"))
            .unwrap();
        let (controller, server) = controller_with(store);

        assert!(controller.restore().await);
        assert_eq!(server.renew_calls(), 1);
        assert_eq!(controller.state(), SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_forces_logout() {
        let (controller, server) = controller_with(TokenStore::in_memory());
        server.set_issue_result(Ok(issued(CredentialPair::new(
            token_expiring_in(-1),
            "refresh-issued",
        ))));
        controller.login("tester@example.com", "secret").await.unwrap();
        server.push_renewal(Err(AuthError::RefreshTokenExpired));

        let result = controller.coordinator().ensure_fresh_access_token().await;
        assert_eq!(result, Err(AuthError::SessionExpired));
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(
            controller.status(),
            SessionStatus::LoggedOut { reason: Some(LogoutReason::RenewalFailed) }
        );
        assert!(controller.store().get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relogin_after_expiry() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();
        advance_secs(900).await;
        assert_eq!(controller.state(), SessionState::LoggedOut);

        controller.login("tester@example.com", "secret").await.unwrap();
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert!(controller.coordinator().ensure_fresh_access_token().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_warning_after_activity_is_ignored() {
        let (controller, _) = controller_with(TokenStore::in_memory());
        controller.login("tester@example.com", "secret").await.unwrap();

        // Warning timer firing just after activity restarted the window.
        advance_secs(839).await;
        controller.record_activity(InputSignal::KeyPress);
        advance_secs(1).await;
        controller.inner.enter_warning();

        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.status(), SessionStatus::Authenticated);
        assert_eq!(controller.seconds_remaining(), Some(899));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_during_renewal_stays_logged_out() {
        let store = TokenStore::in_memory();
        store
            .save(CredentialPair::new(token_expiring_in(-1), "refresh-0"))
            .unwrap();
        let (controller, server) = controller_with(store);
        server.set_renew_delay(Duration::from_millis(100));

        let restoring = tokio::spawn({
            let controller = controller.clone();
            async move { controller.restore().await }
        });
        tokio::task::yield_now().await;
        assert!(controller.coordinator().is_renewing());

        controller.logout();

        assert!(!restoring.await.unwrap());
        assert_eq!(server.renew_calls(), 1);
        assert!(controller.store().get().is_none());
        assert_eq!(controller.state(), SessionState::LoggedOut);
        assert_eq!(controller.status(), SessionStatus::LoggedOut { reason: None });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_renewal_failure_spares_new_login() {
        let store = TokenStore::in_memory();
        store
            .save(CredentialPair::new(token_expiring_in(-1), "refresh-0"))
            .unwrap();
        let (controller, server) = controller_with(store);
        server.set_renew_delay(Duration::from_millis(100));
        server.push_renewal(Err(AuthError::RefreshTokenExpired));

        let restoring = tokio::spawn({
            let controller = controller.clone();
            async move { controller.restore().await }
        });
        tokio::task::yield_now().await;
        assert!(controller.coordinator().is_renewing());

        controller.login("tester@example.com", "secret").await.unwrap();
        assert_eq!(controller.state(), SessionState::Authenticated);

        assert!(!restoring.await.unwrap());
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.status(), SessionStatus::Authenticated);
        assert_eq!(controller.store().get().unwrap().refresh_token, "refresh-issued");
        assert!(controller.coordinator().ensure_fresh_access_token().await.is_ok());
    }
}

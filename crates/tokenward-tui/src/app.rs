//! Application state for the tokenward terminal client.
//!
//! `App` owns the login form, mirrors the `SessionStatus` published by the
//! controller into screen state, and runs authenticated requests in the
//! background through the request pipeline.

use tokenward_core::models::UserProfile;
use tokenward_core::{
    AuthError, Config, RequestError, RequestPipeline, SessionController, SessionStatus,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 8;

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length for password input.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the display name on registration.
const MAX_NAME_LENGTH: usize = 64;

// ============================================================================
// UI State Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    LoggingIn,
    Normal,
    /// Inactivity countdown dialog is showing
    Warning,
    ConfirmingQuit,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    SignIn,
    Register,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFocus {
    Name,
    Email,
    Password,
    Button,
}

impl LoginFocus {
    /// Next field; the name field only exists when registering.
    pub fn next(self, mode: LoginMode) -> Self {
        match (self, mode) {
            (LoginFocus::Name, _) => LoginFocus::Email,
            (LoginFocus::Email, _) => LoginFocus::Password,
            (LoginFocus::Password, _) => LoginFocus::Button,
            (LoginFocus::Button, LoginMode::Register) => LoginFocus::Name,
            (LoginFocus::Button, LoginMode::SignIn) => LoginFocus::Email,
        }
    }

    pub fn prev(self, mode: LoginMode) -> Self {
        match (self, mode) {
            (LoginFocus::Button, _) => LoginFocus::Password,
            (LoginFocus::Password, _) => LoginFocus::Email,
            (LoginFocus::Email, LoginMode::Register) => LoginFocus::Name,
            (LoginFocus::Email, LoginMode::SignIn) | (LoginFocus::Name, _) => LoginFocus::Button,
        }
    }
}

/// Results sent back from background tasks.
enum BackgroundResult {
    Profile(Result<UserProfile, RequestError>),
}

pub struct App {
    pub config: Config,
    pub session: SessionController,
    pipeline: RequestPipeline,
    status_rx: watch::Receiver<SessionStatus>,

    pub state: AppState,

    // Login form
    pub login_mode: LoginMode,
    pub login_focus: LoginFocus,
    pub login_name: String,
    pub login_email: String,
    pub login_password: String,
    pub login_error: Option<String>,
    /// Why the last session ended, shown above the login form
    pub notice: Option<String>,

    pub profile: Option<UserProfile>,
    pub profile_loading: bool,
    pub status_message: Option<String>,

    background_tx: mpsc::Sender<BackgroundResult>,
    background_rx: mpsc::Receiver<BackgroundResult>,
}

impl App {
    pub fn new(config: Config, session: SessionController, pipeline: RequestPipeline) -> Self {
        let (background_tx, background_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let status_rx = session.subscribe();
        let login_email = config.last_email.clone().unwrap_or_default();

        Self {
            config,
            session,
            pipeline,
            status_rx,
            state: AppState::LoggingIn,
            login_mode: LoginMode::SignIn,
            login_focus: LoginFocus::Email,
            login_name: String::new(),
            login_email,
            login_password: String::new(),
            login_error: None,
            notice: None,
            profile: None,
            profile_loading: false,
            status_message: None,
            background_tx,
            background_rx,
        }
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_mode == LoginMode::Register {
            LoginFocus::Name
        } else if self.login_email.is_empty() {
            LoginFocus::Email
        } else {
            LoginFocus::Password
        };
        self.login_error = None;
    }

    pub fn toggle_login_mode(&mut self) {
        self.login_mode = match self.login_mode {
            LoginMode::SignIn => LoginMode::Register,
            LoginMode::Register => LoginMode::SignIn,
        };
        self.start_login();
    }

    pub async fn attempt_login(&mut self) {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();

        if email.is_empty() || password.is_empty() {
            self.login_error = Some("Email and password required".to_string());
            return;
        }
        if self.login_mode == LoginMode::Register && self.login_name.trim().is_empty() {
            self.login_error = Some("Name required to create an account".to_string());
            return;
        }

        self.login_error = None;

        let result = match self.login_mode {
            LoginMode::SignIn => self.session.login(&email, &password).await,
            LoginMode::Register => {
                self.session
                    .register(&email, &password, self.login_name.trim())
                    .await
            }
        };

        match result {
            Ok(()) => {
                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                self.login_password.clear();
                self.login_name.clear();
                self.login_mode = LoginMode::SignIn;
                self.notice = None;
                self.enter_session();
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.login_error = Some(login_error_message(&e));
            }
        }
    }

    /// Show the main screen for a live session and load its profile.
    pub fn enter_session(&mut self) {
        // The transition to Authenticated was published before we got here
        self.status_rx.mark_unchanged();
        self.state = AppState::Normal;
        self.fetch_profile_background();
    }

    pub fn logout(&mut self) {
        info!("User logged out");
        self.session.logout();
    }

    /// "Stay logged in" on the countdown dialog.
    pub fn confirm_stay(&mut self) {
        self.session.confirm_stay_logged_in();
        self.state = AppState::Normal;
    }

    pub fn seconds_remaining(&self) -> Option<u64> {
        self.session.seconds_remaining()
    }

    // =========================================================================
    // Session status
    // =========================================================================

    /// Apply the latest status published by the session controller.
    pub fn sync_session_status(&mut self) {
        if !self.status_rx.has_changed().unwrap_or(false) {
            return;
        }
        let status = self.status_rx.borrow_and_update().clone();
        debug!(?status, "Session status changed");

        match status {
            SessionStatus::Authenticated => {
                if self.state == AppState::Warning {
                    self.state = AppState::Normal;
                }
            }
            SessionStatus::Warning { .. } => {
                if matches!(self.state, AppState::Normal | AppState::ConfirmingQuit) {
                    self.state = AppState::Warning;
                }
            }
            SessionStatus::LoggedOut { reason } => {
                self.profile = None;
                self.profile_loading = false;
                self.status_message = None;
                self.notice = reason.map(|r| r.notice().to_string());
                if self.state != AppState::Quitting {
                    self.start_login();
                }
            }
        }
    }

    // =========================================================================
    // Background requests
    // =========================================================================

    pub fn fetch_profile_background(&mut self) {
        self.profile_loading = true;
        let pipeline = self.pipeline.clone();
        let path = self.config.profile_path.clone();
        let tx = self.background_tx.clone();

        tokio::spawn(async move {
            let result = pipeline.get::<UserProfile>(&path).await;
            let _ = tx.send(BackgroundResult::Profile(result)).await;
        });
    }

    pub fn check_background_tasks(&mut self) {
        while let Ok(result) = self.background_rx.try_recv() {
            match result {
                BackgroundResult::Profile(result) => {
                    self.profile_loading = false;
                    match result {
                        Ok(profile) => {
                            self.status_message = None;
                            self.profile = Some(profile);
                        }
                        // The session status change carries the notice
                        Err(RequestError::AuthenticationRequired) => {}
                        Err(RequestError::Api(e)) => {
                            warn!(error = %e, "Failed to load profile");
                            self.status_message = Some(format!("Could not load profile: {}", e));
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// User-facing message for a failed login or registration.
pub fn login_error_message(error: &AuthError) -> String {
    match error {
        AuthError::InvalidCredentials => "Invalid email or password".to_string(),
        AuthError::AccountNotFound => "No account exists with this email address".to_string(),
        AuthError::AccountExists => "An account with this email already exists".to_string(),
        AuthError::Rejected(msg) => msg.clone(),
        AuthError::ServiceUnavailable(_) => {
            "Unable to connect to server. Check your internet connection.".to_string()
        }
        other => format!("Login failed: {}", other),
    }
}

/// Format seconds as m:ss for the countdown.
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

pub fn can_add_char(focus: LoginFocus, current_len: usize, c: char) -> bool {
    let max = match focus {
        LoginFocus::Name => MAX_NAME_LENGTH,
        LoginFocus::Email => MAX_EMAIL_LENGTH,
        LoginFocus::Password => MAX_PASSWORD_LENGTH,
        LoginFocus::Button => return false,
    };
    current_len < max && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================

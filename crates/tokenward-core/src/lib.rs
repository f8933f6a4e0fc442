//! Core library for tokenward.
//!
//! Holds a short-lived access/refresh credential pair, renews it
//! transparently with single-flight coordination, routes authenticated
//! calls through a retry-once pipeline and ends the session after a
//! configurable period of user inactivity.
//!
//! - `auth`: token store, claim inspection, renewal, inactivity tracking
//!   and the session state machine
//! - `api`: HTTP client for the credential server and the request pipeline
//! - `config`: user configuration and derived session settings
//! - `models`: account data returned by the server

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, RequestError, RequestPipeline};
pub use auth::{
    ActivityMonitor, AuthError, CredentialPair, InputSignal, LogoutReason, RefreshCoordinator,
    SessionController, SessionState, SessionStatus, TokenStore,
};
pub use config::{Config, SessionSettings, StorageKind};

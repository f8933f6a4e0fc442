//! Session and credential lifecycle.
//!
//! - `store`: durable `TokenStore` for the access/refresh pair
//! - `claims`: expiry inspection of access tokens, fail-closed
//! - `refresh`: single-flight `RefreshCoordinator`
//! - `activity`: inactivity `ActivityMonitor` with warning deadline
//! - `session`: `SessionController` state machine
//! - `server`: the `CredentialServer` contract

pub mod activity;
pub mod claims;
pub mod error;
pub mod refresh;
pub mod server;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{ActivityMonitor, ActivityWindow, InputSignal};
pub use claims::{decode_claims, is_expired, DecodedClaims};
pub use error::AuthError;
pub use refresh::RefreshCoordinator;
pub use server::{CredentialServer, IssuedSession, LoginCredentials, Registration};
pub use session::{LogoutReason, SessionController, SessionState, SessionStatus};
pub use store::{CredentialBackend, CredentialPair, FileBackend, KeyringBackend, MemoryBackend, TokenStore};

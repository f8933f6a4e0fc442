//! Data returned by the server alongside credentials and by the account
//! endpoints.

pub mod account;

pub use account::{AccountSummary, UserProfile};

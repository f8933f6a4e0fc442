//! HTTP side of the session subsystem.
//!
//! - `client`: `ApiClient`, the credential server over HTTP plus plain
//!   JSON helpers for business endpoints
//! - `pipeline`: `RequestPipeline`, which attaches fresh access tokens and
//!   recovers once from an authorization failure
//!
//! The server uses JWT bearer authentication; a 401 response is the
//! authorization-failure signal.

pub mod client;
pub mod error;
pub mod pipeline;

pub use client::ApiClient;
pub use error::{ApiError, RequestError};
pub use pipeline::RequestPipeline;

//! Authenticated request pipeline.
//!
//! Every business call goes through [`RequestPipeline::execute`]:
//!
//! 1. Ask the coordinator for a fresh access token and hand it to the call.
//! 2. If the server answers 401, renew (unless another caller already did)
//!    and send the call once more with the new token.
//! 3. A second 401 ends the session and surfaces `AuthenticationRequired`.
//!
//! Calls to the renewal endpoint itself skip all of this.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{ApiClient, ApiError, RequestError};
use crate::auth::{AuthError, LogoutReason, RefreshCoordinator};

#[derive(Clone)]
pub struct RequestPipeline {
    api: ApiClient,
    coordinator: RefreshCoordinator,
}

impl RequestPipeline {
    pub fn new(api: ApiClient, coordinator: RefreshCoordinator) -> Self {
        Self { api, coordinator }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Run `call` with a valid access token, recovering once from a 401.
    ///
    /// `call` may be invoked at most twice. Errors other than 401 are
    /// returned as `RequestError::Api` without touching the session.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, RequestError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self
            .coordinator
            .ensure_fresh_access_token()
            .await
            .map_err(session_lost)?;

        let rejected = match call(token.clone()).await {
            Err(e) if e.is_unauthorized() => token,
            other => return other.map_err(RequestError::from),
        };

        debug!("Access token rejected, renewing before retry");
        let token = self
            .coordinator
            .renew_rejected(&rejected)
            .await
            .map_err(session_lost)?;

        match call(token).await {
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "Request rejected again after renewal, ending session");
                self.coordinator.invalidate_session(LogoutReason::Rejected);
                Err(RequestError::AuthenticationRequired)
            }
            other => other.map_err(RequestError::from),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let api = &self.api;
        if api.is_renewal_path(path) {
            return Ok(api.get_json(path, None).await?);
        }
        self.execute(move |token| async move { api.get_json(path, Some(&token)).await })
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let api = &self.api;
        if api.is_renewal_path(path) {
            return Ok(api.post_json(path, body, None).await?);
        }
        self.execute(move |token| async move { api.post_json(path, body, Some(&token)).await })
            .await
    }
}

fn session_lost(error: AuthError) -> RequestError {
    debug!(error = %error, "No usable credentials for request");
    RequestError::AuthenticationRequired
}

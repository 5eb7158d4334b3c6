//! Out-of-band binding of a socket to the cookie session.
//!
//! Credentials never travel over the socket. Instead the client posts its
//! per-connection `clientId` to the backend over HTTP, carrying the session
//! cookie, and the backend marks that socket as authenticated.

use async_trait::async_trait;
use furioso_shared::{ApiError, WsAuthRequest};
use reqwest::Method;

use crate::api_client::ApiClient;

/// Binds a connection's `clientId` to the current session.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait SessionBinder: Send + Sync {
    /// Resolves `Ok` when the backend acknowledged the binding (2xx).
    async fn bind(&self, client_id: &str) -> Result<(), ApiError>;
}

/// [`SessionBinder`] posting to `/api/ws/auth`.
#[derive(Debug, Clone)]
pub struct HttpSessionBinder {
    api: ApiClient,
    path: String,
}

impl HttpSessionBinder {
    pub fn new(api: ApiClient, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl SessionBinder for HttpSessionBinder {
    async fn bind(&self, client_id: &str) -> Result<(), ApiError> {
        let body = WsAuthRequest {
            client_id: client_id.to_string(),
        };
        self.api
            .send(Method::POST, &self.path, Some(&body))
            .await
            .map(|_| ())
    }
}

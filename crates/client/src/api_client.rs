//! HTTP gateway to the QG FURIOSO backend using the cookie session.
//!
//! Every admin and fan page talks to the backend through
//! [`ApiClient::request`]; the realtime handshake uses it for the
//! `/api/ws/auth` side channel.

use furioso_shared::ApiError;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP client for JSON requests against one backend origin.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            session_cookie: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a `Cookie` header to every request.
    ///
    /// Browsers send the session cookie on their own; native callers pass it
    /// explicitly (e.g. `session=abc123`).
    pub fn with_session_cookie(mut self, cookie: Option<String>) -> Self {
        self.session_cookie = cookie;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    pub(crate) fn url(&self, path: &str) -> String {
        if path.contains("://") {
            return path.to_string();
        }
        let path = path.trim_start_matches('/');
        match self.base_url.trim_end_matches('/') {
            "" => format!("/{path}"),
            base => format!("{base}/{path}"),
        }
    }

    /// Send a request and return the raw response body of a 2xx answer.
    pub async fn send<TReq: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<String, ApiError> {
        let url = self.url(path);
        let mut rb = self.client.request(method, &url);

        #[cfg(target_arch = "wasm32")]
        {
            rb = rb.fetch_credentials_include();
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(cookie) = &self.session_cookie {
                rb = rb.header(reqwest::header::COOKIE, cookie.as_str());
            }
        }

        if let Some(body) = body {
            let body_bytes =
                serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
            rb = rb
                .body(body_bytes)
                .header(reqwest::header::CONTENT_TYPE, "application/json");
        }

        let response = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            crate::log_debug!("{} answered {}", url, status);
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }

    /// Generic JSON gateway: `request(method, path, body)`.
    ///
    /// An empty 2xx body decodes as JSON `null`.
    pub async fn request<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<TRes, ApiError> {
        let text = self.send(method, path, body).await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.request::<(), TRes>(Method::GET, path, None).await
    }

    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, path, None).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let api = ApiClient::new().with_base_url("https://qg.furia.gg/");
        assert_eq!(api.url("/api/ws/auth"), "https://qg.furia.gg/api/ws/auth");
        assert_eq!(api.url("api/users"), "https://qg.furia.gg/api/users");
        assert_eq!(api.url("http://other/x"), "http://other/x");
    }

    #[test]
    fn relative_paths_without_base() {
        let api = ApiClient::new();
        assert_eq!(api.url("api/shop"), "/api/shop");
        assert_eq!(api.url("/api/shop"), "/api/shop");
    }
}

//! The request-send primitive.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, trace};

use crate::auth::AccessToken;
use crate::error::{AuthError, Error, ProtocolError, TransportError};
use crate::types::ApiUrl;
use crate::Result;

use super::endpoints::ErrorResponse;

/// One outbound backend call together with its retry context.
///
/// The retry flag travels with the request value, so each request is
/// retried at most once no matter how many other requests share the
/// gateway.
#[derive(Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    bearer: Option<AccessToken>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an explicit bearer token.
    pub fn bearer(mut self, token: AccessToken) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn bearer_token(&self) -> Option<&AccessToken> {
        self.bearer.as_ref()
    }

    /// True once the request has been re-issued after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn set_bearer(&mut self, token: Option<AccessToken>) {
        self.bearer = token;
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

// Bodies carry passwords and refresh tokens; only their presence is shown.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body.as_ref().map(|_| "[REDACTED]"))
            .field("bearer", &self.bearer)
            .field("retried", &self.retried)
            .finish()
    }
}

/// A backend response of any status.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiResponse {
    status: u16,
    body: Vec<u8>,
}

// Login and refresh bodies carry tokens.
impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Build a response with a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode a success body.
    pub fn json<R: DeserializeOwned>(&self) -> Result<R> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode a success body, or turn a failure status into an error.
    pub fn into_json<R: DeserializeOwned>(self) -> Result<R> {
        if self.is_success() {
            self.json()
        } else {
            Err(self.into_error())
        }
    }

    /// Succeed on 2xx, discarding the body.
    pub fn into_unit(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    /// Convert a failure response into an error, keeping the payload message.
    pub fn into_error(self) -> Error {
        let payload: Option<ErrorResponse> = serde_json::from_slice(&self.body).ok();
        let (error, message) = match payload {
            Some(payload) => (payload.error, payload.message.map(|m| m.into_text())),
            None => (None, None),
        };

        if self.is_unauthorized() {
            AuthError::Unauthorized { message }.into()
        } else {
            ProtocolError::new(self.status, error, message).into()
        }
    }
}

/// Sends one request and returns whatever the backend answered.
///
/// Implementations only fail for transport faults; every HTTP status,
/// 401 included, is an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// HTTP transport over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api: ApiUrl,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given backend.
    pub fn new(api: ApiUrl, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lanyard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api,
            timeout,
        })
    }

    /// Returns the backend URL this transport is configured for.
    pub fn api(&self) -> &ApiUrl {
        &self.api
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            TransportError::Timeout {
                duration_ms: self.timeout.as_millis() as u64,
            }
            .into()
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(api = %self.api, method = %request.method(), path = request.path()))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.api.endpoint(request.path());
        debug!(authed = request.bearer_token().is_some(), "Sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .header(ACCEPT, "application/json");

        if let Some(token) = request.bearer_token() {
            builder = builder.header(AUTHORIZATION, token.authorization());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        trace!(status, bytes = body.len(), "Response received");
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

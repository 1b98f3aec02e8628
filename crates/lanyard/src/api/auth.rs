//! Typed calls to the backend's auth endpoints.

use tracing::{debug, instrument};

use crate::Result;
use crate::auth::{AccessToken, LoginCredentials, SignupDetails};
use crate::gateway::Gateway;
use crate::types::UserProfile;

use super::endpoints::{AuthResponse, LOGIN, LOGOUT, LoginRequest, ME, SIGNUP, SignupRequest};
use super::transport::ApiRequest;

/// The auth endpoints, called through a [`Gateway`].
///
/// Login and signup are public calls: no stored token is attached and a
/// 401 is reported as-is instead of starting a refresh.
#[derive(Debug, Clone)]
pub struct AuthApi {
    gateway: Gateway,
}

impl AuthApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse> {
        let request = ApiRequest::post(LOGIN).json(&LoginRequest {
            email: credentials.email(),
            password: credentials.password(),
        })?;

        self.gateway.send_public(request).await?.into_json()
    }

    #[instrument(skip(self, details), fields(email = %details.email()))]
    pub async fn signup(&self, details: &SignupDetails) -> Result<AuthResponse> {
        let request = ApiRequest::post(SIGNUP).json(&SignupRequest {
            email: details.email(),
            password: details.password(),
            first_name: details.first_name(),
            last_name: details.last_name(),
        })?;

        self.gateway.send_public(request).await?.into_json()
    }

    /// Revoke `token` on the backend. Sent once, without refresh.
    #[instrument(skip(self, token))]
    pub async fn logout(&self, token: AccessToken) -> Result<()> {
        let request = ApiRequest::post(LOGOUT).bearer(token);
        self.gateway.send_public(request).await?.into_unit()?;
        debug!("Backend session revoked");
        Ok(())
    }

    /// Fetch the profile of the bearer of the stored access token.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<UserProfile> {
        self.gateway.send(ApiRequest::get(ME)).await?.into_json()
    }
}

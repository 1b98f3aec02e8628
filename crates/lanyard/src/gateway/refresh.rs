//! Single-flight access token refresh.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::api::endpoints::{REFRESH, RefreshRequest, RefreshResponse};
use crate::api::{ApiRequest, Transport};
use crate::auth::{AccessToken, RefreshToken};
use crate::error::AuthError;
use crate::session::{SessionEvent, SessionSignals, SessionState, SignOutReason};
use crate::store::CredentialStore;

/// What a rejected request should do next.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Refreshed {
    /// Retry with this token.
    Retry(AccessToken),
    /// No refresh token is stored; the original 401 stands.
    NoRefreshToken,
}

/// Serializes refreshes so concurrent 401s share one backend call.
///
/// Whoever holds the lock either performs the refresh or, if the stored
/// access token no longer matches the one its request was rejected with,
/// takes the token a previous holder installed. Requests rejected with a
/// token whose refresh was refused all fail with
/// [`AuthError::RefreshExhausted`], not just the one that drove it.
#[derive(Debug)]
pub(crate) struct Refresher {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    signals: SessionSignals,
    /// Holds the access token whose refresh was last refused.
    lock: Mutex<Option<AccessToken>>,
}

impl Refresher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        signals: SessionSignals,
    ) -> Self {
        Self {
            transport,
            store,
            signals,
            lock: Mutex::new(None),
        }
    }

    /// Obtain a replacement for `rejected`.
    ///
    /// Fails with [`AuthError::RefreshExhausted`] after tearing the session
    /// down when the backend refuses the refresh. A refresh that completes
    /// after the session was cleared or replaced is discarded and reported
    /// as [`Refreshed::NoRefreshToken`].
    #[instrument(skip_all)]
    pub(crate) async fn refresh(&self, rejected: Option<&AccessToken>) -> Result<Refreshed> {
        let mut refused = self.lock.lock().await;

        if let Some(current) = self.store.access_token()
            && Some(&current) != rejected
        {
            debug!("Access token already replaced; reusing it");
            return Ok(Refreshed::Retry(current));
        }

        if rejected.is_some() && refused.as_ref() == rejected {
            debug!("Refresh for this token was already refused");
            return Err(AuthError::RefreshExhausted.into());
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("No refresh token stored");
            return Ok(Refreshed::NoRefreshToken);
        };

        let transition = self.signals.transition(SessionState::RefreshingToken);
        info!("Refreshing access token");

        match self.exchange(&refresh_token).await {
            Ok(access_token) => {
                if !self.store.replace_access_token(&refresh_token, &access_token)? {
                    // Logged out or signed in again meanwhile; the guard
                    // leaves the newer state alone.
                    debug!("Session changed during refresh; discarding new access token");
                    return Ok(Refreshed::NoRefreshToken);
                }
                transition.finish(SessionState::Active);
                debug!("Access token refreshed");
                Ok(Refreshed::Retry(access_token))
            }
            Err(e) => {
                if !self.store.clear_session_for(&refresh_token) {
                    debug!(error = %e, "Session changed during refresh; ignoring refusal");
                    return Ok(Refreshed::NoRefreshToken);
                }
                warn!(error = %e, "Token refresh failed; ending session");
                *refused = rejected.cloned();
                transition.finish(SessionState::NoSession);
                self.signals.emit(SessionEvent::SignedOut {
                    reason: SignOutReason::RefreshFailed,
                });
                Err(AuthError::RefreshExhausted.into())
            }
        }
    }

    async fn exchange(&self, refresh_token: &RefreshToken) -> Result<AccessToken> {
        let request = ApiRequest::post(REFRESH).json(&RefreshRequest {
            refresh_token: refresh_token.as_str(),
        })?;

        let response: RefreshResponse = self.transport.send(&request).await?.into_json()?;
        Ok(response.access_token)
    }
}

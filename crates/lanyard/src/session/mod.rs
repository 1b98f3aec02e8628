//! Session lifecycle: login, signup, logout and session resolution.

mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::api::endpoints::AuthResponse;
use crate::api::{AuthApi, HttpTransport, Transport};
use crate::auth::{LoginCredentials, SignupDetails};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::store::CredentialStore;
use crate::types::UserProfile;

pub use state::{SessionEvent, SessionSignals, SessionState, SignOutReason};

const LOGIN_FAILED: &str = "Login failed. Please try again.";
const SIGNUP_FAILED: &str = "Signup failed. Please try again.";

/// Errors surfaced to the UI.
///
/// `Display` is the message to show the user.
#[derive(Debug, Error)]
pub enum SessionError {
    /// There is no usable session; send the user to sign in.
    #[error("not signed in")]
    Unauthenticated,

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Error,
    },
}

impl SessionError {
    /// Wrap `source`, preferring the backend's message over `fallback`.
    fn failed(source: Error, fallback: &str) -> Self {
        let message = source
            .user_message()
            .filter(|message| !message.is_empty())
            .unwrap_or(fallback)
            .to_string();
        SessionError::Failed { message, source }
    }

    /// The underlying library error, if any.
    pub fn error(&self) -> Option<&Error> {
        match self {
            SessionError::Unauthenticated => None,
            SessionError::Failed { source, .. } => Some(source),
        }
    }
}

/// A stored session whose validity the backend has not yet confirmed.
///
/// [`cached`](Self::cached) is available immediately for provisional
/// display. The `GET /auth/me` check is a future the caller drives: no
/// request is sent until [`verified`](Self::verified) is polled, so render
/// the cached profile first and then await (or `tokio::join!`) the
/// verification alongside other work. A `PendingSession` that is dropped
/// without being awaited never verifies, and leaves the store untouched;
/// the next protected call still goes through the gateway's refresh.
#[must_use = "the backend check only runs when `verified()` is awaited"]
pub struct PendingSession {
    cached: Option<UserProfile>,
    verification: BoxFuture<'static, Result<UserProfile, SessionError>>,
}

impl PendingSession {
    /// The profile cached by the last successful login or verification.
    pub fn cached(&self) -> Option<&UserProfile> {
        self.cached.as_ref()
    }

    /// Ask the backend who the stored token belongs to.
    ///
    /// On failure the whole session has already been cleared and a
    /// [`SessionEvent::SignedOut`] emitted.
    pub async fn verified(self) -> Result<UserProfile, SessionError> {
        self.verification.await
    }
}

impl fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSession")
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

/// Owns one user session against one backend.
///
/// Cheap to clone; clones share credentials, signals and the refresh lock.
#[derive(Debug, Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

#[derive(Debug)]
struct ControllerInner {
    api: AuthApi,
    store: CredentialStore,
    signals: SessionSignals,
    logout_timeout: Duration,
}

impl SessionController {
    /// Build a controller talking HTTP to `config.api_url`.
    pub fn new(config: &ClientConfig) -> crate::Result<Self> {
        let store = CredentialStore::open(&config.storage, config.token_policy)?;
        let transport = HttpTransport::new(config.api_url.clone(), config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport), store))
    }

    /// Build a controller over an explicit transport and store.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: CredentialStore,
    ) -> Self {
        let initial = if store.is_authenticated() {
            SessionState::Active
        } else {
            SessionState::NoSession
        };
        let signals = SessionSignals::new(initial);
        let gateway = Gateway::new(transport, store.clone(), signals.clone());

        Self {
            inner: Arc::new(ControllerInner {
                api: AuthApi::new(gateway),
                store,
                signals,
                logout_timeout: config.logout_timeout,
            }),
        }
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<UserProfile, SessionError> {
        let transition = self.inner.signals.transition(SessionState::Authenticating);

        let response = self
            .inner
            .api
            .login(credentials)
            .await
            .map_err(|e| SessionError::failed(e, LOGIN_FAILED))?;
        let user = self
            .install(response)
            .map_err(|e| SessionError::failed(e, LOGIN_FAILED))?;

        transition.finish(SessionState::Active);
        info!(user_id = %user.id, "Logged in");
        self.signed_in(&user);
        Ok(user)
    }

    /// Create an account and sign straight into it.
    ///
    /// Field validation (including password confirmation) is the caller's.
    #[instrument(skip(self, details), fields(email = %details.email()))]
    pub async fn signup(&self, details: &SignupDetails) -> Result<UserProfile, SessionError> {
        let transition = self.inner.signals.transition(SessionState::Authenticating);

        let response = self
            .inner
            .api
            .signup(details)
            .await
            .map_err(|e| SessionError::failed(e, SIGNUP_FAILED))?;
        let user = self
            .install(response)
            .map_err(|e| SessionError::failed(e, SIGNUP_FAILED))?;

        transition.finish(SessionState::Active);
        info!(user_id = %user.id, "Account created");
        self.signed_in(&user);
        Ok(user)
    }

    /// End the session.
    ///
    /// Local credentials are cleared before the backend is told, so the
    /// user is signed out even if this future is dropped. The backend
    /// revoke is best-effort and bounded by the configured logout timeout.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let token = self.inner.store.access_token();

        self.inner.store.clear_all();
        self.inner.signals.set_state(SessionState::NoSession);
        self.inner.signals.emit(SessionEvent::SignedOut {
            reason: SignOutReason::Logout,
        });
        info!("Logged out");

        let Some(token) = token else {
            debug!("No stored session to revoke");
            return;
        };

        match tokio::time::timeout(self.inner.logout_timeout, self.inner.api.logout(token)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Backend logout failed"),
            Err(_) => warn!(
                timeout_ms = self.inner.logout_timeout.as_millis() as u64,
                "Backend logout timed out"
            ),
        }
    }

    /// Look up the stored session.
    ///
    /// Fails with [`SessionError::Unauthenticated`] straight away when no
    /// access token is stored; no request is made.
    pub fn resolve_current_session(&self) -> Result<PendingSession, SessionError> {
        if !self.inner.store.is_authenticated() {
            return Err(SessionError::Unauthenticated);
        }

        let cached = self.inner.store.profile_cache();
        let controller = self.clone();
        Ok(PendingSession {
            cached,
            verification: async move { controller.verify().await }.boxed(),
        })
    }

    /// Resolve the stored session and wait for the backend to confirm it.
    pub async fn current_user(&self) -> Result<UserProfile, SessionError> {
        self.resolve_current_session()?.verified().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    pub fn state(&self) -> SessionState {
        self.inner.signals.state()
    }

    pub fn watch(&self) -> tokio::sync::watch::Receiver<SessionState> {
        self.inner.signals.watch()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.signals.subscribe()
    }

    /// The authenticated gateway, for calls to endpoints beyond auth.
    pub fn gateway(&self) -> &Gateway {
        self.inner.api.gateway()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    #[instrument(skip(self))]
    async fn verify(&self) -> Result<UserProfile, SessionError> {
        match self.inner.api.me().await {
            Ok(user) => {
                // A logout while the call was in flight wins.
                if !self.inner.store.is_authenticated() {
                    debug!("Session ended during verification");
                    return Err(SessionError::Unauthenticated);
                }
                if let Err(e) = self.inner.store.set_profile_cache(&user) {
                    warn!(error = %e, "Failed to cache verified profile");
                }
                debug!(user_id = %user.id, "Session verified");
                Ok(user)
            }
            Err(e) => {
                // Logout or an exhausted refresh has already ended the
                // session and announced it.
                let had_session = self.inner.store.is_authenticated();
                self.inner.store.clear_all();
                if had_session {
                    warn!(error = %e, "Session verification failed; signing out");
                    self.inner.signals.set_state(SessionState::NoSession);
                    self.inner.signals.emit(SessionEvent::SignedOut {
                        reason: SignOutReason::VerificationFailed,
                    });
                } else {
                    debug!(error = %e, "Session already ended");
                }
                Err(SessionError::Unauthenticated)
            }
        }
    }

    /// Persist a successful login or signup: tokens first, then the profile.
    /// A failed profile write rolls the tokens back.
    fn install(&self, response: AuthResponse) -> crate::Result<UserProfile> {
        let store = &self.inner.store;
        store.set_session(&response.access_token, &response.refresh_token)?;
        if let Err(e) = store.set_profile_cache(&response.user) {
            store.clear_session();
            return Err(e);
        }
        Ok(response.user)
    }

    fn signed_in(&self, user: &UserProfile) {
        self.inner
            .signals
            .emit(SessionEvent::SignedIn { user: user.clone() });
    }
}

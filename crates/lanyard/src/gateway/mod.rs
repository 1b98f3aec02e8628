//! Authenticated request gateway.
//!
//! [`Gateway::send`] decorates the [`Transport`] send primitive: it attaches
//! the stored access token, and when the backend answers 401 it runs the
//! refresh protocol and re-issues the request exactly once.
//!
//! Refresh outcomes:
//!
//! - **Success**: the new access token is stored (the refresh token is left
//!   alone) and the retry's response is returned as-is, even if it is
//!   another 401.
//! - **No refresh token**: the original 401 response is returned.
//! - **Failure**: both tokens are cleared, a
//!   [`SignedOut`](crate::SessionEvent::SignedOut) event with
//!   [`RefreshFailed`](crate::SignOutReason::RefreshFailed) is emitted, and
//!   the call fails with [`AuthError::RefreshExhausted`](crate::error::AuthError).
//!
//! Concurrent requests rejected with the same token share a single refresh.

mod refresh;

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::Result;
use crate::api::{ApiRequest, ApiResponse, Transport};
use crate::session::SessionSignals;
use crate::store::CredentialStore;

use refresh::{Refreshed, Refresher};

/// Sends requests with the stored credentials, refreshing them on 401.
///
/// Cheap to clone; clones share the refresh lock.
#[derive(Debug, Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

#[derive(Debug)]
struct GatewayInner {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    refresher: Refresher,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: CredentialStore,
        signals: SessionSignals,
    ) -> Self {
        let refresher = Refresher::new(transport.clone(), store.clone(), signals);
        Self {
            inner: Arc::new(GatewayInner {
                transport,
                store,
                refresher,
            }),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Send an authorized request.
    ///
    /// Any bearer already set on `request` is replaced by the stored access
    /// token; with no stored token the request goes out unauthenticated.
    #[instrument(skip(self, request), fields(method = %request.method(), path = request.path()))]
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let sent_with = self.inner.store.access_token();
        request.set_bearer(sent_with.clone());

        let response = self.inner.transport.send(&request).await?;
        if !response.is_unauthorized() || request.is_retried() {
            return Ok(response);
        }

        request.mark_retried();
        debug!("Access token rejected");

        match self.inner.refresher.refresh(sent_with.as_ref()).await? {
            Refreshed::Retry(token) => {
                request.set_bearer(Some(token));
                debug!("Retrying with refreshed access token");
                self.inner.transport.send(&request).await
            }
            Refreshed::NoRefreshToken => Ok(response),
        }
    }

    /// Send a request exactly as built: no stored token, no refresh.
    #[instrument(skip(self, request), fields(method = %request.method(), path = request.path()))]
    pub async fn send_public(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.inner.transport.send(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::future::join_all;
    use serde_json::json;

    use crate::api::endpoints::{ME, REFRESH};
    use crate::auth::{AccessToken, RefreshToken};
    use crate::error::{AuthError, Error};
    use crate::session::{SessionEvent, SessionState, SignOutReason};

    /// Accepts only `valid_token` on protected paths. Refresh answers with
    /// `refresh_status` after a short delay and, when `honour_refreshed`
    /// is set, starts accepting the token it hands out.
    #[derive(Debug)]
    struct FakeBackend {
        valid_token: Mutex<String>,
        refresh_status: u16,
        honour_refreshed: bool,
        refresh_delay: Duration,
        refresh_calls: AtomicUsize,
        protected_calls: AtomicUsize,
        refresh_bodies: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeBackend {
        fn new(valid_token: &str, refresh_status: u16) -> Arc<Self> {
            Self::build(valid_token, refresh_status, true)
        }

        fn build(valid_token: &str, refresh_status: u16, honour_refreshed: bool) -> Arc<Self> {
            Self::with_delay(valid_token, refresh_status, honour_refreshed, Duration::from_millis(20))
        }

        fn slow(valid_token: &str) -> Arc<Self> {
            Self::with_delay(valid_token, 200, true, Duration::from_millis(200))
        }

        fn with_delay(
            valid_token: &str,
            refresh_status: u16,
            honour_refreshed: bool,
            refresh_delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                valid_token: Mutex::new(valid_token.to_string()),
                refresh_status,
                honour_refreshed,
                refresh_delay,
                refresh_calls: AtomicUsize::new(0),
                protected_calls: AtomicUsize::new(0),
                refresh_bodies: Mutex::new(Vec::new()),
            })
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn protected_calls(&self) -> usize {
            self.protected_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeBackend {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
            if request.path() == REFRESH {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                assert!(request.bearer_token().is_none());
                self.refresh_bodies
                    .lock()
                    .unwrap()
                    .push(request.body().cloned().unwrap_or_default());
                tokio::time::sleep(self.refresh_delay).await;

                if self.refresh_status != 200 {
                    return Ok(ApiResponse::json_body(
                        self.refresh_status,
                        &json!({"message": "Invalid refresh token", "statusCode": self.refresh_status}),
                    ));
                }
                if self.honour_refreshed {
                    *self.valid_token.lock().unwrap() = "fresh".to_string();
                }
                return Ok(ApiResponse::json_body(200, &json!({"accessToken": "fresh"})));
            }

            self.protected_calls.fetch_add(1, Ordering::SeqCst);
            let valid = self.valid_token.lock().unwrap().clone();
            match request.bearer_token() {
                Some(token) if token.as_str() == valid => {
                    Ok(ApiResponse::json_body(200, &json!({"ok": true})))
                }
                _ => Ok(ApiResponse::json_body(
                    401,
                    &json!({"message": "Unauthorized", "statusCode": 401}),
                )),
            }
        }
    }

    fn gateway_with(
        backend: Arc<FakeBackend>,
        access: &str,
        refresh: Option<&str>,
    ) -> (Gateway, SessionSignals) {
        let store = CredentialStore::in_memory();
        match refresh {
            Some(refresh) => store
                .set_session(&AccessToken::new(access), &RefreshToken::new(refresh))
                .unwrap(),
            None => store.set_access_token(&AccessToken::new(access)).unwrap(),
        }
        let signals = SessionSignals::new(SessionState::Active);
        (Gateway::new(backend, store, signals.clone()), signals)
    }

    #[tokio::test]
    async fn valid_token_passes_through() {
        let backend = FakeBackend::new("good", 200);
        let (gateway, _) = gateway_with(backend.clone(), "good", Some("r"));

        let response = gateway.send(ApiRequest::get(ME)).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_retried_once() {
        let backend = FakeBackend::new("not-yet", 200);
        let (gateway, signals) = gateway_with(backend.clone(), "stale", Some("r-1"));

        let response = gateway.send(ApiRequest::get(ME)).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.protected_calls(), 2);
        assert_eq!(gateway.store().access_token(), Some(AccessToken::new("fresh")));
        assert_eq!(gateway.store().refresh_token(), Some(RefreshToken::new("r-1")));
        assert_eq!(
            backend.refresh_bodies.lock().unwrap()[0],
            json!({"refreshToken": "r-1"})
        );
        assert_eq!(signals.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn second_rejection_is_returned_without_another_refresh() {
        let backend = FakeBackend::build("nobody", 200, false);
        let (gateway, _) = gateway_with(backend.clone(), "stale", Some("r"));

        let response = gateway.send(ApiRequest::get(ME)).await.unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.protected_calls(), 2);
    }

    #[tokio::test]
    async fn missing_refresh_token_returns_original_rejection() {
        let backend = FakeBackend::new("good", 200);
        let (gateway, _) = gateway_with(backend.clone(), "stale", None);

        let response = gateway.send(ApiRequest::get(ME)).await.unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_refresh_tears_session_down() {
        let backend = FakeBackend::new("good", 401);
        let (gateway, signals) = gateway_with(backend.clone(), "stale", Some("expired"));
        let mut events = signals.subscribe();

        let err = gateway.send(ApiRequest::get(ME)).await.unwrap_err();

        assert!(matches!(err, Error::Auth(AuthError::RefreshExhausted)));
        assert!(gateway.store().access_token().is_none());
        assert!(gateway.store().refresh_token().is_none());
        assert_eq!(signals.state(), SessionState::NoSession);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedOut {
                reason: SignOutReason::RefreshFailed
            }
        );
        // No retry after a failed refresh.
        assert_eq!(backend.protected_calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let backend = FakeBackend::new("not-yet", 200);
        let (gateway, _) = gateway_with(backend.clone(), "stale", Some("r"));

        let calls = (0..8).map(|_| gateway.send(ApiRequest::get(ME)));
        let responses = join_all(calls).await;

        for response in responses {
            assert_eq!(response.unwrap().status(), 200);
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(gateway.store().access_token(), Some(AccessToken::new("fresh")));
    }

    #[tokio::test]
    async fn concurrent_rejections_fail_together_when_refresh_is_refused() {
        let backend = FakeBackend::new("good", 400);
        let (gateway, _) = gateway_with(backend.clone(), "stale", Some("r"));

        let calls = (0..4).map(|_| gateway.send(ApiRequest::get(ME)));
        let responses = join_all(calls).await;

        assert_eq!(backend.refresh_calls(), 1);
        for response in responses {
            assert!(matches!(
                response,
                Err(Error::Auth(AuthError::RefreshExhausted))
            ));
        }
        assert!(!gateway.store().is_authenticated());
    }

    #[tokio::test]
    async fn logout_during_refresh_discards_new_token() {
        let backend = FakeBackend::slow("not-yet");
        let (gateway, signals) = gateway_with(backend.clone(), "stale", Some("r"));

        let call = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.send(ApiRequest::get(ME)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(signals.state(), SessionState::RefreshingToken);

        // What SessionController::logout does locally.
        gateway.store().clear_all();
        signals.set_state(SessionState::NoSession);

        let response = call.await.unwrap().unwrap();

        assert_eq!(response.status(), 401);
        assert!(gateway.store().access_token().is_none());
        assert!(gateway.store().refresh_token().is_none());
        assert_eq!(signals.state(), SessionState::NoSession);
        assert_eq!(backend.protected_calls(), 1);
    }

    #[tokio::test]
    async fn refusal_after_new_login_keeps_new_session() {
        let backend = FakeBackend::with_delay("good", 401, true, Duration::from_millis(200));
        let (gateway, signals) = gateway_with(backend.clone(), "stale", Some("r-old"));
        let mut events = signals.subscribe();

        let call = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.send(ApiRequest::get(ME)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        gateway
            .store()
            .set_session(&AccessToken::new("good"), &RefreshToken::new("r-new"))
            .unwrap();
        signals.set_state(SessionState::Active);

        let response = call.await.unwrap().unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(gateway.store().access_token(), Some(AccessToken::new("good")));
        assert_eq!(signals.state(), SessionState::Active);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_refresh_restores_state_and_releases_lock() {
        let backend = FakeBackend::slow("not-yet");
        let (gateway, signals) = gateway_with(backend.clone(), "stale", Some("r"));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), gateway.send(ApiRequest::get(ME)))
                .await;

        assert!(abandoned.is_err());
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(signals.state(), SessionState::Active);
        assert_eq!(gateway.store().access_token(), Some(AccessToken::new("stale")));

        let response = tokio::time::timeout(
            Duration::from_secs(2),
            gateway.send(ApiRequest::get(ME)),
        )
        .await
        .expect("refresh lock still held")
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(backend.refresh_calls(), 2);
        assert_eq!(signals.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn public_requests_skip_token_and_refresh() {
        let backend = FakeBackend::new("good", 200);
        let (gateway, _) = gateway_with(backend.clone(), "good", Some("r"));

        let response = gateway.send_public(ApiRequest::get(ME)).await.unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(backend.refresh_calls(), 0);
    }
}

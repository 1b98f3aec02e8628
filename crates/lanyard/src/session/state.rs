//! Session state machine and navigation signals.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::types::UserProfile;

const EVENT_CAPACITY: usize = 16;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    /// A login or signup call is in flight.
    Authenticating,
    Active,
    /// The access token was rejected and a refresh is in flight.
    RefreshingToken,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    Logout,
    /// The refresh token was missing, rejected, or unreachable.
    RefreshFailed,
    /// The backend would not confirm the stored session.
    VerificationFailed,
}

/// Navigation signals for the UI.
///
/// `SignedIn` means "go to the authenticated area"; `SignedOut` means "go
/// to the unauthenticated entry point".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user: UserProfile },
    SignedOut { reason: SignOutReason },
}

/// Shared handle publishing [`SessionState`] and [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionSignals {
    state: Arc<watch::Sender<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionSignals {
    pub fn new(initial: SessionState) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            trace!(?previous, ?state, "Session state changed");
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Enter `during` until the returned guard is finished. A guard dropped
    /// unfinished (error path or cancelled future) restores the state that
    /// was current when it was created, unless something else has moved
    /// the state on in the meantime.
    pub(crate) fn transition(&self, during: SessionState) -> Transition {
        let previous = self.state.send_replace(during);
        Transition {
            signals: self.clone(),
            during,
            previous,
            finished: false,
        }
    }
}

#[must_use = "dropping a transition restores the previous state"]
pub(crate) struct Transition {
    signals: SessionSignals,
    during: SessionState,
    previous: SessionState,
    finished: bool,
}

impl Transition {
    pub(crate) fn finish(mut self, state: SessionState) {
        self.finished = true;
        self.signals.set_state(state);
    }
}

impl Drop for Transition {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let (during, previous) = (self.during, self.previous);
        let restored = self.signals.state.send_if_modified(|state| {
            if *state == during {
                *state = previous;
                true
            } else {
                false
            }
        });
        if restored {
            trace!(?during, ?previous, "Session state restored");
        }
    }
}

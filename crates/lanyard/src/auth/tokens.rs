//! Bearer token types.
//!
//! Both tokens are opaque strings issued by the backend. They decode
//! straight from a JSON string (`"accessToken": "..."`) and are never
//! serialized back out except by the credential store, which writes
//! [`as_str`](AccessToken::as_str) explicitly. Debug output shows only the
//! length.

use std::fmt;

use serde::Deserialize;

macro_rules! opaque_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            /// The raw token, for the wire and for the credential store.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(<{} bytes>)", stringify!($name), self.0.len())
            }
        }
    };
}

opaque_token! {
    /// Short-lived credential attached to protected calls.
    ///
    /// Rejected with 401 once the backend considers it expired; the gateway
    /// then exchanges the [`RefreshToken`] for a new one.
    AccessToken
}

opaque_token! {
    /// Long-lived credential whose only use is `POST /auth/refresh`.
    ///
    /// It is never attached as a bearer header.
    RefreshToken
}

impl AccessToken {
    /// The `Authorization` header value: `Bearer <token>`.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

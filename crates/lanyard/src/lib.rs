//! lanyard - Session and Token Lifecycle Library
//!
//! This library keeps a web application's user signed in against a
//! bearer-token backend. All session operations flow through a
//! [`SessionController`]; every authenticated call goes through its
//! [`Gateway`], which refreshes an expired access token transparently.
//!
//! # Example
//!
//! ```no_run
//! use lanyard::{ClientConfig, LoginCredentials, SessionController};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let session = SessionController::new(&config)?;
//!
//! let user = session
//!     .login(&LoginCredentials::new("ada@example.com", "correct horse"))
//!     .await?;
//! println!("Hello, {}", user.display_name());
//!
//! // Later, or in another process with durable storage:
//! let pending = session.resolve_current_session()?;
//! if let Some(cached) = pending.cached() {
//!     println!("Probably {}", cached.email);
//! }
//! let verified = pending.verified().await?;
//! println!("Definitely {}", verified.email);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod store;
pub mod types;

// Re-export primary types at crate root for convenience
pub use auth::{AccessToken, LoginCredentials, RefreshToken, SignupDetails};
pub use config::ClientConfig;
pub use error::Error;
pub use gateway::Gateway;
pub use session::{
    PendingSession, SessionController, SessionError, SessionEvent, SessionSignals, SessionState,
    SignOutReason,
};
pub use store::{CredentialStore, SessionExpiry, StorageConfig, TokenPolicy};
pub use types::{ApiUrl, UserProfile};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

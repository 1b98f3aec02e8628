//! Authentication primitives: bearer tokens and credential inputs.

mod credentials;
mod tokens;

pub use credentials::{LoginCredentials, SignupDetails};
pub use tokens::{AccessToken, RefreshToken};

//! Backend HTTP API.
//!
//! [`Transport`] is the request-send primitive; [`HttpTransport`] is its
//! reqwest implementation. [`AuthApi`] wraps the auth endpoints.

mod auth;
pub mod endpoints;
mod transport;

pub use auth::AuthApi;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

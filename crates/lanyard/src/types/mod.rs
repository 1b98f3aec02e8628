//! Core value types.

mod api_url;
mod profile;

pub use api_url::ApiUrl;
pub use profile::UserProfile;

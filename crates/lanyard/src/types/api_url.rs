//! Backend base URL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::{Host, Url};

use crate::error::{Error, InvalidInputError};

/// Base URL of the auth backend, e.g. `https://api.example.com/v1/`.
///
/// Every request carries a bearer token or a password, so the URL must be
/// `https` unless it points at this machine (`localhost`, `127.0.0.0/8` or
/// `[::1]`), which is where a development backend runs.
///
/// # Example
///
/// ```
/// use lanyard::ApiUrl;
///
/// let api = ApiUrl::new("https://api.example.com/v1").unwrap();
/// assert_eq!(api.endpoint("/auth/login"), "https://api.example.com/v1/auth/login");
/// assert!(ApiUrl::new("http://api.example.com").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApiUrl(Url);

impl ApiUrl {
    pub fn new(value: impl AsRef<str>) -> Result<Self, Error> {
        let value = value.as_ref();
        let reject = |reason: &str| -> Error {
            InvalidInputError::ApiUrl {
                value: value.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        let url = Url::parse(value).map_err(|e| reject(&e.to_string()))?;
        let Some(host) = url.host() else {
            return Err(reject("must have a host"));
        };

        match url.scheme() {
            "https" => {}
            "http" if is_loopback(&host) => {}
            "http" => return Err(reject("plain HTTP is only allowed for a local backend")),
            other => return Err(reject(&format!("unsupported scheme `{other}`"))),
        }

        Ok(Self(url))
    }

    /// Full URL of an endpoint path such as `/auth/me`, kept under any
    /// base path prefix.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }
}

fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

impl fmt::Display for ApiUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for ApiUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ApiUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ApiUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

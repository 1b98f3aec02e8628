//! Credential persistence.
//!
//! The [`Storage`] trait is the key/value capability the rest of the crate
//! writes through. Two implementations exist: [`MemoryStorage`] for tests
//! and short-lived processes, and [`FileStorage`] for sessions that must
//! survive a restart. [`StorageConfig`] selects one at startup; nothing
//! else in the crate branches on which one is in use.
//!
//! [`CredentialStore`] layers the session operations (tokens plus cached
//! profile) on top of two storages.

mod credentials;
mod file;
mod memory;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use credentials::{CredentialStore, SessionExpiry, TokenPolicy};
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A stored value with its declared expiry.
///
/// The expiry is metadata only; storages never drop an entry because it
/// has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }
}

/// Synchronous key/value persistence.
///
/// `store` and `remove` apply their whole batch atomically: a reader never
/// observes half of a batch.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Read one entry. A missing key is `Ok(None)`.
    fn load(&self, key: &str) -> Result<Option<StoredEntry>>;

    /// Write a batch of entries, replacing existing values.
    fn store(&self, entries: &[(&str, StoredEntry)]) -> Result<()>;

    /// Remove a batch of keys. Missing keys are ignored.
    fn remove(&self, keys: &[&str]) -> Result<()>;
}

/// Which storage backs the credential store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StorageConfig {
    /// Process-local; the session ends with the process.
    #[default]
    InMemory,
    /// JSON documents under `dir` (`tokens.json`, `profile.json`).
    Durable { dir: PathBuf },
}

//! Session operations over the storage capability.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::Result;
use crate::auth::{AccessToken, RefreshToken};
use crate::types::UserProfile;

use super::{FileStorage, MemoryStorage, Storage, StorageConfig, StoredEntry};

const ACCESS_TOKEN_KEY: &str = "accessToken";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const PROFILE_KEY: &str = "user";

const TOKENS_FILE: &str = "tokens.json";
const PROFILE_FILE: &str = "profile.json";

/// Declared lifetimes written alongside each token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::days(7),
            refresh_ttl: Duration::days(30),
        }
    }
}

/// Declared expirations of the stored tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionExpiry {
    pub access_token: Option<DateTime<Utc>>,
    pub refresh_token: Option<DateTime<Utc>>,
}

/// The access token, refresh token, and cached profile of one session.
///
/// Cheap to clone; clones share the same storages. Reads and clears never
/// fail: a storage error is logged and the value treated as absent.
/// Writes report storage errors to the caller.
#[derive(Clone)]
pub struct CredentialStore {
    tokens: Arc<dyn Storage>,
    profiles: Arc<dyn Storage>,
    policy: TokenPolicy,
    // Serializes token writes so a conditional write cannot interleave
    // with a clear.
    token_writes: Arc<Mutex<()>>,
}

impl CredentialStore {
    /// Build a store from explicit storages.
    pub fn new(tokens: Arc<dyn Storage>, profiles: Arc<dyn Storage>, policy: TokenPolicy) -> Self {
        Self {
            tokens,
            profiles,
            policy,
            token_writes: Arc::new(Mutex::new(())),
        }
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            TokenPolicy::default(),
        )
    }

    /// Open the storages selected by `config`.
    pub fn open(config: &StorageConfig, policy: TokenPolicy) -> Result<Self> {
        match config {
            StorageConfig::InMemory => Ok(Self::new(
                Arc::new(MemoryStorage::new()),
                Arc::new(MemoryStorage::new()),
                policy,
            )),
            StorageConfig::Durable { dir } => {
                debug!(dir = %dir.display(), "Opening durable credential store");
                Ok(Self::new(
                    Arc::new(FileStorage::open(dir.join(TOKENS_FILE))?),
                    Arc::new(FileStorage::open(dir.join(PROFILE_FILE))?),
                    policy,
                ))
            }
        }
    }

    /// Install both tokens in one atomic write.
    pub fn set_session(&self, access: &AccessToken, refresh: &RefreshToken) -> Result<()> {
        let _writing = self.lock_token_writes();
        let now = Utc::now();
        self.tokens.store(&[
            (
                ACCESS_TOKEN_KEY,
                StoredEntry::new(access.as_str(), Some(now + self.policy.access_ttl)),
            ),
            (
                REFRESH_TOKEN_KEY,
                StoredEntry::new(refresh.as_str(), Some(now + self.policy.refresh_ttl)),
            ),
        ])?;
        debug!("Session tokens stored");
        Ok(())
    }

    /// Replace the access token after a refresh; the refresh token is untouched.
    pub fn set_access_token(&self, access: &AccessToken) -> Result<()> {
        let _writing = self.lock_token_writes();
        self.write_access_token(access)
    }

    /// Install a refreshed access token only if `exchanged` is still the
    /// stored refresh token.
    ///
    /// Returns `false`, writing nothing, when the session was cleared or
    /// replaced while the refresh was in flight.
    pub fn replace_access_token(
        &self,
        exchanged: &RefreshToken,
        access: &AccessToken,
    ) -> Result<bool> {
        let _writing = self.lock_token_writes();
        if self.refresh_token().as_ref() != Some(exchanged) {
            return Ok(false);
        }
        self.write_access_token(access)?;
        Ok(true)
    }

    /// Remove both tokens only if `exchanged` is still the stored refresh
    /// token. Returns whether the session was cleared.
    pub fn clear_session_for(&self, exchanged: &RefreshToken) -> bool {
        let _writing = self.lock_token_writes();
        if self.refresh_token().as_ref() != Some(exchanged) {
            return false;
        }
        self.remove_tokens();
        true
    }

    fn write_access_token(&self, access: &AccessToken) -> Result<()> {
        let expires_at = Utc::now() + self.policy.access_ttl;
        self.tokens.store(&[(
            ACCESS_TOKEN_KEY,
            StoredEntry::new(access.as_str(), Some(expires_at)),
        )])
    }

    /// Remove both tokens. Safe to call with no session.
    pub fn clear_session(&self) {
        let _writing = self.lock_token_writes();
        self.remove_tokens();
    }

    fn remove_tokens(&self) {
        if let Err(e) = self.tokens.remove(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]) {
            warn!(error = %e, "Failed to clear session tokens");
        }
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.load(&*self.tokens, ACCESS_TOKEN_KEY)
            .map(|entry| AccessToken::new(entry.value))
    }

    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.load(&*self.tokens, REFRESH_TOKEN_KEY)
            .map(|entry| RefreshToken::new(entry.value))
    }

    /// True iff an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Declared expirations of the stored tokens, if any.
    pub fn expiry(&self) -> SessionExpiry {
        SessionExpiry {
            access_token: self
                .load(&*self.tokens, ACCESS_TOKEN_KEY)
                .and_then(|e| e.expires_at),
            refresh_token: self
                .load(&*self.tokens, REFRESH_TOKEN_KEY)
                .and_then(|e| e.expires_at),
        }
    }

    pub fn set_profile_cache(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        self.profiles
            .store(&[(PROFILE_KEY, StoredEntry::new(json, None))])
    }

    /// The cached profile. An undecodable cache reads as absent.
    pub fn profile_cache(&self) -> Option<UserProfile> {
        let entry = self.load(&*self.profiles, PROFILE_KEY)?;
        match serde_json::from_str(&entry.value) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable profile cache");
                None
            }
        }
    }

    pub fn clear_profile_cache(&self) {
        if let Err(e) = self.profiles.remove(&[PROFILE_KEY]) {
            warn!(error = %e, "Failed to clear profile cache");
        }
    }

    /// Remove tokens and the cached profile.
    pub fn clear_all(&self) {
        self.clear_session();
        self.clear_profile_cache();
    }

    fn lock_token_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.token_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, storage: &dyn Storage, key: &str) -> Option<StoredEntry> {
        match storage.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Credential store read failed");
                None
            }
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("tokens", &self.tokens)
            .field("profiles", &self.profiles)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile() -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": "u-1",
            "email": "ada@example.com",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "createdAt": "2024-03-01T10:00:00Z",
            "updatedAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn set_get_clear_round_trip() {
        let store = CredentialStore::in_memory();
        store
            .set_session(&AccessToken::new("a"), &RefreshToken::new("r"))
            .unwrap();

        assert_eq!(store.access_token(), Some(AccessToken::new("a")));
        assert_eq!(store.refresh_token(), Some(RefreshToken::new("r")));
        assert!(store.is_authenticated());

        store.clear_session();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn clears_are_idempotent_without_session() {
        let store = CredentialStore::in_memory();
        store.clear_session();
        store.clear_profile_cache();
        store.clear_all();
        assert!(store.access_token().is_none());
        assert!(store.profile_cache().is_none());
    }

    #[test]
    fn refresh_replaces_only_access_token() {
        let store = CredentialStore::in_memory();
        store
            .set_session(&AccessToken::new("old"), &RefreshToken::new("r"))
            .unwrap();
        store.set_access_token(&AccessToken::new("new")).unwrap();

        assert_eq!(store.access_token(), Some(AccessToken::new("new")));
        assert_eq!(store.refresh_token(), Some(RefreshToken::new("r")));
    }

    #[test]
    fn refreshed_token_is_dropped_after_session_ends() {
        let store = CredentialStore::in_memory();
        let refresh = RefreshToken::new("r");
        store
            .set_session(&AccessToken::new("old"), &refresh)
            .unwrap();
        store.clear_session();

        let installed = store
            .replace_access_token(&refresh, &AccessToken::new("new"))
            .unwrap();

        assert!(!installed);
        assert!(store.access_token().is_none());
    }

    #[test]
    fn refusal_only_clears_the_session_it_belongs_to() {
        let store = CredentialStore::in_memory();
        store
            .set_session(&AccessToken::new("a-2"), &RefreshToken::new("r-2"))
            .unwrap();

        assert!(!store.clear_session_for(&RefreshToken::new("r-1")));
        assert!(store.is_authenticated());
        assert!(store.clear_session_for(&RefreshToken::new("r-2")));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn refreshed_token_is_dropped_after_new_login() {
        let store = CredentialStore::in_memory();
        store
            .set_session(&AccessToken::new("a-1"), &RefreshToken::new("r-1"))
            .unwrap();
        store
            .set_session(&AccessToken::new("a-2"), &RefreshToken::new("r-2"))
            .unwrap();

        let installed = store
            .replace_access_token(&RefreshToken::new("r-1"), &AccessToken::new("stale"))
            .unwrap();

        assert!(!installed);
        assert_eq!(store.access_token(), Some(AccessToken::new("a-2")));
        assert!(
            store
                .replace_access_token(&RefreshToken::new("r-2"), &AccessToken::new("a-3"))
                .unwrap()
        );
        assert_eq!(store.access_token(), Some(AccessToken::new("a-3")));
    }

    #[test]
    fn expiry_follows_policy_windows() {
        let store = CredentialStore::in_memory();
        let before = Utc::now();
        store
            .set_session(&AccessToken::new("a"), &RefreshToken::new("r"))
            .unwrap();

        let expiry = store.expiry();
        let access = expiry.access_token.unwrap();
        let refresh = expiry.refresh_token.unwrap();
        assert!(access >= before + Duration::days(7));
        assert!(refresh >= before + Duration::days(30));
        assert!(refresh > access);
    }

    #[test]
    fn profile_cache_is_independent_of_tokens() {
        let store = CredentialStore::in_memory();
        store.set_profile_cache(&profile()).unwrap();
        store.clear_session();

        assert_eq!(store.profile_cache(), Some(profile()));

        store.clear_profile_cache();
        assert!(store.profile_cache().is_none());
    }

    #[test]
    fn durable_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::Durable {
            dir: dir.path().to_path_buf(),
        };

        let store = CredentialStore::open(&config, TokenPolicy::default()).unwrap();
        store
            .set_session(&AccessToken::new("a"), &RefreshToken::new("r"))
            .unwrap();
        store.set_profile_cache(&profile()).unwrap();
        drop(store);

        let reopened = CredentialStore::open(&config, TokenPolicy::default()).unwrap();
        assert_eq!(reopened.access_token(), Some(AccessToken::new("a")));
        assert_eq!(reopened.profile_cache(), Some(profile()));
    }

    #[test]
    fn corrupt_token_file_reads_as_no_session() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(TOKENS_FILE), "{").unwrap();
        let config = StorageConfig::Durable {
            dir: dir.path().to_path_buf(),
        };

        let store = CredentialStore::open(&config, TokenPolicy::default()).unwrap();
        assert!(!store.is_authenticated());
    }
}

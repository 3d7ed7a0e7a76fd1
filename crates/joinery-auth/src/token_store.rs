//! Credential/session store.
//!
//! [`CredentialStore`] reads and writes [`SessionRecord`]s in one of the two
//! storage areas and decides which area is authoritative. Exactly one area
//! holds a record at a time: storing into one clears the other.
//!
//! All read-modify-write sequences run under one mutex, so concurrent callers
//! never observe a partially written record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use joinery_vault::{StorageArea, StorageAreaExt, Tier, TieredStorage, VaultError};

use crate::error::{AuthError, Result};
use crate::types::{SessionRecord, SessionValidation, User, expiry_from_now, keys};

/// Default window before expiry in which a stored token "needs refresh".
const DEFAULT_REFRESH_WINDOW_SECS: i64 = 5 * 60;

/// Reads and writes session records in the tiered storage.
pub struct CredentialStore {
    storage: TieredStorage,
    refresh_window: chrono::Duration,
    lock: Mutex<()>,
    /// Bumped on every purge so late writers can detect a logout.
    generation: AtomicU64,
}

impl CredentialStore {
    pub fn new(storage: TieredStorage) -> Self {
        Self {
            storage,
            refresh_window: chrono::Duration::seconds(DEFAULT_REFRESH_WINDOW_SECS),
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Use a different "needs refresh" window.
    pub fn with_refresh_window(mut self, window: std::time::Duration) -> Self {
        self.refresh_window = chrono::Duration::from_std(window)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_REFRESH_WINDOW_SECS));
        self
    }

    pub fn storage(&self) -> &TieredStorage {
        &self.storage
    }

    /// Current purge generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // -- Writes -------------------------------------------------------------

    /// Write `record` into the area selected by `record.persistent`.
    ///
    /// Clears the other area's record, and the demo flag in both areas. A
    /// record without a user is ignored.
    pub fn store(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.guard();
        self.store_locked(record)
    }

    /// Replace the access token of the current session after a refresh.
    ///
    /// Keeps the stored user and persistence mode; keeps the old refresh
    /// token when the backend did not rotate it. Returns `false` without
    /// writing when no user is stored, or when the store was purged since
    /// `expected_generation` was read (a logout won the race).
    ///
    /// A lifetime that is not positive or overflows the clock is an
    /// [`AuthError::RefreshFailed`] and leaves the stored session untouched.
    pub fn update_token(
        &self,
        access_token: &str,
        expires_in: i64,
        refresh_token: Option<String>,
        expected_generation: u64,
    ) -> Result<bool> {
        let expiry = expiry_from_now(expires_in).ok_or_else(|| AuthError::RefreshFailed {
            reason: format!("invalid token lifetime: {expires_in}s"),
        })?;
        let _guard = self.guard();

        if self.generation() != expected_generation {
            tracing::info!("session was cleared during refresh, discarding new token");
            return Ok(false);
        }

        let area = self.storage.area(self.active_tier()?);
        let user = match area.get_json::<User>(keys::CURRENT_USER) {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(false),
            Err(VaultError::Serialization(e)) => {
                tracing::warn!(error = %e, "stored user is corrupt, purging session");
                self.purge_locked()?;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let persistent = area.get(keys::AUTH_PERSISTENT)?.as_deref() == Some("true");
        let refresh_token = match refresh_token {
            Some(token) => Some(token),
            None => area.get(keys::REFRESH_TOKEN)?,
        };

        let record = SessionRecord {
            access_token: access_token.to_string(),
            refresh_token,
            expiry,
            user: Some(user),
            persistent,
        };
        self.store_locked(&record)?;
        Ok(true)
    }

    /// Record the "remember me" choice ahead of a login redirect, so the
    /// callback stores its session in the right area.
    pub fn remember_persistence(&self, persistent: bool) -> Result<()> {
        let _guard = self.guard();
        let tier = Tier::for_persistence(persistent);
        self.storage
            .area(tier)
            .set(keys::AUTH_PERSISTENT, &persistent.to_string())?;
        self.storage.area(tier.other()).remove(keys::AUTH_PERSISTENT)?;
        Ok(())
    }

    /// Remove every auth key (record, demo flag, OAuth nonce) from both areas.
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.guard();
        self.purge_locked()
    }

    // -- Reads --------------------------------------------------------------

    /// Validate whatever session is stored.
    ///
    /// Expired or corrupt sessions are purged from both areas before this
    /// returns.
    pub fn read(&self) -> Result<SessionValidation> {
        let _guard = self.guard();

        let area = self.storage.area(self.active_tier()?);
        let token = area.get(keys::JWT_TOKEN)?.filter(|t| !t.is_empty());
        let expiry_raw = area.get(keys::JWT_TOKEN_EXPIRY)?.filter(|e| !e.is_empty());
        let (Some(_token), Some(expiry_raw)) = (token, expiry_raw) else {
            return Ok(SessionValidation::invalid());
        };

        let expiry = match parse_expiry(&expiry_raw) {
            Ok(expiry) => expiry,
            Err(e) => {
                tracing::warn!(error = %e, "purging session with unreadable expiry");
                self.purge_locked()?;
                return Ok(SessionValidation::invalid());
            }
        };

        let now = Utc::now();
        if expiry <= now {
            tracing::info!(expiry = %expiry, "stored session expired, purging");
            self.purge_locked()?;
            return Ok(SessionValidation::invalid());
        }

        let user = match area.get_json::<User>(keys::CURRENT_USER) {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!("stored session has no user, purging");
                self.purge_locked()?;
                return Ok(SessionValidation::invalid());
            }
            Err(VaultError::Serialization(e)) => {
                tracing::warn!(error = %e, "stored user is corrupt, purging session");
                self.purge_locked()?;
                return Ok(SessionValidation::invalid());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(SessionValidation {
            is_valid: true,
            user: Some(user),
            needs_refresh: expiry <= now + self.refresh_window,
            expiry: Some(expiry),
        })
    }

    /// The stored access token, if any.
    pub fn token(&self) -> Result<Option<String>> {
        self.read_active(keys::JWT_TOKEN)
    }

    /// The stored refresh token, if any.
    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.read_active(keys::REFRESH_TOKEN)
    }

    /// Whether the current session lives in durable storage.
    pub fn is_persistent(&self) -> Result<bool> {
        let _guard = self.guard();
        Ok(self.active_tier()? == Tier::Durable)
    }

    /// The area holding the current session.
    ///
    /// Whichever area holds a token wins (durable first). With no token
    /// anywhere, the stored persistence flag decides.
    pub fn active_tier(&self) -> Result<Tier> {
        if let Some(tier) = self.storage.locate(keys::JWT_TOKEN)? {
            return Ok(tier);
        }

        let persistent = Tier::all().into_iter().try_fold(false, |found, tier| {
            let flag = self.storage.area(tier).get(keys::AUTH_PERSISTENT)?;
            Ok::<_, VaultError>(found || flag.as_deref() == Some("true"))
        })?;

        Ok(Tier::for_persistence(persistent))
    }

    // -- Internal helpers ---------------------------------------------------

    /// The lock guards no data, so poisoning is ignored.
    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_active(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard();
        let value = self.storage.area(self.active_tier()?).get(key)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    fn store_locked(&self, record: &SessionRecord) -> Result<()> {
        let Some(user) = record.user.as_ref() else {
            tracing::debug!("refusing to store a session without a user");
            return Ok(());
        };

        let tier = Tier::for_persistence(record.persistent);
        let user_json = serde_json::to_string(user)?;
        let expiry = record.expiry.to_rfc3339();
        let persistent = record.persistent.to_string();

        let mut entries = vec![
            (keys::JWT_TOKEN, record.access_token.as_str()),
            (keys::JWT_TOKEN_EXPIRY, expiry.as_str()),
            (keys::CURRENT_USER, user_json.as_str()),
            (keys::AUTH_PERSISTENT, persistent.as_str()),
        ];
        if let Some(refresh) = record.refresh_token.as_deref() {
            entries.push((keys::REFRESH_TOKEN, refresh));
        }
        // Write the new record before clearing anything, so a failed write
        // leaves the previous session readable.
        let area = self.storage.area(tier);
        area.set_many(&entries)?;
        if record.refresh_token.is_none() {
            area.remove(keys::REFRESH_TOKEN)?;
        }
        area.remove(keys::DEMO_AUTH)?;
        self.storage.area(tier.other()).remove_many(&keys::ALL)?;

        tracing::debug!(tier = %tier, user_id = %user.id, "session stored");
        Ok(())
    }

    fn purge_locked(&self) -> Result<()> {
        self.storage.clear_keys(&keys::ALL)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("all session data purged");
        Ok(())
    }
}

fn parse_expiry(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use joinery_vault::MemoryArea;

    use super::*;

    /// An area whose writes always fail.
    struct ReadOnlyArea(MemoryArea);

    impl StorageArea for ReadOnlyArea {
        fn name(&self) -> &'static str {
            "read-only"
        }

        fn get(&self, key: &str) -> joinery_vault::Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, _key: &str, _value: &str) -> joinery_vault::Result<()> {
            Err(VaultError::Io(std::io::Error::other("disk full")))
        }

        fn remove(&self, key: &str) -> joinery_vault::Result<()> {
            self.0.remove(key)
        }

        fn keys(&self) -> joinery_vault::Result<Vec<String>> {
            self.0.keys()
        }
    }

    fn test_user() -> User {
        User {
            id: "u-1".to_string(),
            email: "grace@example.com".to_string(),
            name: "Grace".to_string(),
            avatar: None,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn record(persistent: bool, expires_in: i64) -> SessionRecord {
        SessionRecord {
            access_token: "access-1".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expiry: Utc::now() + TimeDelta::seconds(expires_in),
            user: Some(test_user()),
            persistent,
        }
    }

    fn area_is_empty(area: &dyn StorageArea) -> bool {
        area.keys().unwrap().is_empty()
    }

    #[test]
    fn store_then_read_returns_user() {
        let store = CredentialStore::new(TieredStorage::in_memory());
        store.store(&record(true, 3600)).unwrap();

        let validation = store.read().unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.user, Some(test_user()));
        assert!(!validation.needs_refresh);
        assert_eq!(store.token().unwrap().as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn persistent_store_leaves_ephemeral_empty() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());

        store.store(&record(false, 3600)).unwrap();
        assert!(!area_is_empty(storage.ephemeral()));

        store.store(&record(true, 3600)).unwrap();
        assert!(area_is_empty(storage.ephemeral()));
        assert!(store.is_persistent().unwrap());
    }

    #[test]
    fn store_without_user_is_noop() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        let mut rec = record(true, 3600);
        rec.user = None;

        store.store(&rec).unwrap();

        assert!(area_is_empty(storage.durable()));
        assert!(area_is_empty(storage.ephemeral()));
    }

    #[test]
    fn store_clears_demo_flag() {
        let storage = TieredStorage::in_memory();
        storage.durable().set(keys::DEMO_AUTH, "true").unwrap();
        storage.ephemeral().set(keys::DEMO_AUTH, "true").unwrap();

        CredentialStore::new(storage.clone())
            .store(&record(false, 3600))
            .unwrap();

        assert_eq!(storage.locate(keys::DEMO_AUTH).unwrap(), None);
    }

    #[test]
    fn expired_session_is_purged() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(true, -1)).unwrap();

        let validation = store.read().unwrap();
        assert!(!validation.is_valid);
        assert!(validation.user.is_none());
        assert!(area_is_empty(storage.durable()));
        assert!(area_is_empty(storage.ephemeral()));
    }

    #[test]
    fn near_expiry_needs_refresh() {
        let store = CredentialStore::new(TieredStorage::in_memory());
        store.store(&record(false, 120)).unwrap();

        let validation = store.read().unwrap();
        assert!(validation.is_valid);
        assert!(validation.needs_refresh);
    }

    #[test]
    fn corrupt_user_is_purged() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(true, 3600)).unwrap();
        storage.durable().set(keys::CURRENT_USER, "{oops").unwrap();

        let validation = store.read().unwrap();
        assert!(!validation.is_valid);
        assert!(area_is_empty(storage.durable()));
    }

    #[test]
    fn corrupt_expiry_is_purged() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(false, 3600)).unwrap();
        storage
            .ephemeral()
            .set(keys::JWT_TOKEN_EXPIRY, "next tuesday")
            .unwrap();

        assert!(!store.read().unwrap().is_valid);
        assert!(area_is_empty(storage.ephemeral()));
    }

    #[test]
    fn empty_storage_reads_invalid() {
        let store = CredentialStore::new(TieredStorage::in_memory());
        assert_eq!(store.read().unwrap(), SessionValidation::invalid());
        assert_eq!(store.token().unwrap(), None);
    }

    #[test]
    fn active_tier_falls_back_to_persistence_flag() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        assert_eq!(store.active_tier().unwrap(), Tier::Ephemeral);

        storage.ephemeral().set(keys::AUTH_PERSISTENT, "true").unwrap();
        assert_eq!(store.active_tier().unwrap(), Tier::Durable);
    }

    #[test]
    fn update_token_keeps_user_and_tier() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(false, 60)).unwrap();

        let generation = store.generation();
        assert!(store.update_token("access-2", 3600, None, generation).unwrap());

        let validation = store.read().unwrap();
        assert!(validation.is_valid);
        assert!(!validation.needs_refresh);
        assert_eq!(store.token().unwrap().as_deref(), Some("access-2"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh-1"));
        assert!(area_is_empty(storage.durable()));
    }

    #[test]
    fn update_token_after_clear_is_discarded() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(true, 60)).unwrap();

        let generation = store.generation();
        store.clear_all().unwrap();

        assert!(!store.update_token("late", 3600, None, generation).unwrap());
        assert!(area_is_empty(storage.durable()));
        assert!(area_is_empty(storage.ephemeral()));
    }

    #[test]
    fn update_token_rejects_unusable_lifetimes() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(true, 3600)).unwrap();
        let generation = store.generation();

        for lifetime in [0, -5, i64::MAX] {
            let result = store.update_token("access-2", lifetime, None, generation);
            assert!(matches!(result, Err(AuthError::RefreshFailed { .. })), "lifetime {lifetime}");
        }

        assert!(store.read().unwrap().is_valid);
        assert_eq!(store.token().unwrap().as_deref(), Some("access-1"));
    }

    #[test]
    fn failed_write_keeps_the_previous_session() {
        let durable: Arc<dyn StorageArea> = Arc::new(ReadOnlyArea(MemoryArea::new()));
        let storage = TieredStorage::new(durable, Arc::new(MemoryArea::new()));
        let store = CredentialStore::new(storage.clone());
        store.store(&record(false, 3600)).unwrap();

        let mut remembered = record(true, 3600);
        remembered.access_token = "access-2".to_string();
        assert!(store.store(&remembered).is_err());

        assert_eq!(
            storage.ephemeral().get(keys::JWT_TOKEN).unwrap().as_deref(),
            Some("access-1")
        );
        assert!(store.read().unwrap().is_valid);
    }

    #[test]
    fn clear_all_recovers_from_a_poisoned_lock() {
        let storage = TieredStorage::in_memory();
        let store = Arc::new(CredentialStore::new(storage.clone()));
        store.store(&record(true, 3600)).unwrap();

        let holder = Arc::clone(&store);
        let joined = std::thread::spawn(move || {
            let _guard = holder.guard();
            panic!("panicked while holding the store lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(store.lock.is_poisoned());

        store.clear_all().unwrap();
        assert!(area_is_empty(storage.durable()));
        assert_eq!(store.token().unwrap(), None);
    }

    #[test]
    fn clear_all_removes_nonce_and_demo_flag() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());
        store.store(&record(true, 3600)).unwrap();
        storage.durable().set(keys::OAUTH_STATE, "nonce").unwrap();
        storage.ephemeral().set(keys::DEMO_AUTH, "true").unwrap();

        store.clear_all().unwrap();

        assert!(area_is_empty(storage.durable()));
        assert!(area_is_empty(storage.ephemeral()));
    }

    #[test]
    fn remembered_persistence_selects_tier_before_login() {
        let storage = TieredStorage::in_memory();
        let store = CredentialStore::new(storage.clone());

        store.remember_persistence(true).unwrap();
        assert!(store.is_persistent().unwrap());

        store.remember_persistence(false).unwrap();
        assert!(!store.is_persistent().unwrap());
        assert_eq!(storage.durable().get(keys::AUTH_PERSISTENT).unwrap(), None);
    }
}

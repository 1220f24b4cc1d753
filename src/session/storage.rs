//! Client-side persistent storage for the cached auth bundle.
//!
//! Mirrors browser local storage: string keys, plaintext JSON values. The
//! bundle is written under a Stytch-specific key and under the generic
//! `vrin_*` keys older code paths read.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Stytch-specific bundle, JSON [`CachedAuthBundle`].
pub const PROVIDER_BUNDLE_KEY: &str = "stytch_vrin_auth";
/// Raw legacy API key.
pub const API_KEY_KEY: &str = "vrin_api_key";
/// JSON [`LegacyUser`].
pub const USER_KEY: &str = "vrin_user";
/// Chat session of the previous user; never written here, only cleared.
pub const CHAT_SESSION_KEY: &str = "vrin_chat_session_id";

/// Every key that can identify the previous user of this client.
pub const CREDENTIAL_KEYS: [&str; 4] =
    [API_KEY_KEY, USER_KEY, CHAT_SESSION_KEY, PROVIDER_BUNDLE_KEY];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not a JSON object: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Union of the identity-provider member and its legacy credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAuthBundle {
    pub member_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub api_key: String,
    pub email: String,
    pub name: String,
}

impl CachedAuthBundle {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.user_id.is_empty()
    }
}

/// Shape stored under `vrin_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

pub fn read_bundle(storage: &dyn SessionStorage) -> Option<CachedAuthBundle> {
    let raw = storage.get(PROVIDER_BUNDLE_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(bundle) => Some(bundle),
        Err(e) => {
            tracing::warn!("ignoring unreadable {PROVIDER_BUNDLE_KEY}: {e}");
            None
        }
    }
}

/// Write the bundle under the provider key and mirror it into the generic keys.
pub fn write_bundle(
    storage: &dyn SessionStorage,
    bundle: &CachedAuthBundle,
) -> Result<(), StorageError> {
    let user = LegacyUser {
        user_id: bundle.user_id.clone(),
        email: bundle.email.clone(),
        name: bundle.name.clone(),
    };
    storage.set(PROVIDER_BUNDLE_KEY, &serde_json::to_string(bundle)?)?;
    storage.set(API_KEY_KEY, &bundle.api_key)?;
    storage.set(USER_KEY, &serde_json::to_string(&user)?)?;
    Ok(())
}

pub fn cached_api_key(storage: &dyn SessionStorage) -> Option<String> {
    storage.get(API_KEY_KEY).filter(|k| !k.is_empty())
}

pub fn clear_credentials(storage: &dyn SessionStorage) -> Result<(), StorageError> {
    for key in CREDENTIAL_KEYS {
        storage.remove(key)?;
    }
    Ok(())
}

/// Entry hook of the plain login page: whoever signs in next must not
/// inherit the previous user's key or chat.
pub fn visit_login_page(storage: &dyn SessionStorage) -> Result<(), StorageError> {
    tracing::debug!("login page: clearing cached credentials");
    clear_credentials(storage)
}

/// In-memory storage (tests, and per-request storage on the server).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key/value currently held.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Storage persisted as one JSON object on disk (CLI / desktop clients).
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries = self.load()?;
        apply(&mut entries);
        self.save(&entries)
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match self.load() {
            Ok(entries) => entries.get(key).cloned(),
            Err(e) => {
                tracing::warn!("cannot read {}: {e}", self.path.display());
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> CachedAuthBundle {
        CachedAuthBundle {
            member_id: "member-1".into(),
            organization_id: "organization-1".into(),
            user_id: "user_1".into(),
            api_key: "vrin_key_1".into(),
            email: "jane.doe@example.com".into(),
            name: "Jane Doe".into(),
        }
    }

    #[test]
    fn bundle_is_mirrored_into_legacy_keys() {
        let storage = MemoryStorage::new();
        write_bundle(&storage, &bundle()).unwrap();

        assert_eq!(cached_api_key(&storage).as_deref(), Some("vrin_key_1"));
        let user: LegacyUser = serde_json::from_str(&storage.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(user.user_id, "user_1");
        assert_eq!(read_bundle(&storage), Some(bundle()));
    }

    #[test]
    fn login_page_clears_every_credential_key() {
        let storage = MemoryStorage::new();
        write_bundle(&storage, &bundle()).unwrap();
        storage.set(CHAT_SESSION_KEY, "chat-123").unwrap();
        storage.set("theme", "dark").unwrap();

        visit_login_page(&storage).unwrap();

        assert_eq!(storage.get(API_KEY_KEY), None);
        assert_eq!(storage.get(USER_KEY), None);
        assert_eq!(storage.get(CHAT_SESSION_KEY), None);
        assert_eq!(storage.get(PROVIDER_BUNDLE_KEY), None);
        assert_eq!(storage.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn unreadable_bundle_is_ignored() {
        let storage = MemoryStorage::new();
        storage.set(PROVIDER_BUNDLE_KEY, "{not json").unwrap();
        assert_eq!(read_bundle(&storage), None);
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vrin").join("session.json");

        let storage = FileStorage::new(&path);
        write_bundle(&storage, &bundle()).unwrap();
        drop(storage);

        let reopened = FileStorage::new(&path);
        assert_eq!(read_bundle(&reopened), Some(bundle()));

        visit_login_page(&reopened).unwrap();
        assert_eq!(cached_api_key(&reopened), None);
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert_eq!(storage.get(API_KEY_KEY), None);
    }
}

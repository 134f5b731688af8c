//! Persisted key-value storage
//!
//! The session store only needs `get`/`set`/`remove` on string values. Where
//! the values live (memory, files) and whether they are encrypted are separate,
//! composable concerns.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use socportal_core::{storage_error, ErrorContext, PortalConfig, PortalError, PortalResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const NONCE_LEN: usize = 12;

/// Durable string storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> PortalResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> PortalResult<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> PortalResult<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        (**self).remove(key)
    }
}

fn poisoned() -> PortalError {
    storage_error!("Storage lock poisoned", "memory_store")
}

/// In-memory storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    storage_dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating `storage_dir` if needed
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> PortalResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir).map_err(|e| PortalError::Storage {
            message: format!("Failed to create storage directory {}", storage_dir.display()),
            source: Some(Box::new(e)),
            context: ErrorContext::new("file_store")
                .with_operation("create_dir")
                .with_suggestion("Check that the data directory is writable"),
        })?;

        info!("Session storage initialized at: {}", storage_dir.display());
        Ok(Self { storage_dir })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Keys contain `:`; map anything outside `[A-Za-z0-9._-]` to `_`
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.storage_dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error!(
                format!("Failed to read {}", path.display()),
                "file_store",
                e
            )),
        }
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value).map_err(|e| {
            storage_error!(format!("Failed to write {}", path.display()), "file_store", e)
        })?;
        debug!("Stored {} in {}", key, path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error!(
                format!("Failed to remove {}", path.display()),
                "file_store",
                e
            )),
        }
    }
}

/// AES-256-GCM encryption over any other store
///
/// Values are stored as base64 of `nonce || ciphertext`; keys stay in clear.
pub struct EncryptedStore<S> {
    inner: S,
    cipher: Aes256Gcm,
}

impl<S: KeyValueStore> EncryptedStore<S> {
    /// Wrap `inner` with a raw 256-bit key
    pub fn new(inner: S, key: &[u8; 32]) -> Self {
        Self {
            inner,
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Wrap `inner` with a key derived from `passphrase` (SHA-256)
    pub fn from_passphrase(inner: S, passphrase: &str) -> PortalResult<Self> {
        if passphrase.is_empty() {
            return Err(PortalError::Validation {
                message: "Storage passphrase cannot be empty".to_string(),
                field: Some("passphrase".to_string()),
                context: ErrorContext::new("encrypted_store")
                    .with_operation("from_passphrase")
                    .with_suggestion("Set the storage passphrase environment variable"),
            });
        }
        let key: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        Ok(Self::new(inner, &key))
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn encrypt(&self, plaintext: &str) -> PortalResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| storage_error!(format!("Encryption failed: {}", e), "encrypted_store"))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(&combined))
    }

    fn decrypt(&self, encoded: &str) -> PortalResult<String> {
        let combined = STANDARD.decode(encoded.trim()).map_err(|e| {
            storage_error!("Stored value is not valid base64", "encrypted_store", e)
        })?;

        if combined.len() < NONCE_LEN {
            return Err(storage_error!("Stored value is too short", "encrypted_store"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| PortalError::Storage {
                message: "Stored value could not be decrypted".to_string(),
                source: None,
                context: ErrorContext::new("encrypted_store")
                    .with_operation("decrypt")
                    .with_suggestion("The storage key changed or the value was tampered with"),
            })?;

        String::from_utf8(plaintext).map_err(|e| {
            storage_error!("Decrypted value is not valid UTF-8", "encrypted_store", e)
        })
    }
}

impl<S: KeyValueStore> KeyValueStore for EncryptedStore<S> {
    fn get(&self, key: &str) -> PortalResult<Option<String>> {
        match self.inner.get(key)? {
            Some(encoded) => self.decrypt(&encoded).map(Some),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> PortalResult<()> {
        let encoded = self.encrypt(value)?;
        self.inner.set(key, &encoded)
    }

    fn remove(&self, key: &str) -> PortalResult<()> {
        self.inner.remove(key)
    }
}

/// File storage for the portal's session under `dir`, encrypted when the
/// configuration asks for it
///
/// The passphrase is read from the environment variable named by
/// `session.encryption_key_env`.
pub fn open_session_storage(
    config: &PortalConfig,
    dir: &Path,
) -> PortalResult<Arc<dyn KeyValueStore>> {
    let passphrase = std::env::var(&config.session.encryption_key_env).ok();
    open_session_storage_with(config, dir, passphrase.as_deref())
}

pub fn open_session_storage_with(
    config: &PortalConfig,
    dir: &Path,
    passphrase: Option<&str>,
) -> PortalResult<Arc<dyn KeyValueStore>> {
    let files = FileStore::new(dir)?;
    if !config.encrypt_storage() {
        debug!(portal = %config.portal, "Session storage is not encrypted");
        return Ok(Arc::new(files));
    }

    let Some(passphrase) = passphrase else {
        return Err(PortalError::Config {
            message: format!(
                "Session encryption is enabled but {} is not set",
                config.session.encryption_key_env
            ),
            source: None,
            context: ErrorContext::new("session_storage")
                .with_operation("open")
                .with_suggestion(&format!(
                    "Export {} with the storage passphrase",
                    config.session.encryption_key_env
                ))
                .with_suggestion("Or set session.encrypt_storage = false"),
        });
    };
    Ok(Arc::new(EncryptedStore::from_passphrase(files, passphrase)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);

        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("sessions")).unwrap();

        store.set("socportal:admin:v1:session", "{}").unwrap();
        assert!(dir
            .path()
            .join("sessions")
            .join("socportal_admin_v1_session.json")
            .exists());
        assert_eq!(
            store.get("socportal:admin:v1:session").unwrap().as_deref(),
            Some("{}")
        );

        store.remove("socportal:admin:v1:session").unwrap();
        assert_eq!(store.get("socportal:admin:v1:session").unwrap(), None);
        // removing again is fine
        store.remove("socportal:admin:v1:session").unwrap();
    }

    #[test]
    fn test_encrypted_store_hides_plaintext() {
        let inner = Arc::new(MemoryStore::new());
        let store = EncryptedStore::from_passphrase(Arc::clone(&inner), "s3cret").unwrap();

        store.set("session", r#"{"token":"abc"}"#).unwrap();
        let raw = inner.get("session").unwrap().unwrap();
        assert!(!raw.contains("abc"));
        assert_eq!(
            store.get("session").unwrap().as_deref(),
            Some(r#"{"token":"abc"}"#)
        );

        // fresh nonce per write
        store.set("other", r#"{"token":"abc"}"#).unwrap();
        assert_ne!(inner.get("other").unwrap().unwrap(), raw);
    }

    #[test]
    fn test_encrypted_store_rejects_wrong_key_and_tampering() {
        let inner = Arc::new(MemoryStore::new());
        let writer = EncryptedStore::from_passphrase(Arc::clone(&inner), "right").unwrap();
        writer.set("session", "payload").unwrap();

        let reader = EncryptedStore::from_passphrase(Arc::clone(&inner), "wrong").unwrap();
        assert!(matches!(reader.get("session"), Err(PortalError::Storage { .. })));

        inner.set("session", "not base64 !!").unwrap();
        assert!(writer.get("session").is_err());

        inner.set("session", &STANDARD.encode([1u8, 2, 3])).unwrap();
        assert!(writer.get("session").is_err());
    }

    #[test]
    fn test_open_session_storage_follows_portal_default() {
        use socportal_core::PortalKind;

        let dir = tempfile::tempdir().unwrap();
        let admin = PortalConfig::for_portal(PortalKind::Admin);
        assert!(matches!(
            open_session_storage_with(&admin, dir.path(), None),
            Err(PortalError::Config { .. })
        ));

        let store = open_session_storage_with(&admin, dir.path(), Some("pass")).unwrap();
        store.set("k", "plain value").unwrap();
        let raw = FileStore::new(dir.path()).unwrap().get("k").unwrap().unwrap();
        assert!(!raw.contains("plain value"));

        let customer = PortalConfig::for_portal(PortalKind::Customer);
        let store = open_session_storage_with(&customer, dir.path(), None).unwrap();
        store.set("c", "plain value").unwrap();
        let raw = FileStore::new(dir.path()).unwrap().get("c").unwrap().unwrap();
        assert_eq!(raw, "plain value");
    }

    #[test]
    fn test_empty_passphrase_is_rejected() {
        assert!(EncryptedStore::from_passphrase(MemoryStore::new(), "").is_err());
    }
}

/// Token cache storage for KIS access tokens
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Bearer credential issued by `/oauth2/tokenP`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Usable only while `now < expires_at - margin`
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }

    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes()
    }
}

/// Keyed credential persistence.
///
/// `load` treats any failure as a cache miss and `save` is best effort, so
/// neither can fail the caller.
pub trait TokenStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Credential>;
    fn save(&self, key: &str, credential: &Credential);
}

/// JSON file per key under a cache directory
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileTokenStore { dir: dir.into() }
    }

    /// `~/.kis`, falling back to the working directory when `HOME` is unset
    pub fn default_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kis")
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("token_{}.json", key))
    }
}

impl Default for FileTokenStore {
    fn default() -> Self {
        FileTokenStore::new(FileTokenStore::default_dir())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> Option<Credential> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No cached token at {}", path.display());
                return None;
            }
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => {
                debug!("Loaded cached token (expires {})", credential.expires_at);
                Some(credential)
            }
            Err(e) => {
                warn!("Ignoring corrupt token cache {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save(&self, key: &str, credential: &Credential) {
        let path = self.path_for(key);
        let result = std::fs::create_dir_all(&self.dir).and_then(|_| {
            let json = serde_json::to_string_pretty(credential)?;
            std::fs::write(&path, json)
        });

        match result {
            Ok(()) => debug!("Token persisted to {}", path.display()),
            Err(e) => warn!("Failed to persist token to {}: {}", path.display(), e),
        }
    }
}

/// In-process store, mainly for tests and short-lived tools
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        MemoryTokenStore::default()
    }

    pub fn with_credential(key: &str, credential: Credential) -> Self {
        let store = MemoryTokenStore::new();
        store.save(key, &credential);
        store
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> Option<Credential> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn save(&self, key: &str, credential: &Credential) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), credential.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("kis_tokens_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_credential_margin() {
        let now = Utc::now();
        let credential = Credential {
            token: "abc".to_string(),
            expires_at: now + Duration::minutes(10),
        };

        assert!(credential.is_usable_at(now, Duration::minutes(5)));
        assert!(!credential.is_usable_at(now, Duration::minutes(10)));
        assert!(!credential.is_usable_at(now + Duration::minutes(6), Duration::minutes(5)));
    }

    #[test]
    fn test_file_store_roundtrip_creates_dirs() {
        let dir = temp_dir().join("nested");
        let store = FileTokenStore::new(&dir);
        let credential = Credential {
            token: "token-1".to_string(),
            expires_at: Utc::now() + Duration::hours(24),
        };

        assert!(store.load("k1").is_none());
        store.save("k1", &credential);
        assert_eq!(store.load("k1"), Some(credential));
        assert!(store.load("k2").is_none());

        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn test_file_store_corrupt_is_miss() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let store = FileTokenStore::new(&dir);
        std::fs::write(store.path_for("bad"), "{not json").unwrap();

        assert!(store.load("bad").is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::new();
        assert!(store.is_empty());

        let credential = Credential {
            token: "mem".to_string(),
            expires_at: Utc::now(),
        };
        store.save("k", &credential);
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("k").map(|c| c.token), Some("mem".to_string()));
    }
}

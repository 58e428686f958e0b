//! Session-scoped key/value storage port.
//!
//! Every call is fallible; callers in this crate treat any error as "nothing
//! stored" on read and drop the value on write.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::error::StorageError;

pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-process store. One instance per visitor session (or per request when
/// rendering server side).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
    /// Byte budget for keys plus values; `None` is unlimited.
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: DashMap::new(),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.items
            .iter()
            .filter(|entry| entry.key() != key)
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            if self.used_bytes_excluding(key) + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.items.clear();
        Ok(())
    }
}

/// Storage for contexts with no session at all (server rendering, bots,
/// privacy modes that disable storage). Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl SessionStorage for UnavailableStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn clear(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

/// A session persisted to a directory, one `<encoded key>.val` file per key.
///
/// Used by the admin tooling so a "session" survives across invocations.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.val", encode_key(key)))
    }
}

/// Percent-escapes every byte outside `[A-Za-z0-9_-]`. `%` is always
/// escaped, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

impl SessionStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.item_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let final_path = self.item_path(key);
        let tmp_path = final_path.with_extension("val.tmp");
        std::fs::write(&tmp_path, value)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.item_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("val") {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_get_missing_returns_none() {
        let s = MemoryStorage::new();
        assert_eq!(s.get_item("ab_test_x").unwrap(), None);
    }

    #[test]
    fn memory_set_then_get() {
        let s = MemoryStorage::new();
        s.set_item("ab_test_x", "variant").unwrap();
        assert_eq!(s.get_item("ab_test_x").unwrap().as_deref(), Some("variant"));
    }

    #[test]
    fn memory_clear_drops_everything() {
        let s = MemoryStorage::new();
        s.set_item("a", "1").unwrap();
        s.set_item("b", "2").unwrap();
        s.clear().unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn memory_quota_rejects_oversized_write() {
        let s = MemoryStorage::with_quota(16);
        s.set_item("k", "short").unwrap();
        assert!(matches!(
            s.set_item("other", "way too long for the quota"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(s.get_item("k").unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn memory_quota_counts_overwrite_once() {
        let s = MemoryStorage::with_quota(10);
        s.set_item("k", "12345").unwrap();
        s.set_item("k", "67890").unwrap();
        assert_eq!(s.get_item("k").unwrap().as_deref(), Some("67890"));
    }

    #[test]
    fn unavailable_storage_always_fails() {
        let s = UnavailableStorage;
        assert!(s.get_item("k").is_err());
        assert!(s.set_item("k", "v").is_err());
        assert!(s.clear().is_err());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        FileStorage::new(tmp.path())
            .unwrap()
            .set_item("ab_test_hero_cta", "variant")
            .unwrap();
        let reopened = FileStorage::new(tmp.path()).unwrap();
        assert_eq!(
            reopened.get_item("ab_test_hero_cta").unwrap().as_deref(),
            Some("variant")
        );
    }

    #[test]
    fn file_storage_missing_key_is_none() {
        let tmp = TempDir::new().unwrap();
        let s = FileStorage::new(tmp.path()).unwrap();
        assert_eq!(s.get_item("nope").unwrap(), None);
        s.remove_item("nope").unwrap();
    }

    #[test]
    fn file_storage_clear_removes_values() {
        let tmp = TempDir::new().unwrap();
        let s = FileStorage::new(tmp.path()).unwrap();
        s.set_item("a", "1").unwrap();
        s.set_item("b", "2").unwrap();
        s.clear().unwrap();
        assert_eq!(s.get_item("a").unwrap(), None);
        assert_eq!(s.get_item("b").unwrap(), None);
    }

    #[test]
    fn encode_key_keeps_safe_chars() {
        assert_eq!(encode_key("ab_test_hero-cta"), "ab_test_hero-cta");
        assert_eq!(encode_key("../etc/passwd"), "%2E%2E%2Fetc%2Fpasswd");
        assert_eq!(encode_key("50%"), "50%25");
        assert_eq!(encode_key("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn file_storage_keeps_similar_keys_apart() {
        let tmp = TempDir::new().unwrap();
        let s = FileStorage::new(tmp.path()).unwrap();
        s.set_item("ab_test_hero.cta", "variant").unwrap();
        assert_eq!(s.get_item("ab_test_hero_cta").unwrap(), None);
        s.set_item("ab_test_hero_cta", "control").unwrap();
        s.set_item("ab_test_hero%2Ecta", "other").unwrap();
        assert_eq!(s.get_item("ab_test_hero.cta").unwrap().as_deref(), Some("variant"));
        assert_eq!(s.get_item("ab_test_hero_cta").unwrap().as_deref(), Some("control"));
        assert_eq!(s.get_item("ab_test_hero%2Ecta").unwrap().as_deref(), Some("other"));
    }
}

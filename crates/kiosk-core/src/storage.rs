use crate::error::{KioskError, Result};
use crate::settings::KioskSettings;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const SETTINGS_KEY: &str = "kiosk.settings";

/// Plain (non-secret) string storage, the same shape as the app's preference store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// A single JSON object on disk. Every mutation rewrites the file through a
/// staging file in the same directory, then renames it over the original.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let data = fs::read(&path)?;
            if data.is_empty() {
                HashMap::new()
            } else {
                serde_json::from_slice(&data)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut staging = NamedTempFile::new_in(dir)?;
        staging.write_all(&serde_json::to_vec_pretty(entries)?)?;
        staging.flush()?;
        staging
            .persist(&self.path)
            .map_err(|e| KioskError::Storage(format!("persist {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }

    /// Applies `edit` to a copy of the entries and installs the copy only once
    /// it is on disk. Returns without writing when `edit` reports no change.
    fn update(&self, edit: impl FnOnce(&mut HashMap<String, String>) -> bool) -> Result<()> {
        let mut guard = self.entries.write();
        let mut next = guard.clone();
        if !edit(&mut next) {
            return Ok(());
        }
        self.flush(&next)?;
        *guard = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(*key);
            }
            entries.len() != before
        })
    }
}

pub fn load_settings(store: &dyn KeyValueStore) -> Result<KioskSettings> {
    match store.get(SETTINGS_KEY)? {
        Some(raw) => {
            let settings: KioskSettings = serde_json::from_str(&raw)?;
            Ok(settings.normalized())
        }
        None => Ok(KioskSettings::default()),
    }
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &KioskSettings) -> Result<()> {
    settings.validate()?;
    let data = serde_json::to_string(settings)?;
    store.set(SETTINGS_KEY, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs").join("kiosk.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.set("@kiosk_url", "https://example.org").unwrap();
        store.set("@kiosk_pin", "5678").unwrap();
        store.remove_many(&["@kiosk_pin", "@missing"]).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("@kiosk_url").unwrap().as_deref(),
            Some("https://example.org")
        );
        assert_eq!(reopened.get("@kiosk_pin").unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_entries_untouched() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let store = JsonFileStore::open(blocker.join("kiosk.json")).unwrap();

        assert!(store.set("k", "v").is_err());
        assert_eq!(store.get("k").unwrap(), None);

        let good = dir.path().join("kiosk.json");
        let store = JsonFileStore::open(&good).unwrap();
        store.set("@kiosk_pin_attempts", "{}").unwrap();
        fs::remove_file(&good).unwrap();
        fs::create_dir(&good).unwrap();
        assert!(store.remove("@kiosk_pin_attempts").is_err());
        assert_eq!(
            store.get("@kiosk_pin_attempts").unwrap().as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn settings_default_when_absent_and_roundtrip() {
        let store = MemoryStore::new();
        let defaults = load_settings(&store).unwrap();
        assert!(!defaults.screensaver.enabled);
        assert_eq!(defaults.screensaver.inactivity_delay_ms, 600_000);

        let mut settings = defaults.clone();
        settings.url = Some("https://status.example.org".into());
        settings.screensaver.enabled = true;
        settings.screensaver.inactivity_delay_ms = 30_000;
        save_settings(&store, &settings).unwrap();
        assert_eq!(load_settings(&store).unwrap(), settings);
    }

    #[test]
    fn save_settings_rejects_zero_delay() {
        let store = MemoryStore::new();
        let mut settings = KioskSettings::default();
        settings.screensaver.inactivity_delay_ms = 0;
        assert!(save_settings(&store, &settings).is_err());
        assert_eq!(store.get(SETTINGS_KEY).unwrap(), None);
    }
}

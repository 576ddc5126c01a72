//! Persisted records, one JSON file per workspace

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use declarative::{Address, Record, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Format version written to new state files
pub const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

/// On-disk layout of the state file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    pub version: u32,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,

    /// Records keyed by `kind.name`
    #[serde(default)]
    pub resources: BTreeMap<String, Record>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Read a state file, or return an empty state if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.version > STATE_VERSION {
            bail!(
                "State file {} has version {}, this build understands up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            );
        }
        for key in state.resources.keys() {
            key.parse::<Address>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Corrupt state file: {}", path.display()))?;
        }

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Write atomically: a sibling temp file, then rename over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = tmp_path(path);
        fs::write(&tmp, content + "\n")
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// FileStateStore
// ============================================================================

/// [`StateStore`] backed by a state file. Every write is flushed to disk.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl FileStateStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = StateFile::load(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the state was last written
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.lock().last_updated
    }

    fn lock(&self) -> MutexGuard<'_, StateFile> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `next` to disk, then make it the in-memory state. On failure
    /// the in-memory state is left as it was.
    fn commit(&self, current: &mut StateFile, mut next: StateFile) -> declarative::Result<()> {
        next.last_updated = Utc::now();
        next.save(&self.path)
            .map_err(|e| declarative::Error::State(format!("{e:#}")))?;
        *current = next;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self, address: &Address) -> declarative::Result<Option<Record>> {
        Ok(self.lock().resources.get(&address.to_string()).cloned())
    }

    fn save(&self, address: &Address, record: &Record) -> declarative::Result<()> {
        if record.id.is_none() {
            return Err(declarative::Error::MissingIdentifier {
                kind: address.kind.clone(),
            });
        }
        let mut state = self.lock();
        let mut next = state.clone();
        next.resources.insert(address.to_string(), record.clone());
        self.commit(&mut state, next)
    }

    fn remove(&self, address: &Address) -> declarative::Result<bool> {
        let mut state = self.lock();
        let mut next = state.clone();
        if next.resources.remove(&address.to_string()).is_none() {
            return Ok(false);
        }
        self.commit(&mut state, next)?;
        Ok(true)
    }

    fn addresses(&self) -> declarative::Result<Vec<Address>> {
        self.lock()
            .resources
            .keys()
            .map(|key| key.parse().map_err(declarative::Error::State))
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str) -> Record {
        Record::new()
            .with_id(id)
            .with("alert", "cpu")
            .with("condition", r#"{ "op": ">", "target": 80 }"#)
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::open(dir.path().join("state.json")).unwrap();
        assert!(store.addresses().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_reload_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let cpu = Address::new("alert", "cpu");
        let hosts = Address::new("dashboard", "team.hosts");

        let store = FileStateStore::open(&path).unwrap();
        store.save(&cpu, &record("1")).unwrap();
        store.save(&hosts, &record("4b6f")).unwrap();
        assert!(!tmp_path(&path).exists());

        let reopened = FileStateStore::open(&path).unwrap();
        assert_eq!(reopened.addresses().unwrap(), vec![cpu.clone(), hosts.clone()]);
        // documents keep their exact text
        assert_eq!(reopened.load(&cpu).unwrap(), Some(record("1")));

        assert!(reopened.remove(&cpu).unwrap());
        assert!(!reopened.remove(&cpu).unwrap());
        let again = FileStateStore::open(&path).unwrap();
        assert_eq!(again.addresses().unwrap(), vec![hosts]);
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::open(&path).unwrap();
        store.save(&Address::new("alert", "cpu"), &record("7")).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert!(raw["last_updated"].is_string());
        assert_eq!(raw["resources"]["alert.cpu"]["id"], "7");
        assert_eq!(raw["resources"]["alert.cpu"]["fields"]["alert"], "cpu");
    }

    #[test]
    fn test_save_requires_identifier() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::open(dir.path().join("state.json")).unwrap();
        let err = store.save(&Address::new("alert", "cpu"), &Record::new()).unwrap_err();
        assert!(matches!(err, declarative::Error::MissingIdentifier { .. }));
    }

    #[test]
    fn test_rejects_newer_version_and_bad_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        fs::write(&path, r#"{"version": 2, "last_updated": "2024-05-01T10:00:00Z", "resources": {}}"#).unwrap();
        assert!(FileStateStore::open(&path).is_err());

        fs::write(
            &path,
            r#"{"version": 1, "last_updated": "2024-05-01T10:00:00Z", "resources": {"nodot": {}}}"#,
        )
        .unwrap();
        let err = FileStateStore::open(&path).unwrap_err();
        assert!(format!("{err:#}").contains("nodot"));
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let cpu = Address::new("alert", "cpu");
        let store = FileStateStore::open(&path).unwrap();
        store.save(&cpu, &record("1")).unwrap();

        // a directory in place of the file makes the rename fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let disk = Address::new("alert", "disk");
        let err = store.save(&disk, &record("2")).unwrap_err();
        assert!(matches!(err, declarative::Error::State(_)));
        assert_eq!(store.load(&disk).unwrap(), None);

        assert!(store.remove(&cpu).is_err());
        assert_eq!(store.load(&cpu).unwrap(), Some(record("1")));
        assert_eq!(store.addresses().unwrap(), vec![cpu]);
    }

    #[test]
    fn test_concurrent_saves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::open(&path).unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    store
                        .save(&Address::new("alert", format!("a{i}")), &record(&i.to_string()))
                        .unwrap();
                });
            }
        });

        let reopened = FileStateStore::open(&path).unwrap();
        assert_eq!(reopened.addresses().unwrap().len(), 8);
    }
}

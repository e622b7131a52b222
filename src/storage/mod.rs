//! Persistence layer.
//!
//! A small key-value port holding the tracker's last known state under
//! three fixed keys. Values are JSON strings (except `raw-data`, which is
//! the pasted spreadsheet text verbatim). The store is opportunistic: an
//! absent or malformed value is treated as "nothing saved".

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{validate_probability, EdgeRow, UserEstimate};

/// Pasted spreadsheet text.
pub const RAW_DATA_KEY: &str = "raw-data";
/// Computed table rows.
pub const PARSED_DATA_KEY: &str = "parsed-data";
/// Tracked estimates (slug + user probability).
pub const CHOSEN_MARKETS_KEY: &str = "chosen-markets";

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "edgetrack_state.json";

// ---------------------------------------------------------------------------
// Store port
// ---------------------------------------------------------------------------

/// String key-value storage.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store: all keys live in one pretty-printed JSON object.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; a file
    /// that isn't a JSON object of strings is discarded with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state from {}", path.display()))?;
            match serde_json::from_str::<BTreeMap<String, String>>(&json) {
                Ok(entries) => {
                    info!(path = %path.display(), keys = entries.len(), "State loaded from disk");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "State file is malformed, ignoring it");
                    BTreeMap::new()
                }
            }
        } else {
            info!(path = %path.display(), "No saved state found, starting fresh");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).context("Failed to serialise state")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write state to {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = entries.len(), "State saved");
        Ok(())
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and for running without persistence.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything the tracker restores at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub raw_data: Option<String>,
    pub rows: Vec<EdgeRow>,
    pub estimates: Vec<UserEstimate>,
}

/// Read a JSON value, treating read failures and malformed JSON as absent.
fn read_json<T: serde::de::DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "Failed to read stored value, ignoring it");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Stored value is malformed, ignoring it");
            None
        }
    }
}

/// Load the snapshot. Never fails: anything unreadable is dropped.
pub fn load_snapshot(store: &dyn StateStore) -> Snapshot {
    let raw_data = store.get(RAW_DATA_KEY).unwrap_or_else(|e| {
        warn!(key = RAW_DATA_KEY, error = %e, "Failed to read stored value, ignoring it");
        None
    });

    let rows: Vec<EdgeRow> = read_json(store, PARSED_DATA_KEY).unwrap_or_default();
    let estimates: Vec<UserEstimate> = read_json(store, CHOSEN_MARKETS_KEY).unwrap_or_default();

    let valid_estimates: Vec<UserEstimate> = estimates
        .into_iter()
        .filter(|e| !e.slug.trim().is_empty() && validate_probability(e.probability).is_ok())
        .collect();
    let valid_rows: Vec<EdgeRow> = rows
        .into_iter()
        .filter(|r| validate_probability(r.user_probability).is_ok())
        .collect();

    debug!(
        rows = valid_rows.len(),
        estimates = valid_estimates.len(),
        has_raw = raw_data.is_some(),
        "Snapshot restored"
    );

    Snapshot {
        raw_data,
        rows: valid_rows,
        estimates: valid_estimates,
    }
}

pub fn save_raw_data(store: &dyn StateStore, raw: &str) -> Result<()> {
    store.set(RAW_DATA_KEY, raw)
}

pub fn save_rows(store: &dyn StateStore, rows: &[EdgeRow]) -> Result<()> {
    let json = serde_json::to_string(rows).context("Failed to serialise rows")?;
    store.set(PARSED_DATA_KEY, &json)
}

pub fn save_estimates(store: &dyn StateStore, estimates: &[UserEstimate]) -> Result<()> {
    let json = serde_json::to_string(estimates).context("Failed to serialise estimates")?;
    store.set(CHOSEN_MARKETS_KEY, &json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("edgetrack_test_state_{}.json", uuid::Uuid::new_v4()));
        p
    }

    fn sample_row(slug: &str) -> EdgeRow {
        EdgeRow {
            slug: slug.into(),
            title: format!("Market {slug}"),
            market_probability: 0.4,
            user_probability: 0.6,
            side: Side::Yes,
            market_return: 2.5,
            kelly_fraction: 1.0 / 3.0,
            roi: 0.5,
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        save_rows(&store, &[sample_row("a")]).unwrap();
        save_estimates(&store, &[UserEstimate::new("a", 0.6).unwrap()]).unwrap();
        save_raw_data(&store, "a\t60").unwrap();

        let snap = load_snapshot(&store);
        assert_eq!(snap.rows, vec![sample_row("a")]);
        assert_eq!(snap.estimates.len(), 1);
        assert_eq!(snap.raw_data.as_deref(), Some("a\t60"));
    }

    #[test]
    fn test_empty_store_gives_empty_snapshot() {
        let snap = load_snapshot(&MemoryStore::new());
        assert_eq!(snap, Snapshot::default());
    }

    #[test]
    fn test_malformed_values_treated_as_absent() {
        let store = MemoryStore::new();
        store.set(PARSED_DATA_KEY, "{not json").unwrap();
        store.set(CHOSEN_MARKETS_KEY, "[{\"slug\": 5}]").unwrap();
        store.set(RAW_DATA_KEY, "x\t50").unwrap();

        let snap = load_snapshot(&store);
        assert!(snap.rows.is_empty());
        assert!(snap.estimates.is_empty());
        assert_eq!(snap.raw_data.as_deref(), Some("x\t50"));
    }

    #[test]
    fn test_out_of_range_estimates_dropped() {
        let store = MemoryStore::new();
        store
            .set(
                CHOSEN_MARKETS_KEY,
                r#"[{"slug":"ok","probability":0.3},{"slug":"bad","probability":4.0},{"slug":"","probability":0.5}]"#,
            )
            .unwrap();
        let snap = load_snapshot(&store);
        assert_eq!(snap.estimates.len(), 1);
        assert_eq!(snap.estimates[0].slug, "ok");
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let path = temp_path();
        {
            let store = FileStore::open(&path).unwrap();
            save_rows(&store, &[sample_row("a"), sample_row("b")]).unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        let snap = load_snapshot(&store);
        assert_eq!(snap.rows.len(), 2);
        assert_eq!(snap.rows[1].slug, "b");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_store_malformed_file_is_empty() {
        let path = temp_path();
        std::fs::write(&path, "this is not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.get(PARSED_DATA_KEY).unwrap().is_none());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_store_missing_file() {
        let store = FileStore::open(temp_path()).unwrap();
        assert!(load_snapshot(&store).rows.is_empty());
    }
}

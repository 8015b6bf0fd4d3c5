//! JSONL-based storage implementation with in-memory caching.
//!
//! Several processes may share one data directory. Every write takes an
//! advisory lock on `.<collection>.lock` and works against the file as it is
//! on disk, so one process never rewrites a table from a stale cache.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{CogctlError, Result};

/// JSONL-based storage with in-memory caching.
///
/// Each collection lives in `<base_path>/<collection>.jsonl`, one record per line.
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<HashMap<String, Vec<serde_json::Value>>>,
}

impl std::fmt::Debug for JsonlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlStorage")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> CogctlError {
    CogctlError::Storage(e.to_string())
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the collection files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn lock_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!(".{}.lock", collection))
    }

    /// Run `f` holding the collection's exclusive file lock.
    ///
    /// Lock order is file lock, then cache lock; nothing takes them the other way round.
    fn with_file_lock<R>(&self, collection: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path(collection))?;
        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock.write()?;
        f()
    }

    /// Read a collection straight from disk.
    fn read_records(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(lock_err)?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().map_err(lock_err)?;
        if cache.contains_key(collection) {
            return Ok(());
        }
        let records = self.read_records(collection)?;
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    fn cache_records(&self, collection: &str, records: Vec<serde_json::Value>) -> Result<()> {
        let mut cache = self.cache.write().map_err(lock_err)?;
        cache.insert(collection.to_string(), records);
        Ok(())
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Rewrite the entire collection file from the given records.
    fn rewrite_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let tmp = self.base_path.join(format!(".{}.jsonl.tmp", collection));
        {
            let mut file = File::create(&tmp)?;
            for record in records {
                writeln!(file, "{}", serde_json::to_string(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Drop the cached copy of a collection so the next read reloads from disk.
    ///
    /// Used for collections written by other processes, such as the operator inbox.
    pub fn refresh(&self, collection: &str) -> Result<()> {
        let mut cache = self.cache.write().map_err(lock_err)?;
        cache.remove(collection);
        Ok(())
    }

    fn replace(&self, collection: &str, id: &str, value: serde_json::Value, insert_missing: bool) -> Result<()> {
        self.with_file_lock(collection, || {
            let mut records = self.read_records(collection)?;
            match records.iter_mut().find(|r| record_id(r) == Some(id)) {
                Some(slot) => *slot = value,
                None if insert_missing => records.push(value),
                None => {
                    self.cache_records(collection, records)?;
                    return Err(CogctlError::Storage(format!(
                        "Record not found in {}: {}",
                        collection, id
                    )));
                }
            }
            self.rewrite_file(collection, &records)?;
            self.cache_records(collection, records)
        })
    }

    /// Read-modify-write one record of a table under the collection's file lock.
    ///
    /// `f` sees the record as it is on disk right now (`None` when absent) and
    /// may change it or fill it in. The record is written back only when `f`
    /// succeeds and leaves it `Some`.
    pub fn modify<T, R, F>(&self, collection: &str, id: &str, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Option<T>) -> Result<R>,
    {
        self.with_file_lock(collection, || {
            let mut records = self.read_records(collection)?;
            let position = records.iter().position(|r| record_id(r) == Some(id));
            let mut slot: Option<T> = match position {
                Some(i) => Some(serde_json::from_value(records[i].clone())?),
                None => None,
            };

            let outcome = f(&mut slot);
            if let (Ok(_), Some(record)) = (&outcome, &slot) {
                let value = serde_json::to_value(record)?;
                match position {
                    Some(i) => records[i] = value,
                    None => records.push(value),
                }
                self.rewrite_file(collection, &records)?;
            }
            self.cache_records(collection, records)?;
            outcome
        })
    }
}

impl Storage for JsonlStorage {
    fn append<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.with_file_lock(collection, || {
            // File first; it is the source of truth
            self.append_to_file(collection, &value)?;
            let records = self.read_records(collection)?;
            self.cache_records(collection, records)
        })
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache
            .get(collection)
            .ok_or_else(|| CogctlError::Storage(format!("Collection not loaded: {}", collection)))?;

        match records.iter().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.replace(collection, record.id(), value, false)
    }

    fn upsert<T: Serialize + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.replace(collection, record.id(), value, true)
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(lock_err)?;
        let records = cache
            .get(collection)
            .ok_or_else(|| CogctlError::Storage(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        id: String,
        name: String,
        status: String,
    }

    impl HasId for TestRecord {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn record(id: &str, name: &str, status: &str) -> TestRecord {
        TestRecord {
            id: id.to_string(),
            name: name.to_string(),
            status: status.to_string(),
        }
    }

    fn create_test_storage() -> (JsonlStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonlStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_append_and_get() {
        let (storage, _temp) = create_test_storage();
        let rec = record("1", "test", "active");

        storage.append("test", &rec).unwrap();
        let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();

        assert_eq!(retrieved, Some(rec));
    }

    #[test]
    fn test_get_not_found() {
        let (storage, _temp) = create_test_storage();
        let retrieved: Option<TestRecord> = storage.get("test", "nonexistent").unwrap();
        assert_eq!(retrieved, None);
    }

    #[test]
    fn test_append_keeps_every_line() {
        let (storage, temp) = create_test_storage();
        storage.append("log", &record("1", "a", "x")).unwrap();
        storage.append("log", &record("1", "b", "y")).unwrap();

        let all: Vec<TestRecord> = storage.list("log").unwrap();
        assert_eq!(all.len(), 2);

        let raw = fs::read_to_string(temp.path().join("log.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn test_update() {
        let (storage, _temp) = create_test_storage();
        storage.append("test", &record("1", "test", "active")).unwrap();

        let updated = record("1", "test", "completed");
        storage.update("test", &updated).unwrap();

        let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();
        assert_eq!(retrieved, Some(updated));
    }

    #[test]
    fn test_update_not_found() {
        let (storage, _temp) = create_test_storage();
        let result = storage.update("test", &record("1", "test", "active"));
        assert!(result.is_err());
    }

    #[test]
    fn test_upsert_inserts_then_replaces() {
        let (storage, _temp) = create_test_storage();
        storage.upsert("table", &record("g", "global", "100")).unwrap();
        storage.upsert("table", &record("g", "global", "90")).unwrap();

        let all: Vec<TestRecord> = storage.list("table").unwrap();
        assert_eq!(all, vec![record("g", "global", "90")]);
    }

    #[test]
    fn test_query_with_filters() {
        let (storage, _temp) = create_test_storage();
        storage.append("test", &record("1", "alice", "active")).unwrap();
        storage.append("test", &record("2", "bob", "inactive")).unwrap();
        storage.append("test", &record("3", "charlie", "active")).unwrap();

        let active: Vec<TestRecord> = storage.query("test", &[Filter::eq("status", "active")]).unwrap();

        assert_eq!(active.len(), 2);
        assert_eq!(active[0].name, "alice");
        assert_eq!(active[1].name, "charlie");
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            storage.append("test", &record("1", "test", "active")).unwrap();
            storage.update("test", &record("1", "test", "done")).unwrap();
        }

        {
            let storage = JsonlStorage::new(temp_dir.path()).unwrap();
            let retrieved: Option<TestRecord> = storage.get("test", "1").unwrap();
            assert_eq!(retrieved.unwrap().status, "done");
        }
    }

    #[test]
    fn test_refresh_picks_up_external_writes() {
        let (storage, temp) = create_test_storage();
        let before: Vec<TestRecord> = storage.list("inbox").unwrap();
        assert!(before.is_empty());

        let line = serde_json::to_string(&record("d1", "op", "approve")).unwrap();
        fs::write(temp.path().join("inbox.jsonl"), format!("{}\n", line)).unwrap();

        let stale: Vec<TestRecord> = storage.list("inbox").unwrap();
        assert!(stale.is_empty());

        storage.refresh("inbox").unwrap();
        let fresh: Vec<TestRecord> = storage.list("inbox").unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_update_keeps_records_written_by_another_instance() {
        let temp_dir = TempDir::new().unwrap();
        let first = JsonlStorage::new(temp_dir.path()).unwrap();
        let second = JsonlStorage::new(temp_dir.path()).unwrap();

        first.append("table", &record("1", "first", "pending")).unwrap();
        let _: Vec<TestRecord> = second.list("table").unwrap();
        second.append("table", &record("2", "second", "pending")).unwrap();
        first.update("table", &record("1", "first", "approved")).unwrap();

        let reader = JsonlStorage::new(temp_dir.path()).unwrap();
        let all: Vec<TestRecord> = reader.list("table").unwrap();
        assert_eq!(
            all,
            vec![record("1", "first", "approved"), record("2", "second", "pending")]
        );
    }

    #[test]
    fn test_modify_sees_disk_state() {
        let temp_dir = TempDir::new().unwrap();
        let first = JsonlStorage::new(temp_dir.path()).unwrap();
        let second = JsonlStorage::new(temp_dir.path()).unwrap();

        first.upsert("table", &record("g", "global", "100")).unwrap();
        let _: Option<TestRecord> = second.get("table", "g").unwrap();
        first.upsert("table", &record("g", "global", "90")).unwrap();

        let seen = second
            .modify("table", "g", |slot: &mut Option<TestRecord>| {
                let rec = slot.as_mut().unwrap();
                let seen = rec.status.clone();
                rec.status = "80".to_string();
                Ok(seen)
            })
            .unwrap();
        assert_eq!(seen, "90");

        let stored: Option<TestRecord> = first.get("table", "g").unwrap();
        assert_eq!(stored.unwrap().status, "90");
        first.refresh("table").unwrap();
        let stored: Option<TestRecord> = first.get("table", "g").unwrap();
        assert_eq!(stored.unwrap().status, "80");
    }

    #[test]
    fn test_modify_inserts_and_skips_write_on_error() {
        let (storage, _temp) = create_test_storage();

        storage
            .modify("table", "n", |slot: &mut Option<TestRecord>| {
                assert!(slot.is_none());
                *slot = Some(record("n", "new", "fresh"));
                Ok(())
            })
            .unwrap();

        let failed: Result<()> = storage.modify("table", "n", |slot: &mut Option<TestRecord>| {
            if let Some(rec) = slot.as_mut() {
                rec.status = "changed".to_string();
            }
            Err(CogctlError::Storage("refused".to_string()))
        });
        assert!(failed.is_err());

        let stored: Option<TestRecord> = storage.get("table", "n").unwrap();
        assert_eq!(stored.unwrap().status, "fresh");
    }

    #[test]
    fn test_multiple_collections() {
        let (storage, _temp) = create_test_storage();
        storage.append("collection_a", &record("1", "in_a", "active")).unwrap();
        storage.append("collection_b", &record("1", "in_b", "active")).unwrap();

        let a: Option<TestRecord> = storage.get("collection_a", "1").unwrap();
        let b: Option<TestRecord> = storage.get("collection_b", "1").unwrap();

        assert_eq!(a.unwrap().name, "in_a");
        assert_eq!(b.unwrap().name, "in_b");
    }
}

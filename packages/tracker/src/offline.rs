//! Persistence for exported command envelopes.
//!
//! [`JsonLinesStore`] keeps one envelope per line so a log can be appended
//! to and inspected with ordinary text tools.

use crate::errors::StoreError;
use crate::undo_data::{Envelope, OfflineEntry};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait OfflineStore {
    /// Append envelopes after the ones already stored
    fn save(&mut self, envelopes: &[Envelope]) -> Result<(), StoreError>;

    /// Every stored envelope, oldest first
    fn load(&self) -> Result<Vec<Envelope>, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;

    /// Stored envelopes as importable entries
    fn entries(&self) -> Result<Vec<OfflineEntry>, StoreError> {
        Ok(self.load()?.into_iter().map(OfflineEntry::from).collect())
    }
}

#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OfflineStore for JsonLinesStore {
    fn save(&mut self, envelopes: &[Envelope]) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for envelope in envelopes {
            serde_json::to_writer(&mut writer, envelope)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        debug!(path = %self.path.display(), count = envelopes.len(), "Saved envelopes");
        Ok(())
    }

    fn load(&self) -> Result<Vec<Envelope>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut envelopes = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let envelope = serde_json::from_str(&line).map_err(|source| StoreError::Json {
                line: index + 1,
                source,
            })?;
            envelopes.push(envelope);
        }
        debug!(path = %self.path.display(), count = envelopes.len(), "Loaded envelopes");
        Ok(envelopes)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and hosts without a file system
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    envelopes: Vec<Envelope>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

impl OfflineStore for MemoryStore {
    fn save(&mut self, envelopes: &[Envelope]) -> Result<(), StoreError> {
        self.envelopes.extend_from_slice(envelopes);
        Ok(())
    }

    fn load(&self) -> Result<Vec<Envelope>, StoreError> {
        Ok(self.envelopes.clone())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.envelopes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsb::RemoteQueue;
    use crate::undo_data::{ParsedFlag, SerialArg};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn envelope(action: &str) -> Envelope {
        Envelope {
            action: action.to_string(),
            remote_model_name: None,
            remote_queue: RemoteQueue::new(),
            tracker_name: "t".to_string(),
            timestamp: 1_700_000_000_000,
            parsed_flag: ParsedFlag::None,
            userdata: None,
            extra: BTreeMap::new(),
            args: vec![SerialArg::Value(Value::from("x"))],
            args_model_name: None,
        }
    }

    #[test]
    fn test_json_lines_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonLinesStore::new(dir.path().join("log.jsonl"));
        assert!(store.load().unwrap().is_empty());

        store.save(&[envelope("a")]).unwrap();
        store.save(&[envelope("b"), envelope("c")]).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 3);

        let loaded = store.load().unwrap();
        let actions: Vec<_> = loaded.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["a", "b", "c"]);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut store = JsonLinesStore::new(&path);
        store.save(&[envelope("a")]).unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json}\n");
        std::fs::write(&path, content).unwrap();

        assert!(matches!(
            store.load(),
            Err(StoreError::Json { line: 2, .. })
        ));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        store.save(&[envelope("a")]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.entries().unwrap().as_slice(),
            [OfflineEntry::Exported(_)]
        ));
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}

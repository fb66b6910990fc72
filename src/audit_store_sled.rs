use crate::audit_log::{chain_hash, AuditRecord, AuditSink, ChainedEntry, FailureMarker};
use crate::errors::{GateError, GateResult, SafeLock};
use sled::Db;
use std::path::Path;
use std::sync::Mutex;

const ENTRIES_TREE: &str = "audit_entries";
const MARKERS_TREE: &str = "audit_markers";

/// A sled-backed audit sink. Entries are keyed by big-endian sequence number
/// so iteration order is append order.
pub struct SledAuditLog {
    db: Db,
    append_lock: Mutex<()>,
}

impl SledAuditLog {
    pub fn open(path: impl AsRef<Path>) -> GateResult<Self> {
        let db = sled::open(path.as_ref())
            .map_err(|e| GateError::database("open audit store", e))?;
        Ok(Self {
            db,
            append_lock: Mutex::new(()),
        })
    }

    fn tree(&self, name: &str) -> GateResult<sled::Tree> {
        self.db
            .open_tree(name)
            .map_err(|e| GateError::database(format!("open tree {}", name), e))
    }

    fn decode(bytes: &[u8]) -> GateResult<ChainedEntry> {
        serde_json::from_slice(bytes).map_err(|e| GateError::serialization("stored audit entry", e))
    }
}

impl AuditSink for SledAuditLog {
    fn append(&self, record: &AuditRecord) -> GateResult<ChainedEntry> {
        let _guard = self.append_lock.safe_lock("sled_audit_append")?;
        let tree = self.tree(ENTRIES_TREE)?;

        let last = match tree.last()? {
            Some((_, bytes)) => Some(Self::decode(&bytes)?),
            None => None,
        };
        let prev_hash = last.as_ref().map(|entry| entry.hash.clone());
        let entry = ChainedEntry {
            sequence: last.as_ref().map(|entry| entry.sequence + 1).unwrap_or(0),
            record: record.clone(),
            hash: chain_hash(prev_hash.as_deref(), record)?,
            prev_hash,
        };

        let bytes = serde_json::to_vec(&entry)?;
        tree.insert(entry.sequence.to_be_bytes(), bytes)?;
        tree.flush()?;
        Ok(entry)
    }

    fn entries(&self) -> GateResult<Vec<ChainedEntry>> {
        let tree = self.tree(ENTRIES_TREE)?;
        tree.iter()
            .values()
            .map(|value| {
                let bytes = value?;
                Self::decode(&bytes)
            })
            .collect()
    }

    fn write_marker(&self, marker: &FailureMarker) -> GateResult<()> {
        let tree = self.tree(MARKERS_TREE)?;
        let id = self.db.generate_id()?;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(marker)?)?;
        tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_log::{verify_chain, AuditLogger};
    use crate::engine::Engine;
    use crate::decision_input::DecisionInputBuilder;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn sled_entries_chain_in_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SledAuditLog::open(dir.path().join("audit")).unwrap());
        let engine = Engine::builtin(AuditLogger::new(store.clone())).unwrap();

        for intent in ["first", "second", "third"] {
            let input = DecisionInputBuilder::new(intent)
                .region("IN")
                .platform("INSTAGRAM")
                .build()
                .unwrap();
            engine.enforce(&input);
        }

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(verify_chain(&entries).is_intact());
    }

    #[test]
    fn reopened_store_continues_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit");
        let input = DecisionInputBuilder::new("hello")
            .region("IN")
            .platform("INSTAGRAM")
            .build()
            .unwrap();

        {
            let store = Arc::new(SledAuditLog::open(&path).unwrap());
            Engine::builtin(AuditLogger::new(store)).unwrap().enforce(&input);
        }
        let store = Arc::new(SledAuditLog::open(&path).unwrap());
        Engine::builtin(AuditLogger::new(store.clone())).unwrap().enforce(&input);

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(verify_chain(&entries).is_intact());
    }
}

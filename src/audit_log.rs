//! Append-only decision audit log
//!
//! One [`AuditRecord`] is written per decision. Stored entries are
//! hash-linked: `hash = sha256(prev_hash || canonical_json(record))`, so any
//! edit, reorder or deletion is detectable with [`verify_chain`].
//!
//! Writers are serialized with a process-wide lock. [`AuditLogger`] never
//! propagates a failure: when the main store cannot be written it leaves a
//! failure marker in a fallback location and carries on.

use crate::canonicalize::canonicalize_serializable;
use crate::errors::{GateError, GateResult, SafeLock};
use crate::evaluator::{EvaluatorOutcome, Outcome};
use crate::trace_identity::TraceId;
use crate::verdict::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Serializes appends to JSONL audit files across every instance in the
/// process and holds the cached chain tip of each file
static AUDIT_LOCK: Mutex<BTreeMap<PathBuf, ChainTip>> = Mutex::new(BTreeMap::new());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorSummary {
    pub name: String,
    pub outcome: Outcome,
    pub escalation: bool,
    pub reason_code: String,
}

impl From<&EvaluatorOutcome> for EvaluatorSummary {
    fn from(outcome: &EvaluatorOutcome) -> Self {
        Self {
            name: outcome.evaluator.clone(),
            outcome: outcome.outcome,
            escalation: outcome.escalation,
            reason_code: outcome.reason_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSummary {
    pub risk_category: String,
    pub confidence: f64,
    pub decision_tier: String,
}

/// Everything needed to recompute and verify one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub trace_id: TraceId,
    pub engine_version: String,
    /// Wall-clock metadata; never part of the trace identity
    pub recorded_at: DateTime<Utc>,
    /// Normalized input, or the raw request when it was rejected
    pub input_snapshot: Value,
    #[serde(default)]
    pub input_rejected: bool,
    /// Sorted by evaluator name
    pub evaluator_results: Vec<EvaluatorSummary>,
    pub classifier: Option<ClassifierSummary>,
    pub final_decision: Decision,
    pub reason_code: String,
    #[serde(default)]
    pub kill_switch_engaged: bool,
}

/// A stored, hash-linked record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedEntry {
    pub sequence: u64,
    pub record: AuditRecord,
    pub prev_hash: Option<String>,
    pub hash: String,
}

/// Minimal marker left behind when a record could not be stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureMarker {
    #[serde(rename = "type")]
    pub kind: String,
    pub trace_id: String,
    pub recorded_at: DateTime<Utc>,
    pub error: String,
}

impl FailureMarker {
    pub fn new(trace_id: &TraceId, error: impl Into<String>) -> Self {
        Self {
            kind: "AUDIT_WRITE_FAILURE".to_string(),
            trace_id: trace_id.to_string(),
            recorded_at: Utc::now(),
            error: error.into(),
        }
    }
}

pub fn chain_hash(prev_hash: Option<&str>, record: &AuditRecord) -> GateResult<String> {
    let canonical = canonicalize_serializable(record)?;
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Link a record after `prev`, given as the previous `(sequence, hash)`
fn link(prev: Option<(u64, &str)>, record: &AuditRecord) -> GateResult<ChainedEntry> {
    let prev_hash = prev.map(|(_, hash)| hash.to_string());
    let hash = chain_hash(prev_hash.as_deref(), record)?;
    Ok(ChainedEntry {
        sequence: prev.map(|(sequence, _)| sequence + 1).unwrap_or(0),
        record: record.clone(),
        prev_hash,
        hash,
    })
}

/// Durable store for audit records
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> GateResult<ChainedEntry>;

    /// All entries in append order
    fn entries(&self) -> GateResult<Vec<ChainedEntry>>;

    /// Best-effort fallback used when `append` fails
    fn write_marker(&self, marker: &FailureMarker) -> GateResult<()>;
}

/// JSON-lines file, one [`ChainedEntry`] per line
///
/// The chain tip of each file is cached under [`AUDIT_LOCK`] after the first
/// scan, so an append only reads the file again when its length no longer
/// matches what this process last wrote. A torn trailing line left by an
/// interrupted write is cut off before the next append.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
    fallback_path: PathBuf,
}

/// Last stored link of a JSONL file and the file length it was read at
#[derive(Debug, Clone, Default)]
struct ChainTip {
    head: Option<(u64, String)>,
    len: u64,
}

/// Where a scan of a JSONL file stopped
#[derive(Debug, Default)]
struct ScanEnd {
    /// Byte offset just past the last parseable entry
    intact_len: u64,
    file_len: u64,
    /// The last entry parsed but its newline was never written
    missing_newline: bool,
}

impl ScanEnd {
    fn torn_bytes(&self) -> u64 {
        self.file_len - self.intact_len
    }
}

impl JsonlAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut fallback = path.clone().into_os_string();
        fallback.push(".fallback");
        Self {
            path,
            fallback_path: PathBuf::from(fallback),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    /// Walk every line, handing parsed entries to `visit`.
    ///
    /// An unterminated, unparseable last line is a torn write and is skipped.
    /// Any complete line that fails to parse is corruption and fails the scan.
    fn scan(&self, mut visit: impl FnMut(ChainedEntry)) -> GateResult<Option<ScanEnd>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GateError::io("open audit log", e)),
        };

        let mut reader = BufReader::new(file);
        let mut end = ScanEnd::default();
        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| GateError::io("read audit log", e))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            end.file_len += read as u64;

            let terminated = buf.last() == Some(&b'\n');
            let content = buf.trim_ascii();
            if content.is_empty() {
                if terminated {
                    end.intact_len = end.file_len;
                }
                continue;
            }
            match serde_json::from_slice::<ChainedEntry>(content) {
                Ok(entry) => {
                    visit(entry);
                    end.intact_len = end.file_len;
                    end.missing_newline = !terminated;
                }
                // only the last line can lack its newline
                Err(_) if !terminated => {}
                Err(err) => {
                    return Err(GateError::serialization(format!("audit log line {}", line_no), err))
                }
            }
        }
        Ok(Some(end))
    }

    /// Scan the file for its tip, cutting off a torn tail if there is one
    fn recover_tip(&self) -> GateResult<ChainTip> {
        let mut head = None;
        let end = match self.scan(|entry| head = Some((entry.sequence, entry.hash)))? {
            Some(end) => end,
            None => return Ok(ChainTip::default()),
        };

        let mut len = end.file_len;
        if end.torn_bytes() > 0 || end.missing_newline {
            let mut file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| GateError::io("open audit log for repair", e))?;
            if end.torn_bytes() > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    dropped_bytes = end.torn_bytes(),
                    "truncating torn audit log tail"
                );
                file.set_len(end.intact_len)
                    .map_err(|e| GateError::io("truncate torn audit tail", e))?;
                len = end.intact_len;
            }
            if end.missing_newline {
                file.seek(SeekFrom::End(0))
                    .and_then(|_| file.write_all(b"\n"))
                    .map_err(|e| GateError::io("terminate last audit entry", e))?;
                len += 1;
            }
        }
        Ok(ChainTip { head, len })
    }
}

fn file_len(path: &Path) -> GateResult<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(GateError::io("stat audit log", e)),
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, record: &AuditRecord) -> GateResult<ChainedEntry> {
        let mut tips = AUDIT_LOCK.safe_lock("audit_log")?;

        // Drop the cached tip up front so a failed write forces a rescan
        let on_disk = file_len(&self.path)?;
        let tip = match tips.remove(&self.path) {
            Some(tip) if tip.len == on_disk => tip,
            _ => self.recover_tip()?,
        };
        let head = tip.head.as_ref().map(|(sequence, hash)| (*sequence, hash.as_str()));
        let entry = link(head, record)?;
        let line = serde_json::to_string(&entry)
            .map_err(|e| GateError::serialization("audit entry", e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| GateError::io("open audit log for append", e))?;
        writeln!(file, "{}", line).map_err(|e| GateError::io("append audit entry", e))?;
        file.flush().map_err(|e| GateError::io("flush audit log", e))?;

        tips.insert(
            self.path.clone(),
            ChainTip {
                head: Some((entry.sequence, entry.hash.clone())),
                len: tip.len + line.len() as u64 + 1,
            },
        );
        Ok(entry)
    }

    fn entries(&self) -> GateResult<Vec<ChainedEntry>> {
        let mut entries = Vec::new();
        if let Some(end) = self.scan(|entry| entries.push(entry))? {
            if end.torn_bytes() > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    ignored_bytes = end.torn_bytes(),
                    "audit log ends in a torn line"
                );
            }
        }
        Ok(entries)
    }

    fn write_marker(&self, marker: &FailureMarker) -> GateResult<()> {
        let line = serde_json::to_string(marker)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.fallback_path)
            .map_err(|e| GateError::io("open audit fallback", e))?;
        writeln!(file, "{}", line).map_err(|e| GateError::io("append audit marker", e))?;
        Ok(())
    }
}

/// In-process sink for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<ChainedEntry>>,
    markers: Mutex<Vec<FailureMarker>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markers(&self) -> GateResult<Vec<FailureMarker>> {
        Ok(self.markers.safe_lock("audit_markers")?.clone())
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> GateResult<ChainedEntry> {
        let mut entries = self.entries.safe_lock("audit_entries")?;
        let prev = entries.last().map(|last| (last.sequence, last.hash.as_str()));
        let entry = link(prev, record)?;
        entries.push(entry.clone());
        Ok(entry)
    }

    fn entries(&self) -> GateResult<Vec<ChainedEntry>> {
        Ok(self.entries.safe_lock("audit_entries")?.clone())
    }

    fn write_marker(&self, marker: &FailureMarker) -> GateResult<()> {
        self.markers.safe_lock("audit_markers")?.push(marker.clone());
        Ok(())
    }
}

/// Side-effect-only logger wrapped around a sink
#[derive(Clone)]
pub struct AuditLogger {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Logger that drops every record
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn sink(&self) -> Option<&Arc<dyn AuditSink>> {
        self.sink.as_ref()
    }

    /// Store a record. Never fails and never panics the caller.
    pub fn record(&self, record: &AuditRecord) {
        let sink = match &self.sink {
            Some(sink) => sink,
            None => return,
        };

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.append(record)));
        let error = match outcome {
            Ok(Ok(_)) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => "audit sink panicked".to_string(),
        };

        tracing::error!(trace_id = %record.trace_id, error = %error, "audit write failed");
        let marker = FailureMarker::new(&record.trace_id, error);
        if let Err(err) = sink.write_marker(&marker) {
            tracing::error!(trace_id = %record.trace_id, error = %err, "audit fallback marker failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub sequence: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub entries: usize,
    pub first_break: Option<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }
}

/// Recompute every link and report the first inconsistency
pub fn verify_chain(entries: &[ChainedEntry]) -> ChainReport {
    let mut prev: Option<&ChainedEntry> = None;
    for (position, entry) in entries.iter().enumerate() {
        let broken = |reason: String| ChainReport {
            entries: entries.len(),
            first_break: Some(ChainBreak {
                sequence: entry.sequence,
                reason,
            }),
        };

        if entry.sequence != position as u64 {
            return broken(format!("expected sequence {}, found {}", position, entry.sequence));
        }
        let expected_prev = prev.map(|p| p.hash.as_str());
        if entry.prev_hash.as_deref() != expected_prev {
            return broken("prev_hash does not link to the preceding entry".to_string());
        }
        match chain_hash(expected_prev, &entry.record) {
            Ok(hash) if hash == entry.hash => {}
            Ok(_) => return broken("hash does not match record content".to_string()),
            Err(err) => return broken(format!("record cannot be canonicalized: {}", err)),
        }
        prev = Some(entry);
    }
    ChainReport {
        entries: entries.len(),
        first_break: None,
    }
}

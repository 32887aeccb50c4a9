//! Access audit trail - one JSON line per processed recognition event
//!
//! Records are appended to the file specified in config.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Audit entry for one recognition event
#[derive(Debug, Clone, Serialize)]
pub struct AccessRecord {
    pub event_id: String,
    pub received_at_ms: u64,
    pub source: &'static str,
    pub channel: &'static str,
    /// Normalized identity, absent when normalization rejected the input
    pub identity: Option<String>,
    /// Decision label for grants, error label otherwise
    pub outcome: &'static str,
    pub detail: Option<String>,
    pub latency_us: u64,
}

/// Append-only JSONL writer
pub struct AccessAudit {
    file_path: String,
    /// Serializes appends from the camera and tag loops
    write_lock: parking_lot::Mutex<()>,
}

impl AccessAudit {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "audit_initialized");
        Self { file_path: file_path.to_string(), write_lock: parking_lot::Mutex::new(()) }
    }

    /// Write a record; returns true if successful
    pub fn write_record(&self, record: &AccessRecord) -> bool {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %record.event_id, error = %e, "audit_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(event_id = %record.event_id, error = %e, "audit_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "audit_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(event_id: &str, outcome: &'static str) -> AccessRecord {
        AccessRecord {
            event_id: event_id.to_string(),
            received_at_ms: 1_700_000_000_000,
            source: "camera",
            channel: "entry",
            identity: Some("P123".to_string()),
            outcome,
            detail: None,
            latency_us: 42,
        }
    }

    #[test]
    fn test_write_records_as_jsonl() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("audit").join("access.jsonl");
        let audit = AccessAudit::new(file_path.to_str().unwrap());

        assert!(audit.write_record(&record("a", "grant_entry")));
        assert!(audit.write_record(&record("b", "policy_denied")));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["event_id"], "b");
        assert_eq!(parsed["outcome"], "policy_denied");
        assert_eq!(parsed["identity"], "P123");
    }
}

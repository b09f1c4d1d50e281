//! Security audit log (§11, grounded on
//! `windows_app/src/security/audit_logger.py`): line-delimited JSON
//! records at `logs/audit.log` (spec §6).

use crate::error::{ProtocolError, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct AuditRecord {
    timestamp: String,
    event_type: &'static str,
    data: Value,
}

pub struct AuditLogger {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl AuditLogger {
    pub fn open(app_dir: &Path) -> Result<Self> {
        let logs_dir = app_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .map_err(|e| ProtocolError::Persistence(format!("creating logs dir: {e}")))?;
        let path = logs_dir.join("audit.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ProtocolError::Persistence(format!("opening audit.log: {e}")))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub async fn log(&self, event_type: &'static str, data: Value) {
        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type,
            data,
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        let mut file = self.file.lock().await;
        let _ = writeln!(file, "{line}");
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub type SharedAuditLogger = Arc<AuditLogger>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_line_delimited_json() {
        let dir = tempfile::tempdir().unwrap();
        let logger = AuditLogger::open(dir.path()).unwrap();
        logger.log("device_approved", json!({"device_id": "d1"})).await;
        logger.log("auth_failed", json!({"device_id": "d2"})).await;

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "device_approved");
        assert_eq!(first["data"]["device_id"], "d1");
    }
}

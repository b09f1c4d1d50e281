//! Device approval: a one-shot completion handle per pending connection
//! (spec §3 "PendingApproval", §9 "Approval as a one-shot future") and the
//! persisted trusted-device set (spec §3 "TrustedDevice", §6
//! `trusted_devices.json`).

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

pub const APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// A single-consumer completion primitive: exactly one outcome is ever
/// delivered, either by an external decision or by the 60s timeout.
pub struct PendingApproval {
    sender: Option<oneshot::Sender<ApprovalDecision>>,
}

pub struct ApprovalWaiter {
    receiver: oneshot::Receiver<ApprovalDecision>,
}

pub fn pending_approval() -> (PendingApproval, ApprovalWaiter) {
    let (tx, rx) = oneshot::channel();
    (
        PendingApproval { sender: Some(tx) },
        ApprovalWaiter { receiver: rx },
    )
}

impl PendingApproval {
    /// Delivers the external decision. A second call is a no-op: there is
    /// exactly one outcome per spec §3.
    pub fn decide(&mut self, decision: ApprovalDecision) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(decision);
        }
    }
}

impl ApprovalWaiter {
    /// Waits up to `APPROVAL_TIMEOUT` for a decision; timeout resolves as
    /// reject (spec §8 "Approval timeout at exactly 60 s must resolve as
    /// reject").
    pub async fn wait(self) -> ApprovalDecision {
        match timeout(APPROVAL_TIMEOUT, self.receiver).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecision::Rejected, // sender dropped without deciding
            Err(_) => ApprovalDecision::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDeviceRecord {
    pub name: String,
    pub first_seen: i64,
    pub last_seen: i64,
}

/// Persisted `{device_id -> record}` map, rewritten on every mutation
/// (spec §3, §6). Loss is recoverable: clients simply re-approve.
pub struct TrustedDeviceStore {
    path: PathBuf,
    devices: Mutex<HashMap<String, TrustedDeviceRecord>>,
}

impl TrustedDeviceStore {
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join("trusted_devices.json");
        let devices = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ProtocolError::Persistence(format!("reading trusted_devices.json: {e}")))?;
            serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(error = %e, "trusted_devices.json was malformed, starting empty");
                HashMap::new()
            })
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            devices: Mutex::new(devices),
        })
    }

    pub async fn is_trusted(&self, device_id: &str) -> bool {
        self.devices.lock().await.contains_key(device_id)
    }

    pub async fn trust(&self, device_id: &str, name: &str, now: i64) -> Result<()> {
        let mut devices = self.devices.lock().await;
        devices
            .entry(device_id.to_string())
            .and_modify(|r| r.last_seen = now)
            .or_insert_with(|| TrustedDeviceRecord {
                name: name.to_string(),
                first_seen: now,
                last_seen: now,
            });
        self.persist(&devices)
    }

    fn persist(&self, devices: &HashMap<String, TrustedDeviceRecord>) -> Result<()> {
        let contents = serde_json::to_string_pretty(devices)
            .map_err(|e| ProtocolError::Persistence(format!("serializing trusted devices: {e}")))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| ProtocolError::Persistence(format!("writing trusted_devices.json: {e}")))?;
        info!(path = %self.path.display(), "trusted devices persisted");
        Ok(())
    }
}

pub type SharedTrustedDeviceStore = Arc<TrustedDeviceStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn external_decision_wins() {
        let (mut pending, waiter) = pending_approval();
        pending.decide(ApprovalDecision::Approved);
        assert_eq!(waiter.wait().await, ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn dropped_sender_resolves_as_rejected() {
        let (pending, waiter) = pending_approval();
        drop(pending);
        assert_eq!(waiter.wait().await, ApprovalDecision::Rejected);
    }

    #[tokio::test]
    async fn trust_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustedDeviceStore::load(dir.path()).unwrap();
        assert!(!store.is_trusted("d1").await);
        store.trust("d1", "Phone", 1000).await.unwrap();
        assert!(store.is_trusted("d1").await);

        let reloaded = TrustedDeviceStore::load(dir.path()).unwrap();
        assert!(reloaded.is_trusted("d1").await);
    }
}

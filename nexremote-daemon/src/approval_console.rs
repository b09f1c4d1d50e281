//! Minimal stdin-driven approval prompt (spec §4.C state 2, "UI-driven").
//! A host with a real tray/notification UI would call
//! [`nexremote_core::server::Engine::decide_approval`] directly instead;
//! this is the text-console stand-in so the daemon is usable on its own.

use nexremote_core::approval::ApprovalDecision;
use nexremote_core::capture::MonitorSource;
use nexremote_core::server::Engine;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub fn spawn<S: MonitorSource + 'static>(engine: Arc<Engine<S>>) {
    tokio::spawn(async move {
        info!("approval console ready: type 'approve <device_id>' or 'reject <device_id>'");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.split_whitespace();
            let (command, device_id) = (parts.next(), parts.next());
            match (command, device_id) {
                (Some("approve"), Some(id)) => {
                    engine.decide_approval(id, ApprovalDecision::Approved).await;
                }
                (Some("reject"), Some(id)) => {
                    engine.decide_approval(id, ApprovalDecision::Rejected).await;
                }
                _ => warn!(%line, "unrecognized approval console command"),
            }
        }
    });
}

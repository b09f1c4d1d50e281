//! UDP discovery responder (spec §4.A). Grounded on the teacher's
//! `discovery::service::DiscoveryService` broadcaster/listener shape, cut
//! down to the single responder role this spec requires: no outbound
//! broadcast, no peer tracking — just "answer the magic prefix".

use crate::error::Result;
use crate::packet::DISCOVERY_MAGIC;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub port: u16,
    pub port_insecure: u16,
    pub id: String,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_addr: Option<String>,
}

impl DiscoveryResponse {
    pub fn new(name: String, port: u16, port_insecure: u16, id: String) -> Self {
        Self {
            kind: "discovery_response",
            name,
            port,
            port_insecure,
            id,
            version: "1.0.0",
            external_addr: None,
        }
    }
}

pub struct DiscoveryResponder {
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    response_template: DiscoveryResponse,
}

impl DiscoveryResponder {
    pub async fn bind(port: u16, response_template: DiscoveryResponse) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            running: Arc::new(AtomicBool::new(true)),
            response_template,
        })
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Runs until `running` is cleared. A bad datagram or a failed reply
    /// send is logged and the loop continues (spec §4.A: "the responder
    /// never terminates on a per-datagram error").
    pub async fn run(self) {
        info!(port = ?self.socket.local_addr().ok(), "discovery responder listening");
        let mut buf = [0u8; 1500];
        while self.running.load(Ordering::Relaxed) {
            let recv = tokio::time::timeout(Duration::from_secs(1), self.socket.recv_from(&mut buf)).await;
            let (len, addr) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!(error = %e, "discovery socket read failed");
                    continue;
                }
                Err(_) => continue, // timeout: re-check running flag
            };
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                warn!("discovery datagram was not valid utf-8");
                continue;
            };
            if !text.starts_with(DISCOVERY_MAGIC) {
                continue;
            }
            debug!(%addr, "answering discovery probe");
            let payload = match serde_json::to_vec(&self.response_template) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "failed to encode discovery response");
                    continue;
                }
            };
            if let Err(e) = self.socket.send_to(&payload, addr).await {
                warn!(error = %e, %addr, "failed to send discovery response");
            }
        }
        info!("discovery responder stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responds_to_magic_prefix() {
        let template = DiscoveryResponse::new("office-pc".into(), 8765, 8766, "ABC".into());
        let responder = DiscoveryResponder::bind(0, template).await.unwrap();
        let server_addr = responder.socket.local_addr().unwrap();
        let running = responder.shutdown_handle();

        let client = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        client.connect(server_addr).await.unwrap();

        let task = tokio::spawn(responder.run());
        client.send(b"NEXREMOTE_DISCOVER\n").await.unwrap();

        let mut buf = [0u8; 1500];
        let len = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
            .await
            .expect("timed out waiting for discovery response")
            .unwrap();
        let response: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(response["type"], "discovery_response");
        assert_eq!(response["name"], "office-pc");
        assert_eq!(response["port"], 8765);
        assert_eq!(response["id"], "ABC");

        running.store(false, Ordering::Relaxed);
        let _ = task.await;
    }

    #[tokio::test]
    async fn ignores_non_matching_datagrams() {
        let template = DiscoveryResponse::new("pc".into(), 1, 2, "x".into());
        let responder = DiscoveryResponder::bind(0, template).await.unwrap();
        let server_addr = responder.socket.local_addr().unwrap();
        let running = responder.shutdown_handle();
        let client = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        client.connect(server_addr).await.unwrap();
        let task = tokio::spawn(responder.run());

        client.send(b"not discovery").await.unwrap();
        let mut buf = [0u8; 64];
        let result = tokio::time::timeout(Duration::from_millis(300), client.recv(&mut buf)).await;
        assert!(result.is_err(), "should not have received a reply");

        running.store(false, Ordering::Relaxed);
        let _ = task.await;
    }
}

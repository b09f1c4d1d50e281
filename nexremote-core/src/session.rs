//! Per-connection session state machine (spec §4.C, §3 "ClientSession").
//! Grounded on the teacher's manager pattern (`resource_manager.rs`,
//! `transport_manager.rs`): an `RwLock`-guarded map owned by the event
//! loop, mutated only from tasks that hold a session handle.

use crate::error::{ProtocolError, Result};
use crate::transport::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAuth,
    Approving,
    Running,
    Terminated,
}

/// A running push-loop task, keyed by `(kind, sub_id)` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    Screen(u32),
    Camera,
    MediaState,
}

pub struct ClientSession {
    pub device_id: String,
    pub device_name: String,
    pub peer_addr: Option<std::net::SocketAddr>,
    state: Mutex<SessionState>,
    approved: AtomicBool,
    pub write_half: Arc<Mutex<Connection>>,
    streams: Mutex<HashMap<StreamKey, JoinHandle<()>>>,
}

impl ClientSession {
    pub fn new(
        device_id: String,
        device_name: String,
        peer_addr: Option<std::net::SocketAddr>,
        write_half: Connection,
    ) -> Arc<Self> {
        Arc::new(Self {
            device_id,
            device_name,
            peer_addr,
            state: Mutex::new(SessionState::AwaitingAuth),
            approved: AtomicBool::new(false),
            write_half: Arc::new(Mutex::new(write_half)),
            streams: Mutex::new(HashMap::new()),
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn set_state(&self, state: SessionState) {
        *self.state.lock().await = state;
    }

    pub fn is_approved(&self) -> bool {
        self.approved.load(Ordering::SeqCst)
    }

    pub fn mark_approved(&self) {
        self.approved.store(true, Ordering::SeqCst);
    }

    pub async fn register_stream(&self, key: StreamKey, handle: JoinHandle<()>) {
        let mut streams = self.streams.lock().await;
        if let Some(previous) = streams.insert(key, handle) {
            previous.abort(); // idempotent refresh: replace, don't duplicate (spec §8)
        }
    }

    pub async fn cancel_stream(&self, key: &StreamKey) {
        if let Some(handle) = self.streams.lock().await.remove(key) {
            handle.abort();
        }
    }

    pub async fn cancel_all_streams(&self) {
        let mut streams = self.streams.lock().await;
        for (_, handle) in streams.drain() {
            handle.abort();
        }
    }

    pub async fn active_screen_monitors(&self) -> Vec<u32> {
        self.streams
            .lock()
            .await
            .keys()
            .filter_map(|k| match k {
                StreamKey::Screen(m) => Some(*m),
                _ => None,
            })
            .collect()
    }
}

/// Owned by the event loop; mutated only on tasks that accept/terminate
/// sessions (spec §5 "Shared resources").
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ClientSession>>>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, key: String, session: Arc<ClientSession>) {
        self.sessions.write().await.insert(key, session);
    }

    pub async fn get(&self, key: &str) -> Option<Arc<ClientSession>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Terminates and removes a session, cancelling all owned stream
    /// tasks first (spec §3 "On termination...", §4.C state 4).
    pub async fn terminate(&self, key: &str) -> Result<()> {
        let session = self.sessions.write().await.remove(key);
        match session {
            Some(session) => {
                session.cancel_all_streams().await;
                session.set_state(SessionState::Terminated).await;
                info!(device_id = %session.device_id, "session terminated");
                Ok(())
            }
            None => Err(ProtocolError::invalid_state("no such session")),
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_keys_distinguish_monitors() {
        assert_ne!(StreamKey::Screen(0), StreamKey::Screen(1));
        assert_eq!(StreamKey::Camera, StreamKey::Camera);
    }
}

//! Session state machine and transport endpoint wiring (spec §4.B, §4.C):
//! accepts connections on the secure and plain listeners, drives each
//! connection through `AwaitingAuth → Approving → Running → Terminated`,
//! and spawns the per-message dispatch tasks described in spec §4.E.

use crate::approval::{pending_approval, ApprovalDecision, PendingApproval, SharedTrustedDeviceStore};
use crate::audit::SharedAuditLogger;
use crate::capture::camera::CameraCapture;
use crate::capture::MonitorSource;
use crate::crypto::EncryptionContext;
use crate::dispatcher::{Dispatcher, RateLimiter};
use crate::error::{ProtocolError, Result};
use crate::handlers::Handlers;
use crate::packet::{current_timestamp, Capabilities, Envelope, HandshakeIdentity};
use crate::session::{ClientSession, SessionManager, SessionState};
use crate::streaming::{self, CaptureRegistry};
use crate::tls::CertificateCache;
use crate::transport::{Connection, Frame};
use serde_json::json;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the session state machine needs, shared across accepted
/// connections (spec §5 "Shared resources").
pub struct Engine<S: MonitorSource> {
    pub pc_name: String,
    pub device_id: String,
    pub require_approval: bool,
    pub auto_approve: bool,
    pub encryption: EncryptionContext,
    pub trusted: SharedTrustedDeviceStore,
    pub audit: SharedAuditLogger,
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<Dispatcher<S>>,
    pending_approvals: Mutex<HashMap<String, PendingApproval>>,
    _source: PhantomData<S>,
}

impl<S: MonitorSource + 'static> Engine<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pc_name: String,
        device_id: String,
        require_approval: bool,
        auto_approve: bool,
        encryption: EncryptionContext,
        trusted: SharedTrustedDeviceStore,
        audit: SharedAuditLogger,
        handlers: Arc<Handlers>,
        capture_registry: Arc<CaptureRegistry>,
        camera: Arc<CameraCapture>,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Dispatcher::new(
            handlers,
            capture_registry,
            camera,
            encryption.clone(),
        ));
        Arc::new(Self {
            pc_name,
            device_id,
            require_approval,
            auto_approve,
            encryption,
            trusted,
            audit,
            sessions: SessionManager::new(),
            dispatcher,
            pending_approvals: Mutex::new(HashMap::new()),
            _source: PhantomData,
        })
    }

    /// External decision entry point (spec §4.C state 2, "UI-driven").
    /// The host process (CLI prompt, tray notification, etc.) calls this
    /// once the user has decided.
    pub async fn decide_approval(&self, device_id: &str, decision: ApprovalDecision) {
        if let Some(mut pending) = self.pending_approvals.lock().await.remove(device_id) {
            pending.decide(decision);
        }
    }

    pub async fn accept_secure(self: &Arc<Self>, listener: TcpListener, acceptor: TlsAcceptor) {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "secure accept failed");
                    continue;
                }
            };
            let acceptor = acceptor.clone();
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                match acceptor.accept(socket).await {
                    Ok(tls) => {
                        engine
                            .run_session(Connection::Secure(tls), Some(peer))
                            .await;
                    }
                    Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                }
            });
        }
    }

    pub async fn accept_plain(self: &Arc<Self>, listener: TcpListener) {
        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "plain accept failed");
                    continue;
                }
            };
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                engine.run_session(Connection::Plain(socket), Some(peer)).await;
            });
        }
    }

    /// Drives one connection through the full session state machine
    /// (spec §4.C).
    async fn run_session(self: Arc<Self>, mut connection: Connection, peer: Option<std::net::SocketAddr>) {
        let identity = match self.await_handshake(&mut connection).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "handshake failed");
                let _ = connection
                    .write_frame(&Frame::Text(json!({"type": "auth_failed"}).to_string()))
                    .await;
                return;
            }
        };

        let session = ClientSession::new(identity.device_id.clone(), identity.device_name.clone(), peer, connection);
        session.set_state(SessionState::Approving).await;

        let decision = self.resolve_approval(&identity).await;
        if decision != ApprovalDecision::Approved {
            self.audit
                .log("device_rejected", json!({"device_id": identity.device_id}))
                .await;
            let mut conn = session.write_half.lock().await;
            let _ = conn
                .write_frame(&Frame::Text(json!({"type": "connection_rejected"}).to_string()))
                .await;
            return;
        }

        session.mark_approved();
        session.set_state(SessionState::Running).await;
        self.trusted
            .trust(&identity.device_id, &identity.device_name, current_timestamp())
            .await
            .ok();
        self.audit
            .log("device_approved", json!({"device_id": identity.device_id}))
            .await;

        {
            let auth_success = json!({
                "type": "auth_success",
                "server_name": self.pc_name,
                "capabilities": Capabilities::default(),
            })
            .to_string();
            let mut conn = session.write_half.lock().await;
            if conn.write_frame(&Frame::Text(auth_success)).await.is_err() {
                return;
            }
        }

        self.sessions.insert(identity.device_id.clone(), Arc::clone(&session)).await;
        streaming::start_media_state_loop(
            &session,
            Arc::clone(&self.dispatcher.handlers.media),
            self.encryption.clone(),
        )
        .await;
        self.run_dispatch_loop(Arc::clone(&session)).await;
        let _ = self.sessions.terminate(&identity.device_id).await;
    }

    async fn await_handshake(&self, connection: &mut Connection) -> Result<HandshakeIdentity> {
        let frame = tokio::time::timeout(AUTH_TIMEOUT, connection.read_frame())
            .await
            .map_err(|_| ProtocolError::AuthTimeout)??;
        let text = match frame {
            Frame::Text(t) => t,
            Frame::Binary(_) => return Err(ProtocolError::Auth("expected text handshake frame".into())),
        };
        let decoded = self.encryption.decode_flexible(&text);
        serde_json::from_str(&decoded).map_err(|e| ProtocolError::Auth(format!("bad handshake body: {e}")))
    }

    async fn resolve_approval(&self, identity: &HandshakeIdentity) -> ApprovalDecision {
        if self.auto_approve || self.trusted.is_trusted(&identity.device_id).await {
            return ApprovalDecision::Approved;
        }
        if !self.require_approval {
            return ApprovalDecision::Approved;
        }
        let (pending, waiter) = pending_approval();
        self.pending_approvals
            .lock()
            .await
            .insert(identity.device_id.clone(), pending);
        info!(device_id = %identity.device_id, "awaiting user approval decision");
        waiter.wait().await
    }

    /// Spec §4.E "Every inbound message is processed on an independent
    /// task" + rate limiting; reads are serialized on this one task.
    async fn run_dispatch_loop(self: Arc<Self>, session: Arc<ClientSession>) {
        let rate_limiter = Arc::new(RateLimiter::default());
        loop {
            let frame = {
                let mut conn = session.write_half.lock().await;
                conn.read_frame().await
            };
            let frame = match frame {
                Ok(f) => f,
                Err(e) => {
                    if e.terminates_session() {
                        error!(device_id = %session.device_id, error = %e, "session terminated by transport error");
                    }
                    return;
                }
            };
            let Frame::Text(text) = frame else {
                continue; // binary frames are server->client only on this wire
            };
            if !rate_limiter.allow().await {
                continue; // dropped silently (spec §4.E, §8 Scenario 5)
            }
            let decoded = self.encryption.decode_flexible(&text);
            let Some(envelope) = Envelope::parse(&decoded) else {
                warn!(device_id = %session.device_id, "dropped malformed envelope");
                continue;
            };
            let engine = Arc::clone(&self);
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let kind = envelope.kind();
                let response = engine.dispatcher.dispatch(&session, envelope).await;
                if let Some(response) = response {
                    if let Ok(text) = serde_json::to_string(&response) {
                        if let Ok(encrypted) = engine.encryption.encrypt(&text) {
                            let mut conn = session.write_half.lock().await;
                            if let Err(e) = conn.write_frame(&Frame::Text(encrypted)).await {
                                warn!(%kind, error = %e, "failed to send dispatch response");
                            }
                        }
                    }
                }
            });
        }
    }
}

pub fn load_tls_acceptor(app_dir: &std::path::Path) -> Result<TlsAcceptor> {
    CertificateCache::load_or_generate(app_dir)?.into_acceptor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MonitorInfo, MonitorSource as _};
    use crate::capture::frame::{PixelFormat, RawFrame};

    struct StubSource;
    impl MonitorSource for StubSource {
        fn enumerate() -> Result<Vec<MonitorInfo>> {
            Ok(vec![])
        }
        fn open(_index_one_based: u32) -> Result<Self> {
            Ok(Self)
        }
        fn grab(&mut self) -> Result<RawFrame> {
            Ok(RawFrame::new(1, 1, PixelFormat::Bgra, vec![0; 4]))
        }
    }

    fn test_engine() -> Arc<Engine<StubSource>> {
        let dir = tempfile::tempdir().unwrap();
        let trusted = Arc::new(crate::approval::TrustedDeviceStore::load(dir.path()).unwrap());
        let audit = Arc::new(crate::audit::AuditLogger::open(dir.path()).unwrap());
        Engine::new(
            "test-pc".into(),
            "srv-id".into(),
            true,
            true,
            EncryptionContext::new(),
            trusted,
            audit,
            Arc::new(Handlers::default()),
            CaptureRegistry::new(),
            Arc::new(CameraCapture::default()),
        )
    }

    #[tokio::test]
    async fn auto_approve_skips_pending_approval() {
        let engine = test_engine();
        let identity = HandshakeIdentity {
            device_id: "d1".into(),
            device_name: "Phone".into(),
        };
        let decision = engine.resolve_approval(&identity).await;
        assert_eq!(decision, ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn trusted_device_skips_approval_without_auto_approve() {
        let dir = tempfile::tempdir().unwrap();
        let trusted = Arc::new(crate::approval::TrustedDeviceStore::load(dir.path()).unwrap());
        trusted.trust("d1", "Phone", 0).await.unwrap();
        let audit = Arc::new(crate::audit::AuditLogger::open(dir.path()).unwrap());
        let engine = Engine::<StubSource>::new(
            "test-pc".into(),
            "srv-id".into(),
            true,
            false,
            EncryptionContext::new(),
            trusted,
            audit,
            Arc::new(Handlers::default()),
            CaptureRegistry::new(),
            Arc::new(CameraCapture::default()),
        );
        let identity = HandshakeIdentity {
            device_id: "d1".into(),
            device_name: "Phone".into(),
        };
        assert_eq!(engine.resolve_approval(&identity).await, ApprovalDecision::Approved);
    }
}

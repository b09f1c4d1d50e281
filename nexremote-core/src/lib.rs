//! NexRemote connection and streaming engine: discovery, transport,
//! session handling, the command dispatcher, and the capture pipelines
//! a host daemon wires together to serve one or more remote clients.

pub mod approval;
pub mod audit;
pub mod capture;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod nat;
pub mod packet;
pub mod server;
pub mod session;
pub mod streaming;
pub mod tls;
pub mod transport;

pub use approval::{ApprovalDecision, ApprovalWaiter, PendingApproval, SharedTrustedDeviceStore, TrustedDeviceStore};
pub use audit::{AuditLogger, SharedAuditLogger};
pub use capture::{MonitorCapture, MonitorInfo, MonitorSource, ScrapMonitorSource};
pub use config::Config;
pub use crypto::EncryptionContext;
pub use discovery::{DiscoveryResponder, DiscoveryResponse};
pub use dispatcher::Dispatcher;
pub use error::{ProtocolError, Result};
pub use handlers::Handlers;
pub use packet::Envelope;
pub use server::Engine;
pub use session::{ClientSession, SessionManager, SessionState};
pub use tls::CertificateCache;
pub use transport::{Connection, Frame};

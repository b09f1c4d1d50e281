//! NexRemote daemon entry point: loads configuration, stands up the
//! discovery responder and the secure/plain transport endpoints, and
//! drives the connection engine (spec §2 component table).

mod approval_console;

use anyhow::{Context, Result};
use clap::Parser;
use nexremote_core::capture::camera::CameraCapture;
use nexremote_core::capture::ScrapMonitorSource;
use nexremote_core::config::{default_app_dir, Config};
use nexremote_core::discovery::{DiscoveryResponder, DiscoveryResponse};
use nexremote_core::handlers::Handlers;
use nexremote_core::nat;
use nexremote_core::server::{load_tls_acceptor, Engine};
use nexremote_core::streaming::CaptureRegistry;
use nexremote_core::{AuditLogger, EncryptionContext, TrustedDeviceStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nexremoted", about = "NexRemote remote-control daemon")]
struct Cli {
    /// Directory holding config.json, trusted_devices.json, certs/, logs/.
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app_dir = cli.app_dir.unwrap_or_else(default_app_dir);
    std::fs::create_dir_all(&app_dir).with_context(|| format!("creating app dir {}", app_dir.display()))?;

    let config = Config::load(&app_dir).context("loading config.json")?;
    info!(pc_name = %config.pc_name, device_id = %config.device_id, "starting nexremoted");

    let trusted = Arc::new(TrustedDeviceStore::load(&app_dir).context("loading trusted_devices.json")?);
    let audit = Arc::new(AuditLogger::open(&app_dir).context("opening audit log")?);

    let engine = Engine::<ScrapMonitorSource>::new(
        config.pc_name.clone(),
        config.device_id.clone(),
        config.require_approval,
        config.auto_approve,
        EncryptionContext::new(),
        trusted,
        audit,
        Arc::new(Handlers::default()),
        CaptureRegistry::new(),
        Arc::new(CameraCapture::default()),
    );

    if !config.auto_approve {
        approval_console::spawn(Arc::clone(&engine));
    }

    let mut discovery_template = DiscoveryResponse::new(
        config.pc_name.clone(),
        config.server_port,
        config.server_port_insecure,
        config.device_id.clone(),
    );
    discovery_template.external_addr = discover_external_addr().await;
    let discovery = DiscoveryResponder::bind(config.discovery_port, discovery_template)
        .await
        .context("binding discovery responder")?;
    tokio::spawn(discovery.run());

    let acceptor = load_tls_acceptor(&app_dir).context("loading TLS certificate")?;
    let secure_listener = TcpListener::bind(("0.0.0.0", config.server_port))
        .await
        .with_context(|| format!("binding secure port {}", config.server_port))?;
    let plain_listener = TcpListener::bind(("0.0.0.0", config.server_port_insecure))
        .await
        .with_context(|| format!("binding insecure port {}", config.server_port_insecure))?;

    info!(
        secure_port = config.server_port,
        plain_port = config.server_port_insecure,
        discovery_port = config.discovery_port,
        "listening"
    );

    let secure_engine = Arc::clone(&engine);
    let secure_task = tokio::spawn(async move { secure_engine.accept_secure(secure_listener, acceptor).await });
    let plain_engine = Arc::clone(&engine);
    let plain_task = tokio::spawn(async move { plain_engine.accept_plain(plain_listener).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = secure_task => {}
        _ = plain_task => {}
    }

    Ok(())
}

/// Best-effort STUN lookup (§11): failure just means the discovery
/// response omits `external_addr`, not a startup failure.
async fn discover_external_addr() -> Option<String> {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not bind STUN probe socket, skipping external address discovery");
            return None;
        }
    };
    match nat::discover_external_addr(&socket, nat::DEFAULT_STUN_SERVER).await {
        Ok(addr) => Some(addr.to_string()),
        Err(e) => {
            warn!(error = %e, "STUN lookup failed, continuing without external_addr");
            None
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

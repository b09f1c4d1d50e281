//! Daemon configuration, persisted as `config.json` under the per-user
//! application data directory (spec §6). Grounded on the teacher's
//! `cosmic-connect-daemon::config` shape, adapted to JSON to match the
//! wire/persistence contract this spec names explicitly.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn new_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pc_name: String,
    #[serde(default = "new_device_id")]
    pub device_id: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_server_port_insecure")]
    pub server_port_insecure: u16,
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_true")]
    pub require_approval: bool,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_screen_quality")]
    pub screen_quality: u8,
    #[serde(default = "default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "default_true")]
    pub enable_gamepad: bool,
}

fn default_server_port() -> u16 {
    8765
}
fn default_server_port_insecure() -> u16 {
    8766
}
fn default_discovery_port() -> u16 {
    37020
}
fn default_max_clients() -> usize {
    8
}
fn default_screen_quality() -> u8 {
    75
}
fn default_mouse_sensitivity() -> f32 {
    1.0
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pc_name: hostname_or_default(),
            device_id: new_device_id(),
            server_port: default_server_port(),
            server_port_insecure: default_server_port_insecure(),
            discovery_port: default_discovery_port(),
            require_approval: true,
            auto_approve: false,
            max_clients: default_max_clients(),
            screen_quality: default_screen_quality(),
            mouse_sensitivity: default_mouse_sensitivity(),
            enable_gamepad: true,
        }
    }
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "nexremote-pc".to_string())
}

impl Config {
    /// Load from `<app_dir>/config.json`, writing out defaults if the file
    /// is absent. A malformed file at startup is a fatal persistence error.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join("config.json");
        if !path.exists() {
            let config = Self::default();
            config.save(app_dir)?;
            return Ok(config);
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ProtocolError::Persistence(format!("reading config.json: {e}")))?;
        serde_json::from_str(&contents)
            .map_err(|e| ProtocolError::Persistence(format!("parsing config.json: {e}")))
    }

    pub fn save(&self, app_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(app_dir)
            .map_err(|e| ProtocolError::Persistence(format!("creating app dir: {e}")))?;
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::Persistence(format!("serializing config: {e}")))?;
        std::fs::write(app_dir.join("config.json"), contents)
            .map_err(|e| ProtocolError::Persistence(format!("writing config.json: {e}")))
    }
}

/// Default per-user application data directory, e.g.
/// `~/.local/share/nexremote` on Linux.
pub fn default_app_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("nexremote")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_ports() {
        let config = Config::default();
        assert_eq!(config.server_port, 8765);
        assert_eq!(config.server_port_insecure, 8766);
        assert_eq!(config.discovery_port, 37020);
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.device_id, config.device_id);
        assert_eq!(loaded.pc_name, config.pc_name);
    }

    #[test]
    fn load_writes_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(dir.path().join("config.json").exists());
        assert_eq!(config.server_port, 8765);
    }
}

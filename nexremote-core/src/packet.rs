//! JSON envelope and message types (spec §4.D, §9 "Dynamic dispatch by
//! `type` field"). The source dispatches on a string `type` field; here it
//! is modeled as a tagged enum so unknown variants are a single, uniform
//! `Unknown` arm rather than a chain of string comparisons.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The handshake's first frame: `{device_id, device_name}` (spec §4.C, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeIdentity {
    pub device_id: String,
    pub device_name: String,
}

/// Server → client capability advertisement sent with `auth_success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub keyboard: bool,
    pub mouse: bool,
    pub gamepad: bool,
    pub screen_streaming: bool,
    pub camera_streaming: bool,
    pub file_transfer: bool,
    pub clipboard: bool,
    pub multi_display: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
            gamepad: true,
            screen_streaming: true,
            camera_streaming: true,
            file_transfer: true,
            clipboard: true,
            multi_display: true,
        }
    }
}

/// The decoded `{type, action?, ...payload}` envelope (spec §4.D), modeled
/// as a tagged union keyed on the top-level `type` field. `Unknown` is the
/// log-and-drop case named in spec §9.
#[derive(Debug, Clone)]
pub enum Envelope {
    Keyboard(Value),
    Mouse(Value),
    Gamepad(Value),
    MediaControl(Value),
    FileExplorer(Value),
    TaskManager(Value),
    ScreenShare(Value),
    Camera(Value),
    Clipboard(Value),
    Unknown(String),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Keyboard(_) => "keyboard",
            Envelope::Mouse(_) => "mouse",
            Envelope::Gamepad(_) => "gamepad",
            Envelope::MediaControl(_) => "media_control",
            Envelope::FileExplorer(_) => "file_explorer",
            Envelope::TaskManager(_) => "task_manager",
            Envelope::ScreenShare(_) => "screen_share",
            Envelope::Camera(_) => "camera",
            Envelope::Clipboard(_) => "clipboard",
            Envelope::Unknown(_) => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let type_field = value.get("type")?.as_str()?.to_string();
        let body = value;
        Some(match type_field.as_str() {
            "keyboard" => Envelope::Keyboard(body),
            "mouse" => Envelope::Mouse(body),
            "gamepad" => Envelope::Gamepad(body),
            "media_control" => Envelope::MediaControl(body),
            "file_explorer" => Envelope::FileExplorer(body),
            "task_manager" => Envelope::TaskManager(body),
            "screen_share" => Envelope::ScreenShare(body),
            "camera" => Envelope::Camera(body),
            "clipboard" => Envelope::Clipboard(body),
            other => Envelope::Unknown(other.to_string()),
        })
    }

    pub fn action(&self) -> Option<&str> {
        self.body().get("action")?.as_str()
    }

    fn body(&self) -> &Value {
        match self {
            Envelope::Keyboard(v)
            | Envelope::Mouse(v)
            | Envelope::Gamepad(v)
            | Envelope::MediaControl(v)
            | Envelope::FileExplorer(v)
            | Envelope::TaskManager(v)
            | Envelope::ScreenShare(v)
            | Envelope::Camera(v)
            | Envelope::Clipboard(v) => v,
            Envelope::Unknown(_) => &Value::Null,
        }
    }
}

/// Binary streaming frame headers (spec §4.D).
pub const SCRN_MAGIC: &[u8; 4] = b"SCRN";
pub const CAMF_MAGIC: &[u8; 4] = b"CAMF";

/// Prepends the `SCRN` + zero-based monitor index header to JPEG bytes.
pub fn frame_screen(monitor_index_zero_based: u8, jpeg: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + jpeg.len());
    out.extend_from_slice(SCRN_MAGIC);
    out.push(monitor_index_zero_based);
    out.extend_from_slice(jpeg);
    out
}

/// Prepends the `CAMF` header to JPEG bytes.
pub fn frame_camera(jpeg: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + jpeg.len());
    out.extend_from_slice(CAMF_MAGIC);
    out.extend_from_slice(jpeg);
    out
}

/// The discovery UDP magic prefix (spec §4.A, §6).
pub const DISCOVERY_MAGIC: &str = "NEXREMOTE_DISCOVER";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        let env = Envelope::parse(r#"{"type":"keyboard","action":"press"}"#).unwrap();
        assert!(matches!(env, Envelope::Keyboard(_)));
        assert_eq!(env.action(), Some("press"));
    }

    #[test]
    fn unknown_type_is_unknown_variant() {
        let env = Envelope::parse(r#"{"type":"bogus"}"#).unwrap();
        assert!(matches!(env, Envelope::Unknown(ref t) if t == "bogus"));
    }

    #[test]
    fn malformed_json_parses_to_none() {
        assert!(Envelope::parse("not json").is_none());
    }

    #[test]
    fn screen_frame_header_matches_spec() {
        let frame = frame_screen(1, &[0xFF, 0xD8]);
        assert_eq!(&frame[0..4], SCRN_MAGIC);
        assert_eq!(frame[4], 1);
        assert_eq!(&frame[5..], &[0xFF, 0xD8]);
    }
}

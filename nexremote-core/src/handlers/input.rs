//! Virtual keyboard/mouse/gamepad adapters (spec §4.E). The concrete OS
//! key-injection and virtual gamepad kernel driver are out of scope
//! (spec §1); this defines the port the dispatcher calls inline (no
//! blocking I/O per spec §4.E dispatcher policy).

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait InputHandler: Send + Sync {
    async fn keyboard(&self, action: &str, body: &Value);
    async fn mouse(&self, action: &str, body: &Value);
    async fn gamepad(&self, action: &str, body: &Value);
}

pub struct NullInputHandler;

#[async_trait]
impl InputHandler for NullInputHandler {
    async fn keyboard(&self, action: &str, _body: &Value) {
        tracing::debug!(%action, "keyboard event dropped: no host input handler installed");
    }

    async fn mouse(&self, action: &str, _body: &Value) {
        tracing::debug!(%action, "mouse event dropped: no host input handler installed");
    }

    async fn gamepad(&self, action: &str, _body: &Value) {
        tracing::debug!(%action, "gamepad event dropped: no host input handler installed");
    }
}

/// Keyboard action vocabulary enforced by input validation (spec §4.E).
pub const KEYBOARD_ACTIONS: &[&str] = &["type", "press", "release", "hotkey"];
/// Mouse action vocabulary (spec §4.E).
pub const MOUSE_ACTIONS: &[&str] = &[
    "move",
    "move_relative",
    "click",
    "press",
    "release",
    "scroll",
];
/// Gamepad action vocabulary (spec §4.E).
pub const GAMEPAD_ACTIONS: &[&str] = &["button", "trigger", "joystick", "dpad"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabularies_are_non_empty() {
        assert!(!KEYBOARD_ACTIONS.is_empty());
        assert!(!MOUSE_ACTIONS.is_empty());
        assert!(!GAMEPAD_ACTIONS.is_empty());
    }
}

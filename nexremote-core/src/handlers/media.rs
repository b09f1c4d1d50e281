//! Media control adapter (spec §4.E `media_control`). The OS media
//! session bridge (COM on Windows, MPRIS elsewhere) is out of scope
//! (spec §1 "Media metadata extraction mechanics"); this is the port the
//! dispatcher offloads to the blocking worker pool per spec §4.E policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaState {
    pub volume: f32,
    pub mute: bool,
    pub title: String,
    pub artist: String,
    pub playing: bool,
}

#[async_trait]
pub trait MediaHandler: Send + Sync {
    async fn control(&self, action: &str, body: &Value);
    async fn get_state(&self) -> MediaState;
}

pub struct NullMediaHandler;

#[async_trait]
impl MediaHandler for NullMediaHandler {
    async fn control(&self, action: &str, _body: &Value) {
        tracing::debug!(%action, "media control dropped: no host media handler installed");
    }

    async fn get_state(&self) -> MediaState {
        MediaState::default()
    }
}

pub const MEDIA_ACTIONS: &[&str] = &[
    "play",
    "pause",
    "stop",
    "next",
    "previous",
    "volume",
    "mute_toggle",
    "get_info",
];

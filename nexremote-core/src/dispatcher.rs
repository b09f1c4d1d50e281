//! Command dispatcher (spec §4.E): validates and routes decoded
//! envelopes to handlers, enforcing the rate limit and action
//! vocabularies. Grounded on the teacher's `resource_manager.rs` style
//! (const limits, tracking struct) for the sliding-window limiter.

use crate::capture::camera::{enumerate_cameras, CameraCapture};
use crate::capture::frame::ResolutionPreset;
use crate::capture::MonitorSource;
use crate::handlers::input::{GAMEPAD_ACTIONS, KEYBOARD_ACTIONS, MOUSE_ACTIONS};
use crate::handlers::media::MEDIA_ACTIONS;
use crate::handlers::Handlers;
use crate::packet::Envelope;
use crate::session::ClientSession;
use crate::streaming::{self, CaptureRegistry};
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Spec §4.E "Rate limiting": at most 1000 inbound messages/second per
/// session, sliding window; excess is dropped silently.
pub const RATE_LIMIT_PER_SECOND: usize = 1000;

pub struct RateLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
        }
    }
}

impl RateLimiter {
    /// Returns `true` if this message should be processed, `false` if it
    /// must be dropped.
    pub async fn allow(&self) -> bool {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().await;
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > Duration::from_secs(1) {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() >= RATE_LIMIT_PER_SECOND {
            return false;
        }
        timestamps.push_back(now);
        true
    }
}

pub struct Dispatcher<S: MonitorSource> {
    pub handlers: Arc<Handlers>,
    pub capture_registry: Arc<CaptureRegistry>,
    pub camera: Arc<CameraCapture>,
    pub encryption: crate::crypto::EncryptionContext,
    _source: PhantomData<S>,
}

impl<S: MonitorSource + 'static> Dispatcher<S> {
    pub fn new(
        handlers: Arc<Handlers>,
        capture_registry: Arc<CaptureRegistry>,
        camera: Arc<CameraCapture>,
        encryption: crate::crypto::EncryptionContext,
    ) -> Self {
        Self {
            handlers,
            capture_registry,
            camera,
            encryption,
            _source: PhantomData,
        }
    }

    /// Dispatches one decoded envelope. Handlers that perform blocking
    /// I/O are offloaded to `spawn_blocking`-backed handler impls;
    /// in-memory handlers (keyboard/mouse/gamepad) run inline (spec
    /// §4.E policy). Every handler call is wrapped so a failure is
    /// logged, never terminates the session.
    pub async fn dispatch(&self, session: &Arc<ClientSession>, envelope: Envelope) -> Option<Value> {
        match envelope {
            Envelope::Keyboard(body) => {
                if let Some(action) = body.get("action").and_then(|v| v.as_str()) {
                    if KEYBOARD_ACTIONS.contains(&action) {
                        self.handlers.input.keyboard(action, &body).await;
                    } else {
                        warn!(%action, "rejected unknown keyboard action");
                    }
                }
                None
            }
            Envelope::Mouse(body) => {
                if let Some(action) = body.get("action").and_then(|v| v.as_str()) {
                    if MOUSE_ACTIONS.contains(&action) {
                        self.handlers.input.mouse(action, &body).await;
                    } else {
                        warn!(%action, "rejected unknown mouse action");
                    }
                }
                None
            }
            Envelope::Gamepad(body) => {
                if let Some(action) = body.get("action").and_then(|v| v.as_str()) {
                    if GAMEPAD_ACTIONS.contains(&action) {
                        self.handlers.input.gamepad(action, &body).await;
                    } else {
                        warn!(%action, "rejected unknown gamepad action");
                    }
                }
                None
            }
            Envelope::MediaControl(body) => {
                let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("");
                if !MEDIA_ACTIONS.contains(&action) {
                    warn!(%action, "rejected unknown media_control action");
                    return None;
                }
                self.handlers.media.control(action, &body).await;
                if action == "get_info" {
                    let state = self.handlers.media.get_state().await;
                    Some(serde_json::json!({"type": "media_control", "state": state}))
                } else {
                    None
                }
            }
            Envelope::FileExplorer(body) => {
                let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("");
                Some(self.handlers.file_explorer.handle(action, &body).await)
            }
            Envelope::TaskManager(body) => {
                let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("");
                Some(self.handlers.task_manager.handle(action, &body).await)
            }
            Envelope::Clipboard(body) => {
                self.handlers.clipboard.handle(body).await;
                None
            }
            Envelope::ScreenShare(body) => self.dispatch_screen_share(session, body).await,
            Envelope::Camera(body) => self.dispatch_camera(session, body).await,
            Envelope::Unknown(kind) => {
                warn!(%kind, "dropped message of unknown type");
                None
            }
        }
    }

    async fn dispatch_screen_share(&self, session: &Arc<ClientSession>, body: Value) -> Option<Value> {
        let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("");
        match action {
            "start" => {
                let indices: Vec<u32> = if let Some(list) = body.get("display_indices").and_then(|v| v.as_array()) {
                    list.iter().filter_map(|v| v.as_u64()).map(|v| v as u32).collect()
                } else if let Some(single) = body.get("display_index").and_then(|v| v.as_u64()) {
                    vec![single as u32]
                } else {
                    vec![0]
                };
                let fps = body.get("fps").and_then(|v| v.as_u64()).unwrap_or(30) as u32;
                let quality = body.get("quality").and_then(|v| v.as_u64()).unwrap_or(75) as u8;
                let resolution = body
                    .get("resolution")
                    .and_then(|v| v.as_str())
                    .and_then(ResolutionPreset::from_str)
                    .unwrap_or(ResolutionPreset::Native);
                streaming::start_screen_share::<S>(session, &self.capture_registry, &indices, fps, quality, resolution)
                    .await;
                None
            }
            "stop" => {
                let index = body.get("display_index").and_then(|v| v.as_u64()).map(|v| v as u32);
                streaming::stop_screen_share(session, &self.capture_registry, index).await;
                None
            }
            "set_fps" => {
                if let Some(fps) = body.get("fps").and_then(|v| v.as_u64()) {
                    self.capture_registry
                        .apply_to_all(|c| c.settings.set_fps(fps as u32))
                        .await;
                }
                None
            }
            "set_quality" => {
                if let Some(quality) = body.get("quality").and_then(|v| v.as_u64()) {
                    self.capture_registry
                        .apply_to_all(|c| c.settings.set_quality(quality as u8))
                        .await;
                }
                None
            }
            "set_resolution" => {
                if let Some(preset) = body
                    .get("resolution")
                    .and_then(|v| v.as_str())
                    .and_then(ResolutionPreset::from_str)
                {
                    self.capture_registry
                        .apply_to_all(|c| c.settings.set_resolution(preset))
                        .await;
                }
                None
            }
            "list_displays" => streaming::list_displays::<S>(&self.capture_registry).await.ok(),
            "input" => {
                if let Some(input_action) = body.get("input_action").and_then(|v| v.as_str()) {
                    self.handlers.input.mouse(input_action, &body).await;
                } else {
                    warn!("screen_share input message missing input_action");
                }
                None
            }
            other => {
                warn!(action = other, "unknown screen_share action");
                None
            }
        }
    }

    async fn dispatch_camera(&self, session: &Arc<ClientSession>, body: Value) -> Option<Value> {
        let action = body.get("action").and_then(|v| v.as_str()).unwrap_or("");
        match action {
            "list_cameras" => {
                let cameras = enumerate_cameras();
                Some(serde_json::json!({"type": "camera", "cameras": cameras.iter().map(|c| serde_json::json!({
                    "index": c.index, "name": c.name, "width": c.width, "height": c.height, "fps": c.fps
                })).collect::<Vec<_>>()}))
            }
            "start" | "set_camera" => {
                let index = body.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                let fps = body.get("fps").and_then(|v| v.as_u64()).unwrap_or(30) as u32;
                streaming::start_camera_share(session, &self.camera, index, fps).await;
                Some(serde_json::json!({"type": "camera_info", "index": index}))
            }
            "stop" => {
                streaming::stop_camera_share(session, &self.camera).await;
                None
            }
            other => {
                warn!(action = other, "unknown camera action");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_allows_up_to_threshold() {
        let limiter = RateLimiter::default();
        let mut allowed = 0;
        for _ in 0..1200 {
            if limiter.allow().await {
                allowed += 1;
            }
        }
        assert_eq!(allowed, RATE_LIMIT_PER_SECOND);
    }
}

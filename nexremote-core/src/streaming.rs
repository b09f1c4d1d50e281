//! Streaming fabric (spec §4.F): per-session push loops for screen,
//! camera, and media state, plus the `screen_share` lifecycle messages
//! that start/stop/reconfigure them. Grounded on the teacher's
//! `plugins::remotedesktop::capture` push-loop shape, generalized across
//! monitors and wired to the [`crate::session::ClientSession`] stream map.

use crate::capture::camera::CameraCapture;
use crate::capture::frame::ResolutionPreset;
use crate::capture::{enumerate_monitors, new_monitor_capture, MonitorCapture, MonitorSource};
use crate::error::Result;
use crate::handlers::media::MediaHandler;
use crate::packet::{frame_camera, frame_screen};
use crate::session::{ClientSession, StreamKey};
use crate::transport::Frame;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Registry of lazily-created [`MonitorCapture`]s, one per monitor index
/// that any client has requested (spec §3 "created lazily...destroyed
/// when the last client stops monitor N").
#[derive(Default)]
pub struct CaptureRegistry {
    monitors: RwLock<HashMap<u32, Arc<MonitorCapture>>>,
}

impl CaptureRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn get_or_create(
        &self,
        index_one_based: u32,
        fps: u32,
        quality: u8,
        resolution: ResolutionPreset,
    ) -> Arc<MonitorCapture> {
        let mut monitors = self.monitors.write().await;
        monitors
            .entry(index_one_based)
            .or_insert_with(|| new_monitor_capture(index_one_based, fps, quality, resolution))
            .clone()
    }

    pub async fn get(&self, index_one_based: u32) -> Option<Arc<MonitorCapture>> {
        self.monitors.read().await.get(&index_one_based).cloned()
    }

    pub async fn apply_to_all(&self, f: impl Fn(&Arc<MonitorCapture>)) {
        for capture in self.monitors.read().await.values() {
            f(capture);
        }
    }
}

/// Starts (or refreshes) push loops for the requested monitors on behalf
/// of one session (spec §4.F "start").
pub async fn start_screen_share<S: MonitorSource + 'static>(
    session: &Arc<ClientSession>,
    registry: &Arc<CaptureRegistry>,
    monitor_indices_zero_based: &[u32],
    fps: u32,
    quality: u8,
    resolution: ResolutionPreset,
) {
    for &zero_based in monitor_indices_zero_based {
        let one_based = zero_based + 1;
        let capture = registry
            .get_or_create(one_based, fps, quality, resolution)
            .await;
        capture.add_reader::<S>();

        let session = Arc::clone(session);
        let capture_for_task = Arc::clone(&capture);
        let handle = tokio::spawn(async move {
            screen_push_loop(session, capture_for_task, zero_based as u8).await;
        });
        session
            .register_stream(StreamKey::Screen(zero_based), handle)
            .await;
    }
}

/// Stops push loops for the given monitors (or all, if none given) for
/// this session (spec §4.F "stop", §9 "screen_share.stop without
/// display_index").
pub async fn stop_screen_share(
    session: &Arc<ClientSession>,
    registry: &Arc<CaptureRegistry>,
    monitor_index_zero_based: Option<u32>,
) {
    let targets = match monitor_index_zero_based {
        Some(m) => vec![m],
        None => session.active_screen_monitors().await,
    };
    for zero_based in targets {
        session.cancel_stream(&StreamKey::Screen(zero_based)).await;
        if let Some(capture) = registry.get(zero_based + 1).await {
            capture.remove_reader();
        }
    }
}

async fn screen_push_loop(session: Arc<ClientSession>, capture: Arc<MonitorCapture>, monitor_index_zero_based: u8) {
    loop {
        let iteration_start = Instant::now();
        if let Some(jpeg) = capture.slot().latest() {
            let frame = frame_screen(monitor_index_zero_based, &jpeg);
            let mut conn = session.write_half.lock().await;
            if conn.write_frame(&Frame::Binary(frame)).await.is_err() {
                debug!(monitor = monitor_index_zero_based, "screen push send failed, stopping stream");
                return;
            }
        }
        let fps = capture.settings.fps().max(1);
        let target = Duration::from_secs_f64(1.0 / fps as f64);
        let elapsed = iteration_start.elapsed();
        if elapsed < target {
            tokio::time::sleep(target - elapsed).await;
        }
    }
}

/// Starts the camera push loop (spec §4.F "Camera push loop"). Device open
/// is blocking I/O (spec §4.H), so it runs on the blocking pool rather than
/// inline on this async task.
pub async fn start_camera_share(session: &Arc<ClientSession>, camera: &Arc<CameraCapture>, index: u32, fps: u32) {
    let camera_for_start = Arc::clone(camera);
    match tokio::task::spawn_blocking(move || camera_for_start.start(index)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(error = %e, index, "failed to start camera");
            return;
        }
        Err(e) => {
            warn!(error = %e, "camera start task panicked");
            return;
        }
    }
    let task_session = Arc::clone(session);
    let task_camera = Arc::clone(camera);
    let handle = tokio::spawn(async move { camera_push_loop(task_session, task_camera, fps).await });
    session.register_stream(StreamKey::Camera, handle).await;
}

/// Stops the camera push loop and closes the device (spec §4.F, §4.H).
pub async fn stop_camera_share(session: &Arc<ClientSession>, camera: &Arc<CameraCapture>) {
    session.cancel_stream(&StreamKey::Camera).await;
    let camera = Arc::clone(camera);
    if let Err(e) = tokio::task::spawn_blocking(move || camera.stop()).await {
        warn!(error = %e, "camera stop task panicked");
    }
}

async fn camera_push_loop(session: Arc<ClientSession>, camera: Arc<CameraCapture>, fps: u32) {
    loop {
        let iteration_start = Instant::now();
        if let Some(jpeg) = camera.slot().latest() {
            let frame = frame_camera(&jpeg);
            let mut conn = session.write_half.lock().await;
            if conn.write_frame(&Frame::Binary(frame)).await.is_err() {
                debug!("camera push send failed, stopping stream");
                return;
            }
        }
        let target = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let elapsed = iteration_start.elapsed();
        if elapsed < target {
            tokio::time::sleep(target - elapsed).await;
        }
    }
}

/// Media-state push loop: every 1.5s, sends an encrypted JSON envelope
/// with the current media state (spec §4.F).
pub async fn start_media_state_loop(
    session: &Arc<ClientSession>,
    media: Arc<dyn MediaHandler>,
    encryption: crate::crypto::EncryptionContext,
) {
    let session_for_task = Arc::clone(session);
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let state = media.get_state().await;
            let Ok(text) = serde_json::to_string(&serde_json::json!({
                "type": "media_control",
                "action": "state",
                "state": state,
            })) else {
                continue;
            };
            let Ok(encrypted) = encryption.encrypt(&text) else {
                continue;
            };
            let mut conn = session_for_task.write_half.lock().await;
            if conn.write_frame(&Frame::Text(encrypted)).await.is_err() {
                return;
            }
        }
    });
    session.register_stream(StreamKey::MediaState, handle).await;
}

/// `list_displays` response payload (spec §4.F). Matches the original's
/// `_handle_screen_share_list_displays` shape: `displays` carries only the
/// static per-monitor fields, while `active_displays` and the current
/// fps/quality/resolution are top-level, reflecting the (single, shared)
/// capture settings rather than being duplicated per display.
pub async fn list_displays<S: MonitorSource>(registry: &Arc<CaptureRegistry>) -> Result<Value> {
    let monitors = enumerate_monitors::<S>()?;
    let mut displays = Vec::new();
    let mut active_displays = Vec::new();
    let mut current_fps = None;
    let mut current_quality = None;
    let mut current_resolution = None;
    for m in monitors {
        let zero_based = m.index_one_based - 1;
        displays.push(serde_json::json!({
            "index": zero_based,
            "name": m.name,
            "width": m.width,
            "height": m.height,
            "is_primary": m.is_primary,
        }));
        if let Some(capture) = registry.get(m.index_one_based).await {
            if capture.reader_count() > 0 {
                active_displays.push(zero_based);
                if current_fps.is_none() {
                    current_fps = Some(capture.settings.fps());
                    current_quality = Some(capture.settings.quality());
                    current_resolution = Some(capture.settings.resolution().as_str());
                }
            }
        }
    }
    Ok(serde_json::json!({
        "type": "screen_share",
        "action": "list_displays",
        "displays": displays,
        "active_displays": active_displays,
        "current_fps": current_fps,
        "current_quality": current_quality,
        "current_resolution": current_resolution,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_creates_lazily_and_reuses() {
        let registry = CaptureRegistry::new();
        let a = registry
            .get_or_create(1, 30, 50, ResolutionPreset::Native)
            .await;
        let b = registry
            .get_or_create(1, 10, 10, ResolutionPreset::P720)
            .await;
        assert!(Arc::ptr_eq(&a, &b), "second call should reuse the same capture");
    }
}

//! Camera capture pipeline (spec §4.H): mirrors [`super::MonitorCapture`]
//! but is a process-wide singleton backed by one device index at a time,
//! via the `nokhwa` cross-platform camera crate.

use crate::capture::frame::{encode_jpeg, FrameSlot, ResolutionPreset};
use crate::error::Result;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Probes device indices 0..9 (spec §4.H "probing indices 0..9").
pub fn enumerate_cameras() -> Vec<CameraInfo> {
    let mut found = Vec::new();
    for index in 0..10u32 {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(camera) => {
                let format = camera.camera_format();
                found.push(CameraInfo {
                    index,
                    name: camera.info().human_name(),
                    width: format.resolution().width(),
                    height: format.resolution().height(),
                    fps: format.frame_rate(),
                });
            }
            Err(_) => continue,
        }
    }
    found
}

/// Singleton camera capture: stopping and starting on a different index
/// is atomic from the client's perspective (spec §4.H), enforced here by
/// fully joining the old thread before opening the new one.
pub struct CameraCapture {
    slot: FrameSlot,
    active_index: Mutex<Option<u32>>,
    stop_flag: Arc<AtomicBool>,
    quality: Arc<AtomicUsize>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Default for CameraCapture {
    fn default() -> Self {
        Self {
            slot: FrameSlot::new(),
            active_index: Mutex::new(None),
            stop_flag: Arc::new(AtomicBool::new(false)),
            quality: Arc::new(AtomicUsize::new(75)),
            handle: Mutex::new(None),
        }
    }
}

impl CameraCapture {
    pub fn slot(&self) -> FrameSlot {
        self.slot.clone()
    }

    pub fn active_index(&self) -> Option<u32> {
        *self.active_index.lock().unwrap()
    }

    pub fn set_quality(&self, quality: u8) {
        self.quality.store(quality.clamp(1, 100) as usize, Ordering::Relaxed);
    }

    /// Starts capturing `index`, joining any previous producer first.
    pub fn start(self: &Arc<Self>, index: u32) -> Result<()> {
        self.stop();
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag.store(false, Ordering::SeqCst);
        *self.active_index.lock().unwrap() = Some(index);
        let slot = self.slot.clone();
        let quality = Arc::clone(&self.quality);
        let flag = Arc::clone(&stop_flag);
        let handle = std::thread::spawn(move || run_camera_producer(index, slot, quality, flag));
        *self.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        *self.active_index.lock().unwrap() = None;
    }
}

fn run_camera_producer(
    index: u32,
    slot: FrameSlot,
    quality: Arc<AtomicUsize>,
    stop_flag: Arc<AtomicBool>,
) {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(c) => c,
        Err(e) => {
            warn!(camera = index, error = %e, "failed to open camera");
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        warn!(camera = index, error = %e, "failed to start camera stream");
        return;
    }
    info!(camera = index, "camera capture producer started");

    while !stop_flag.load(Ordering::SeqCst) {
        match camera.frame() {
            Ok(buf) => match buf.decode_image::<RgbFormat>() {
                Ok(image) => {
                    let resized = crate::capture::frame::apply_resolution_preset(
                        image,
                        ResolutionPreset::Native,
                    );
                    match encode_jpeg(&resized, quality.load(Ordering::Relaxed) as u8) {
                        Ok(jpeg) => slot.publish(jpeg),
                        Err(e) => debug!(camera = index, error = %e, "jpeg encode failed"),
                    }
                }
                Err(e) => debug!(camera = index, error = %e, "dropped a bad camera frame"),
            },
            Err(e) => debug!(camera = index, error = %e, "camera read failed"),
        }
    }
    info!(camera = index, "camera capture producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_spec_bounds() {
        let capture = CameraCapture::default();
        capture.set_quality(255);
        assert_eq!(capture.quality.load(Ordering::Relaxed), 100);
        capture.set_quality(0);
        assert_eq!(capture.quality.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn starts_with_no_active_index() {
        let capture = CameraCapture::default();
        assert_eq!(capture.active_index(), None);
    }
}

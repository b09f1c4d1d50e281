//! Multi-monitor capture pipeline (spec §4.G). Grounded on the teacher's
//! `plugins::remotedesktop::capture` producer-thread shape (one OS thread
//! per captured source, writing a mutex-guarded [`FrameSlot`]), adapted
//! from the teacher's PipeWire/portal pipeline to a direct framebuffer
//! grab via the `scrap` crate, matching this spec's BGRA/no-permission-
//! -dialog data model exactly.

pub mod camera;
pub mod frame;

use crate::error::{ProtocolError, Result};
use frame::{apply_resolution_preset, encode_jpeg, FrameSlot, PixelFormat, RawFrame, ResolutionPreset};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub index_one_based: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

/// Abstraction over the OS display backend so the producer loop's pacing
/// and settings logic can be unit-tested without real display hardware.
pub trait MonitorSource: Send {
    fn enumerate() -> Result<Vec<MonitorInfo>>
    where
        Self: Sized;
    fn open(index_one_based: u32) -> Result<Self>
    where
        Self: Sized;
    fn grab(&mut self) -> Result<RawFrame>;
}

/// Real backend: direct framebuffer capture via `scrap` (DXGI on Windows,
/// X11 on Linux), producing BGRA frames.
pub struct ScrapMonitorSource {
    capturer: scrap::Capturer,
}

impl MonitorSource for ScrapMonitorSource {
    fn enumerate() -> Result<Vec<MonitorInfo>> {
        let displays = scrap::Display::all()
            .map_err(|e| ProtocolError::capture(format!("enumerating displays: {e}")))?;
        Ok(displays
            .into_iter()
            .enumerate()
            .map(|(i, d)| MonitorInfo {
                index_one_based: (i + 1) as u32,
                name: format!("display-{}", i + 1),
                width: d.width() as u32,
                height: d.height() as u32,
                is_primary: d.is_primary(),
            })
            .collect())
    }

    fn open(index_one_based: u32) -> Result<Self> {
        let displays = scrap::Display::all()
            .map_err(|e| ProtocolError::capture(format!("enumerating displays: {e}")))?;
        let idx = index_one_based
            .checked_sub(1)
            .ok_or_else(|| ProtocolError::capture("monitor index must be 1-based"))? as usize;
        let display = displays
            .into_iter()
            .nth(idx)
            .ok_or_else(|| ProtocolError::capture(format!("no monitor at index {index_one_based}")))?;
        let capturer = scrap::Capturer::new(display)
            .map_err(|e| ProtocolError::capture(format!("opening capturer: {e}")))?;
        Ok(Self { capturer })
    }

    fn grab(&mut self) -> Result<RawFrame> {
        let width = self.capturer.width() as u32;
        let height = self.capturer.height() as u32;
        loop {
            match self.capturer.frame() {
                Ok(buf) => {
                    return Ok(RawFrame::new(width, height, PixelFormat::Bgra, buf.to_vec()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                    continue;
                }
                Err(e) => return Err(ProtocolError::capture(format!("frame grab failed: {e}"))),
            }
        }
    }
}

/// Monitor enumeration is cached after first success (spec §4.G).
static MONITOR_CACHE: OnceLock<Vec<MonitorInfo>> = OnceLock::new();

pub fn enumerate_monitors<S: MonitorSource>() -> Result<Vec<MonitorInfo>> {
    if let Some(cached) = MONITOR_CACHE.get() {
        return Ok(cached.clone());
    }
    let monitors = S::enumerate()?;
    let _ = MONITOR_CACHE.set(monitors.clone());
    Ok(monitors)
}

/// Settings read by the producer loop on every iteration, so changes
/// apply within at most one frame (spec §4.G "Settings are read each
/// iteration").
pub struct CaptureSettings {
    fps: AtomicU32,
    quality: AtomicU8,
    resolution: AtomicU8,
}

impl CaptureSettings {
    pub fn new(fps: u32, quality: u8, resolution: ResolutionPreset) -> Arc<Self> {
        Arc::new(Self {
            fps: AtomicU32::new(fps.clamp(1, 60)),
            quality: AtomicU8::new(quality.clamp(1, 100)),
            resolution: AtomicU8::new(resolution as u8),
        })
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    pub fn set_fps(&self, fps: u32) {
        self.fps.store(fps.clamp(1, 60), Ordering::Relaxed);
    }

    pub fn quality(&self) -> u8 {
        self.quality.load(Ordering::Relaxed)
    }

    pub fn set_quality(&self, quality: u8) {
        self.quality.store(quality.clamp(1, 100), Ordering::Relaxed);
    }

    pub fn resolution(&self) -> ResolutionPreset {
        match self.resolution.load(Ordering::Relaxed) {
            1 => ResolutionPreset::P1080,
            2 => ResolutionPreset::P720,
            3 => ResolutionPreset::P480,
            4 => ResolutionPreset::P360,
            _ => ResolutionPreset::Native,
        }
    }

    /// Unknown presets are rejected; the previous value is retained
    /// (spec §8 boundary behaviors).
    pub fn set_resolution(&self, preset: ResolutionPreset) {
        self.resolution.store(preset as u8, Ordering::Relaxed);
    }
}

/// One physically captured monitor: a producer thread and its
/// [`FrameSlot`] (spec §3 "MonitorCapture").
pub struct MonitorCapture {
    pub index_one_based: u32,
    pub settings: Arc<CaptureSettings>,
    slot: FrameSlot,
    reader_count: Arc<AtomicUsize>,
    stop_flag: Arc<AtomicBool>,
    handle: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl MonitorCapture {
    pub fn slot(&self) -> FrameSlot {
        self.slot.clone()
    }

    pub fn reader_count(&self) -> usize {
        self.reader_count.load(Ordering::SeqCst)
    }

    /// Registers a new reader; starts the producer thread if this is the
    /// first (spec §3 "producer runs iff its active-reader count > 0").
    pub fn add_reader<S: MonitorSource + 'static>(self: &Arc<Self>) {
        let previous = self.reader_count.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            self.spawn_producer::<S>();
        }
    }

    /// Releases a reader; the producer exits on its next loop iteration
    /// once the count reaches zero.
    pub fn remove_reader(&self) {
        self.reader_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn spawn_producer<S: MonitorSource + 'static>(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let stop_flag = Arc::clone(&self.stop_flag);
        stop_flag.store(false, Ordering::SeqCst);
        let handle = std::thread::spawn(move || run_producer::<S>(this));
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop_and_join(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

pub fn new_monitor_capture(
    index_one_based: u32,
    fps: u32,
    quality: u8,
    resolution: ResolutionPreset,
) -> Arc<MonitorCapture> {
    Arc::new(MonitorCapture {
        index_one_based,
        settings: CaptureSettings::new(fps, quality, resolution),
        slot: FrameSlot::new(),
        reader_count: Arc::new(AtomicUsize::new(0)),
        stop_flag: Arc::new(AtomicBool::new(false)),
        handle: std::sync::Mutex::new(None),
    })
}

/// The producer loop body (spec §4.G steps 1-7): runs on a dedicated OS
/// thread until the reader count drops to zero or `stop_flag` is set.
fn run_producer<S: MonitorSource>(capture: Arc<MonitorCapture>) {
    let mut source = match S::open(capture.index_one_based) {
        Ok(s) => s,
        Err(e) => {
            warn!(monitor = capture.index_one_based, error = %e, "failed to open monitor source");
            return;
        }
    };
    info!(monitor = capture.index_one_based, "capture producer started");

    loop {
        if capture.reader_count.load(Ordering::SeqCst) == 0 {
            break;
        }
        if capture.stop_flag.load(Ordering::SeqCst) {
            break;
        }
        let iteration_start = Instant::now();
        match source.grab().and_then(|raw| encode_current(&raw, &capture.settings)) {
            Ok(jpeg) => capture.slot.publish(jpeg),
            Err(e) => {
                debug!(monitor = capture.index_one_based, error = %e, "dropped a bad frame");
            }
        }
        let fps = capture.settings.fps().max(1);
        let target = Duration::from_secs_f64(1.0 / fps as f64);
        let elapsed = iteration_start.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
        // else: already late, no catch-up sleep (spec §4.G step 7).
    }
    info!(monitor = capture.index_one_based, "capture producer stopped");
}

fn encode_current(raw: &RawFrame, settings: &CaptureSettings) -> Result<Vec<u8>> {
    let image = raw
        .to_rgb_image()
        .ok_or_else(|| ProtocolError::capture("raw buffer size did not match dimensions"))?;
    let resized = apply_resolution_preset(image, settings.resolution());
    encode_jpeg(&resized, settings.quality())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as TestCounter;

    struct FakeSource {
        width: u32,
        height: u32,
        frames_emitted: Arc<TestCounter>,
    }

    impl MonitorSource for FakeSource {
        fn enumerate() -> Result<Vec<MonitorInfo>> {
            Ok(vec![MonitorInfo {
                index_one_based: 1,
                name: "fake".into(),
                width: 64,
                height: 64,
                is_primary: true,
            }])
        }

        fn open(_index_one_based: u32) -> Result<Self> {
            Ok(Self {
                width: 64,
                height: 64,
                frames_emitted: Arc::new(TestCounter::new(0)),
            })
        }

        fn grab(&mut self) -> Result<RawFrame> {
            self.frames_emitted.fetch_add(1, Ordering::SeqCst);
            Ok(RawFrame::new(
                self.width,
                self.height,
                PixelFormat::Bgra,
                vec![128u8; (self.width * self.height * 4) as usize],
            ))
        }
    }

    #[test]
    fn producer_publishes_frames_while_readers_present() {
        let capture = new_monitor_capture(1, 30, 50, ResolutionPreset::Native);
        capture.add_reader::<FakeSource>();
        // Wait for at least one frame.
        for _ in 0..200 {
            if capture.slot().latest().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(capture.slot().latest().is_some(), "expected a published frame");
        capture.remove_reader();
        capture.stop_and_join();
    }

    #[test]
    fn settings_clamp_to_spec_bounds() {
        let settings = CaptureSettings::new(100, 200, ResolutionPreset::Native);
        assert_eq!(settings.fps(), 60);
        assert_eq!(settings.quality(), 100);
        settings.set_fps(0);
        assert_eq!(settings.fps(), 1);
    }
}

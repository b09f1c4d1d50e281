//! Frame types shared by the monitor and camera capture pipelines
//! (spec §3 "FrameSlot", §4.G/§4.H). Adapted from the teacher's
//! `plugins::remotedesktop::capture::frame` module: same pixel-format and
//! raw-frame shape, generalized to the BGRA→BGR→resize→JPEG pipeline this
//! spec requires instead of the teacher's PipeWire/H.264 path.

use crate::error::{ProtocolError, Result};
use image::{ImageBuffer, Rgb};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra,
    Bgr,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Bgra => 4,
            PixelFormat::Bgr => 3,
        }
    }
}

/// A raw pixel buffer grabbed from a display or camera, before resize and
/// JPEG encoding (spec §4.G steps 2–3).
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// BGRA → BGR (spec §4.G step 3).
    pub fn to_bgr(&self) -> RawFrame {
        match self.format {
            PixelFormat::Bgr => self.clone(),
            PixelFormat::Bgra => {
                let data: Vec<u8> = self
                    .data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                RawFrame::new(self.width, self.height, PixelFormat::Bgr, data)
            }
        }
    }

    /// Converts BGR pixel data to an RGB image buffer for resizing/encoding.
    pub fn to_rgb_image(&self) -> Option<ImageBuffer<Rgb<u8>, Vec<u8>>> {
        let bgr = self.to_bgr();
        let rgb: Vec<u8> = bgr
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        ImageBuffer::from_raw(bgr.width, bgr.height, rgb)
    }
}

/// Resolution presets: width x height ceilings, downscale-only (spec
/// §4.G "Resolution presets").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPreset {
    #[default]
    Native,
    P1080,
    P720,
    P480,
    P360,
}

impl ResolutionPreset {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "native" => Some(ResolutionPreset::Native),
            "1080p" => Some(ResolutionPreset::P1080),
            "720p" => Some(ResolutionPreset::P720),
            "480p" => Some(ResolutionPreset::P480),
            "360p" => Some(ResolutionPreset::P360),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPreset::Native => "native",
            ResolutionPreset::P1080 => "1080p",
            ResolutionPreset::P720 => "720p",
            ResolutionPreset::P480 => "480p",
            ResolutionPreset::P360 => "360p",
        }
    }

    /// `None` for `Native` (no ceiling); otherwise `(max_width, max_height)`.
    pub fn ceiling(&self) -> Option<(u32, u32)> {
        match self {
            ResolutionPreset::Native => None,
            ResolutionPreset::P1080 => Some((1920, 1080)),
            ResolutionPreset::P720 => Some((1280, 720)),
            ResolutionPreset::P480 => Some((854, 480)),
            ResolutionPreset::P360 => Some((640, 360)),
        }
    }
}

/// Resizes `image`, preserving aspect ratio, so that it fits within the
/// preset's ceiling. Downscale only — never enlarges (spec §4.G step 4).
pub fn apply_resolution_preset(
    image: ImageBuffer<Rgb<u8>, Vec<u8>>,
    preset: ResolutionPreset,
) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let Some((max_w, max_h)) = preset.ceiling() else {
        return image;
    };
    let (w, h) = image.dimensions();
    if w <= max_w && h <= max_h {
        return image;
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(&image, new_w, new_h, image::imageops::FilterType::Triangle)
}

/// Encodes an RGB image as JPEG at the given quality (1-100, spec §4.G
/// step 5, clamped per spec §8 boundary behavior).
pub fn encode_jpeg(image: &ImageBuffer<Rgb<u8>, Vec<u8>>, quality: u8) -> Result<Vec<u8>> {
    let quality = quality.clamp(1, 100);
    let mut out = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(image)
        .map_err(|e| ProtocolError::capture(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

/// A single-slot mailbox holding the most recent encoded JPEG frame.
/// Producers overwrite unconditionally; readers take a cheap `Arc` clone
/// of the bytes (spec §3 "FrameSlot", §9 "Frame buffer sharing").
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<Vec<u8>>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Vec<u8>) {
        let mut guard = self.inner.lock().unwrap();
        *guard = Some(Arc::new(frame));
    }

    /// Returns the most recent frame snapshot, if any has been published yet.
    pub fn latest(&self) -> Option<Arc<Vec<u8>>> {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_to_bgr_drops_alpha() {
        let frame = RawFrame::new(1, 1, PixelFormat::Bgra, vec![10, 20, 30, 255]);
        let bgr = frame.to_bgr();
        assert_eq!(bgr.data, vec![10, 20, 30]);
    }

    #[test]
    fn resolution_preset_round_trips_strings() {
        for s in ["native", "1080p", "720p", "480p", "360p"] {
            let preset = ResolutionPreset::from_str(s).unwrap();
            assert_eq!(preset.as_str(), s);
        }
        assert!(ResolutionPreset::from_str("bogus").is_none());
    }

    #[test]
    fn downscale_only_never_enlarges() {
        let image = ImageBuffer::from_pixel(100, 100, Rgb([0, 0, 0]));
        let resized = apply_resolution_preset(image, ResolutionPreset::P1080);
        assert_eq!(resized.dimensions(), (100, 100));
    }

    #[test]
    fn downscale_preserves_aspect_ratio_within_ceiling() {
        let image = ImageBuffer::from_pixel(3840, 2160, Rgb([0, 0, 0]));
        let resized = apply_resolution_preset(image, ResolutionPreset::P720);
        let (w, h) = resized.dimensions();
        assert!(w <= 1280 && h <= 720);
        assert_eq!(w as f64 / h as f64, 3840.0 / 2160.0);
    }

    #[test]
    fn frame_slot_overwrites_and_reads_latest() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        slot.publish(vec![1, 2, 3]);
        slot.publish(vec![4, 5, 6]);
        assert_eq!(*slot.latest().unwrap(), vec![4, 5, 6]);
    }
}

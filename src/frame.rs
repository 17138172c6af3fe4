//! Captured frame types.
//!
//! - `FrameMetadata`: Immutable per-frame descriptor. The index is assigned by
//!   the session orchestrator, never trusted from the source.
//! - `RawBuffer`: Opaque pixel container handed from the frame source to the
//!   inference engine. Bytes are zeroized on drop.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::grid::{DepthGrid, RgbGrid, RgbPixel};

/// Illumination state while the frame was exposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorchPhase {
    Off,
    On,
    AlternatingOn,
    AlternatingOff,
    Ambient,
}

impl TorchPhase {
    /// The opposite half of an alternating on/off pair, if this phase has one.
    pub fn complement(&self) -> Option<TorchPhase> {
        match self {
            TorchPhase::AlternatingOn => Some(TorchPhase::AlternatingOff),
            TorchPhase::AlternatingOff => Some(TorchPhase::AlternatingOn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TorchPhase::Off => "off",
            TorchPhase::On => "on",
            TorchPhase::AlternatingOn => "alternating_on",
            TorchPhase::AlternatingOff => "alternating_off",
            TorchPhase::Ambient => "ambient",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMetadata {
    /// Milliseconds since the capture session started.
    pub timestamp_ms: u64,
    /// 0-based position within the session.
    pub index: u64,
    pub torch_phase: TorchPhase,
    /// Camera-to-target distance, when the source can measure it.
    pub distance_mm: Option<f32>,
    /// Deviation from the optimal viewing angle, when available.
    pub tilt_deg: Option<f32>,
}

impl FrameMetadata {
    pub fn new(timestamp_ms: u64, torch_phase: TorchPhase) -> Self {
        Self {
            timestamp_ms,
            index: 0,
            torch_phase,
            distance_mm: None,
            tilt_deg: None,
        }
    }

    pub fn with_geometry(mut self, distance_mm: Option<f32>, tilt_deg: Option<f32>) -> Self {
        self.distance_mm = distance_mm;
        self.tilt_deg = tilt_deg;
        self
    }

    /// Copy of this metadata carrying the orchestrator-assigned index.
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

/// Pixel layout of a `RawBuffer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 => 4,
        }
    }

    pub fn is_color(&self) -> bool {
        !matches!(self, PixelFormat::Gray8)
    }
}

/// Raw capture buffer. There is no `Clone`; the pipeline shares it behind an `Arc`.
pub struct RawBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Optional depth map delivered alongside the image by the sensor.
    depth: Option<DepthGrid>,
}

impl RawBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| anyhow!("raw buffer dimensions overflow"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("raw buffer dimensions must be positive"));
        }
        if data.len() != expected {
            return Err(anyhow!(
                "raw buffer has {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            depth: None,
        })
    }

    pub fn with_depth(mut self, depth: DepthGrid) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn depth(&self) -> Option<&DepthGrid> {
        self.depth.as_ref()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Fraction of colour samples at full scale (255). Alpha is ignored.
    pub fn saturated_fraction(&self) -> f32 {
        let bpp = self.format.bytes_per_pixel();
        let channels = match self.format {
            PixelFormat::Bgra8 => 3,
            _ => bpp,
        };
        let mut total = 0usize;
        let mut saturated = 0usize;
        for px in self.data.chunks_exact(bpp) {
            for &sample in &px[..channels] {
                total += 1;
                if sample == u8::MAX {
                    saturated += 1;
                }
            }
        }
        if total == 0 {
            return 0.0;
        }
        saturated as f32 / total as f32
    }

    /// Linear RGB view of the buffer. `None` for grayscale input.
    pub fn rgb_grid(&self) -> Option<RgbGrid> {
        if !self.format.is_color() {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let pixels = self
            .data
            .chunks_exact(bpp)
            .map(|px| {
                let (r, g, b) = match self.format {
                    PixelFormat::Bgra8 => (px[2], px[1], px[0]),
                    _ => (px[0], px[1], px[2]),
                };
                RgbPixel {
                    r: r as f32 / 255.0,
                    g: g as f32 / 255.0,
                    b: b as f32 / 255.0,
                }
            })
            .collect();
        RgbGrid::new(self.width as usize, self.height as usize, pixels).ok()
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_buffer_validates_length() {
        assert!(RawBuffer::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb8).is_ok());
        assert!(RawBuffer::new(vec![0u8; 11], 2, 2, PixelFormat::Rgb8).is_err());
        assert!(RawBuffer::new(vec![], 0, 2, PixelFormat::Gray8).is_err());
    }

    #[test]
    fn saturated_fraction_ignores_alpha() {
        // Two BGRA pixels: first fully saturated colour, second dark with opaque alpha.
        let data = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let buffer = RawBuffer::new(data, 2, 1, PixelFormat::Bgra8).unwrap();
        assert!((buffer.saturated_fraction() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rgb_grid_swizzles_bgra() {
        let data = vec![0, 0, 255, 255];
        let buffer = RawBuffer::new(data, 1, 1, PixelFormat::Bgra8).unwrap();
        let grid = buffer.rgb_grid().unwrap();
        assert_eq!(grid.pixels()[0].r, 1.0);
        assert_eq!(grid.pixels()[0].b, 0.0);

        let gray = RawBuffer::new(vec![10], 1, 1, PixelFormat::Gray8).unwrap();
        assert!(gray.rgb_grid().is_none());
    }

    #[test]
    fn torch_phase_complements_only_alternating() {
        assert_eq!(
            TorchPhase::AlternatingOn.complement(),
            Some(TorchPhase::AlternatingOff)
        );
        assert_eq!(TorchPhase::On.complement(), None);
        assert_eq!(TorchPhase::Ambient.complement(), None);
    }

    #[test]
    fn with_index_overrides_source_index() {
        let meta = FrameMetadata::new(40, TorchPhase::On).with_index(7);
        assert_eq!(meta.index, 7);
        assert_eq!(meta.timestamp_ms, 40);
    }
}

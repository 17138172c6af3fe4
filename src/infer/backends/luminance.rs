use anyhow::Result;

use crate::frame::{FrameMetadata, PixelFormat, RawBuffer};
use crate::grid::ScalarGrid;
use crate::infer::backend::InferenceEngine;

const DEFAULT_SIDE: u32 = 32;

/// CPU engine that block-averages normalized luminance into a coarse field.
///
/// Not a physiological model. It gives the pipeline a frame-dependent field
/// when no trained model is available.
pub struct LuminanceEngine {
    side: u32,
}

impl LuminanceEngine {
    pub fn new() -> Self {
        Self { side: DEFAULT_SIDE }
    }

    pub fn with_side(side: u32) -> Self {
        Self { side: side.max(1) }
    }
}

impl Default for LuminanceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn luminance(format: PixelFormat, px: &[u8]) -> f32 {
    let (r, g, b) = match format {
        PixelFormat::Gray8 => return px[0] as f32 / 255.0,
        PixelFormat::Rgb8 => (px[0], px[1], px[2]),
        PixelFormat::Bgra8 => (px[2], px[1], px[0]),
    };
    (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32) / 255.0
}

impl InferenceEngine for LuminanceEngine {
    fn name(&self) -> &'static str {
        "luminance"
    }

    fn infer(&self, buffer: &RawBuffer, _meta: &FrameMetadata) -> Result<ScalarGrid> {
        let out_w = self.side.min(buffer.width) as usize;
        let out_h = self.side.min(buffer.height) as usize;
        let in_w = buffer.width as usize;
        let in_h = buffer.height as usize;
        let bpp = buffer.format.bytes_per_pixel();
        let data = buffer.data();

        let mut sums = vec![0f32; out_w * out_h];
        let mut counts = vec![0u32; out_w * out_h];
        for y in 0..in_h {
            let cy = y * out_h / in_h;
            for x in 0..in_w {
                let cx = x * out_w / in_w;
                let offset = (y * in_w + x) * bpp;
                let cell = cy * out_w + cx;
                sums[cell] += luminance(buffer.format, &data[offset..offset + bpp]);
                counts[cell] += 1;
            }
        }
        let values = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| if count == 0 { 0.0 } else { sum / count as f32 })
            .collect();
        ScalarGrid::new(out_w, out_h, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TorchPhase;

    #[test]
    fn averages_blocks_of_gray_pixels() {
        // 4x2 image reduced to 2x1: left half dark, right half bright.
        let data = vec![0, 0, 255, 255, 0, 0, 255, 255];
        let buffer = RawBuffer::new(data, 4, 2, PixelFormat::Gray8).unwrap();
        let engine = LuminanceEngine::with_side(2);
        let grid = engine
            .infer(&buffer, &FrameMetadata::new(0, TorchPhase::On))
            .unwrap();
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.get(0, 0), Some(0.0));
        assert_eq!(grid.get(1, 0), Some(1.0));
    }

    #[test]
    fn output_never_exceeds_input_size() {
        let buffer = RawBuffer::new(vec![128u8; 3 * 3 * 3], 3, 3, PixelFormat::Rgb8).unwrap();
        let grid = LuminanceEngine::new()
            .infer(&buffer, &FrameMetadata::new(0, TorchPhase::On))
            .unwrap();
        assert_eq!((grid.width(), grid.height()), (3, 3));
        assert!(grid.values().iter().all(|&v| (v - 128.0 / 255.0).abs() < 1e-4));
    }
}

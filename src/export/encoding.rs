//! Binary encodings for exported grids and stills.
//!
//! Grids are flat little-endian `f32` arrays, row-major, with multi-channel
//! grids channel-interleaved. Nothing else (no header, no dimensions) is
//! written; dimensions are recorded in the metadata stream.

use crate::grid::{DepthGrid, RgbGrid, ScalarGrid};

/// File-name stem for each grid kind: `<kind>_<index>.bin`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKind {
    Scalar,
    Depth,
    Rgb,
}

impl GridKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridKind::Scalar => "scalar",
            GridKind::Depth => "depth",
            GridKind::Rgb => "rgb",
        }
    }

    pub fn file_name(&self, index: u64) -> String {
        format!("{}_{}.bin", self.as_str(), index)
    }
}

pub fn encode_f32_le<I>(samples: I) -> Vec<u8>
where
    I: IntoIterator<Item = f32>,
{
    let iter = samples.into_iter();
    let mut out = Vec::with_capacity(iter.size_hint().0 * 4);
    for v in iter {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn encode_scalar(grid: &ScalarGrid) -> Vec<u8> {
    encode_f32_le(grid.values().iter().copied())
}

pub fn encode_depth(grid: &DepthGrid) -> Vec<u8> {
    encode_f32_le(grid.values().iter().copied())
}

pub fn encode_rgb(grid: &RgbGrid) -> Vec<u8> {
    encode_f32_le(grid.interleaved())
}

/// Binary PGM (P5) of the scalar field, values clamped to `0.0..=1.0`.
pub fn encode_pgm(grid: &ScalarGrid) -> Vec<u8> {
    let header = format!("P5\n{} {}\n255\n", grid.width(), grid.height());
    let mut out = Vec::with_capacity(header.len() + grid.values().len());
    out.extend_from_slice(header.as_bytes());
    out.extend(
        grid.values()
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8),
    );
    out
}

/// Inverse of `encode_f32_le`; trailing partial samples are ignored.
pub fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RgbPixel;

    #[test]
    fn rgb_is_channel_interleaved_little_endian() {
        let grid = RgbGrid::new(
            1,
            1,
            vec![RgbPixel {
                r: 1.0,
                g: 0.5,
                b: 0.25,
            }],
        )
        .unwrap();
        let bytes = encode_rgb(&grid);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_f32_le(&bytes), vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn pgm_clamps_and_scales() {
        let grid = ScalarGrid::new(3, 1, vec![-1.0, 0.5, 2.0]).unwrap();
        let bytes = encode_pgm(&grid);
        let header = b"P5\n3 1\n255\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[0, 128, 255]);
    }

    #[test]
    fn file_names_are_deterministic() {
        assert_eq!(GridKind::Scalar.file_name(0), "scalar_0.bin");
        assert_eq!(GridKind::Rgb.file_name(17), "rgb_17.bin");
    }
}

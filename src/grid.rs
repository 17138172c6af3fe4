//! Immutable row-major 2D grids.
//!
//! Every grid upholds `values.len() == width * height` with both dimensions
//! positive. Construction rejects anything else, so holders of a grid never
//! re-check its shape.

use anyhow::{anyhow, Result};

fn check_dims(kind: &str, width: usize, height: usize, len: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(anyhow!(
            "{} grid dimensions must be positive (got {}x{})",
            kind,
            width,
            height
        ));
    }
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| anyhow!("{} grid dimensions overflow", kind))?;
    if len != expected {
        return Err(anyhow!(
            "{} grid has {} samples, expected {}x{} = {}",
            kind,
            len,
            width,
            height,
            expected
        ));
    }
    Ok(())
}

/// Scalar measurement field (e.g. tissue oxygenation), one value per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarGrid {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl ScalarGrid {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        check_dims("scalar", width, height, values.len())?;
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values.get(y * self.width + x).copied()
    }
}

/// Depth map in millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthGrid {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DepthGrid {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Result<Self> {
        check_dims("depth", width, height, values.len())?;
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Linear-space RGB sample, components nominally in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RgbPixel {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RgbGrid {
    width: usize,
    height: usize,
    pixels: Vec<RgbPixel>,
}

impl RgbGrid {
    pub fn new(width: usize, height: usize, pixels: Vec<RgbPixel>) -> Result<Self> {
        check_dims("rgb", width, height, pixels.len())?;
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[RgbPixel] {
        &self.pixels
    }

    /// Channel-interleaved samples: `r0 g0 b0 r1 g1 b1 ...`.
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        self.pixels.iter().flat_map(|p| [p.r, p.g, p.b])
    }
}

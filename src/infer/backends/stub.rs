use anyhow::Result;

use crate::frame::{FrameMetadata, RawBuffer};
use crate::grid::ScalarGrid;
use crate::infer::backend::InferenceEngine;

/// Stub engine for wiring and tests. Returns a constant square field so the
/// pipeline stays exercised when no model is loaded.
pub struct StubEngine {
    side: usize,
    value: f32,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            side: 32,
            value: 0.5,
        }
    }

    pub fn with_value(side: usize, value: f32) -> Self {
        Self {
            side: side.max(1),
            value,
        }
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&self, _buffer: &RawBuffer, _meta: &FrameMetadata) -> Result<ScalarGrid> {
        ScalarGrid::new(
            self.side,
            self.side,
            vec![self.value; self.side * self.side],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PixelFormat, TorchPhase};

    #[test]
    fn stub_engine_returns_constant_field() {
        let engine = StubEngine::new();
        let buffer = RawBuffer::new(vec![0u8; 4], 2, 2, PixelFormat::Gray8).unwrap();
        let grid = engine
            .infer(&buffer, &FrameMetadata::new(0, TorchPhase::On))
            .unwrap();
        assert_eq!(grid.width(), 32);
        assert_eq!(grid.height(), 32);
        assert!(grid.values().iter().all(|&v| v == 0.5));
    }
}

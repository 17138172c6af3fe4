use anyhow::Result;

use crate::frame::{FrameMetadata, RawBuffer};
use crate::grid::ScalarGrid;

/// Inference engine trait.
///
/// Implementations receive the buffer by reference and must not retain it
/// past the call. Engines are shared across pipeline workers, so `infer`
/// takes `&self`; engines with mutable state lock internally.
pub trait InferenceEngine: Send + Sync {
    /// Engine identifier used for registry lookup.
    fn name(&self) -> &'static str;

    /// Produce a scalar field for one frame.
    fn infer(&self, buffer: &RawBuffer, meta: &FrameMetadata) -> Result<ScalarGrid>;

    /// Optional warm-up hook, run once before the first session.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

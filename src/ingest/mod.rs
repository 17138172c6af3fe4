//! Frame sources.
//!
//! A source runs on its own thread once started and pushes
//! `(FrameMetadata, RawBuffer)` pairs into the callback it was given. The
//! callback must return quickly; the session orchestrator only assigns an
//! index and enqueues the frame there.
//!
//! - Synthetic source (`stub://` URLs): timer-driven generated frames.
//!
//! Hardware capture backends live outside this crate and plug in through the
//! `FrameSource` trait.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::frame::{FrameMetadata, RawBuffer};

pub mod synthetic;

pub use synthetic::{SyntheticConfig, SyntheticFrameSource};

/// Callback invoked on the source thread for every captured frame.
pub type FrameCallback = Arc<dyn Fn(FrameMetadata, RawBuffer) + Send + Sync>;

pub trait FrameSource: Send + Sync {
    /// Begin delivering frames to `on_frame`. Returns once capture is running.
    fn start(&self, on_frame: FrameCallback) -> Result<()>;

    /// Stop capture. After this returns no new frames are delivered.
    fn stop(&self);

    /// Whether frames are currently being produced.
    fn is_streaming(&self) -> bool;
}

/// Build the source named by `config.url`.
pub fn source_for(config: SyntheticConfig) -> Result<Arc<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Arc::new(SyntheticFrameSource::new(config)?));
    }
    Err(anyhow!(
        "frame source '{}' requires a platform capture backend (only stub:// is built in)",
        config.url
    ))
}

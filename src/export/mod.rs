//! Export sinks.
//!
//! A sink owns every durable resource of a session, keyed by `SessionId`.
//! The orchestrator never sees a file handle: it only hands over the id and
//! immutable frame values.
//!
//! Contract shared by all sinks:
//! - `begin_session` is idempotent; a second call for a registered id is a no-op.
//! - `end_session` closes everything for the id; unknown ids are a no-op.
//! - `export_*` for an unknown or ended id is a silent no-op returning `Ok(())`.
//!   This is what makes frames still in flight after `stop()` harmless.
//! - Write failures are returned to the caller for reporting, never retried.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::{FrameMetadata, RawBuffer};
use crate::session::ProcessedFrame;
use crate::SessionId;

pub mod encoding;
pub mod file;
pub mod record;

pub use file::FileExportSink;
pub use record::{FrameRecord, MarkerRecord};

/// Independent export switches. Any subset may be enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingExportConfig {
    /// Append-only per-frame metadata stream (`frames.jsonl`).
    pub enable_jsonl: bool,
    /// `<kind>_<index>.bin` float grids.
    pub enable_bin_grids: bool,
    /// Raw capture bytes per frame (`raw_<index>.bin`).
    pub export_raw_stills: bool,
    /// 8-bit rendering of the scalar field (`processed_<index>.pgm`).
    pub export_processed_stills: bool,
}

impl TrainingExportConfig {
    /// Training default: export everything.
    pub fn training_defaults() -> Self {
        Self {
            enable_jsonl: true,
            enable_bin_grids: true,
            export_raw_stills: true,
            export_processed_stills: true,
        }
    }

    /// Applied when a session begins without a config: metadata stream only.
    pub fn clinical_default() -> Self {
        Self {
            enable_jsonl: true,
            enable_bin_grids: false,
            export_raw_stills: false,
            export_processed_stills: false,
        }
    }
}

/// Free-form annotation recorded during a training session.
#[derive(Clone, Debug, PartialEq)]
pub struct EventMarker {
    /// Index of the most recently accepted frame, if any.
    pub frame_index: Option<u64>,
    pub wall_clock_ms: u64,
    pub note: Option<String>,
}

pub trait ExportSink: Send + Sync {
    fn begin_session(&self, id: SessionId, config: Option<&TrainingExportConfig>) -> Result<()>;

    fn end_session(&self, id: SessionId);

    fn export_frame(&self, id: SessionId, frame: &ProcessedFrame) -> Result<()>;

    /// Raw capture export. Sinks without still support ignore it.
    fn export_still(&self, _id: SessionId, _meta: &FrameMetadata, _buffer: &RawBuffer) -> Result<()> {
        Ok(())
    }

    fn export_marker(&self, _id: SessionId, _marker: &EventMarker) -> Result<()> {
        Ok(())
    }
}

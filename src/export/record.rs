use serde::{Deserialize, Serialize};

use crate::export::EventMarker;
use crate::frame::TorchPhase;
use crate::qc::QcLevel;
use crate::session::ProcessedFrame;
use crate::SessionId;

/// One flat line of the per-session metadata stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub session_id: SessionId,
    pub index: u64,
    pub timestamp_ms: u64,
    pub torch_phase: TorchPhase,
    pub distance_mm: Option<f32>,
    pub tilt_deg: Option<f32>,
    pub qc_level: QcLevel,
    pub in_distance_window: bool,
    pub in_tilt_window: bool,
    pub not_saturated: bool,
    pub has_on_off_pair: bool,
    /// Primary statistic: mean of the scalar field.
    pub scalar_mean: Option<f32>,
    pub scalar_min: Option<f32>,
    pub scalar_max: Option<f32>,
    pub scalar_width: Option<usize>,
    pub scalar_height: Option<usize>,
    pub has_depth: bool,
    pub has_rgb: bool,
}

impl FrameRecord {
    pub fn from_frame(session_id: SessionId, frame: &ProcessedFrame) -> Self {
        let meta = &frame.meta;
        Self {
            session_id,
            index: meta.index,
            timestamp_ms: meta.timestamp_ms,
            torch_phase: meta.torch_phase,
            distance_mm: meta.distance_mm,
            tilt_deg: meta.tilt_deg,
            qc_level: frame.qc_level,
            in_distance_window: frame.qc.in_distance_window,
            in_tilt_window: frame.qc.in_tilt_window,
            not_saturated: frame.qc.not_saturated,
            has_on_off_pair: frame.qc.has_on_off_pair,
            scalar_mean: frame.stats.map(|s| s.mean),
            scalar_min: frame.stats.map(|s| s.min),
            scalar_max: frame.stats.map(|s| s.max),
            scalar_width: frame.scalar.as_ref().map(|g| g.width()),
            scalar_height: frame.scalar.as_ref().map(|g| g.height()),
            has_depth: frame.depth.is_some(),
            has_rgb: frame.rgb.is_some(),
        }
    }
}

/// One line of `markers.jsonl`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub session_id: SessionId,
    pub frame_index: Option<u64>,
    pub wall_clock_ms: u64,
    pub note: Option<String>,
}

impl MarkerRecord {
    pub fn from_marker(session_id: SessionId, marker: &EventMarker) -> Self {
        Self {
            session_id,
            frame_index: marker.frame_index,
            wall_clock_ms: marker.wall_clock_ms,
            note: marker.note.clone(),
        }
    }
}

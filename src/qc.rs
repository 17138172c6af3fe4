//! Frame quality control.
//!
//! `QcLevel::from_flags` is the one piece of QC that is core logic and it is
//! pure. Flag derivation (`QcPolicy`) depends on sensor geometry thresholds
//! and lives alongside it so the pipeline has one place to call.

use serde::{Deserialize, Serialize};

use crate::frame::{FrameMetadata, RawBuffer, TorchPhase};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcFlags {
    pub in_distance_window: bool,
    pub in_tilt_window: bool,
    pub not_saturated: bool,
    pub has_on_off_pair: bool,
}

impl QcFlags {
    pub fn all_ok() -> Self {
        Self {
            in_distance_window: true,
            in_tilt_window: true,
            not_saturated: true,
            has_on_off_pair: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcLevel {
    Good,
    Warning,
    Bad,
}

impl QcLevel {
    /// Geometry or exposure failures are `Bad`; a missing on/off pair alone is `Warning`.
    pub fn from_flags(flags: &QcFlags) -> Self {
        if !(flags.in_distance_window && flags.in_tilt_window && flags.not_saturated) {
            return QcLevel::Bad;
        }
        if flags.has_on_off_pair {
            QcLevel::Good
        } else {
            QcLevel::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QcLevel::Good => "good",
            QcLevel::Warning => "warning",
            QcLevel::Bad => "bad",
        }
    }
}

/// Thresholds used to derive `QcFlags` from a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct QcPolicy {
    pub distance_min_mm: f32,
    pub distance_max_mm: f32,
    pub max_tilt_deg: f32,
    pub max_saturated_fraction: f32,
}

impl Default for QcPolicy {
    fn default() -> Self {
        Self {
            distance_min_mm: 80.0,
            distance_max_mm: 250.0,
            max_tilt_deg: 15.0,
            max_saturated_fraction: 0.02,
        }
    }
}

impl QcPolicy {
    /// Missing distance/tilt measurements pass; only a measured value can fail.
    pub fn flags(
        &self,
        meta: &FrameMetadata,
        buffer: &RawBuffer,
        previous_phase: Option<TorchPhase>,
    ) -> QcFlags {
        let in_distance_window = meta
            .distance_mm
            .map(|d| d >= self.distance_min_mm && d <= self.distance_max_mm)
            .unwrap_or(true);
        let in_tilt_window = meta
            .tilt_deg
            .map(|t| t.abs() <= self.max_tilt_deg)
            .unwrap_or(true);
        let not_saturated = buffer.saturated_fraction() <= self.max_saturated_fraction;
        QcFlags {
            in_distance_window,
            in_tilt_window,
            not_saturated,
            has_on_off_pair: is_on_off_pair(meta.torch_phase, previous_phase),
        }
    }
}

/// True when `current` and `previous` form an alternating on/off pair.
pub fn is_on_off_pair(current: TorchPhase, previous: Option<TorchPhase>) -> bool {
    match (current.complement(), previous) {
        (Some(expected), Some(prev)) => expected == prev,
        _ => false,
    }
}

//! Live capture session orchestrator.
//!
//! This crate turns an asynchronous stream of camera frames into processed,
//! quality-classified measurements and routes them to a UI sink and a durable
//! export sink.
//!
//! # Architecture
//!
//! - `ingest`: Frame sources. They run on their own thread and push
//!   `(FrameMetadata, RawBuffer)` pairs into a callback.
//! - `session`: The orchestrator. Single authority for "is a session running",
//!   frame index assignment, and the per-frame pipeline
//!   (infer -> classify -> stats -> export -> publish).
//! - `infer`: Inference engines that map a raw buffer to a scalar field.
//! - `export`: Session-keyed export sinks that own all file handles.
//! - `qc` / `stats`: Pure helpers for quality classification and statistics.
//! - `startup`: Permission-dependent readiness gate.
//! - `storage`: Session history persistence.
//!
//! Failures never abort the process: they degrade one frame or one session and
//! are routed through a single `ErrorReporter`.

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod export;
pub mod frame;
pub mod grid;
pub mod infer;
pub mod ingest;
pub mod qc;
pub mod report;
pub mod session;
pub mod startup;
pub mod stats;
pub mod storage;
pub mod ui;

pub use export::{ExportSink, FileExportSink, TrainingExportConfig};
pub use frame::{FrameMetadata, PixelFormat, RawBuffer, TorchPhase};
pub use grid::{DepthGrid, RgbGrid, RgbPixel, ScalarGrid};
pub use infer::{EngineRegistry, InferenceEngine, LuminanceEngine, StubEngine};
pub use ingest::{FrameCallback, FrameSource, SyntheticConfig, SyntheticFrameSource};
pub use qc::{QcFlags, QcLevel, QcPolicy};
pub use report::{ChannelReporter, ErrorEvent, ErrorKind, ErrorReporter, LogReporter};
pub use session::{
    Collaborators, LiveSessionState, OrchestratorSettings, ProcessedFrame, SessionContext,
    SessionEventsSink, SessionOrchestrator, SessionStatus, TrainingOrchestrator,
};
pub use startup::{
    AuthorizationStatus, PermissionsGateway, StartupGate, StartupState, StaticPermissions,
};
pub use stats::{compute_stats, FrameStats};
pub use storage::{
    InMemorySessionHistoryStore, SessionHistory, SessionHistoryStore, SessionSummary,
    SqliteSessionHistoryStore,
};

// -------------------- Session Identity --------------------

/// Opaque session identifier: 16 random bytes, rendered as lowercase hex.
///
/// Generated once per session start and never reused. It is the only value
/// shared between the orchestrator, the export sink and the history store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse the hex form produced by `Display`.
    pub fn parse(value: &str) -> Result<Self> {
        static SESSION_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = SESSION_ID_RE
            .get_or_init(|| regex::Regex::new(r"^[0-9a-f]{32}$").expect("static regex"));
        if !re.is_match(value) {
            return Err(anyhow!(
                "session id must be 32 lowercase hex characters, got '{}'",
                value
            ));
        }
        let bytes = hex::decode(value)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl TryFrom<String> for SessionId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_string()
    }
}

// -------------------- Modes --------------------

/// How a session is being used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Clinician-facing observation with minimal export.
    #[default]
    Clinical,
    /// Data collection with a configurable, richer export.
    Training,
    /// Developer-only features visible.
    Developer,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Clinical => "clinical",
            SessionMode::Training => "training",
            SessionMode::Developer => "developer",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clinical" => Ok(SessionMode::Clinical),
            "training" => Ok(SessionMode::Training),
            "developer" => Ok(SessionMode::Developer),
            other => Err(anyhow!("unknown session mode '{}'", other)),
        }
    }
}

/// User-facing illumination mode for the frame source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    Off,
    On,
    #[default]
    Alternating,
}

impl FlashMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FlashMode::Off),
            "on" => Ok(FlashMode::On),
            "alternating" => Ok(FlashMode::Alternating),
            other => Err(anyhow!("unknown flash mode '{}'", other)),
        }
    }
}

pub(crate) fn now_ms() -> Result<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    u64::try_from(elapsed.as_millis()).map_err(|_| anyhow!("wall clock exceeds u64 millis"))
}

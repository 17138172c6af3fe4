//! Training sessions layered on the session orchestrator.
//!
//! Session identity lives only in `SessionOrchestrator`. This type adds the
//! training export config on start and timestamped event markers while the
//! running session is a training session.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::{SessionContext, SessionOrchestrator};
use crate::export::{EventMarker, TrainingExportConfig};
use crate::{now_ms, SessionId, SessionMode};

pub struct TrainingOrchestrator {
    session: Arc<SessionOrchestrator>,
    default_config: TrainingExportConfig,
    // Serializes start/stop/mark so a marker never lands between stop and a restart.
    gate: Mutex<()>,
}

impl TrainingOrchestrator {
    pub fn new(session: Arc<SessionOrchestrator>) -> Self {
        Self::with_config(session, TrainingExportConfig::training_defaults())
    }

    pub fn with_config(session: Arc<SessionOrchestrator>, default_config: TrainingExportConfig) -> Self {
        Self {
            session,
            default_config,
            gate: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<SessionOrchestrator> {
        &self.session
    }

    /// Id of the running training session.
    pub fn current_training_session(&self) -> Option<SessionId> {
        self.training_context().map(|ctx| ctx.id)
    }

    pub fn is_training_active(&self) -> bool {
        self.training_context().is_some()
    }

    /// Start a training session with the default export config.
    pub fn start_training_session(&self) -> Result<()> {
        self.start_training_session_with(self.default_config)
    }

    /// Start a training session. A no-op while one is already running.
    ///
    /// Fails when a session of another mode is running, or when the frame
    /// source cannot start.
    pub fn start_training_session_with(&self, config: TrainingExportConfig) -> Result<()> {
        let _gate = self.lock_gate();
        if let Some(ctx) = self.session.current_session() {
            if ctx.mode == SessionMode::Training {
                log::debug!("training session {} already running", ctx.id);
                return Ok(());
            }
            return Err(anyhow!(
                "cannot start training: {} session {} is running",
                ctx.mode.as_str(),
                ctx.id
            ));
        }
        self.session
            .start_with_config(SessionMode::Training, Some(config))
    }

    /// Stop the running training session. Sessions of other modes are left alone.
    pub fn stop_training_session(&self) {
        let _gate = self.lock_gate();
        if self.training_context().is_some() {
            self.session.stop();
        }
    }

    /// Record an event marker against the running training session.
    ///
    /// Returns `Ok(false)` when no training session is running.
    pub fn mark_event(&self, note: Option<&str>) -> Result<bool> {
        let _gate = self.lock_gate();
        let Some(ctx) = self.training_context() else {
            return Ok(false);
        };
        let marker = EventMarker {
            frame_index: self.session.last_frame_index(),
            wall_clock_ms: now_ms()?,
            note: note.map(str::to_string),
        };
        self.session.export_sink().export_marker(ctx.id, &marker)?;
        log::info!(
            "training session {}: marker at frame {:?}",
            ctx.id,
            marker.frame_index
        );
        Ok(true)
    }

    fn training_context(&self) -> Option<SessionContext> {
        self.session
            .current_session()
            .filter(|ctx| ctx.mode == SessionMode::Training)
    }

    fn lock_gate(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.gate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

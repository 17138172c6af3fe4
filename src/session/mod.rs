//! Live session orchestration.
//!
//! `SessionOrchestrator` is the single authority for whether a session is
//! running. It owns the session id and the frame counter, and drives each
//! accepted frame through infer -> classify -> stats -> export -> publish.
//!
//! Concurrency model:
//! - `start`/`stop` are serialized by a lifecycle lock and block until the
//!   frame source and export sink have acknowledged.
//! - Frame bookkeeping (running flag, session id, counter, last torch phase)
//!   sits behind a state lock shared with the source thread. Index assignment
//!   and the bounded-queue enqueue happen together under that lock, so indices
//!   are gap-free and follow acceptance order.
//! - Pipeline workers process queued frames concurrently. Frames still in
//!   flight when `stop` runs may reach the export sink after the session was
//!   ended; the sink ignores them.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};

use crate::export::{ExportSink, TrainingExportConfig};
use crate::frame::{FrameMetadata, RawBuffer, TorchPhase};
use crate::grid::{DepthGrid, RgbGrid, ScalarGrid};
use crate::infer::InferenceEngine;
use crate::ingest::{FrameCallback, FrameSource};
use crate::qc::{QcFlags, QcLevel, QcPolicy};
use crate::report::{ErrorEvent, ErrorKind, ErrorReporter, LogReporter};
use crate::stats::FrameStats;
use crate::storage::{SessionHistoryStore, SessionSummary};
use crate::{now_ms, SessionId, SessionMode};

mod pipeline;
pub mod training;

pub use training::TrainingOrchestrator;

use pipeline::FrameJob;

// ----------------------------------------------------------------------------
// Frame and state values
// ----------------------------------------------------------------------------

/// Per-frame result handed to both the export sink and the UI sink.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedFrame {
    pub meta: FrameMetadata,
    pub qc: QcFlags,
    pub qc_level: QcLevel,
    /// Absent when inference failed or timed out.
    pub scalar: Option<ScalarGrid>,
    pub depth: Option<DepthGrid>,
    pub rgb: Option<RgbGrid>,
    pub stats: Option<FrameStats>,
}

/// Snapshot published to the UI sink once per processed frame.
#[derive(Clone, Debug)]
pub struct LiveSessionState {
    pub session_id: SessionId,
    /// Frames accepted so far in this session.
    pub frame_count: u64,
    pub last_frame: Arc<ProcessedFrame>,
}

/// Receives live session updates. Called from pipeline worker threads; must
/// return quickly.
pub trait SessionEventsSink: Send + Sync {
    fn session_did_update(&self, state: LiveSessionState);
}

/// Immutable description of the running session, shared with queued frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    pub id: SessionId,
    pub mode: SessionMode,
    pub config: Option<TrainingExportConfig>,
    pub started_at_ms: u64,
}

impl SessionContext {
    fn exports_grids(&self) -> bool {
        self.config.is_some_and(|c| c.enable_bin_grids)
    }
}

/// Externally observable orchestrator state.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    pub running: bool,
    pub session_id: Option<SessionId>,
    pub mode: Option<SessionMode>,
    pub frame_counter: u64,
}

// ----------------------------------------------------------------------------
// Settings and collaborators
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    /// Capacity of the queue between the source callback and the workers.
    pub queue_capacity: usize,
    pub workers: usize,
    pub inference_timeout: Duration,
    pub qc: QcPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            workers: 2,
            inference_timeout: Duration::from_secs(2),
            qc: QcPolicy::default(),
        }
    }
}

/// External capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn FrameSource>,
    pub engine: Arc<dyn InferenceEngine>,
    pub export: Arc<dyn ExportSink>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub history: Option<Arc<dyn SessionHistoryStore>>,
}

impl Collaborators {
    pub fn new(
        source: Arc<dyn FrameSource>,
        engine: Arc<dyn InferenceEngine>,
        export: Arc<dyn ExportSink>,
    ) -> Self {
        Self {
            source,
            engine,
            export,
            reporter: Arc::new(LogReporter),
            history: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn SessionHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }
}

// ----------------------------------------------------------------------------
// Shared state
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SessionState {
    running: bool,
    session: Option<Arc<SessionContext>>,
    frame_counter: u64,
    last_phase: Option<TorchPhase>,
    queue: Option<Sender<FrameJob>>,
}

pub(crate) struct Shared {
    collaborators: Collaborators,
    settings: OrchestratorSettings,
    state: Mutex<SessionState>,
    sink: RwLock<Option<Weak<dyn SessionEventsSink>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent across a panicking holder: every field is
        // written in one step under the lock.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn report(&self, kind: ErrorKind, session_id: Option<SessionId>, message: impl Into<String>) {
        self.collaborators
            .reporter
            .report(ErrorEvent::new(kind, session_id, message));
    }

    /// Frame counter of `id` while it is the running session.
    pub(crate) fn frame_count_if_current(&self, id: SessionId) -> Option<u64> {
        let state = self.lock_state();
        match state.session.as_ref() {
            Some(ctx) if state.running && ctx.id == id => Some(state.frame_counter),
            _ => None,
        }
    }

    /// Assign the next index and enqueue. Runs on the frame source thread.
    fn accept_frame(&self, meta: FrameMetadata, buffer: RawBuffer) {
        let mut state = self.lock_state();
        if !state.running {
            return;
        }
        let (Some(ctx), Some(queue)) = (state.session.clone(), state.queue.clone()) else {
            return;
        };

        let index = state.frame_counter;
        let meta = meta.with_index(index);
        let job = FrameJob {
            session: ctx.clone(),
            meta,
            previous_phase: state.last_phase,
            buffer: Arc::new(buffer),
        };
        match queue.try_send(job) {
            Ok(()) => {
                state.frame_counter += 1;
                state.last_phase = Some(meta.torch_phase);
            }
            Err(TrySendError::Full(_)) => {
                drop(state);
                self.report(
                    ErrorKind::FrameDropped,
                    Some(ctx.id),
                    format!(
                        "pipeline queue full; dropped frame captured at {} ms",
                        meta.timestamp_ms
                    ),
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("session {}: pipeline queue closed, frame ignored", ctx.id);
            }
        }
    }

    pub(crate) fn publish(&self, state: LiveSessionState) {
        let sink = match self.sink.read() {
            Ok(guard) => guard.as_ref().and_then(Weak::upgrade),
            Err(_) => None,
        };
        if let Some(sink) = sink {
            sink.session_did_update(state);
        }
    }
}

fn frame_callback(shared: Weak<Shared>) -> FrameCallback {
    Arc::new(move |meta: FrameMetadata, buffer: RawBuffer| {
        if let Some(shared) = shared.upgrade() {
            shared.accept_frame(meta, buffer);
        }
    })
}

// ----------------------------------------------------------------------------
// Orchestrator
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Lifecycle {
    workers: Vec<JoinHandle<()>>,
}

pub struct SessionOrchestrator {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionOrchestrator {
    pub fn new(collaborators: Collaborators, settings: OrchestratorSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                collaborators,
                settings,
                state: Mutex::new(SessionState::default()),
                sink: RwLock::new(None),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Attach or replace the UI sink. Only a weak reference is kept; the
    /// caller owns the sink's lifetime.
    pub fn set_sink(&self, sink: Option<&Arc<dyn SessionEventsSink>>) {
        let weak = sink.map(Arc::downgrade);
        match self.shared.sink.write() {
            Ok(mut guard) => *guard = weak,
            Err(poisoned) => *poisoned.into_inner() = weak,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.shared.lock_state();
        SessionStatus {
            running: state.running,
            session_id: state.session.as_ref().map(|ctx| ctx.id),
            mode: state.session.as_ref().map(|ctx| ctx.mode),
            frame_counter: state.frame_counter,
        }
    }

    /// The running session, if any.
    pub fn current_session(&self) -> Option<SessionContext> {
        let state = self.shared.lock_state();
        if !state.running {
            return None;
        }
        state.session.as_deref().cloned()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Index of the most recently accepted frame of the running session.
    pub fn last_frame_index(&self) -> Option<u64> {
        let state = self.shared.lock_state();
        if !state.running {
            return None;
        }
        state.frame_counter.checked_sub(1)
    }

    pub(crate) fn export_sink(&self) -> &Arc<dyn ExportSink> {
        &self.shared.collaborators.export
    }

    /// Start a session. Training mode uses the full training export config.
    pub fn start(&self, mode: SessionMode) -> Result<()> {
        let config = match mode {
            SessionMode::Training => Some(TrainingExportConfig::training_defaults()),
            SessionMode::Clinical | SessionMode::Developer => None,
        };
        self.start_with_config(mode, config)
    }

    /// Start a session with an explicit export config. A no-op while running.
    ///
    /// Returns `Err` only when the frame source fails to start, in which case
    /// the orchestrator is back in exactly the state it was in before.
    pub fn start_with_config(
        &self,
        mode: SessionMode,
        config: Option<TrainingExportConfig>,
    ) -> Result<()> {
        let mut lifecycle = self.lock_lifecycle();
        if self.shared.lock_state().running {
            log::debug!("start ignored: a session is already running");
            return Ok(());
        }

        let ctx = Arc::new(SessionContext {
            id: SessionId::generate(),
            mode,
            config,
            started_at_ms: now_ms()?,
        });
        let id = ctx.id;
        let (tx, rx) = bounded::<FrameJob>(self.shared.settings.queue_capacity.max(1));

        {
            let mut state = self.shared.lock_state();
            state.running = true;
            state.session = Some(ctx.clone());
            state.frame_counter = 0;
            state.last_phase = None;
            state.queue = Some(tx);
        }

        let workers = match pipeline::spawn_workers(&self.shared, rx) {
            Ok(workers) => workers,
            Err(err) => {
                self.rollback();
                return Err(err);
            }
        };

        let export = &self.shared.collaborators.export;
        if let Err(err) = export.begin_session(id, ctx.config.as_ref()) {
            self.shared.report(
                ErrorKind::BeginSession,
                Some(id),
                format!("continuing without durable export: {:#}", err),
            );
        }

        let callback = frame_callback(Arc::downgrade(&self.shared));
        if let Err(err) = self.shared.collaborators.source.start(callback) {
            self.rollback();
            export.end_session(id);
            join_workers(workers);
            self.shared.report(
                ErrorKind::SourceStart,
                Some(id),
                format!("{:#}", err),
            );
            return Err(anyhow!("frame source failed to start: {:#}", err));
        }

        if let Some(history) = &self.shared.collaborators.history {
            let summary = SessionSummary {
                id,
                started_at_ms: ctx.started_at_ms,
                mode,
                frame_count: 0,
            };
            if let Err(err) = history.record_started(&summary) {
                self.shared
                    .report(ErrorKind::History, Some(id), format!("{:#}", err));
            }
        }

        lifecycle.workers = workers;
        log::info!("session {} started (mode={})", id, mode.as_str());
        Ok(())
    }

    /// Stop the running session. A no-op while idle.
    ///
    /// Capture is stopped before export resources are closed. Returns once no
    /// new frames can be produced; frames already in flight may still reach
    /// the export sink, which ignores them.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        let ctx = {
            let mut state = self.shared.lock_state();
            if !state.running {
                return;
            }
            state.running = false;
            state.session.clone()
        };

        self.shared.collaborators.source.stop();
        if let Some(ctx) = ctx.as_ref() {
            self.shared.collaborators.export.end_session(ctx.id);
        }

        let frame_count = {
            let mut state = self.shared.lock_state();
            let count = state.frame_counter;
            state.session = None;
            state.frame_counter = 0;
            state.last_phase = None;
            state.queue = None;
            count
        };
        // A sink may call `stop` from a worker while this thread is stopping;
        // that worker must be able to take the lifecycle lock before we join it.
        let workers = std::mem::take(&mut lifecycle.workers);
        drop(lifecycle);
        join_workers(workers);

        let Some(ctx) = ctx else {
            return;
        };
        if let Some(history) = &self.shared.collaborators.history {
            if let Err(err) = history.record_ended(ctx.id, frame_count) {
                self.shared
                    .report(ErrorKind::History, Some(ctx.id), format!("{:#}", err));
            }
        }
        log::info!("session {} stopped after {} frames", ctx.id, frame_count);
    }

    fn rollback(&self) {
        let mut state = self.shared.lock_state();
        *state = SessionState::default();
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for worker in workers {
        // A sink that stops the session from inside `session_did_update` runs on a worker.
        if worker.thread().id() == current {
            continue;
        }
        if worker.join().is_err() {
            log::error!("pipeline worker panicked");
        }
    }
}

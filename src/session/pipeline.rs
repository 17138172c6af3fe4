//! Pipeline workers: infer -> classify -> stats -> export -> publish.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;

use super::{LiveSessionState, ProcessedFrame, SessionContext, Shared};
use crate::frame::{FrameMetadata, RawBuffer, TorchPhase};
use crate::infer::{InferenceLane, InferenceOutcome};
use crate::qc::QcLevel;
use crate::report::ErrorKind;
use crate::stats::compute_stats;

/// A frame accepted by the orchestrator, with its index already assigned.
pub(crate) struct FrameJob {
    pub session: Arc<SessionContext>,
    pub meta: FrameMetadata,
    /// Torch phase of the previously accepted frame in the same session.
    pub previous_phase: Option<TorchPhase>,
    pub buffer: Arc<RawBuffer>,
}

pub(crate) fn spawn_workers(
    shared: &Arc<Shared>,
    rx: Receiver<FrameJob>,
) -> Result<Vec<JoinHandle<()>>> {
    let count = shared.settings.workers.max(1);
    let mut workers = Vec::with_capacity(count);
    for n in 0..count {
        let shared = shared.clone();
        let rx = rx.clone();
        let spawned = thread::Builder::new()
            .name(format!("pipeline-{}", n))
            .spawn(move || worker_loop(n, shared, rx));
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(err) => {
                // Workers already running exit once the queue sender is dropped.
                return Err(anyhow!("failed to spawn pipeline worker {}: {}", n, err));
            }
        }
    }
    Ok(workers)
}

fn worker_loop(n: usize, shared: Arc<Shared>, rx: Receiver<FrameJob>) {
    let mut lane = InferenceLane::new(
        shared.collaborators.engine.clone(),
        shared.settings.inference_timeout,
        &format!("pipeline-{}", n),
    );
    for job in rx.iter() {
        if shared.frame_count_if_current(job.session.id).is_none() {
            log::debug!(
                "session {}: discarding queued frame {} after stop",
                job.session.id,
                job.meta.index
            );
            continue;
        }
        process_frame(&shared, &mut lane, job);
    }
    log::debug!("pipeline-{} exiting", n);
}

fn process_frame(shared: &Shared, lane: &mut InferenceLane, job: FrameJob) {
    let FrameJob {
        session,
        meta,
        previous_phase,
        buffer,
    } = job;
    let id = session.id;

    let scalar = match lane.run(buffer.clone(), meta) {
        InferenceOutcome::Grid(grid) => Some(grid),
        InferenceOutcome::Failed(err) => {
            shared.report(
                ErrorKind::Inference,
                Some(id),
                format!("frame {}: {:#}", meta.index, err),
            );
            None
        }
        InferenceOutcome::TimedOut(after) => {
            shared.report(
                ErrorKind::InferenceTimeout,
                Some(id),
                format!("frame {}: no result after {:?}", meta.index, after),
            );
            None
        }
    };

    let qc = shared.settings.qc.flags(&meta, &buffer, previous_phase);
    let frame = Arc::new(ProcessedFrame {
        meta,
        qc,
        qc_level: QcLevel::from_flags(&qc),
        stats: scalar.as_ref().map(|grid| compute_stats(grid.values())),
        scalar,
        depth: buffer.depth().cloned(),
        rgb: if session.exports_grids() {
            buffer.rgb_grid()
        } else {
            None
        },
    });

    let export = &shared.collaborators.export;
    if let Err(err) = export.export_still(id, &meta, &buffer) {
        shared.report(
            ErrorKind::Export,
            Some(id),
            format!("frame {} still: {:#}", meta.index, err),
        );
    }
    // Raw bytes are zeroized on drop; release them before publishing.
    drop(buffer);
    if let Err(err) = export.export_frame(id, &frame) {
        shared.report(
            ErrorKind::Export,
            Some(id),
            format!("frame {}: {:#}", meta.index, err),
        );
    }

    let Some(frame_count) = shared.frame_count_if_current(id) else {
        return;
    };
    shared.publish(LiveSessionState {
        session_id: id,
        frame_count,
        last_frame: frame,
    });
}

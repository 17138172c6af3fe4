//! Bounded-time inference.
//!
//! A lane owns one helper thread that runs the engine. The caller waits at
//! most `timeout` for a result. On timeout the helper is abandoned (it exits
//! once its current call returns) and a fresh one is spawned for the next
//! frame, so a single stuck inference cannot stall later frames.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::backend::InferenceEngine;
use crate::frame::{FrameMetadata, RawBuffer};
use crate::grid::ScalarGrid;

pub enum InferenceOutcome {
    Grid(ScalarGrid),
    Failed(anyhow::Error),
    TimedOut(Duration),
}

struct LaneRequest {
    buffer: Arc<RawBuffer>,
    meta: FrameMetadata,
}

struct LaneWorker {
    tx: Sender<LaneRequest>,
    rx: Receiver<Result<ScalarGrid>>,
}

pub struct InferenceLane {
    engine: Arc<dyn InferenceEngine>,
    timeout: Duration,
    label: String,
    worker: Option<LaneWorker>,
    generation: u64,
}

impl InferenceLane {
    pub fn new(engine: Arc<dyn InferenceEngine>, timeout: Duration, label: &str) -> Self {
        Self {
            engine,
            timeout,
            label: label.to_string(),
            worker: None,
            generation: 0,
        }
    }

    pub fn run(&mut self, buffer: Arc<RawBuffer>, meta: FrameMetadata) -> InferenceOutcome {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => match self.spawn_worker() {
                Ok(worker) => worker,
                Err(err) => return InferenceOutcome::Failed(err),
            },
        };

        if worker.tx.send(LaneRequest { buffer, meta }).is_err() {
            return InferenceOutcome::Failed(anyhow!(
                "inference lane {} closed unexpectedly",
                self.label
            ));
        }

        match worker.rx.recv_timeout(self.timeout) {
            Ok(Ok(grid)) => {
                self.worker = Some(worker);
                InferenceOutcome::Grid(grid)
            }
            Ok(Err(err)) => {
                self.worker = Some(worker);
                InferenceOutcome::Failed(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "inference lane {} exceeded {:?} on frame {}; abandoning helper",
                    self.label,
                    self.timeout,
                    meta.index
                );
                InferenceOutcome::TimedOut(self.timeout)
            }
            Err(RecvTimeoutError::Disconnected) => InferenceOutcome::Failed(anyhow!(
                "inference engine {} panicked",
                self.engine.name()
            )),
        }
    }

    fn spawn_worker(&mut self) -> Result<LaneWorker> {
        let (req_tx, req_rx) = bounded::<LaneRequest>(1);
        let (res_tx, res_rx) = bounded::<Result<ScalarGrid>>(1);
        let engine = self.engine.clone();
        self.generation += 1;
        thread::Builder::new()
            .name(format!("{}-infer-{}", self.label, self.generation))
            .spawn(move || {
                for request in req_rx.iter() {
                    let result = engine.infer(&request.buffer, &request.meta);
                    if res_tx.send(result).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn inference helper: {}", e))?;
        Ok(LaneWorker {
            tx: req_tx,
            rx: res_rx,
        })
    }
}

//! Filesystem export sink.
//!
//! Layout under the configured root:
//!
//! ```text
//! session_<started_ms>_<session_id>/
//!   frames.jsonl            one FrameRecord per line (append-only)
//!   markers.jsonl           training markers (created on first marker)
//!   scalar_<index>.bin      f32 LE, row-major
//!   depth_<index>.bin       f32 LE, row-major
//!   rgb_<index>.bin         f32 LE, row-major, r/g/b interleaved
//!   raw_<index>.bin         raw capture bytes
//!   processed_<index>.pgm   8-bit rendering of the scalar field
//! ```
//!
//! Per-frame files are created with `create_new`; an existing file is an
//! error, never overwritten. Partial files are left in place on failure.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use super::encoding::{encode_depth, encode_pgm, encode_rgb, encode_scalar, GridKind};
use super::record::{FrameRecord, MarkerRecord};
use super::{EventMarker, ExportSink, TrainingExportConfig};
use crate::frame::{FrameMetadata, RawBuffer};
use crate::session::ProcessedFrame;
use crate::{now_ms, SessionId};

pub const FRAMES_FILE: &str = "frames.jsonl";
pub const MARKERS_FILE: &str = "markers.jsonl";

struct SessionRecord {
    folder: PathBuf,
    config: TrainingExportConfig,
    frames: Option<LineWriter<File>>,
    markers: Option<LineWriter<File>>,
}

pub struct FileExportSink {
    root: PathBuf,
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl FileExportSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating export root {}", root.display()))?;
        Ok(Self {
            root,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a registered session.
    pub fn session_dir(&self, id: SessionId) -> Option<PathBuf> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(&id).map(|rec| rec.folder.clone())
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(&id))
            .unwrap_or(false)
    }

    fn lock_sessions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, SessionRecord>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("export session table lock poisoned"))
    }
}

impl ExportSink for FileExportSink {
    fn begin_session(&self, id: SessionId, config: Option<&TrainingExportConfig>) -> Result<()> {
        let mut sessions = self.lock_sessions()?;
        if sessions.contains_key(&id) {
            log::debug!("export session {} already registered", id);
            return Ok(());
        }

        let config = config
            .copied()
            .unwrap_or_else(TrainingExportConfig::clinical_default);
        let folder = self.root.join(format!("session_{}_{}", now_ms()?, id));
        fs::create_dir_all(&folder)
            .with_context(|| format!("creating session directory {}", folder.display()))?;

        let frames = if config.enable_jsonl {
            Some(open_append(&folder.join(FRAMES_FILE))?)
        } else {
            None
        };

        log::info!(
            "export session {} opened at {} (jsonl={}, grids={}, raw={}, processed={})",
            id,
            folder.display(),
            config.enable_jsonl,
            config.enable_bin_grids,
            config.export_raw_stills,
            config.export_processed_stills
        );
        sessions.insert(
            id,
            SessionRecord {
                folder,
                config,
                frames,
                markers: None,
            },
        );
        Ok(())
    }

    fn end_session(&self, id: SessionId) {
        let record = match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        let Some(mut record) = record else {
            return;
        };
        for writer in [record.frames.as_mut(), record.markers.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Err(err) = writer.flush() {
                log::warn!("export session {}: flush on close failed: {}", id, err);
            }
        }
        log::info!("export session {} closed", id);
    }

    fn export_frame(&self, id: SessionId, frame: &ProcessedFrame) -> Result<()> {
        let mut sessions = self.lock_sessions()?;
        let Some(record) = sessions.get_mut(&id) else {
            log::debug!(
                "export frame {} for unregistered session {} ignored",
                frame.meta.index,
                id
            );
            return Ok(());
        };

        let index = frame.meta.index;
        let mut failures = Vec::new();

        if let Some(writer) = record.frames.as_mut() {
            let line = FrameRecord::from_frame(id, frame);
            if let Err(err) = append_json_line(writer, &line) {
                failures.push(format!("{}: {}", FRAMES_FILE, err));
            }
        }

        if record.config.enable_bin_grids {
            let grids = [
                (GridKind::Scalar, frame.scalar.as_ref().map(encode_scalar)),
                (GridKind::Depth, frame.depth.as_ref().map(encode_depth)),
                (GridKind::Rgb, frame.rgb.as_ref().map(encode_rgb)),
            ];
            for (kind, bytes) in grids {
                let Some(bytes) = bytes else { continue };
                let name = kind.file_name(index);
                if let Err(err) = write_new_file(&record.folder.join(&name), &bytes) {
                    failures.push(format!("{}: {}", name, err));
                }
            }
        }

        if record.config.export_processed_stills {
            if let Some(scalar) = frame.scalar.as_ref() {
                let name = format!("processed_{}.pgm", index);
                if let Err(err) = write_new_file(&record.folder.join(&name), &encode_pgm(scalar)) {
                    failures.push(format!("{}: {}", name, err));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "frame {}: {} export write(s) failed: {}",
                index,
                failures.len(),
                failures.join("; ")
            ))
        }
    }

    fn export_still(&self, id: SessionId, meta: &FrameMetadata, buffer: &RawBuffer) -> Result<()> {
        let sessions = self.lock_sessions()?;
        let Some(record) = sessions.get(&id) else {
            return Ok(());
        };
        if !record.config.export_raw_stills {
            return Ok(());
        }
        let name = format!("raw_{}.bin", meta.index);
        write_new_file(&record.folder.join(&name), buffer.data())
            .with_context(|| format!("writing {}", name))
    }

    fn export_marker(&self, id: SessionId, marker: &EventMarker) -> Result<()> {
        let mut sessions = self.lock_sessions()?;
        let Some(record) = sessions.get_mut(&id) else {
            return Ok(());
        };
        if record.markers.is_none() {
            record.markers = Some(open_append(&record.folder.join(MARKERS_FILE))?);
        }
        if let Some(writer) = record.markers.as_mut() {
            append_json_line(writer, &MarkerRecord::from_marker(id, marker))
                .with_context(|| format!("appending to {}", MARKERS_FILE))?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<LineWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok(LineWriter::new(file))
}

fn append_json_line<T: Serialize>(writer: &mut LineWriter<File>, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    Ok(())
}

fn write_new_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

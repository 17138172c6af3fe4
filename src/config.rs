use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::export::TrainingExportConfig;
use crate::ingest::SyntheticConfig;
use crate::qc::QcPolicy;
use crate::session::OrchestratorSettings;
use crate::FlashMode;

const DEFAULT_EXPORT_ROOT: &str = "sessions";
const DEFAULT_HISTORY_DB_PATH: &str = "chroma_history.db";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 64;
const DEFAULT_SOURCE_HEIGHT: u32 = 48;
const DEFAULT_QUEUE_CAPACITY: usize = 8;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_BACKEND: &str = "stub";

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    export_root: Option<PathBuf>,
    history_db_path: Option<String>,
    source: Option<SourceConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    qc: Option<QcConfigFile>,
    training: Option<TrainingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    flash_mode: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    queue_capacity: Option<usize>,
    workers: Option<usize>,
    inference_timeout_ms: Option<u64>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct QcConfigFile {
    distance_min_mm: Option<f32>,
    distance_max_mm: Option<f32>,
    max_tilt_deg: Option<f32>,
    max_saturated_fraction: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrainingConfigFile {
    enable_jsonl: Option<bool>,
    enable_bin_grids: Option<bool>,
    export_raw_stills: Option<bool>,
    export_processed_stills: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub export_root: PathBuf,
    pub history_db_path: String,
    pub source: SourceSettings,
    pub pipeline: PipelineSettings,
    pub qc: QcPolicy,
    pub training: TrainingExportConfig,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub flash_mode: FlashMode,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub inference_timeout: Duration,
    /// Inference engine name, looked up in the engine registry.
    pub backend: String,
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CHROMA_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SessionConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let flash_mode = match source.flash_mode.as_deref() {
            Some(mode) => FlashMode::parse(mode)?,
            None => FlashMode::default(),
        };
        let pipeline = file.pipeline.unwrap_or_default();
        let qc = file.qc.unwrap_or_default();
        let qc_defaults = QcPolicy::default();
        let training = file.training.unwrap_or_default();
        let training_defaults = TrainingExportConfig::training_defaults();

        Ok(Self {
            export_root: file
                .export_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_ROOT)),
            history_db_path: file
                .history_db_path
                .unwrap_or_else(|| DEFAULT_HISTORY_DB_PATH.to_string()),
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                flash_mode,
            },
            pipeline: PipelineSettings {
                queue_capacity: pipeline.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
                workers: pipeline.workers.unwrap_or(DEFAULT_WORKERS),
                inference_timeout: Duration::from_millis(
                    pipeline
                        .inference_timeout_ms
                        .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_MS),
                ),
                backend: pipeline
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            },
            qc: QcPolicy {
                distance_min_mm: qc.distance_min_mm.unwrap_or(qc_defaults.distance_min_mm),
                distance_max_mm: qc.distance_max_mm.unwrap_or(qc_defaults.distance_max_mm),
                max_tilt_deg: qc.max_tilt_deg.unwrap_or(qc_defaults.max_tilt_deg),
                max_saturated_fraction: qc
                    .max_saturated_fraction
                    .unwrap_or(qc_defaults.max_saturated_fraction),
            },
            training: TrainingExportConfig {
                enable_jsonl: training
                    .enable_jsonl
                    .unwrap_or(training_defaults.enable_jsonl),
                enable_bin_grids: training
                    .enable_bin_grids
                    .unwrap_or(training_defaults.enable_bin_grids),
                export_raw_stills: training
                    .export_raw_stills
                    .unwrap_or(training_defaults.export_raw_stills),
                export_processed_stills: training
                    .export_processed_stills
                    .unwrap_or(training_defaults.export_processed_stills),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("CHROMA_EXPORT_ROOT") {
            if !root.trim().is_empty() {
                self.export_root = PathBuf::from(root);
            }
        }
        if let Ok(path) = std::env::var("CHROMA_HISTORY_DB") {
            if !path.trim().is_empty() {
                self.history_db_path = path;
            }
        }
        if let Ok(url) = std::env::var("CHROMA_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(mode) = std::env::var("CHROMA_FLASH_MODE") {
            if !mode.trim().is_empty() {
                self.source.flash_mode = FlashMode::parse(&mode)?;
            }
        }
        if let Ok(backend) = std::env::var("CHROMA_INFERENCE_BACKEND") {
            if !backend.trim().is_empty() {
                self.pipeline.backend = backend.trim().to_string();
            }
        }
        if let Ok(timeout) = std::env::var("CHROMA_INFERENCE_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("CHROMA_INFERENCE_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.pipeline.inference_timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("source.target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        if self.pipeline.workers == 0 {
            return Err(anyhow!("pipeline.workers must be greater than zero"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(anyhow!("pipeline.queue_capacity must be greater than zero"));
        }
        if self.pipeline.inference_timeout.is_zero() {
            return Err(anyhow!("pipeline.inference_timeout_ms must be greater than zero"));
        }
        if self.qc.distance_min_mm > self.qc.distance_max_mm {
            return Err(anyhow!(
                "qc distance window is inverted ({} > {})",
                self.qc.distance_min_mm,
                self.qc.distance_max_mm
            ));
        }
        if !(0.0..=1.0).contains(&self.qc.max_saturated_fraction) {
            return Err(anyhow!("qc.max_saturated_fraction must be within [0, 1]"));
        }
        self.source.url = self.source.url.trim().to_string();
        self.pipeline.backend = self.pipeline.backend.to_lowercase();
        Ok(())
    }

    pub fn source_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            url: self.source.url.clone(),
            target_fps: self.source.target_fps,
            width: self.source.width,
            height: self.source.height,
            flash_mode: self.source.flash_mode,
            frame_limit: None,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            queue_capacity: self.pipeline.queue_capacity,
            workers: self.pipeline.workers,
            inference_timeout: self.pipeline.inference_timeout,
            qc: self.qc.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<SessionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

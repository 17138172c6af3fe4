//! Synthetic frame source (`stub://` URLs).
//!
//! Generates RGB frames on a timer thread at the configured rate. Frames
//! follow the configured flash mode, so alternating mode yields on/off pairs
//! and the off half is rendered darker. Distance and tilt drift slowly
//! around values inside the default QC windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use super::{FrameCallback, FrameSource};
use crate::frame::{FrameMetadata, PixelFormat, RawBuffer, TorchPhase};
use crate::FlashMode;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://camera").
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub flash_mode: FlashMode,
    /// Stop producing after this many frames. `None` streams until stopped.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
            flash_mode: FlashMode::Alternating,
            frame_limit: None,
        }
    }
}

struct Streaming {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

pub struct SyntheticFrameSource {
    config: SyntheticConfig,
    streaming: Mutex<Option<Streaming>>,
}

impl SyntheticFrameSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.target_fps == 0 {
            return Err(anyhow!("synthetic source target_fps must be >= 1"));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source dimensions must be positive"));
        }
        Ok(Self {
            config,
            streaming: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl FrameSource for SyntheticFrameSource {
    fn start(&self, on_frame: FrameCallback) -> Result<()> {
        let mut streaming = self
            .streaming
            .lock()
            .map_err(|_| anyhow!("synthetic source lock poisoned"))?;
        if let Some(active) = streaming.as_ref() {
            if !active.join.is_finished() {
                return Err(anyhow!("synthetic source {} already streaming", self.config.url));
            }
        }
        if let Some(finished) = streaming.take() {
            if finished.join.join().is_err() {
                log::error!("synthetic capture thread panicked");
            }
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let config = self.config.clone();
        let join = thread::Builder::new()
            .name("synthetic-capture".to_string())
            .spawn(move || capture_loop(config, on_frame, shutdown_thread))
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;

        log::info!(
            "SyntheticFrameSource: streaming {} at {} fps ({}x{}, flash {:?})",
            self.config.url,
            self.config.target_fps,
            self.config.width,
            self.config.height,
            self.config.flash_mode
        );
        *streaming = Some(Streaming { shutdown, join });
        Ok(())
    }

    fn stop(&self) {
        let active = match self.streaming.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(active) = active else {
            return;
        };
        active.shutdown.store(true, Ordering::SeqCst);
        if active.join.thread().id() == thread::current().id() {
            // Stop requested from inside the callback; the loop exits on its next check.
            return;
        }
        if active.join.join().is_err() {
            log::error!("synthetic capture thread panicked");
        }
        log::info!("SyntheticFrameSource: stopped {}", self.config.url);
    }

    fn is_streaming(&self) -> bool {
        match self.streaming.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|s| !s.join.is_finished()),
            Err(_) => false,
        }
    }
}

impl Drop for SyntheticFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(config: SyntheticConfig, on_frame: FrameCallback, shutdown: Arc<AtomicBool>) {
    let interval = Duration::from_millis(1000 / config.target_fps.max(1) as u64);
    let started = Instant::now();
    let mut generator = SceneGenerator::new(&config);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if config
            .frame_limit
            .is_some_and(|limit| generator.frame_count >= limit)
        {
            break;
        }

        let timestamp_ms = started.elapsed().as_millis() as u64;
        match generator.next_frame(timestamp_ms) {
            Ok((meta, buffer)) => on_frame(meta, buffer),
            Err(err) => {
                log::error!("synthetic frame generation failed: {}", err);
                break;
            }
        }

        thread::sleep(interval);
    }
}

struct SceneGenerator {
    width: u32,
    height: u32,
    flash_mode: FlashMode,
    frame_count: u64,
    scene_state: u8,
}

impl SceneGenerator {
    fn new(config: &SyntheticConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            flash_mode: config.flash_mode,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn phase(&self) -> TorchPhase {
        match self.flash_mode {
            FlashMode::Off => TorchPhase::Off,
            FlashMode::On => TorchPhase::On,
            FlashMode::Alternating if self.frame_count % 2 == 0 => TorchPhase::AlternatingOn,
            FlashMode::Alternating => TorchPhase::AlternatingOff,
        }
    }

    fn next_frame(&mut self, timestamp_ms: u64) -> Result<(FrameMetadata, RawBuffer)> {
        let phase = self.phase();
        let t = self.frame_count as f32 / 30.0;
        let distance_mm = 150.0 + 40.0 * t.sin();
        let tilt_deg = 5.0 * (t * 0.7).sin();
        let meta = FrameMetadata::new(timestamp_ms, phase)
            .with_index(self.frame_count)
            .with_geometry(Some(distance_mm), Some(tilt_deg));

        let pixels = self.generate_pixels(phase)?;
        let buffer = RawBuffer::new(pixels, self.width, self.height, PixelFormat::Rgb8)?;
        self.frame_count += 1;
        Ok((meta, buffer))
    }

    fn generate_pixels(&mut self, phase: TorchPhase) -> Result<Vec<u8>> {
        let pixel_count = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| anyhow!("frame size {}x{} overflows", self.width, self.height))?;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let dimmed = matches!(
            phase,
            TorchPhase::AlternatingOff | TorchPhase::Off | TorchPhase::Ambient
        );
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let v = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
            *pixel = if dimmed { v / 2 } else { v };
        }
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn collecting_callback() -> (FrameCallback, Arc<StdMutex<Vec<FrameMetadata>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: FrameCallback = Arc::new(move |meta: FrameMetadata, _buffer: RawBuffer| {
            sink.lock().unwrap().push(meta);
        });
        (callback, seen)
    }

    #[test]
    fn emits_alternating_phases_up_to_frame_limit() {
        let source = SyntheticFrameSource::new(SyntheticConfig {
            target_fps: 200,
            frame_limit: Some(4),
            ..SyntheticConfig::default()
        })
        .unwrap();
        let (callback, seen) = collecting_callback();
        source.start(callback).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_streaming() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        source.stop();

        let frames = seen.lock().unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].torch_phase, TorchPhase::AlternatingOn);
        assert_eq!(frames[1].torch_phase, TorchPhase::AlternatingOff);
        assert!(frames.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
    }

    #[test]
    fn no_frames_after_stop_returns() {
        let source = SyntheticFrameSource::new(SyntheticConfig {
            target_fps: 500,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let (callback, seen) = collecting_callback();
        source.start(callback).unwrap();
        thread::sleep(Duration::from_millis(30));
        source.stop();

        let count = seen.lock().unwrap().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.lock().unwrap().len(), count);
        assert!(!source.is_streaming());
    }

    #[test]
    fn double_start_is_rejected() {
        let source = SyntheticFrameSource::new(SyntheticConfig::default()).unwrap();
        let (callback, _) = collecting_callback();
        source.start(callback.clone()).unwrap();
        assert!(source.start(callback).is_err());
        source.stop();
    }

    #[test]
    fn restarts_after_capture_thread_panicked() {
        let source = SyntheticFrameSource::new(SyntheticConfig {
            target_fps: 200,
            ..SyntheticConfig::default()
        })
        .unwrap();
        let panicking: FrameCallback =
            Arc::new(|_meta: FrameMetadata, _buffer: RawBuffer| panic!("consumer failed"));
        source.start(panicking).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_streaming() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!source.is_streaming());

        let (callback, seen) = collecting_callback();
        source.start(callback).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        source.stop();
        assert!(!seen.lock().unwrap().is_empty());
    }

    #[test]
    fn oversized_frame_fails_instead_of_overflowing() {
        let mut generator = SceneGenerator::new(&SyntheticConfig {
            width: u32::MAX,
            height: u32::MAX,
            ..SyntheticConfig::default()
        });
        let err = generator.next_frame(0).err().expect("oversized frame must fail");
        assert!(err.to_string().contains("overflows"));
        assert_eq!(generator.frame_count, 0);
    }

    #[test]
    fn zero_fps_is_rejected() {
        assert!(SyntheticFrameSource::new(SyntheticConfig {
            target_fps: 0,
            ..SyntheticConfig::default()
        })
        .is_err());
    }
}

//! Terminal feedback for the binaries: stage spinners and a live session line.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::qc::QcLevel;
use crate::session::{LiveSessionState, SessionEventsSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Session sink that renders one status line per processed frame.
    pub fn live_progress(&self) -> LiveProgress {
        let bar = if self.use_pretty() {
            Some(spinner("waiting for frames".to_string()))
        } else {
            None
        };
        LiveProgress {
            bar,
            published: AtomicU64::new(0),
        }
    }
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct LiveProgress {
    bar: Option<ProgressBar>,
    published: AtomicU64,
}

impl LiveProgress {
    /// Updates received so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl SessionEventsSink for LiveProgress {
    fn session_did_update(&self, state: LiveSessionState) {
        let published = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let line = describe(&state);
        match &self.bar {
            Some(bar) => bar.set_message(line),
            // Plain mode: one line per second at 10 fps would flood the terminal.
            None if published % 10 == 1 => eprintln!("    {}", line),
            None => {}
        }
    }
}

fn describe(state: &LiveSessionState) -> String {
    let frame = &state.last_frame;
    let qc = match frame.qc_level {
        QcLevel::Good => "good",
        QcLevel::Warning => "warn",
        QcLevel::Bad => "BAD",
    };
    let mean = frame
        .stats
        .map(|s| format!("{:.3}", s.mean))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "session {} frame {} ({} accepted) qc={} mean={}",
        state.session_id, frame.meta.index, state.frame_count, qc, mean
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

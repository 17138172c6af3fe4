//! live_session - run one capture session against the configured frame source
//!
//! Frames flow source -> inference -> QC -> export -> terminal status line.
//! The session ends after `--duration-secs` or on Ctrl-C.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use chroma_session::config::SessionConfig;
use chroma_session::ingest::source_for;
use chroma_session::ui::Ui;
use chroma_session::{
    Collaborators, EngineRegistry, ExportSink, FileExportSink, SessionEventsSink,
    SessionHistoryStore, SessionMode, SessionOrchestrator, SqliteSessionHistoryStore,
    StartupGate, StaticPermissions, TrainingOrchestrator,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Session mode (clinical|training|developer).
    #[arg(long, default_value = "clinical")]
    mode: String,
    /// Session length in seconds; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,
    /// Inference engine, overriding the configured backend.
    #[arg(long, env = "CHROMA_INFERENCE_BACKEND")]
    backend: Option<String>,
    /// Emit a training marker at this interval (training mode only).
    #[arg(long, value_name = "SECS")]
    mark_every_secs: Option<u64>,
    /// Skip recording the session in the history database.
    #[arg(long)]
    no_history: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);
    let mode = SessionMode::parse(&args.mode)?;

    let cfg = {
        let _stage = ui.stage("Load configuration");
        SessionConfig::load()?
    };

    {
        let _stage = ui.stage("Check camera permission");
        let gate = StartupGate::new(Arc::new(StaticPermissions::authorized()));
        let state = gate.request_if_needed();
        if !state.is_ready() {
            return Err(anyhow!("camera not available: {:?}", state));
        }
    }

    let export = {
        let _stage = ui.stage("Open export root");
        Arc::new(FileExportSink::new(&cfg.export_root)?)
    };
    let engine = {
        let _stage = ui.stage("Select inference engine");
        let registry = EngineRegistry::with_builtin();
        let name = args.backend.as_deref().unwrap_or(&cfg.pipeline.backend);
        let engine = registry.select(name)?;
        engine.warm_up()?;
        engine
    };
    let source = source_for(cfg.source_config())?;

    let mut collaborators = Collaborators::new(source, engine, export.clone() as Arc<dyn ExportSink>);
    if !args.no_history {
        let _stage = ui.stage("Open session history");
        let store = SqliteSessionHistoryStore::open(&cfg.history_db_path)?;
        collaborators = collaborators.with_history(Arc::new(store) as Arc<dyn SessionHistoryStore>);
    }

    let orchestrator = Arc::new(SessionOrchestrator::new(
        collaborators,
        cfg.orchestrator_settings(),
    ));
    let progress = Arc::new(ui.live_progress());
    let sink: Arc<dyn SessionEventsSink> = progress.clone();
    orchestrator.set_sink(Some(&sink));

    let training = TrainingOrchestrator::with_config(orchestrator.clone(), cfg.training);
    match mode {
        SessionMode::Training => training.start_training_session()?,
        SessionMode::Clinical | SessionMode::Developer => orchestrator.start(mode)?,
    }
    let session = orchestrator
        .current_session()
        .ok_or_else(|| anyhow!("session did not start"))?;
    let export_dir = export.session_dir(session.id);

    let (tx, rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "session {} running (mode={}); press Ctrl-C to stop",
        session.id,
        mode.as_str()
    );
    wait_for_end(&rx, &args, &training)?;

    let frames = orchestrator.last_frame_index().map(|i| i + 1).unwrap_or(0);
    {
        let _stage = ui.stage("Stop session");
        orchestrator.stop();
    }
    progress.finish();

    println!("session:   {}", session.id);
    println!("mode:      {}", mode.as_str());
    println!("frames:    {} accepted, {} published", frames, progress.published());
    match export_dir {
        Some(dir) => println!("export:    {}", dir.display()),
        None => println!("export:    unavailable"),
    }
    Ok(())
}

fn wait_for_end(
    rx: &crossbeam_channel::Receiver<()>,
    args: &Args,
    training: &TrainingOrchestrator,
) -> Result<()> {
    let deadline = (args.duration_secs > 0)
        .then(|| std::time::Instant::now() + Duration::from_secs(args.duration_secs));
    let tick = args
        .mark_every_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(1));

    loop {
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                if remaining.is_zero() {
                    return Ok(());
                }
                remaining.min(tick)
            }
            None => tick,
        };
        match rx.recv_timeout(wait) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping session...");
                return Ok(());
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return Ok(()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
        }
        if args.mark_every_secs.is_some() {
            training.mark_event(Some("periodic"))?;
        }
    }
}

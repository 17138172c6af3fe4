//! session_history - list recent sessions from the history database

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use chroma_session::{LogReporter, SessionHistory, SqliteSessionHistoryStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the session history database.
    #[arg(long, env = "CHROMA_HISTORY_DB", default_value = "chroma_history.db")]
    db_path: String,
    /// Maximum sessions to list.
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Print JSON lines instead of a table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store = SqliteSessionHistoryStore::open(&args.db_path)?;
    let history = SessionHistory::new(Arc::new(store), Arc::new(LogReporter));
    let sessions = history.load_recent(args.limit);

    if args.json {
        for summary in &sessions {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(());
    }

    if sessions.is_empty() {
        println!("no sessions recorded in {}", args.db_path);
        return Ok(());
    }
    println!("{:<32}  {:<10}  {:>15}  {:>8}", "SESSION", "MODE", "STARTED_MS", "FRAMES");
    for summary in sessions {
        println!(
            "{:<32}  {:<10}  {:>15}  {:>8}",
            summary.id,
            summary.mode.as_str(),
            summary.started_at_ms,
            summary.frame_count
        );
    }
    Ok(())
}

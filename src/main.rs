use anyhow::Result;
use clap::Parser;
use revenant::clock::SystemClock;
use revenant::sink::{JsonlRecordSink, Notifier, NullNotifier, WebhookNotifier};
use revenant::events::StreamEvent;
use revenant::{CaptureEngine, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "revenant",
    about = "Ephemeral retention and deletion-capture engine for chat streams"
)]
struct Cli {
    /// Path to config.toml
    #[arg(short, long, default_value = "revenant.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("revenant={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Fatal startup errors (missing/invalid config) refuse to start.
    let config = Config::load(&cli.config)?;
    let storage = config.storage.resolve()?;

    let notifier: Arc<dyn Notifier> = match (config.notify.enabled, config.notify.webhook_url.clone()) {
        (true, Some(url)) => Arc::new(WebhookNotifier::new(url, config.notify.timeout())?),
        (true, None) => anyhow::bail!("notify.webhook_url is required while notify.enabled = true"),
        (false, _) => {
            tracing::warn!("notifications disabled; captures are persisted only");
            Arc::new(NullNotifier)
        }
    };
    let sink = Arc::new(JsonlRecordSink::new(storage.records_path.clone()));

    let engine = CaptureEngine::new(&config, Arc::new(SystemClock), notifier, sink)?;
    engine.spawn_reaper();
    tracing::info!(
        temp = %storage.temp_dir.display(),
        saved = %storage.saved_dir.display(),
        "revenant listening for events on stdin"
    );

    tokio::select! {
        result = run_event_loop(&engine) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        }
    }

    engine.shutdown();
    Ok(())
}

/// Feed the engine from the protocol bridge: one JSON event per stdin line.
async fn run_event_loop(engine: &CaptureEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::Message(msg)) => engine.handle_incoming_message(msg).await,
            Ok(StreamEvent::Revoke(event)) => engine.handle_revoke(event).await,
            Ok(StreamEvent::Ready) => engine.mark_ready(),
            Err(error) => {
                tracing::warn!(%error, "skipping malformed event line");
            }
        }
    }
    tracing::info!("event stream closed");
    Ok(())
}

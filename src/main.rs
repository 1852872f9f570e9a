//! niko-rs: Turkish voice assistant core with a console front end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

use niko_rs::api::{self, ApiState};
use niko_rs::app_state::AppState;
use niko_rs::assistant::{update_phrase, Assistant};
use niko_rs::clock::{Clock, SystemClock};
use niko_rs::config::Config;
use niko_rs::console;
use niko_rs::history::HistoryStore;
use niko_rs::platform::LoggingPlatform;
use niko_rs::remote::RemoteChatClient;
use niko_rs::speech::{self, SpeechOutputQueue};
use niko_rs::storage::KeyValueStore;
use niko_rs::update::{UpdateChecker, UpdateStatus};

#[derive(Parser, Debug)]
#[command(name = "niko-rs", about = "Turkish voice assistant")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the state file location
    #[arg(long)]
    state: Option<PathBuf>,

    /// Handle a single utterance, wait for speech to finish, and exit
    #[arg(long)]
    once: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins when set; otherwise keep hyper/reqwest internals quiet
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,hyper=info,reqwest=info")
        } else {
            EnvFilter::new("info,hyper=warn,reqwest=warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("niko-rs starting");

    let config = Config::load(args.config.as_deref());
    let name = config.assistant.name.clone();

    let state_path = args.state.unwrap_or_else(|| config.storage.state_path.clone());
    info!("State file: {}", state_path.display());
    let store = Arc::new(KeyValueStore::open(state_path));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app_state = Arc::new(AppState::load(store.clone()));
    let history = Arc::new(HistoryStore::load(
        store,
        clock.clone(),
        name.clone(),
        config.history.max_items,
    ));

    let idle = Arc::new(Notify::new());
    let engine = speech::build_engine(
        config.speech.backend,
        &name,
        &config.speech.command,
        &config.speech.args,
        idle.clone(),
    );
    let queue = Arc::new(SpeechOutputQueue::new(engine, idle));
    let _driver = queue.spawn_driver();

    let remote = RemoteChatClient::new(config.remote.clone())?;
    if !remote.is_configured() {
        info!("No remote model configured, only local commands are available");
    }

    let mut assistant = Assistant::new(
        name,
        clock,
        app_state,
        history,
        queue.clone(),
        remote,
        Arc::new(LoggingPlatform),
    )
    .with_audio_clips(config.speech.play_audio_clips);
    if !config.update.manifest_url.is_empty() {
        assistant = assistant.with_updates(UpdateChecker::new(&config.update)?);
    }
    let assistant = Arc::new(assistant);

    if config.api.enabled {
        api::start_api(
            ApiState {
                assistant: assistant.clone(),
            },
            config.api.port,
        )
        .await;
    }

    if let Some(text) = args.once {
        let outcome = assistant.handle_utterance(&text).await;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        drain(&queue).await;
        return Ok(());
    }

    if config.update.enabled {
        let assistant = assistant.clone();
        tokio::spawn(async move {
            let status = assistant.check_for_updates(false).await;
            if let Some(UpdateStatus::Available { latest, .. }) = &status {
                assistant.say(&update_phrase(status.as_ref()), false);
                println!("Bu sürümü atlamak için: /skip-update {latest}");
            }
        });
    }

    console::run(assistant).await?;
    drain(&queue).await;

    info!("niko-rs stopped");
    Ok(())
}

/// Wait until everything queued has been spoken.
async fn drain(queue: &SpeechOutputQueue) {
    while queue.is_speaking() || queue.pending_len() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_once_and_state_override() {
        let args = Args::parse_from([
            "niko-rs",
            "--state",
            "/tmp/niko.json",
            "--once",
            "saat kaç",
            "-v",
        ]);
        assert_eq!(args.state, Some(PathBuf::from("/tmp/niko.json")));
        assert_eq!(args.once.as_deref(), Some("saat kaç"));
        assert!(args.verbose);
        assert!(args.config.is_none());
    }
}

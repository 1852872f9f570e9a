//! Serialized speech output.
//!
//! The engine can say one thing at a time. [`SpeechOutputQueue`] holds what is
//! waiting, hands the next item to the engine whenever it is idle, and skips
//! text that cleans down to nothing. Engines announce "became idle" through a
//! shared [`Notify`]; the driver task spawned by
//! [`SpeechOutputQueue::spawn_driver`] answers each signal with `play_next`.

pub mod playback;

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};
use crate::normalizer::clean_for_speech;
use playback::ClipPlayer;

/// Something that can produce sound.
///
/// `speak` and `play_clip` start output and return immediately; the engine
/// must report `is_speaking() == true` from then until it signals idle.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
    fn play_clip(&self, audio: Vec<u8>) -> Result<()>;
    fn is_speaking(&self) -> bool;
    /// Cancel whatever is being said right now.
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechItem {
    Text(String),
    /// Encoded audio from the remote model; played as-is.
    Clip(Vec<u8>),
}

pub struct SpeechOutputQueue {
    pending: Mutex<VecDeque<SpeechItem>>,
    engine: Arc<dyn SpeechEngine>,
    idle: Arc<Notify>,
}

impl SpeechOutputQueue {
    pub fn new(engine: Arc<dyn SpeechEngine>, idle: Arc<Notify>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            engine,
            idle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SpeechItem>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, text: impl Into<String>) {
        self.push(SpeechItem::Text(text.into()));
    }

    pub fn enqueue_clip(&self, audio: Vec<u8>) {
        self.push(SpeechItem::Clip(audio));
    }

    fn push(&self, item: SpeechItem) {
        self.lock().push_back(item);
        self.play_next();
    }

    pub fn pending_len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_speaking(&self) -> bool {
        self.engine.is_speaking()
    }

    /// Hand the next speakable item to the engine, if it is idle.
    ///
    /// Items that clean to empty text, or that the engine refuses, are dropped
    /// and the next one is tried.
    pub fn play_next(&self) {
        let mut pending = self.lock();
        if self.engine.is_speaking() {
            return;
        }

        while let Some(item) = pending.pop_front() {
            let started = match item {
                SpeechItem::Text(text) => {
                    let cleaned = clean_for_speech(&text);
                    if cleaned.is_empty() {
                        debug!("Skipping utterance with nothing to say");
                        continue;
                    }
                    self.engine.speak(&cleaned)
                }
                SpeechItem::Clip(audio) => self.engine.play_clip(audio),
            };

            match started {
                Ok(()) => return,
                Err(e) => warn!("Speech engine rejected utterance: {e}"),
            }
        }
    }

    /// Drop everything pending and cut off the current utterance.
    pub fn clear(&self) {
        let dropped = {
            let mut pending = self.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        self.engine.stop();
        if dropped > 0 {
            info!("Speech queue cleared ({dropped} pending dropped)");
        }
    }

    /// Re-run `play_next` every time the engine reports it went idle.
    pub fn spawn_driver(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                queue.idle.notified().await;
                queue.play_next();
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// Print utterances to stdout.
    #[default]
    Console,
    /// Run an external TTS program per utterance.
    Command,
}

/// Prints what would be said. Text finishes instantly; clips still play.
pub struct ConsoleSpeechEngine {
    speaker: String,
    clips: ClipPlayer,
    idle: Arc<Notify>,
}

impl ConsoleSpeechEngine {
    pub fn new(speaker: impl Into<String>, idle: Arc<Notify>) -> Self {
        Self {
            speaker: speaker.into(),
            clips: ClipPlayer::new(idle.clone()),
            idle,
        }
    }
}

impl SpeechEngine for ConsoleSpeechEngine {
    fn speak(&self, text: &str) -> Result<()> {
        println!("🔊 {}: {text}", self.speaker);
        self.idle.notify_one();
        Ok(())
    }

    fn play_clip(&self, audio: Vec<u8>) -> Result<()> {
        self.clips.play(audio);
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.clips.is_playing()
    }

    fn stop(&self) {
        self.clips.cancel();
    }
}

struct ActiveCommand {
    id: u64,
    cancel: CancellationToken,
}

/// Speaks through an external program, e.g. `espeak-ng -v tr <text>`.
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
    active: Arc<Mutex<Option<ActiveCommand>>>,
    next_id: Mutex<u64>,
    clips: ClipPlayer,
    idle: Arc<Notify>,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>, idle: Arc<Notify>) -> Self {
        Self {
            program: program.into(),
            args,
            active: Arc::new(Mutex::new(None)),
            next_id: Mutex::new(0),
            clips: ClipPlayer::new(idle.clone()),
            idle,
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCommand>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn speak(&self, text: &str) -> Result<()> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AssistantError::Speech(format!("failed to start {}: {e}", self.program)))?;

        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let cancel = CancellationToken::new();
        *self.lock_active() = Some(ActiveCommand {
            id,
            cancel: cancel.clone(),
        });
        debug!("Speaking via {} (#{id})", self.program);

        let active = self.active.clone();
        let idle = self.idle.clone();
        let program = self.program.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if !s.success() => warn!("{program} exited with {s}"),
                    Err(e) => warn!("Failed waiting for {program}: {e}"),
                    Ok(_) => {}
                },
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {program}: {e}");
                    }
                    debug!("Speech #{id} cancelled");
                }
            }

            let mut current = active.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().is_some_and(|a| a.id == id) {
                *current = None;
            }
            drop(current);
            idle.notify_one();
        });
        Ok(())
    }

    fn play_clip(&self, audio: Vec<u8>) -> Result<()> {
        self.clips.play(audio);
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.lock_active().is_some() || self.clips.is_playing()
    }

    fn stop(&self) {
        if let Some(active) = self.lock_active().take() {
            active.cancel.cancel();
        }
        self.clips.cancel();
    }
}

/// Build the engine selected in config.
pub fn build_engine(
    backend: SpeechBackend,
    speaker: &str,
    program: &str,
    args: &[String],
    idle: Arc<Notify>,
) -> Arc<dyn SpeechEngine> {
    match backend {
        SpeechBackend::Console => Arc::new(ConsoleSpeechEngine::new(speaker, idle)),
        SpeechBackend::Command => {
            info!("Speech backend: {program} {}", args.join(" "));
            Arc::new(CommandSpeechEngine::new(program, args.to_vec(), idle))
        }
    }
}

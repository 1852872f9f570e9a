//! Playback of encoded audio clips (wav/mp3/ogg) returned with remote replies.
//!
//! Each clip is decoded and played on a blocking thread that polls the rodio
//! sink for completion or cancellation. Only the most recently started clip
//! owns the "playing" state, so a clip that was cancelled and then replaced
//! does not clear its successor's state when its thread winds down.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rodio::{Decoder, OutputStreamBuilder, Sink};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct ClipPlayer {
    active: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    idle: Arc<Notify>,
}

impl ClipPlayer {
    pub fn new(idle: Arc<Notify>) -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start playing `audio` in the background. Signals `idle` when done.
    pub fn play(&self, audio: Vec<u8>) {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel_flag.clone());

        let active = self.active.clone();
        let idle = self.idle.clone();
        let size = audio.len();
        tokio::task::spawn_blocking(move || {
            match play_blocking(audio, &cancel_flag) {
                Ok(true) => info!("Audio clip cancelled"),
                Ok(false) => debug!("Audio clip finished ({size} bytes)"),
                Err(e) => warn!("Audio clip playback failed: {e}"),
            }

            let mut current = active.lock().unwrap_or_else(PoisonError::into_inner);
            if current
                .as_ref()
                .is_some_and(|flag| Arc::ptr_eq(flag, &cancel_flag))
            {
                *current = None;
            }
            drop(current);
            idle.notify_one();
        });
    }

    pub fn cancel(&self) {
        if let Some(flag) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

/// Returns whether playback was cancelled.
fn play_blocking(audio: Vec<u8>, cancel_flag: &AtomicBool) -> Result<bool, String> {
    let stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| format!("Failed to open audio output: {e}"))?;
    let source =
        Decoder::new(Cursor::new(audio)).map_err(|e| format!("Failed to decode clip: {e}"))?;

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);

    loop {
        if sink.empty() {
            return Ok(false);
        }
        if cancel_flag.load(Ordering::Relaxed) {
            sink.stop();
            return Ok(true);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

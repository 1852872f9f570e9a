//! Main orchestration with state machine.
//!
//! IDLE → LISTENING → PROCESSING → IDLE
//!
//! An utterance is recorded, routed, and either acted on locally or sent to
//! the remote model. Whatever comes back is spoken through the queue. Errors
//! that escape a component stop here and become a spoken apology.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Datelike, Local};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::clock::Clock;
use crate::error::{AssistantError, Result};
use crate::history::{HistoryPanel, HistoryStore, HistoryView, Sender};
use crate::intent::{Connectivity, IntentRouter, LocalAction, MediaCommand};
use crate::models::display_model_name;
use crate::normalizer::Utterance;
use crate::platform::{DevicePlatform, PlatformOutcome};
use crate::remote::RemoteChatClient;
use crate::speech::SpeechOutputQueue;
use crate::update::{UpdateChecker, UpdateStatus};

pub const LISTENING_PROMPT: &str = "Dinliyorum...";
pub const READY_PROMPT: &str = "Hazır";

const OFFLINE_REPLY: &str =
    "İnternet bağlantım yok. Şimdilik sadece yerel komutları (saat, tarih, arama gibi) uygulayabilirim.";
const UNREACHABLE_REPLY: &str =
    "Yapay zeka asistanına şu an ulaşılamıyor. Lütfen internet bağlantınızı kontrol edin.";
const APOLOGY: &str = "Bir şeyler ters gitti. Lütfen tekrar dene.";

const MONTHS: [&str; 12] = [
    "Ocak", "Şubat", "Mart", "Nisan", "Mayıs", "Haziran", "Temmuz", "Ağustos", "Eylül", "Ekim",
    "Kasım", "Aralık",
];
const WEEKDAYS: [&str; 7] = [
    "Pazartesi",
    "Salı",
    "Çarşamba",
    "Perşembe",
    "Cuma",
    "Cumartesi",
    "Pazar",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantState {
    Idle,
    Listening,
    Processing,
}

impl std::fmt::Display for AssistantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Listening => write!(f, "LISTENING"),
            Self::Processing => write!(f, "PROCESSING"),
        }
    }
}

/// What happened to one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Nothing left after normalization.
    Ignored,
    Local {
        action: LocalAction,
        response: Option<String>,
    },
    Remote {
        reply: String,
        thought: Option<String>,
    },
    /// No chat server configured.
    Offline { response: String },
    /// The reply arrived after a stop or reset and was dropped.
    Discarded,
    Failed { response: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: AssistantState,
    pub speaking: bool,
    pub pending_speech: usize,
    pub session_id: Option<String>,
    /// Logged-in account, if any.
    pub user: Option<String>,
    pub model: Option<String>,
    pub web_search: bool,
    pub history_count: usize,
}

pub struct Assistant {
    name: String,
    clock: Arc<dyn Clock>,
    router: IntentRouter,
    state: Arc<AppState>,
    history: Arc<HistoryStore>,
    speech: Arc<SpeechOutputQueue>,
    remote: RemoteChatClient,
    platform: Arc<dyn DevicePlatform>,
    updates: Option<UpdateChecker>,
    play_audio_clips: bool,
    /// Bumped by stop/reset; replies and listens started under an older value are dropped.
    generation: AtomicU64,
    /// Wakes everyone parked in [`Assistant::stopped`].
    stop_signal: Notify,
    phase: Mutex<AssistantState>,
    panel: Mutex<HistoryPanel>,
}

impl Assistant {
    pub fn new(
        name: impl Into<String>,
        clock: Arc<dyn Clock>,
        state: Arc<AppState>,
        history: Arc<HistoryStore>,
        speech: Arc<SpeechOutputQueue>,
        remote: RemoteChatClient,
        platform: Arc<dyn DevicePlatform>,
    ) -> Self {
        let name = name.into();
        Self {
            router: IntentRouter::new(name.clone(), clock.clone()),
            name,
            clock,
            state,
            history,
            speech,
            remote,
            platform,
            updates: None,
            play_audio_clips: true,
            generation: AtomicU64::new(0),
            stop_signal: Notify::new(),
            phase: Mutex::new(AssistantState::Idle),
            panel: Mutex::new(HistoryPanel::new()),
        }
    }

    pub fn with_updates(mut self, checker: UpdateChecker) -> Self {
        self.updates = Some(checker);
        self
    }

    pub fn with_audio_clips(mut self, enabled: bool) -> Self {
        self.play_audio_clips = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn app_state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn state(&self) -> AssistantState {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, to: AssistantState) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase != to {
            info!("State: {} → {to}", *phase);
            *phase = to;
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            speaking: self.speech.is_speaking(),
            pending_speech: self.speech.pending_len(),
            session_id: self.state.session().current_id(),
            user: self.state.username(),
            model: self.state.selected_model(),
            web_search: self.state.web_search(),
            history_count: self.history.len(),
        }
    }

    /// Queue `text` for speech. With `record`, also log it as an assistant message
    /// unless it is a transient prompt or too short to matter.
    pub fn say(&self, text: &str, record: bool) {
        if record && text != LISTENING_PROMPT && text != READY_PROMPT && text.trim().chars().count() > 2 {
            if let Err(e) = self.history.append(Sender::Assistant, text) {
                warn!("Failed to record assistant message: {e}");
            }
        }
        self.speech.enqueue(text);
    }

    /// Mark the start of a listen. Returns a ticket for [`Self::listen_is_current`].
    pub fn begin_listening(&self) -> u64 {
        self.transition(AssistantState::Listening);
        self.generation()
    }

    /// False if a stop happened since the listen began; its result should be dropped.
    pub fn listen_is_current(&self, ticket: u64) -> bool {
        self.generation() == ticket
    }

    /// Resolves at the next stop or reset after the returned future is first polled.
    pub async fn stopped(&self) {
        self.stop_signal.notified().await;
    }

    /// Full turn for one transcribed utterance. Never fails.
    pub async fn handle_utterance(&self, raw: &str) -> TurnOutcome {
        let utterance = Utterance::new(raw);
        if utterance.is_empty() {
            self.transition(AssistantState::Idle);
            return TurnOutcome::Ignored;
        }

        self.transition(AssistantState::Processing);
        let outcome = match self.process(&utterance).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to handle '{}': {e}", utterance.raw);
                self.say(APOLOGY, false);
                TurnOutcome::Failed {
                    response: APOLOGY.to_string(),
                }
            }
        };
        self.transition(AssistantState::Idle);
        outcome
    }

    async fn process(&self, utterance: &Utterance) -> Result<TurnOutcome> {
        self.history.append(Sender::User, &utterance.raw)?;

        if let Some(action) = self.router.route(&utterance.normalized) {
            let response = self.execute(&action).await?;
            return Ok(TurnOutcome::Local { action, response });
        }

        if !self.remote.is_configured() {
            self.say(OFFLINE_REPLY, true);
            return Ok(TurnOutcome::Offline {
                response: OFFLINE_REPLY.to_string(),
            });
        }

        self.ask_remote(utterance).await
    }

    async fn ask_remote(&self, utterance: &Utterance) -> Result<TurnOutcome> {
        let started = self.generation();
        let request = self.remote.request(
            &utterance.raw,
            self.state.session().current_id(),
            self.state.selected_model(),
            self.state.web_search(),
        );
        let token = self.state.access_token();
        let result = self.remote.chat(&request, token.as_deref()).await;

        if self.generation() != started {
            info!("Discarding remote result that arrived after stop");
            return Ok(TurnOutcome::Discarded);
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(AssistantError::Network(reason)) => {
                warn!("Remote model unreachable: {reason}");
                self.say(UNREACHABLE_REPLY, false);
                return Ok(TurnOutcome::Failed {
                    response: UNREACHABLE_REPLY.to_string(),
                });
            }
            Err(AssistantError::Remote { message, .. }) => {
                self.say(&message, false);
                return Ok(TurnOutcome::Failed { response: message });
            }
            Err(e) => return Err(e),
        };

        if let Some(id) = reply.id.as_deref().filter(|id| !id.is_empty()) {
            self.state.session().adopt(id)?;
        }
        self.history.append(Sender::Assistant, &reply.reply)?;

        let clip = if self.play_audio_clips {
            reply.audio_bytes()
        } else {
            None
        };
        match clip {
            Some(audio) => self.speech.enqueue_clip(audio),
            None if !reply.reply.trim().is_empty() => self.speech.enqueue(reply.reply.as_str()),
            None => {}
        }

        Ok(TurnOutcome::Remote {
            reply: reply.reply,
            thought: reply.thought.filter(|t| !t.is_empty()),
        })
    }

    /// Carry out a routed action and speak the result. Returns the phrase spoken, if any.
    async fn execute(&self, action: &LocalAction) -> Result<Option<String>> {
        let now = self.clock.now();
        let (response, record) = match action {
            LocalAction::SpeakOnly { text } => (Some(text.clone()), true),
            LocalAction::TellTime => (Some(format!("Saat şu an {}", now.format("%H:%M"))), true),
            LocalAction::TellDate => (Some(format!("Bugün {}", turkish_date(&now))), true),
            LocalAction::OpenHistory { filter } => {
                let view = self.open_history(filter);
                (
                    Some(format!(
                        "Sohbet geçmişi açılıyor. Toplam {} mesaj bulundu.",
                        view.stats.total
                    )),
                    false,
                )
            }
            LocalAction::ClearHistory => {
                let phrase = if self.history.clear()? {
                    "Sohbet geçmişi tamamen temizlendi"
                } else {
                    "Temizlenecek bir geçmiş bulunamadı."
                };
                (Some(phrase.to_string()), false)
            }
            LocalAction::CheckForUpdates => {
                self.say("Güncelleme kontrol ediliyor...", false);
                let status = self.check_for_updates(true).await;
                (Some(update_phrase(status.as_ref())), false)
            }
            device => match self.platform.perform(device) {
                PlatformOutcome::Done => (confirmation(device), true),
                PlatformOutcome::Say(text) => (Some(text), true),
                PlatformOutcome::Unavailable(reason) => (Some(reason), true),
            },
        };

        if let Some(text) = &response {
            self.say(text, record);
        }
        Ok(response)
    }

    /// Open the history panel, optionally filtered.
    pub fn open_history(&self, filter: &str) -> HistoryView {
        let mut panel = self.panel.lock().unwrap_or_else(PoisonError::into_inner);
        let view = panel.open(&self.history);
        if filter.trim().is_empty() {
            return view;
        }
        panel.set_filter(&self.history, filter).unwrap_or(view)
    }

    pub fn close_history(&self) {
        self.panel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }

    /// Cut off speech, drop the queue, cancel the active listen and orphan in-flight replies.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
        self.speech.clear();
        if self.state() == AssistantState::Listening {
            info!("Listen cancelled");
        }
        self.transition(AssistantState::Idle);
        info!("Stopped");
    }

    /// Stop, then forget the conversation: new session, empty history.
    pub fn reset(&self) -> Result<()> {
        self.stop();
        self.state.session().reset()?;
        self.history.clear()?;
        info!("Conversation reset");
        Ok(())
    }

    /// Switch the remote model. Returns its display name.
    pub fn select_model(&self, id: &str) -> Result<String> {
        self.state.set_selected_model(id)?;
        Ok(display_model_name(id))
    }

    pub fn set_web_search(&self, enabled: bool) -> Result<()> {
        self.state.set_web_search(enabled)
    }

    /// Compare against the published manifest. A manual check forgets any skipped version first.
    pub async fn check_for_updates(&self, manual: bool) -> Option<UpdateStatus> {
        let checker = self.updates.as_ref().filter(|c| c.is_configured())?;
        if manual {
            if let Err(e) = self.state.clear_skipped_version() {
                warn!("Failed to clear skipped version: {e}");
            }
        }
        let skipped = self.state.skipped_version();
        match checker.check(skipped.as_deref()).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Update check failed: {e}");
                None
            }
        }
    }

    /// Log in to the chat server and keep the token for later requests.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        if !self.remote.is_configured() {
            return Err(AssistantError::Config("no chat server configured".into()));
        }
        let token = self.remote.login(username, password).await?;
        self.state.set_login(username, &token)
    }

    pub fn logout(&self) -> Result<()> {
        self.state.logout()
    }

    /// Model ids the server offers for chat.
    pub async fn available_models(&self) -> Result<Vec<String>> {
        if !self.remote.is_configured() {
            return Err(AssistantError::Config("no chat server configured".into()));
        }
        let token = self.state.access_token();
        self.remote.fetch_models(token.as_deref()).await
    }

    pub fn skip_update(&self, version: &str) -> Result<()> {
        self.state.skip_version(version)?;
        info!("Skipping version {version}");
        Ok(())
    }
}

/// Spoken confirmation after the platform carried out `action`.
fn confirmation(action: &LocalAction) -> Option<String> {
    let text = match action {
        LocalAction::OpenCamera => "Kamera açılıyor".to_string(),
        LocalAction::OpenSettings => "Ayarlar açılıyor".to_string(),
        LocalAction::ControlMedia { command } => match command {
            MediaCommand::Play => "Müzik başlatılıyor",
            MediaCommand::Pause => "Müzik durduruldu",
            MediaCommand::Next => "Sonraki şarkı",
            MediaCommand::Previous => "Önceki şarkı",
        }
        .to_string(),
        LocalAction::SetAlarm { time: Some(time) } => {
            format!("Alarm saat {} için kuruldu", time.clock_label())
        }
        LocalAction::SetAlarm { time: None } => {
            "Saati tam anlayamadım, alarm listesini açıyorum.".to_string()
        }
        LocalAction::SetReminder {
            time,
            title,
            day_offset,
        } => {
            let day = if *day_offset > 0 { " yarın" } else { "" };
            let clock = time
                .map(|t| format!(" {}", t.clock_label()))
                .unwrap_or_default();
            format!("Hatırlatıcı{day}{clock} için açılıyor: {title}")
        }
        LocalAction::ToggleConnectivity { kind, on } => match (kind, on) {
            (Connectivity::Wifi, true) => "Wi-Fi açıldı",
            (Connectivity::Wifi, false) => "Wi-Fi kapatıldı",
            (Connectivity::Bluetooth, true) => "Bluetooth açılıyor",
            (Connectivity::Bluetooth, false) => "Bluetooth kapatılıyor",
        }
        .to_string(),
        // calls and message replies happen silently
        _ => return None,
    };
    Some(text)
}

pub fn update_phrase(status: Option<&UpdateStatus>) -> String {
    match status {
        Some(UpdateStatus::UpToDate { current }) => format!("Uygulama güncel. Sürüm {current}."),
        Some(UpdateStatus::Available { latest, .. }) => {
            format!("Yeni bir sürüm mevcut: {latest}.")
        }
        Some(UpdateStatus::Skipped { latest }) => format!("{latest} sürümü atlandı."),
        None => "Güncelleme kontrol edilemedi.".to_string(),
    }
}

/// "14 Mart 2026 Cumartesi"
fn turkish_date(now: &DateTime<Local>) -> String {
    format!(
        "{:02} {} {} {}",
        now.day(),
        MONTHS[now.month0() as usize],
        now.year(),
        WEEKDAYS[now.weekday().num_days_from_monday() as usize]
    )
}

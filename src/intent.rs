//! Local command classification.
//!
//! The router walks a fixed list of keyword rules in declaration order and
//! returns the action of the first rule whose predicate holds. There is no
//! scoring and no backtracking: overlapping keywords ("aç" opens music, Wi-Fi
//! and the history panel alike) are resolved purely by position in [`RULES`].
//! `None` means "not a local command", and the utterance goes to the remote
//! model instead.
//!
//! The router only classifies. Side effects belong to the platform layer.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::clock::Clock;
use crate::normalizer::capitalize_first;
use crate::temporal::{self, TimeSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCommand {
    Play,
    Pause,
    Next,
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Wifi,
    Bluetooth,
}

/// Everything the platform layer needs to carry out a local command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LocalAction {
    SpeakOnly { text: String },
    ReadLastMessage,
    ReplyLastMessage { text: String },
    CallLast { direction: CallDirection },
    CallByName { name: String },
    TellTime,
    TellDate,
    OpenCamera,
    OpenSettings,
    ControlMedia { command: MediaCommand },
    SetAlarm { time: Option<TimeSpec> },
    SetReminder {
        time: Option<TimeSpec>,
        title: String,
        day_offset: u32,
    },
    ToggleConnectivity { kind: Connectivity, on: bool },
    OpenHistory { filter: String },
    ClearHistory,
    CheckForUpdates,
}

/// Input handed to a rule's action builder.
pub struct RouteContext<'a> {
    pub text: &'a str,
    pub now: NaiveDateTime,
    pub assistant_name: &'a str,
}

/// One keyword rule.
pub struct IntentRule {
    pub name: &'static str,
    predicate: fn(&str) -> bool,
    build: fn(&RouteContext<'_>) -> LocalAction,
}

impl IntentRule {
    pub fn matches(&self, text: &str) -> bool {
        (self.predicate)(text)
    }
}

impl std::fmt::Debug for IntentRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRule").field("name", &self.name).finish()
    }
}

const MEDIA_NOUNS: &[&str] = &["müzik", "müzi", "şarkı", "spotify", "parça"];
const PLAY_VERBS: &[&str] = &["başlat", "oynat", "devam", "çal", "aç"];
const PAUSE_VERBS: &[&str] = &["durdur", "duraklat", "kapat"];
const NEXT_VERBS: &[&str] = &["sonraki", "geç", "değiştir", "atla", "sıradaki"];
const PREVIOUS_VERBS: &[&str] = &["önceki", "başa", "geri"];
const WIFI_NOUNS: &[&str] = &["wifi", "wi-fi", "internet"];
const HISTORY_NOUNS: &[&str] = &["geçmişi", "sohbet geçmişini"];
const UPDATE_NOUNS: &[&str] = &["güncelleme", "sürüm"];

fn any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// The rule table. Order is behavior.
pub static RULES: &[IntentRule] = &[
    IntentRule {
        name: "identity",
        predicate: |t| any(t, &["adın ne", "kimsin", "kendini tanıt"]),
        build: |ctx| LocalAction::SpeakOnly {
            text: format!(
                "Benim adım {}. Senin kişisel yapay zeka asistanınım.",
                ctx.assistant_name
            ),
        },
    },
    IntentRule {
        name: "message-read",
        predicate: |t| t.contains("whatsapp") && t.contains("oku"),
        build: |_| LocalAction::ReadLastMessage,
    },
    IntentRule {
        name: "message-reply",
        predicate: |t| t.contains("whatsapp") && t.contains("cevap"),
        build: |_| LocalAction::ReplyLastMessage {
            text: "Tamam".into(),
        },
    },
    IntentRule {
        name: "call-last-incoming",
        predicate: |t| t.contains("son gelen"),
        build: |_| LocalAction::CallLast {
            direction: CallDirection::Incoming,
        },
    },
    IntentRule {
        name: "call-last-outgoing",
        predicate: |t| t.contains("son aranan"),
        build: |_| LocalAction::CallLast {
            direction: CallDirection::Outgoing,
        },
    },
    IntentRule {
        name: "call-by-name",
        predicate: |t| t.contains("ara"),
        build: |ctx| LocalAction::CallByName {
            name: extract_contact_name(ctx.text),
        },
    },
    IntentRule {
        name: "time-query",
        predicate: |t| any(t, &["saat kaç", "saati söyle"]),
        build: |_| LocalAction::TellTime,
    },
    IntentRule {
        name: "date-query",
        predicate: |t| any(t, &["tarih", "bugün günlerden ne", "hangi gündeyiz"]),
        build: |_| LocalAction::TellDate,
    },
    IntentRule {
        name: "camera",
        predicate: |t| any(t, &["kamera aç", "fotoğraf çek"]),
        build: |_| LocalAction::OpenCamera,
    },
    IntentRule {
        name: "settings",
        predicate: |t| t.contains("ayarları aç"),
        build: |_| LocalAction::OpenSettings,
    },
    IntentRule {
        name: "media-play",
        predicate: |t| any(t, MEDIA_NOUNS) && any(t, PLAY_VERBS),
        build: |_| LocalAction::ControlMedia {
            command: MediaCommand::Play,
        },
    },
    IntentRule {
        name: "media-pause",
        predicate: |t| any(t, MEDIA_NOUNS) && any(t, PAUSE_VERBS),
        build: |_| LocalAction::ControlMedia {
            command: MediaCommand::Pause,
        },
    },
    IntentRule {
        name: "media-next",
        predicate: |t| any(t, MEDIA_NOUNS) && any(t, NEXT_VERBS),
        build: |_| LocalAction::ControlMedia {
            command: MediaCommand::Next,
        },
    },
    IntentRule {
        name: "media-previous",
        predicate: |t| any(t, MEDIA_NOUNS) && any(t, PREVIOUS_VERBS),
        build: |_| LocalAction::ControlMedia {
            command: MediaCommand::Previous,
        },
    },
    IntentRule {
        name: "alarm",
        predicate: |t| t.contains("alarm"),
        build: |ctx| LocalAction::SetAlarm {
            time: temporal::parse(ctx.text, ctx.now),
        },
    },
    IntentRule {
        name: "reminder",
        predicate: |t| any(t, &["hatırlat", "anımsat"]),
        build: |ctx| {
            let time = temporal::parse(ctx.text, ctx.now);
            let day_offset = match time {
                Some(spec) => spec.day_offset,
                None => u32::from(ctx.text.contains("yarın")),
            };
            LocalAction::SetReminder {
                time,
                title: extract_reminder_title(ctx.text),
                day_offset,
            }
        },
    },
    IntentRule {
        name: "wifi-on",
        predicate: |t| any(t, WIFI_NOUNS) && t.contains("aç"),
        build: |_| LocalAction::ToggleConnectivity {
            kind: Connectivity::Wifi,
            on: true,
        },
    },
    IntentRule {
        name: "wifi-off",
        predicate: |t| any(t, WIFI_NOUNS) && t.contains("kapat"),
        build: |_| LocalAction::ToggleConnectivity {
            kind: Connectivity::Wifi,
            on: false,
        },
    },
    IntentRule {
        name: "bluetooth-on",
        predicate: |t| t.contains("bluetooth") && t.contains("aç"),
        build: |_| LocalAction::ToggleConnectivity {
            kind: Connectivity::Bluetooth,
            on: true,
        },
    },
    IntentRule {
        name: "bluetooth-off",
        predicate: |t| t.contains("bluetooth") && t.contains("kapat"),
        build: |_| LocalAction::ToggleConnectivity {
            kind: Connectivity::Bluetooth,
            on: false,
        },
    },
    IntentRule {
        name: "history-open",
        predicate: |t| any(t, HISTORY_NOUNS) && any(t, &["göster", "aç", "oku"]),
        build: |_| LocalAction::OpenHistory {
            filter: String::new(),
        },
    },
    IntentRule {
        name: "history-clear",
        predicate: |t| any(t, HISTORY_NOUNS) && any(t, &["temizle", "sil", "kapat"]),
        build: |_| LocalAction::ClearHistory,
    },
    IntentRule {
        name: "update-check",
        predicate: |t| any(t, UPDATE_NOUNS) && any(t, &["kontrol", "var mı", "bak"]),
        build: |_| LocalAction::CheckForUpdates,
    },
];

pub struct IntentRouter {
    assistant_name: String,
    clock: Arc<dyn Clock>,
}

impl IntentRouter {
    pub fn new(assistant_name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            clock,
        }
    }

    pub fn rules() -> &'static [IntentRule] {
        RULES
    }

    /// First rule matching `text`, if any.
    pub fn matching_rule(text: &str) -> Option<&'static IntentRule> {
        RULES.iter().find(|rule| rule.matches(text))
    }

    /// Classify a normalized utterance. `None` means "ask the remote model".
    pub fn route(&self, text: &str) -> Option<LocalAction> {
        let rule = Self::matching_rule(text)?;
        let ctx = RouteContext {
            text,
            now: self.clock.now().naive_local(),
            assistant_name: &self.assistant_name,
        };
        tracing::debug!("Rule '{}' matched '{text}'", rule.name);
        Some((rule.build)(&ctx))
    }
}

const CASE_SUFFIXES: &[&str] = &[
    "'yi", "'yı", "'yu", "'yü", "'i", "'ı", "'u", "'ü", "'a", "'e", "'ya", "'ye",
];

/// Contact name from a call command: "ahmet'i ara" → "ahmet".
pub fn extract_contact_name(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| *word != "ara")
        .map(|word| {
            CASE_SUFFIXES
                .iter()
                .find_map(|suffix| word.strip_suffix(suffix))
                .unwrap_or(word)
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

const TITLE_STOPWORDS: &[&str] = &[
    "bana", "ekle", "kur", "yarın", "bugün", "saat", "buçuk", "buçukta", "yarım", "akşam",
    "gece", "sabah", "öğleden", "sonra", "dakika", "dk", "de", "da", "te", "ta",
];
const TITLE_COMMAND_STEMS: &[&str] = &["hatırlat", "anımsat"];
const LOCATIVE_SUFFIXES: &[&str] = &["'de", "'da", "'te", "'ta"];

/// Reminder title from the command: "yarın saat 9'da ilaç almamı hatırlat" → "İlaç almamı".
pub fn extract_reminder_title(text: &str) -> String {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_ascii_digit()).collect::<String>())
        .filter(|word| {
            !word.is_empty()
                && !TITLE_STOPWORDS.contains(&word.as_str())
                && !LOCATIVE_SUFFIXES.contains(&word.as_str())
                && !TITLE_COMMAND_STEMS.iter().any(|stem| word.starts_with(stem))
                && !word.chars().all(|c| c.is_ascii_punctuation())
        })
        .collect();

    if words.is_empty() {
        "Hatırlatma".to_string()
    } else {
        capitalize_first(&words.join(" "))
    }
}

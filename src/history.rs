//! Chat history: a bounded, persisted log of user and assistant turns.
//!
//! Entries are kept in insertion order under the `chat_history` key of the
//! state store. Once the log grows past `max_items`, the oldest entries go
//! first. Pairing, filtering and statistics are computed on every read.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::normalizer::{fold_case, upper_case};
use crate::storage::{KeyValueStore, KEY_CHAT_HISTORY};

pub const DEFAULT_MAX_ITEMS: usize = 100;

const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M";
const USER_LABEL: &str = "Ben";
/// Later lines of a multi-line message are indented in exports so they can
/// never be mistaken for a message or date header.
const CONTINUATION_INDENT: &str = "  ";
const CONTINUATION_BREAK: &str = "\n  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    fn storage_label(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// One recorded message. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub sender: Sender,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// "dd/mm/yyyy"
    pub date: String,
    /// "HH:MM"
    pub time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
}

/// A display unit. `index` is the structural position of the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryItem {
    Pair {
        index: usize,
        user: ChatEntry,
        assistant: ChatEntry,
    },
    Single {
        index: usize,
        entry: ChatEntry,
    },
}

impl HistoryItem {
    pub fn index(&self) -> usize {
        match self {
            HistoryItem::Pair { index, .. } | HistoryItem::Single { index, .. } => *index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    pub items: Vec<HistoryItem>,
    /// Always computed over the whole log, regardless of the filter.
    pub stats: HistoryStats,
}

pub struct HistoryStore {
    entries: Mutex<Vec<ChatEntry>>,
    store: Arc<KeyValueStore>,
    clock: Arc<dyn Clock>,
    assistant_name: String,
    max_items: usize,
}

impl HistoryStore {
    /// Restore the persisted log. A missing or malformed value starts empty.
    pub fn load(
        store: Arc<KeyValueStore>,
        clock: Arc<dyn Clock>,
        assistant_name: impl Into<String>,
        max_items: usize,
    ) -> Self {
        let mut entries = store
            .get::<Vec<ChatEntry>>(KEY_CHAT_HISTORY)
            .unwrap_or_default();
        let max_items = max_items.max(1);
        if entries.len() > max_items {
            let excess = entries.len() - max_items;
            entries.drain(..excess);
        }
        debug!("Loaded {} history entries", entries.len());

        Self {
            entries: Mutex::new(entries),
            store,
            clock,
            assistant_name: assistant_name.into(),
            max_items,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &[ChatEntry]) -> Result<()> {
        self.store.set(KEY_CHAT_HISTORY, &entries)
    }

    /// Record a message. Returns `false` when it is too short to keep.
    pub fn append(&self, sender: Sender, message: &str) -> Result<bool> {
        let message = message.trim();
        if message.chars().count() < 2 {
            return Ok(false);
        }

        let now = self.clock.now();
        let entry = ChatEntry {
            sender,
            message: message.to_string(),
            timestamp: now.timestamp_millis(),
            date: now.format(DATE_FORMAT).to_string(),
            time: now.format(TIME_FORMAT).to_string(),
        };

        let mut entries = self.lock();
        entries.push(entry);
        if entries.len() > self.max_items {
            let excess = entries.len() - self.max_items;
            entries.drain(..excess);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the whole log in chronological order.
    pub fn entries(&self) -> Vec<ChatEntry> {
        self.lock().clone()
    }

    /// Paired, filtered view plus stats over the unfiltered log.
    ///
    /// The filter is a case-insensitive substring match over the message and
    /// the sender. A pair is shown whole when either half matches.
    pub fn query(&self, filter: &str) -> HistoryView {
        let entries = self.lock();
        let needle = fold_case(filter.trim());
        let matches = |entry: &ChatEntry| {
            needle.is_empty()
                || fold_case(&entry.message).contains(&needle)
                || entry.sender.storage_label().contains(&needle)
                || fold_case(self.display_sender(entry.sender)).contains(&needle)
        };

        let mut items = Vec::new();
        let mut i = 0;
        while i < entries.len() {
            let current = &entries[i];
            let next = entries.get(i + 1);
            match next {
                Some(reply)
                    if current.sender == Sender::User && reply.sender == Sender::Assistant =>
                {
                    if matches(current) || matches(reply) {
                        items.push(HistoryItem::Pair {
                            index: i,
                            user: current.clone(),
                            assistant: reply.clone(),
                        });
                    }
                    i += 2;
                }
                _ => {
                    if matches(current) {
                        items.push(HistoryItem::Single {
                            index: i,
                            entry: current.clone(),
                        });
                    }
                    i += 1;
                }
            }
        }

        HistoryView {
            items,
            stats: self.stats_of(&entries),
        }
    }

    fn stats_of(&self, entries: &[ChatEntry]) -> HistoryStats {
        let now = self.clock.now();
        let today = now.format(DATE_FORMAT).to_string();
        let week_ago = now.naive_local() - Duration::days(7);

        let today_count = entries.iter().filter(|e| e.date == today).count();
        let week_count = entries
            .iter()
            .filter_map(|e| NaiveDate::parse_from_str(&e.date, DATE_FORMAT).ok())
            .filter_map(|d| d.and_hms_opt(0, 0, 0))
            .filter(|start| *start > week_ago)
            .count();

        HistoryStats {
            total: entries.len(),
            today: today_count,
            this_week: week_count,
        }
    }

    /// Remove one entry. Out-of-range indices are a no-op returning `false`.
    pub fn delete_at(&self, index: usize) -> Result<bool> {
        let mut entries = self.lock();
        if index >= entries.len() {
            debug!("Ignoring delete of stale index {index} (len {})", entries.len());
            return Ok(false);
        }
        entries.remove(index);
        self.persist(&entries)?;
        Ok(true)
    }

    /// Remove the entries at `index` and `index + 1`, both or neither.
    pub fn delete_pair(&self, index: usize) -> Result<bool> {
        let mut entries = self.lock();
        if entries.len() < 2 || index > entries.len() - 2 {
            debug!("Ignoring pair delete at stale index {index} (len {})", entries.len());
            return Ok(false);
        }
        entries.drain(index..index + 2);
        self.persist(&entries)?;
        Ok(true)
    }

    /// Empty the log. Returns whether there was anything to remove.
    pub fn clear(&self) -> Result<bool> {
        let mut entries = self.lock();
        let had_entries = !entries.is_empty();
        entries.clear();
        self.persist(&entries)?;
        if had_entries {
            info!("Chat history cleared");
        }
        Ok(had_entries)
    }

    fn display_sender(&self, sender: Sender) -> &str {
        match sender {
            Sender::User => USER_LABEL,
            Sender::Assistant => &self.assistant_name,
        }
    }

    /// Plain-text dump of the whole log grouped by date.
    pub fn export(&self) -> String {
        let entries = self.lock();
        let now = self.clock.now();

        let mut out = String::new();
        out.push_str(&format!(
            "=== {} SOHBET GEÇMİŞİ ===\n",
            upper_case(&self.assistant_name)
        ));
        out.push_str(&format!(
            "Dışa Aktarım Tarihi: {}\n",
            now.format("%d/%m/%Y %H:%M")
        ));
        out.push_str(&format!("Toplam Mesaj: {}\n", entries.len()));
        out.push_str("================================\n");

        let mut current_date: Option<&str> = None;
        for entry in entries.iter() {
            if current_date != Some(entry.date.as_str()) {
                out.push_str(&format!("\n--- {} ---\n\n", entry.date));
                current_date = Some(entry.date.as_str());
            }
            out.push_str(&format!(
                "[{}] {}: {}\n\n",
                entry.time,
                self.display_sender(entry.sender),
                entry.message.replace('\n', CONTINUATION_BREAK)
            ));
        }
        out
    }
}

/// One message recovered from an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedMessage {
    pub date: String,
    pub time: String,
    pub sender: Sender,
    pub message: String,
}

static SECTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--- (\d{2}/\d{2}/\d{4}) ---$").expect("valid regex"));
static MESSAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{2}:\d{2})\] (.+?): (.*)$").expect("valid regex"));

/// Read an [`HistoryStore::export`] dump back into messages.
///
/// Indented lines continue the message above them, so multi-line messages
/// survive even when they contain header-shaped text. Unindented lines that
/// are neither headers nor messages are separators and ignored.
pub fn parse_export(text: &str) -> Vec<ExportedMessage> {
    let mut messages: Vec<ExportedMessage> = Vec::new();
    let mut date: Option<String> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(CONTINUATION_INDENT) {
            if let Some(last) = messages.last_mut() {
                last.message.push('\n');
                last.message.push_str(rest);
            }
            continue;
        }
        if let Some(caps) = SECTION_LINE.captures(line) {
            finish_message(&mut messages);
            date = Some(caps[1].to_string());
            continue;
        }
        let Some(date) = &date else {
            continue;
        };
        if let Some(caps) = MESSAGE_LINE.captures(line) {
            finish_message(&mut messages);
            let sender = if &caps[2] == USER_LABEL {
                Sender::User
            } else {
                Sender::Assistant
            };
            messages.push(ExportedMessage {
                date: date.clone(),
                time: caps[1].to_string(),
                sender,
                message: caps[3].to_string(),
            });
        }
    }
    finish_message(&mut messages);
    messages
}

fn finish_message(messages: &mut [ExportedMessage]) {
    if let Some(last) = messages.last_mut() {
        let trimmed = last.message.trim_end().len();
        last.message.truncate(trimmed);
    }
}

/// Which history queries are currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PanelState {
    #[default]
    Closed,
    Open {
        filter: String,
    },
}

/// History panel. Every open or filter change re-reads the whole view.
#[derive(Debug, Default)]
pub struct HistoryPanel {
    state: PanelState,
}

impl HistoryPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, PanelState::Open { .. })
    }

    /// Open (or reopen) with an empty filter.
    pub fn open(&mut self, history: &HistoryStore) -> HistoryView {
        self.state = PanelState::Open {
            filter: String::new(),
        };
        history.query("")
    }

    /// Change the filter. Only legal while open; `None` when closed.
    pub fn set_filter(&mut self, history: &HistoryStore, filter: &str) -> Option<HistoryView> {
        match &mut self.state {
            PanelState::Closed => None,
            PanelState::Open { filter: current } => {
                *current = filter.to_string();
                Some(history.query(filter))
            }
        }
    }

    pub fn close(&mut self) {
        self.state = PanelState::Closed;
    }
}

//! Interactive stdin loop: each line is an utterance unless it is a slash command.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::assistant::{Assistant, TurnOutcome, READY_PROMPT};
use crate::error::AssistantError;
use crate::history::{HistoryItem, HistoryView};
use crate::models::{display_model_name, model_description};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Utterance(String),
    Stop,
    Reset,
    History(String),
    Export,
    Delete(usize),
    DeletePair(usize),
    Model(String),
    Models,
    Login { username: String, password: String },
    Logout,
    Web(bool),
    SkipUpdate(String),
    Help,
    Quit,
    Invalid(String),
}

pub const HELP: &str = "\
/stop                durdur
/reset               sohbeti ve geçmişi sıfırla
/history [filtre]    geçmişi göster
/export              geçmişi metin olarak yazdır
/delete <i>          tek mesajı sil
/delete-pair <i>     soru-cevap çiftini sil
/model <id>          modeli değiştir
/models              sunucudaki modelleri listele
/login <ad> <şifre>  sunucuya giriş yap
/logout              oturumu kapat
/web on|off          web aramasını aç/kapat
/skip-update <sürüm> bu sürümü bir daha sorma
/quit                çık";

impl ConsoleCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Utterance(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let index = || {
            arg.parse::<usize>()
                .map_err(|_| format!("geçersiz sıra numarası: '{arg}'"))
        };

        let command = match name {
            "stop" => Self::Stop,
            "reset" => Self::Reset,
            "history" => Self::History(arg.to_string()),
            "export" => Self::Export,
            "delete" => index().map(Self::Delete).unwrap_or_else(Self::Invalid),
            "delete-pair" => index().map(Self::DeletePair).unwrap_or_else(Self::Invalid),
            "model" if arg.is_empty() => Self::Invalid("kullanım: /model <id>".into()),
            "model" => Self::Model(arg.to_string()),
            "models" => Self::Models,
            "login" => match arg.split_whitespace().collect::<Vec<_>>().as_slice() {
                [username, password] => Self::Login {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => Self::Invalid("kullanım: /login <kullanıcı> <şifre>".into()),
            },
            "logout" => Self::Logout,
            "web" => match arg {
                "on" => Self::Web(true),
                "off" => Self::Web(false),
                _ => Self::Invalid("kullanım: /web on|off".into()),
            },
            "skip-update" if arg.is_empty() => {
                Self::Invalid("kullanım: /skip-update <sürüm>".into())
            }
            "skip-update" => Self::SkipUpdate(arg.to_string()),
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Invalid(format!("bilinmeyen komut: /{name}")),
        };
        Some(command)
    }
}

/// Text rendering of a history view, newest last.
pub fn render_history(view: &HistoryView, assistant_name: &str) -> String {
    let mut lines = vec![format!(
        "Toplam: {} | Bugün: {} | Bu hafta: {}",
        view.stats.total, view.stats.today, view.stats.this_week
    )];

    if view.items.is_empty() {
        lines.push("(eşleşen mesaj yok)".to_string());
    }
    for item in &view.items {
        match item {
            HistoryItem::Pair {
                index,
                user,
                assistant,
            } => {
                lines.push(format!("[#{index}] {} {}", user.date, user.time));
                lines.push(format!("  Ben: {}", user.message));
                lines.push(format!("  {assistant_name}: {}", assistant.message));
            }
            HistoryItem::Single { index, entry } => {
                let who = match entry.sender {
                    crate::history::Sender::User => "Ben",
                    crate::history::Sender::Assistant => assistant_name,
                };
                lines.push(format!("[#{index}] {} {}", entry.date, entry.time));
                lines.push(format!("  {who}: {}", entry.message));
            }
        }
    }
    lines.join("\n")
}

/// Model picker lines; the selected model is starred.
pub fn render_models(models: &[String], selected: Option<&str>) -> String {
    if models.is_empty() {
        return "(sunucu model sunmuyor)".to_string();
    }
    models
        .iter()
        .map(|id| {
            let marker = if Some(id.as_str()) == selected { "*" } else { " " };
            format!(
                "{marker} {id}: {} - {}",
                display_model_name(id),
                model_description(id)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read stdin until EOF or `/quit`.
pub async fn run(assistant: Arc<Assistant>) -> std::io::Result<()> {
    run_with(assistant, BufReader::new(tokio::io::stdin())).await
}

/// Console loop over any line source.
///
/// A stop while waiting for input cancels that listen and starts a fresh one,
/// so the next line typed afterwards is still handled.
pub async fn run_with<R>(assistant: Arc<Assistant>, input: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    assistant.say(READY_PROMPT, false);
    println!("Yardım için /help yazın.");

    loop {
        let ticket = assistant.begin_listening();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = assistant.stopped() => {
                println!("Dinleme iptal edildi.");
                continue;
            }
        };
        let Some(line) = line else {
            break;
        };
        if !assistant.listen_is_current(ticket) {
            info!("Dropping input from a cancelled listen");
            println!("Dinleme iptal edildi, satır işlenmedi.");
            continue;
        }
        let Some(command) = ConsoleCommand::parse(&line) else {
            continue;
        };

        match command {
            ConsoleCommand::Utterance(text) => {
                if let TurnOutcome::Remote {
                    thought: Some(thought),
                    ..
                } = assistant.handle_utterance(&text).await
                {
                    info!("Thought: {thought}");
                }
            }
            ConsoleCommand::Stop => assistant.stop(),
            ConsoleCommand::Reset => match assistant.reset() {
                Ok(()) => println!("Sohbet sıfırlandı."),
                Err(e) => warn!("Reset failed: {e}"),
            },
            ConsoleCommand::History(filter) => {
                let view = assistant.open_history(&filter);
                println!("{}", render_history(&view, assistant.name()));
            }
            ConsoleCommand::Export => println!("{}", assistant.history().export()),
            ConsoleCommand::Delete(index) => report_delete(assistant.history().delete_at(index)),
            ConsoleCommand::DeletePair(index) => {
                report_delete(assistant.history().delete_pair(index))
            }
            ConsoleCommand::Model(id) => match assistant.select_model(&id) {
                Ok(name) => println!("Model: {name}. {}", model_description(&id)),
                Err(e) => warn!("Failed to select model: {e}"),
            },
            ConsoleCommand::Models => match assistant.available_models().await {
                Ok(models) => {
                    let selected = assistant.app_state().selected_model();
                    println!("{}", render_models(&models, selected.as_deref()));
                }
                Err(e) => {
                    warn!("Failed to fetch models: {e}");
                    println!("Modeller alınamadı.");
                }
            },
            ConsoleCommand::Login { username, password } => {
                match assistant.login(&username, &password).await {
                    Ok(()) => println!("Giriş başarılı! Hoş geldin {username}"),
                    Err(AssistantError::Remote { message, .. }) => {
                        println!("Giriş başarısız: {message}")
                    }
                    Err(e) => {
                        warn!("Login failed: {e}");
                        println!("Bağlantı hatası.");
                    }
                }
            }
            ConsoleCommand::Logout => match assistant.logout() {
                Ok(()) => println!("Oturum kapatıldı."),
                Err(e) => warn!("Logout failed: {e}"),
            },
            ConsoleCommand::Web(enabled) => {
                if let Err(e) = assistant.set_web_search(enabled) {
                    warn!("Failed to toggle web search: {e}");
                }
            }
            ConsoleCommand::SkipUpdate(version) => {
                if let Err(e) = assistant.skip_update(&version) {
                    warn!("Failed to skip update: {e}");
                }
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Invalid(message) => println!("{message}"),
        }
    }

    assistant.close_history();
    info!("Console closed");
    Ok(())
}

fn report_delete(result: crate::error::Result<bool>) {
    match result {
        Ok(true) => println!("Silindi."),
        Ok(false) => println!("Silme başarısız."),
        Err(e) => warn!("Delete failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::clock::{Clock, FixedClock};
    use crate::config::RemoteConfig;
    use crate::history::{ChatEntry, HistoryStats, HistoryStore, Sender};
    use crate::platform::LoggingPlatform;
    use crate::remote::RemoteChatClient;
    use crate::speech::testing::RecordingEngine;
    use crate::speech::SpeechOutputQueue;
    use crate::storage::KeyValueStore;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    fn test_assistant() -> Arc<Assistant> {
        let now = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at(now));
        let store = Arc::new(KeyValueStore::in_memory());
        let history = Arc::new(HistoryStore::load(store.clone(), clock.clone(), "Niko", 100));
        let idle = Arc::new(Notify::new());
        let queue = Arc::new(SpeechOutputQueue::new(
            Arc::new(RecordingEngine::new(idle.clone())),
            idle,
        ));
        Arc::new(Assistant::new(
            "Niko",
            clock,
            Arc::new(AppState::load(store)),
            history,
            queue,
            RemoteChatClient::new(RemoteConfig::default()).unwrap(),
            Arc::new(LoggingPlatform),
        ))
    }

    #[test]
    fn plain_lines_are_utterances() {
        assert_eq!(
            ConsoleCommand::parse("  saat kaç  "),
            Some(ConsoleCommand::Utterance("saat kaç".into()))
        );
        assert_eq!(ConsoleCommand::parse("   "), None);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(ConsoleCommand::parse("/stop"), Some(ConsoleCommand::Stop));
        assert_eq!(
            ConsoleCommand::parse("/history hava durumu"),
            Some(ConsoleCommand::History("hava durumu".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("/history"),
            Some(ConsoleCommand::History(String::new()))
        );
        assert_eq!(ConsoleCommand::parse("/delete 3"), Some(ConsoleCommand::Delete(3)));
        assert_eq!(
            ConsoleCommand::parse("/delete-pair 0"),
            Some(ConsoleCommand::DeletePair(0))
        );
        assert_eq!(ConsoleCommand::parse("/web off"), Some(ConsoleCommand::Web(false)));
        assert_eq!(
            ConsoleCommand::parse("/model kumru"),
            Some(ConsoleCommand::Model("kumru".into()))
        );
        assert_eq!(ConsoleCommand::parse("/quit"), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn account_and_model_commands() {
        assert_eq!(ConsoleCommand::parse("/models"), Some(ConsoleCommand::Models));
        assert_eq!(ConsoleCommand::parse("/logout"), Some(ConsoleCommand::Logout));
        assert_eq!(
            ConsoleCommand::parse("/login ayse gizli"),
            Some(ConsoleCommand::Login {
                username: "ayse".into(),
                password: "gizli".into(),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("/login ayse"),
            Some(ConsoleCommand::Invalid("kullanım: /login <kullanıcı> <şifre>".into()))
        );
    }

    #[test]
    fn missing_arguments_print_usage() {
        assert_eq!(
            ConsoleCommand::parse("/model"),
            Some(ConsoleCommand::Invalid("kullanım: /model <id>".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("/skip-update  "),
            Some(ConsoleCommand::Invalid("kullanım: /skip-update <sürüm>".into()))
        );
    }

    #[test]
    fn renders_model_picker() {
        let models = vec!["kumru:latest".to_string(), "phi3".to_string()];
        assert_eq!(
            render_models(&models, Some("phi3")),
            "  kumru:latest: Kumru - Akıcı ve son derece doğal Türkçe sohbet yeteneği.\n\
             * phi3: Phi3 - Genel amaçlı yapay zeka yardımcısı."
        );
        assert_eq!(render_models(&[], None), "(sunucu model sunmuyor)");
    }

    #[tokio::test]
    async fn stop_while_idle_keeps_next_line() {
        let assistant = test_assistant();
        let (mut writer, reader) = tokio::io::duplex(256);
        let console = tokio::spawn(run_with(assistant.clone(), BufReader::new(reader)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assistant.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.write_all("saat kaç\n/quit\n".as_bytes()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), console)
            .await
            .expect("console exits on /quit")
            .unwrap()
            .unwrap();
        let messages: Vec<String> = assistant
            .history()
            .entries()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["saat kaç", "Saat şu an 10:00"]);
    }

    #[test]
    fn malformed_commands_are_invalid() {
        assert!(matches!(
            ConsoleCommand::parse("/delete x"),
            Some(ConsoleCommand::Invalid(_))
        ));
        assert!(matches!(
            ConsoleCommand::parse("/web maybe"),
            Some(ConsoleCommand::Invalid(_))
        ));
        assert!(matches!(
            ConsoleCommand::parse("/model"),
            Some(ConsoleCommand::Invalid(_))
        ));
        assert!(matches!(
            ConsoleCommand::parse("/dance"),
            Some(ConsoleCommand::Invalid(_))
        ));
    }

    #[test]
    fn renders_pairs_and_singles() {
        let entry = |sender, message: &str| ChatEntry {
            sender,
            message: message.into(),
            timestamp: 0,
            date: "14/03/2026".into(),
            time: "10:00".into(),
        };
        let view = HistoryView {
            items: vec![
                HistoryItem::Pair {
                    index: 0,
                    user: entry(Sender::User, "hi"),
                    assistant: entry(Sender::Assistant, "hello"),
                },
                HistoryItem::Single {
                    index: 2,
                    entry: entry(Sender::User, "bye"),
                },
            ],
            stats: HistoryStats {
                total: 3,
                today: 3,
                this_week: 3,
            },
        };

        assert_eq!(
            render_history(&view, "Niko"),
            "Toplam: 3 | Bugün: 3 | Bu hafta: 3\n\
             [#0] 14/03/2026 10:00\n  Ben: hi\n  Niko: hello\n\
             [#2] 14/03/2026 10:00\n  Ben: bye"
        );
    }
}

//! Operator control over Telegram
//!
//! The listener long-polls the bot for messages, serves only the configured
//! chat, and hands parsed commands to the handler. Manual buys and sells go
//! through the same gateway entry points as the engine.

pub mod command;
pub mod logs;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::notify::telegram::Update;
use crate::notify::{Notifier, TelegramNotifier};

pub use command::{help_text, Command};

/// Long-poll timeout for getUpdates
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

/// Executes commands against a running engine
pub struct CommandHandler {
    engine: Arc<Engine>,
}

impl CommandHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Run a command and return the reply text
    pub async fn handle(&self, command: Command) -> String {
        info!("Operator command: {:?}", command);

        match command {
            Command::Status => self.engine.status_report().await,
            Command::Stop => {
                if self.engine.state().set_paused(true) {
                    "Already paused.".to_string()
                } else {
                    "⏸️ Trading paused. Open positions are still monitored.".to_string()
                }
            }
            Command::Start => {
                if self.engine.state().set_paused(false) {
                    "▶️ Trading resumed.".to_string()
                } else {
                    "Already running.".to_string()
                }
            }
            Command::Buy(asset) => match self.engine.manual_buy(&asset).await {
                Ok(reply) => reply,
                Err(e) => format!("❌ {}", e),
            },
            Command::Sell(asset) => match self.engine.manual_sell(&asset).await {
                Ok(reply) => reply,
                Err(e) => format!("❌ {}", e),
            },
            Command::Logs(minutes) => self.logs(minutes).await,
            Command::Help => help_text().to_string(),
            Command::Usage(usage) => format!("Usage: {}", usage),
            Command::Unknown(name) => format!("Unknown command /{}. Try /help", name),
        }
    }

    async fn logs(&self, minutes: u32) -> String {
        let Some(file) = &self.engine.config().logging.file else {
            return "File logging is off (set logging.file).".to_string();
        };

        match logs::recent_lines(Path::new(file), minutes).await {
            Ok(lines) if lines.is_empty() => format!("No log lines in the last {} minutes.", minutes),
            Ok(lines) => format!("Last {} minutes:\n{}", minutes, lines.join("\n")),
            Err(e) => format!("❌ {}", e),
        }
    }
}

/// Polls Telegram for operator messages
pub struct CommandListener {
    telegram: Arc<TelegramNotifier>,
    handler: CommandHandler,
}

impl CommandListener {
    pub fn new(telegram: Arc<TelegramNotifier>, handler: CommandHandler) -> Self {
        Self { telegram, handler }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Listening for Telegram commands");
        let mut offset = 0i64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.telegram.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            };

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.dispatch(update).await;
                    }
                }
                Err(e) => {
                    warn!("Telegram polling failed: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_DELAY) => {}
                    }
                }
            }
        }
        debug!("Command listener stopped");
    }

    async fn dispatch(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        if !is_authorized(message.chat.id, self.telegram.chat_id()) {
            warn!("Ignoring message from unauthorized chat {}", message.chat.id);
            return;
        }
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return;
        };

        let reply = self.handler.handle(command).await;
        self.telegram.send(&reply).await;
    }
}

fn is_authorized(chat_id: i64, allowed: &str) -> bool {
    allowed.trim() == chat_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configured_chat_is_served() {
        assert!(is_authorized(12345, "12345"));
        assert!(is_authorized(-100987, " -100987 "));
        assert!(!is_authorized(12345, "54321"));
        assert!(!is_authorized(12345, ""));
    }
}

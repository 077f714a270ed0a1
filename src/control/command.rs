//! Operator command parsing

/// Accepted range for `/logs N` (minutes)
pub const MIN_LOG_MINUTES: u32 = 1;
pub const MAX_LOG_MINUTES: u32 = 60;
const DEFAULT_LOG_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    /// Pause entries
    Stop,
    /// Resume entries
    Start,
    Buy(String),
    Sell(String),
    /// Log lines from the last N minutes
    Logs(u32),
    Help,
    /// Recognized command with bad arguments; carries the usage hint
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Parse a chat message. Returns `None` for anything that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        // Group chats address commands as /status@bot_name
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let arg = parts.next();

        let command = match name.as_str() {
            "status" => Command::Status,
            "stop" | "pause" => Command::Stop,
            "start" | "resume" => Command::Start,
            "buy" => match arg {
                Some(asset) => Command::Buy(asset.to_string()),
                None => Command::Usage("/buy <ASSET>"),
            },
            "sell" => match arg {
                Some(asset) => Command::Sell(asset.to_string()),
                None => Command::Usage("/sell <ASSET>"),
            },
            "logs" => match arg.map(str::parse::<u32>) {
                None => Command::Logs(DEFAULT_LOG_MINUTES),
                Some(Ok(minutes)) => Command::Logs(minutes.clamp(MIN_LOG_MINUTES, MAX_LOG_MINUTES)),
                Some(Err(_)) => Command::Usage("/logs [minutes 1-60]"),
            },
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

pub fn help_text() -> &'static str {
    "Commands:\n\
     /status - health and open positions\n\
     /stop - pause new entries (exits keep running)\n\
     /start - resume entries\n\
     /buy <ASSET> - open a position now\n\
     /sell <ASSET> - close a position now\n\
     /logs [N] - log lines from the last N minutes (1-60)\n\
     /help - this message"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/status"), Some(Command::Status));
        assert_eq!(Command::parse("/STOP"), Some(Command::Stop));
        assert_eq!(Command::parse("/start@momentum_bot"), Some(Command::Start));
        assert_eq!(Command::parse("/buy JUP"), Some(Command::Buy("JUP".into())));
        assert_eq!(Command::parse("  /sell wif  "), Some(Command::Sell("wif".into())));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/moon"), Some(Command::Unknown("moon".into())));
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_missing_arguments_give_usage() {
        assert!(matches!(Command::parse("/buy"), Some(Command::Usage(_))));
        assert!(matches!(Command::parse("/sell"), Some(Command::Usage(_))));
        assert!(matches!(Command::parse("/logs ten"), Some(Command::Usage(_))));
    }

    #[test]
    fn test_logs_minutes_clamped() {
        assert_eq!(Command::parse("/logs"), Some(Command::Logs(5)));
        assert_eq!(Command::parse("/logs 15"), Some(Command::Logs(15)));
        assert_eq!(Command::parse("/logs 0"), Some(Command::Logs(1)));
        assert_eq!(Command::parse("/logs 500"), Some(Command::Logs(60)));
    }
}

//! Recent lines from the log file
//!
//! Understands both log formats the binary writes: plain lines that start
//! with an RFC 3339 timestamp, and JSON lines with a `timestamp` field.
//! Lines without a timestamp (wrapped messages) follow the line before them.

use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use crate::error::{Error, Result};

/// Most lines returned at once
const MAX_LINES: usize = 200;

fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let raw = if line.trim_start().starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        value.get("timestamp")?.as_str()?.to_string()
    } else {
        line.split_whitespace().next()?.to_string()
    };
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Lines logged within `minutes` of `now`, newest last
pub fn filter_recent(contents: &str, minutes: u32, now: DateTime<Utc>) -> Vec<String> {
    let cutoff = now - Duration::minutes(minutes as i64);
    let mut include = false;

    let mut lines: Vec<String> = contents
        .lines()
        .filter(|line| {
            if let Some(timestamp) = line_timestamp(line) {
                include = timestamp >= cutoff;
            }
            include && !line.trim().is_empty()
        })
        .map(str::to_string)
        .collect();

    if lines.len() > MAX_LINES {
        lines.drain(..lines.len() - MAX_LINES);
    }
    lines
}

pub async fn recent_lines(path: &Path, minutes: u32) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("read {}: {}", path.display(), e)))?;
    Ok(filter_recent(&contents, minutes, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_filters_plain_lines_by_timestamp() {
        let contents = "\
2026-10-19T11:00:00.000000Z  INFO momentum_trader: old
2026-10-19T11:56:00.000000Z  INFO momentum_trader: recent
    continuation of recent
2026-10-19T11:59:30.123456Z  WARN momentum_trader: newest
";
        let lines = filter_recent(contents, 5, at("2026-10-19T12:00:00Z"));
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("recent"));
        assert!(lines[1].contains("continuation"));
        assert!(lines[2].ends_with("newest"));
    }

    #[test]
    fn test_filters_json_lines() {
        let contents = r#"{"timestamp":"2026-10-19T11:00:00Z","level":"INFO","fields":{"message":"old"}}
{"timestamp":"2026-10-19T11:58:00Z","level":"INFO","fields":{"message":"new"}}"#;
        let lines = filter_recent(contents, 10, at("2026-10-19T12:00:00Z"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("new"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = recent_lines(&dir.path().join("absent.log"), 5).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

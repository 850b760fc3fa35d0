//! One line of the JSONL log.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A self-contained log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp with milliseconds, UTC
    pub ts: String,
    /// trace, debug, info, warn or error
    pub level: String,
    /// Which client process wrote it
    pub instance: String,
    /// Module path of the event
    pub target: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Enclosing spans, root first, joined with " > "
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(
        level: impl Into<String>,
        instance: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            instance: instance.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_parts_are_omitted() {
        let json = LogEntry::new("info", "cli", "boxchat_core::sync", "poll cycle")
            .to_json_line()
            .unwrap();
        assert!(json.contains("\"msg\":\"poll cycle\""));
        assert!(!json.contains("fields"));
        assert!(!json.contains("span"));
    }

    #[test]
    fn test_fields_survive_parse() {
        let entry = LogEntry::new("warn", "cli", "boxchat_core::sync", "acknowledgement failed")
            .with_fields(serde_json::json!({ "count": 3 }))
            .with_span("sync");
        let parsed = LogEntry::from_json_line(&entry.to_json_line().unwrap()).unwrap();
        assert_eq!(parsed, entry);
    }
}

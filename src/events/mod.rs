//! Structured log events as produced by the (external) template-mining stage,
//! plus timestamp derivation and session-key extraction.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default HDFS block identifier pattern.
pub const BLOCK_ID_PATTERN: &str = r"blk_-?\d+";

/// One parsed log line. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the source (arrival order)
    pub line_id: usize,
    /// `None` when the raw timestamp could not be parsed
    pub timestamp: Option<NaiveDateTime>,
    pub event_type: String,
    /// Free-text content, session keys are extracted from it
    pub content: String,
    /// Remaining raw columns
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl Event {
    pub fn new(
        line_id: usize,
        timestamp: Option<NaiveDateTime>,
        event_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            line_id,
            timestamp,
            event_type: event_type.into(),
            content: content.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Extracts a session key as the first regex match in the event content.
#[derive(Debug, Clone)]
pub struct RegexKeyExtractor {
    regex: Regex,
}

impl RegexKeyExtractor {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// HDFS block id extractor (`blk_-?\d+`).
    pub fn block_id() -> Result<Self, regex::Error> {
        Self::new(BLOCK_ID_PATTERN)
    }

    pub fn extract(&self, event: &Event) -> Option<String> {
        self.regex
            .find(&event.content)
            .map(|m| m.as_str().to_string())
    }
}

/// Parse a timestamp with a chrono format; `None` on failure.
pub fn parse_timestamp(raw: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), format).ok()
}

/// Derive a timestamp from HDFS `Date` (yyMMdd) and `Time` (HHMMSS) fields.
/// Both are zero-padded to six digits first since numeric exports drop
/// leading zeros (`81109` -> `081109`).
pub fn hdfs_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    let time = time.trim();
    if date.is_empty() || time.is_empty() || date.len() > 6 || time.len() > 6 {
        return None;
    }
    let joined = format!("{:0>6}{:0>6}", date, time);
    NaiveDateTime::parse_from_str(&joined, "%y%m%d%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_bgl_timestamp() {
        let ts = parse_timestamp("2005-06-03-15.42.50.675872", "%Y-%m-%d-%H.%M.%S%.f").unwrap();
        let expected = NaiveDate::from_ymd_opt(2005, 6, 3)
            .unwrap()
            .and_hms_micro_opt(15, 42, 50, 675_872)
            .unwrap();
        assert_eq!(ts, expected);
        assert!(parse_timestamp("garbage", "%Y-%m-%d-%H.%M.%S%.f").is_none());
    }

    #[test]
    fn derives_hdfs_timestamp_with_padding() {
        let ts = hdfs_timestamp("81109", "203615").unwrap();
        let expected = NaiveDate::from_ymd_opt(2008, 11, 9)
            .unwrap()
            .and_hms_opt(20, 36, 15)
            .unwrap();
        assert_eq!(ts, expected);

        let early = hdfs_timestamp("081110", "5").unwrap();
        assert_eq!(early.format("%H:%M:%S").to_string(), "00:00:05");
        assert!(hdfs_timestamp("", "203615").is_none());
        assert!(hdfs_timestamp("081399", "203615").is_none());
    }

    #[test]
    fn extracts_first_block_id() {
        let ex = RegexKeyExtractor::block_id().unwrap();
        let e = Event::new(
            0,
            None,
            "E5",
            "Receiving block blk_-1608999687919862906 src: /10.250.19.102 blk_42",
        );
        assert_eq!(ex.extract(&e).as_deref(), Some("blk_-1608999687919862906"));
        let none = Event::new(1, None, "E1", "Verification succeeded");
        assert!(ex.extract(&none).is_none());
    }
}

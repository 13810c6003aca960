//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber: JSON lines to stdout, level from RUST_LOG or default.
    /// A second call is a no-op.
    pub fn init(json: bool, default_level: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let installed = if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stdout);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
                .try_init()
        };
        if installed.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    }

    /// Emit a single structured record (e.g. a fold report) without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(w, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Serialize)]
    struct Record {
        fold: usize,
        pr_auc: Option<f64>,
    }

    #[test]
    fn emits_one_object_per_line() {
        let mut buf = Vec::new();
        StructuredLogger::emit_json(&Record { fold: 1, pr_auc: Some(0.5) }, &mut buf).unwrap();
        StructuredLogger::emit_json(&Record { fold: 2, pr_auc: None }, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["pr_auc"], 0.5);
        assert!(lines[1]["pr_auc"].is_null());
    }

    #[test]
    fn init_twice_does_not_panic() {
        StructuredLogger::init(false, "warn");
        StructuredLogger::init(true, "warn");
    }
}

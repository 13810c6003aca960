//! CSV readers for the structured event source, label tables and
//! externally supplied feature importances.

use crate::config::{InputConfig, TimestampSource};
use crate::error::{PipelineError, Result};
use crate::events::{hdfs_timestamp, parse_timestamp, Event};
use crate::features::LabelTable;
use csv::{ReaderBuilder, StringRecord};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

fn column_index(headers: &StringRecord, column: &str, source_name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| PipelineError::missing_column(column, source_name))
}

fn open(path: &Path) -> Result<File> {
    Ok(File::open(path)?)
}

/// Load the structured event CSV named in `config`.
pub fn load_events(config: &InputConfig) -> Result<Vec<Event>> {
    let source_name = config.structured_csv.display().to_string();
    read_events(open(&config.structured_csv)?, config, &source_name)
}

/// Parse structured events. The event-type, content and timestamp columns
/// are required; every other column lands in [`Event::fields`].
/// Unparseable timestamps yield `None` and are counted.
pub fn read_events<R: Read>(reader: R, config: &InputConfig, source_name: &str) -> Result<Vec<Event>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let type_idx = column_index(&headers, &config.event_type_column, source_name)?;
    let content_idx = column_index(&headers, &config.content_column, source_name)?;
    let ts_idx: Vec<usize> = match &config.timestamp {
        TimestampSource::Column { name, .. } => vec![column_index(&headers, name, source_name)?],
        TimestampSource::DateTime {
            date_column,
            time_column,
        } => vec![
            column_index(&headers, date_column, source_name)?,
            column_index(&headers, time_column, source_name)?,
        ],
    };

    let mut events = Vec::new();
    let mut unparsed = 0usize;
    for (line_id, record) in rdr.records().enumerate() {
        let record = record?;
        let get = |i: usize| record.get(i).unwrap_or("");
        let timestamp = match &config.timestamp {
            TimestampSource::Column { format, .. } => parse_timestamp(get(ts_idx[0]), format),
            TimestampSource::DateTime { .. } => hdfs_timestamp(get(ts_idx[0]), get(ts_idx[1])),
        };
        if timestamp.is_none() {
            unparsed += 1;
        }
        let fields: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != type_idx && *i != content_idx && !ts_idx.contains(i))
            .map(|(i, h)| (h.to_string(), get(i).to_string()))
            .collect();
        events.push(Event {
            line_id,
            timestamp,
            event_type: get(type_idx).to_string(),
            content: get(content_idx).to_string(),
            fields,
        });
    }

    if events.is_empty() {
        return Err(PipelineError::EmptyInput(format!("{source_name} holds no events")));
    }
    if unparsed > 0 {
        warn!(source = source_name, unparsed, "events with unparseable timestamp");
    }
    info!(source = source_name, events = events.len(), "structured events loaded");
    Ok(events)
}

/// Load a `key,label` table from a CSV file.
pub fn load_label_table(path: &Path, key_column: &str, label_column: &str) -> Result<LabelTable> {
    let source_name = path.display().to_string();
    read_label_table(open(path)?, key_column, label_column, &source_name)
}

pub fn read_label_table<R: Read>(
    reader: R,
    key_column: &str,
    label_column: &str,
    source_name: &str,
) -> Result<LabelTable> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let key_idx = column_index(&headers, key_column, source_name)?;
    let label_idx = column_index(&headers, label_column, source_name)?;

    let mut pairs = Vec::new();
    for record in rdr.records() {
        let record = record?;
        pairs.push((
            record.get(key_idx).unwrap_or("").trim().to_string(),
            record.get(label_idx).unwrap_or("").to_string(),
        ));
    }
    let table = LabelTable::from_pairs(pairs)?;
    info!(source = source_name, labels = table.len(), "label table loaded");
    Ok(table)
}

pub fn load_importances(path: &Path) -> Result<HashMap<String, f64>> {
    let source_name = path.display().to_string();
    read_importances(open(path)?, &source_name)
}

/// `feature,importance` rows into a lookup table.
pub fn read_importances<R: Read>(reader: R, source_name: &str) -> Result<HashMap<String, f64>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let feature_idx = column_index(&headers, "feature", source_name)?;
    let score_idx = column_index(&headers, "importance", source_name)?;

    let mut out = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        let feature = record.get(feature_idx).unwrap_or("").trim().to_string();
        let raw = record.get(score_idx).unwrap_or("").trim();
        let score: f64 = raw.parse().map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "{source_name}: importance '{raw}' of '{feature}' is not a number"
            ))
        })?;
        out.insert(feature, score);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Label;
    use chrono::NaiveDate;

    const BGL: &str = "\
LineId,Label,Timestamp,EventId,Content
1,-,2005-06-03-15.42.50.675872,E1,instruction cache parity error corrected
2,KERNDTLB,2005-06-03-15.43.10.000000,E7,data TLB error interrupt
3,-,not-a-time,E1,instruction cache parity error corrected
";

    #[test]
    fn reads_events_with_extra_fields() {
        let events = read_events(BGL.as_bytes(), &InputConfig::default(), "bgl.csv").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].event_type, "E7");
        assert_eq!(events[1].field("Label"), Some("KERNDTLB"));
        assert_eq!(events[1].field("LineId"), Some("2"));
        assert!(events[1].field("EventId").is_none());
        assert_eq!(
            events[0].timestamp,
            NaiveDate::from_ymd_opt(2005, 6, 3)
                .unwrap()
                .and_hms_micro_opt(15, 42, 50, 675_872)
        );
        assert_eq!(events[2].timestamp, None);
        assert_eq!(events[2].line_id, 2);
    }

    #[test]
    fn derives_hdfs_date_time_columns() {
        let csv = "\
LineId,Date,Time,EventId,Content
1,81109,203615,E5,Receiving block blk_-1608999687919862906
";
        let config = InputConfig {
            timestamp: TimestampSource::DateTime {
                date_column: "Date".into(),
                time_column: "Time".into(),
            },
            ..Default::default()
        };
        let events = read_events(csv.as_bytes(), &config, "hdfs.csv").unwrap();
        assert_eq!(
            events[0].timestamp,
            NaiveDate::from_ymd_opt(2008, 11, 9)
                .unwrap()
                .and_hms_opt(20, 36, 15)
        );
    }

    #[test]
    fn missing_column_is_schema_error() {
        let csv = "LineId,Timestamp,Content\n1,2005-06-03-15.42.50.000000,x\n";
        match read_events(csv.as_bytes(), &InputConfig::default(), "short.csv") {
            Err(PipelineError::Schema {
                column,
                source_name,
            }) => {
                assert_eq!(column, "EventId");
                assert_eq!(source_name, "short.csv");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_only_source_is_empty_input() {
        let csv = "Timestamp,EventId,Content\n";
        assert!(matches!(
            read_events(csv.as_bytes(), &InputConfig::default(), "empty.csv"),
            Err(PipelineError::EmptyInput(_))
        ));
    }

    #[test]
    fn reads_label_table() {
        let csv = "BlockId,Label\nblk_1,Normal\nblk_2,Anomaly\nblk_3,1\n";
        let table = read_label_table(csv.as_bytes(), "BlockId", "Label", "labels.csv").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("blk_2"), Some(Label::Anomaly));
        assert_eq!(table.get("blk_3"), Some(Label::Anomaly));

        let bad = "BlockId,Label\nblk_1,Suspicious\n";
        assert!(matches!(
            read_label_table(bad.as_bytes(), "BlockId", "Label", "labels.csv"),
            Err(PipelineError::LabelValue { .. })
        ));
        assert!(matches!(
            read_label_table(csv.as_bytes(), "SessionId", "Label", "labels.csv"),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn reads_importances() {
        let csv = "feature,importance\nE1,0.25\nE2,-0.01\n";
        let imp = read_importances(csv.as_bytes(), "imp.csv").unwrap();
        assert_eq!(imp["E1"], 0.25);
        assert_eq!(imp["E2"], -0.01);

        let bad = "feature,importance\nE1,high\n";
        assert!(matches!(
            read_importances(bad.as_bytes(), "imp.csv"),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}

//! Pipeline configuration: input schema, unit strategy, reduction thresholds,
//! evaluation protocol and logging.

use crate::error::{PipelineError, Result};
use crate::model::ModelKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dataset class name (e.g. "hdfs", "bgl"); drives `reduction.skip_vif_for`
    pub dataset: String,
    /// Directory receiving matrices and reports
    pub output_dir: PathBuf,
    /// Structured event source
    pub input: InputConfig,
    /// How events are grouped into units
    pub units: UnitsConfig,
    pub ordering: OrderingConfig,
    pub labels: LabelsConfig,
    pub reduction: ReductionConfig,
    pub evaluation: EvaluationConfig,
    pub importance: ImportanceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub structured_csv: PathBuf,
    pub event_type_column: String,
    pub content_column: String,
    pub timestamp: TimestampSource,
}

/// Where an event's timestamp comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimestampSource {
    /// A single column parsed with a chrono format string
    Column { name: String, format: String },
    /// HDFS-style `Date` (yyMMdd) and `Time` (HHMMSS) columns, zero-padded
    DateTime {
        date_column: String,
        time_column: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum UnitsConfig {
    Sliding {
        window_minutes: i64,
        step_minutes: i64,
    },
    Session {
        /// Metadata column holding the session key in the matrix
        key_column: String,
        /// Regex whose first match in the content field is the session key
        key_pattern: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Abort when a unit has no representative timestamp
    Error,
    /// Drop such units and report how many were dropped
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    pub unresolved: UnresolvedPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LabelSource {
    /// Separate table keyed by session identifier
    Table {
        path: PathBuf,
        key_column: String,
        label_column: String,
    },
    /// Per-event labels in the structured source; a unit is anomalous when it
    /// contains an event type that occurs on an abnormal line
    FailureEvents {
        label_column: String,
        normal_value: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub source: LabelSource,
    /// Fail when the label table holds keys that match no unit
    pub require_all_labels: bool,
    /// |corr(feature, label)| above this is reported as a leakage suspect
    pub leakage_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub correlation_enabled: bool,
    pub corr_threshold: f64,
    pub vif_enabled: bool,
    pub vif_threshold: f64,
    /// Dataset classes for which the VIF stage is skipped
    pub skip_vif_for: Vec<String>,
    /// Optional `feature,importance` CSV steering correlation tie-breaks
    pub importances_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub n_splits: usize,
    pub models: Vec<ModelKind>,
    /// Also run the 60/20/20 chronological split protocol
    pub fixed_split: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceConfig {
    pub enabled: bool,
    pub n_repeats: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: "hdfs".to_string(),
            output_dir: PathBuf::from("out"),
            input: InputConfig::default(),
            units: UnitsConfig::default(),
            ordering: OrderingConfig::default(),
            labels: LabelsConfig::default(),
            reduction: ReductionConfig::default(),
            evaluation: EvaluationConfig::default(),
            importance: ImportanceConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            structured_csv: PathBuf::from("structured.csv"),
            event_type_column: "EventId".to_string(),
            content_column: "Content".to_string(),
            timestamp: TimestampSource::default(),
        }
    }
}

impl Default for TimestampSource {
    fn default() -> Self {
        TimestampSource::Column {
            name: "Timestamp".to_string(),
            format: "%Y-%m-%d-%H.%M.%S%.f".to_string(),
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        UnitsConfig::Session {
            key_column: "BlockId".to_string(),
            key_pattern: r"blk_-?\d+".to_string(),
        }
    }
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            unresolved: UnresolvedPolicy::Error,
        }
    }
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            source: LabelSource::Table {
                path: PathBuf::from("anomaly_label.csv"),
                key_column: "BlockId".to_string(),
                label_column: "Label".to_string(),
            },
            require_all_labels: false,
            leakage_threshold: 0.8,
        }
    }
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            correlation_enabled: true,
            corr_threshold: 0.8,
            vif_enabled: true,
            vif_threshold: 10.0,
            skip_vif_for: vec!["bgl".to_string()],
            importances_csv: None,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            models: vec![
                ModelKind::RandomForest(Default::default()),
                ModelKind::LogisticRegression(Default::default()),
            ],
            fixed_split: true,
        }
    }
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_repeats: 10,
            seed: 42,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ReductionConfig {
    /// Whether the VIF stage runs for the given dataset class.
    pub fn vif_applies_to(&self, dataset: &str) -> bool {
        self.vif_enabled
            && !self
                .skip_vif_for
                .iter()
                .any(|d| d.eq_ignore_ascii_case(dataset))
    }
}

impl PipelineConfig {
    /// Load from JSON file if present; otherwise return default.
    /// A file that exists but does not parse is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&data)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let UnitsConfig::Sliding {
            window_minutes,
            step_minutes,
        } = self.units
        {
            if window_minutes <= 0 || step_minutes <= 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "window ({window_minutes}) and step ({step_minutes}) must be positive"
                )));
            }
        }
        let r = &self.reduction;
        if !(0.0..=1.0).contains(&r.corr_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "corr_threshold {} outside [0, 1]",
                r.corr_threshold
            )));
        }
        if r.vif_threshold < 1.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "vif_threshold {} below 1",
                r.vif_threshold
            )));
        }
        if self.evaluation.n_splits < 2 {
            return Err(PipelineError::InvalidConfig(
                "evaluation.n_splits must be at least 2".to_string(),
            ));
        }
        if self.importance.enabled && self.importance.n_repeats == 0 {
            return Err(PipelineError::InvalidConfig(
                "importance.n_repeats must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

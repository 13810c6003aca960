//! logfeat: Log event feature matrices, multicollinearity reduction and
//! leakage-free anomaly model evaluation.
//!
//! Modular structure:
//! - [`events`]: Structured log events, timestamps and session keys
//! - [`features`]: Windowing, aggregation, chronological ordering and labels
//! - [`reduce`]: Correlation and VIF feature pruning
//! - [`model`]: Binary classifiers behind a factory seam
//! - [`eval`]: Rolling-origin folds, metrics and permutation importance
//! - [`analysis`]: Leakage screen and class repartition
//! - [`storage`]: CSV inputs and report outputs
//! - [`logging`]: Structured JSON logging
//! - [`runner`]: One full batch run over a configuration

pub mod analysis;
pub mod config;
pub mod error;
pub mod eval;
pub mod events;
pub mod features;
pub mod logging;
pub mod model;
pub mod reduce;
pub mod runner;
pub mod stats;
pub mod storage;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::{Event, RegexKeyExtractor};
pub use features::{FeatureExtractor, FeatureMatrix, LabeledMatrix, UnitStrategy};
pub use logging::StructuredLogger;
pub use model::{Classifier, ModelFactory, ModelKind};
pub use reduce::{reduce, Reduction, ReductionReport};
pub use runner::{run, RunOutcome};
pub use storage::OutputStore;

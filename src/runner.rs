//! One full batch run: load, extract, order, label, reduce, evaluate, and
//! write every artifact to the output directory.

use crate::analysis::{class_repartition, leakage_suspects, ClassRepartition};
use crate::config::{LabelSource, PipelineConfig};
use crate::error::Result;
use crate::eval::{
    evaluate_fixed_split, evaluate_rolling_origin, permutation_importance, summarize, FoldReport,
    ImportanceResult, MetricSummary, SplitReport,
};
use crate::events::Event;
use crate::features::chronology::{first_occurrence, order_sessions, order_windows, Ordered};
use crate::features::labels::{attach_labels, failure_event_types, label_by_failure_events};
use crate::features::{FeatureExtractor, FeatureMatrix, LabeledMatrix, UnitStrategy};
use crate::logging::StructuredLogger;
use crate::model::ModelFactory;
use crate::reduce::{reduce, ReductionReport};
use crate::storage::{load_events, load_importances, load_label_table, OutputStore};
use std::io::Write;
use tracing::info;

pub const FEATURES_FILE: &str = "features.csv";
pub const REDUCED_FILE: &str = "features_reduced.csv";
pub const REDUCTION_REPORT_FILE: &str = "reduction_report.csv";
pub const LEAKAGE_FILE: &str = "leakage_suspects.csv";
pub const REPARTITION_FILE: &str = "class_repartition.json";
pub const FOLD_METRICS_FILE: &str = "fold_metrics.csv";
pub const FOLD_METRICS_NDJSON: &str = "fold_metrics.ndjson";
pub const SUMMARY_FILE: &str = "metrics_summary.csv";
pub const SPLIT_FILE: &str = "split_metrics.csv";

pub fn importance_file(model: &str) -> String {
    format!("importance_{model}.csv")
}

/// What a run produced, beyond the files it wrote.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub events: usize,
    pub units: usize,
    pub dropped_units: usize,
    pub repartition: ClassRepartition,
    pub reduction: ReductionReport,
    pub fold_reports: Vec<FoldReport>,
    pub summaries: Vec<(String, MetricSummary)>,
    pub split_reports: Vec<SplitReport>,
    pub importances: Vec<(String, ImportanceResult)>,
}

fn order(
    strategy: &UnitStrategy,
    events: &[Event],
    matrix: &FeatureMatrix,
    config: &PipelineConfig,
) -> Result<Ordered> {
    match strategy {
        UnitStrategy::Session(grouping) => {
            let first = first_occurrence(events, grouping.extractor());
            order_sessions(matrix, &first, config.ordering.unresolved)
        }
        UnitStrategy::Sliding(_) => order_windows(matrix),
    }
}

fn label(
    events: &[Event],
    matrix: &FeatureMatrix,
    config: &PipelineConfig,
) -> Result<LabeledMatrix> {
    match &config.labels.source {
        LabelSource::Table {
            path,
            key_column,
            label_column,
        } => {
            let table = load_label_table(path, key_column, label_column)?;
            attach_labels(matrix, &table, config.labels.require_all_labels)
        }
        LabelSource::FailureEvents {
            label_column,
            normal_value,
        } => {
            let failures = failure_event_types(events, label_column, normal_value)?;
            Ok(label_by_failure_events(matrix, &failures)?.labeled)
        }
    }
}

/// Run the whole pipeline described by `config`.
pub fn run(config: &PipelineConfig) -> Result<RunOutcome> {
    config.validate()?;
    let store = OutputStore::open(&config.output_dir)?;

    let events = load_events(&config.input)?;
    let extractor = FeatureExtractor::histogram(UnitStrategy::from_config(&config.units)?);
    let extraction = extractor.extract(&events)?;
    let ordered = order(extractor.windower(), &events, &extraction.matrix, config)?;
    let labeled = label(&events, &ordered.matrix, config)?;
    store.save_matrix(FEATURES_FILE, labeled.matrix())?;

    let suspects = leakage_suspects(&labeled, config.labels.leakage_threshold);
    store.save_leakage_suspects(LEAKAGE_FILE, &suspects)?;
    let repartition = class_repartition(&labeled, 10);
    let mut out = store.create(REPARTITION_FILE)?;
    serde_json::to_writer_pretty(&mut out, &repartition)?;
    out.flush()?;

    let importances_in = config
        .reduction
        .importances_csv
        .as_deref()
        .map(load_importances)
        .transpose()?;
    let reduction = reduce(
        labeled.matrix(),
        &config.reduction,
        &config.dataset,
        importances_in.as_ref(),
    )?;
    store.save_matrix(REDUCED_FILE, &reduction.matrix)?;
    store.save_reduction_report(REDUCTION_REPORT_FILE, &reduction.report)?;
    let reduced = LabeledMatrix::new(reduction.matrix)?;

    let mut fold_reports = Vec::new();
    let mut summaries = Vec::new();
    let mut split_reports = Vec::new();
    let mut importances = Vec::new();
    let mut ndjson = store.create(FOLD_METRICS_NDJSON)?;
    for model in &config.evaluation.models {
        let folds = evaluate_rolling_origin(&reduced, model, config.evaluation.n_splits)?;
        for report in &folds {
            StructuredLogger::emit_json(report, &mut ndjson)?;
        }
        if let Some(summary) = summarize(folds.iter().map(|f| &f.metrics)) {
            info!(
                model = model.name(),
                folds = summary.folds,
                pr_auc = ?summary.pr_auc,
                roc_auc = ?summary.roc_auc,
                f1 = summary.f1,
                "rolling-origin summary"
            );
            summaries.push((model.name().to_string(), summary));
        }
        fold_reports.extend(folds);

        if config.evaluation.fixed_split {
            split_reports.push(evaluate_fixed_split(&reduced, model)?);
        }
    }
    ndjson.flush()?;
    store.save_fold_reports(FOLD_METRICS_FILE, &fold_reports)?;
    store.save_summaries(SUMMARY_FILE, &summaries)?;
    if config.evaluation.fixed_split {
        store.save_split_reports(SPLIT_FILE, &split_reports)?;
    }

    if config.importance.enabled {
        for model in &config.evaluation.models {
            let result = permutation_importance(
                &reduced,
                model,
                config.evaluation.n_splits,
                config.importance.n_repeats,
                config.importance.seed,
            )?;
            store.save_importances(&importance_file(model.name()), &result.records)?;
            importances.push((model.name().to_string(), result));
        }
    }

    info!(
        output_dir = %store.dir().display(),
        units = labeled.n_rows(),
        features_kept = reduction.report.kept.len(),
        "run complete"
    );
    Ok(RunOutcome {
        events: events.len(),
        units: labeled.n_rows(),
        dropped_units: ordered.dropped_units,
        repartition,
        reduction: reduction.report,
        fold_reports,
        summaries,
        split_reports,
        importances,
    })
}

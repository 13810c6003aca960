//! logfeat entrypoint: one batch run driven by a JSON configuration file.
//! The path comes from `LOGFEAT_CONFIG_PATH` (default `logfeat.json`); a
//! missing file means defaults.

use logfeat::{config::PipelineConfig, logging::StructuredLogger, runner};
use std::path::PathBuf;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("LOGFEAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logfeat.json"));
    let config = PipelineConfig::load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);

    info!(
        config = %config_path.display(),
        dataset = %config.dataset,
        output_dir = ?config.output_dir,
        "logfeat starting"
    );

    match runner::run(&config) {
        Ok(outcome) => {
            info!(
                events = outcome.events,
                units = outcome.units,
                features_kept = outcome.reduction.kept.len(),
                folds = outcome.fold_reports.len(),
                "logfeat run complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            Err(e.into())
        }
    }
}

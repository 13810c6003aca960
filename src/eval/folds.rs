//! Chronological train/test partitions.

use crate::error::{PipelineError, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::ops::Range;

/// One expanding-window fold: train is always `0..test.start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Forward-chaining folds over rows sorted by timestamp.
///
/// With `test_size = n / (k + 1)`, fold `i` tests on
/// `[n - k * test_size + i * test_size, + test_size)` and trains on everything
/// before it. When equal timestamps straddle the boundary the test start moves
/// forward past them, so `max(train) < min(test)` holds strictly.
pub fn rolling_origin_folds(timestamps: &[NaiveDateTime], k: usize) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "rolling-origin evaluation needs at least 2 folds, got {k}"
        )));
    }
    if let Some(row) = timestamps.windows(2).position(|w| w[1] < w[0]) {
        return Err(PipelineError::Unordered { row: row + 1 });
    }
    let n = timestamps.len();
    let test_size = n / (k + 1);
    if test_size == 0 {
        return Err(PipelineError::EmptyInput(format!(
            "{n} rows are too few for {k} folds"
        )));
    }

    let mut folds = Vec::with_capacity(k);
    for i in 0..k {
        let end = n - k * test_size + (i + 1) * test_size;
        let mut start = end - test_size;
        while start < end && timestamps[start] == timestamps[start - 1] {
            start += 1;
        }
        if start == end {
            return Err(PipelineError::EmptyInput(format!(
                "fold {i}: every test row shares the last training timestamp"
            )));
        }
        folds.push(Fold {
            index: i,
            train: 0..start,
            test: start..end,
        });
    }
    Ok(folds)
}

/// Contiguous train / validation / test split at 60% and 80%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedSplit {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

pub fn chrono_split_60_20_20(n: usize) -> Result<FixedSplit> {
    let a = (n as f64 * 0.6) as usize;
    let b = (n as f64 * 0.8) as usize;
    if a == 0 || b == a || b == n {
        return Err(PipelineError::EmptyInput(format!(
            "{n} rows are too few for a 60/20/20 split"
        )));
    }
    Ok(FixedSplit {
        train: 0..a,
        validation: a..b,
        test: b..n,
    })
}

//! Tabular storage: CSV readers for events, labels and importances, and the
//! output directory receiving matrices and reports.

mod reader;
mod writer;

pub use reader::{
    load_events, load_importances, load_label_table, read_events, read_importances,
    read_label_table,
};
pub use writer::{
    write_fold_reports, write_importances, write_leakage_suspects, write_matrix,
    write_reduction_report, write_split_reports, write_summaries, OutputStore, TIMESTAMP_FORMAT,
};

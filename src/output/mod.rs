//! Ranking reports and their output formats

pub mod formatter;
pub mod report;

pub use formatter::{report_path, save_report_to_file, suggest_filename, ReportGenerator};
pub use report::{Degradation, RankingReport, ReportedMatch};

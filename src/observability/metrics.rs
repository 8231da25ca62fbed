//! Metrics for the review ETL pipeline
//!
//! Recording goes through the `metrics` facade. Until a recorder is installed
//! (the binary calls [`init`]) every call here is a no-op, so library users and
//! tests pay nothing.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources
    SourcesParsed,
    SourcesParseErrors,
    SourcesRowsRead,
    SourcesBytesRead,

    // Relational snapshot
    SnapshotReadSuccess,
    SnapshotReadSuppressed,
    SnapshotDuplicateRowsRemoved,

    // Join
    JoinMergedRows,

    // Aggregates
    AggregateRowsProduced,

    // Publish
    PublishSuccess,
    PublishError,
    PublishBytes,

    // Whole run
    PipelineRuns,
    PipelineDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesParsed => "review_etl_sources_parsed_total",
            MetricName::SourcesParseErrors => "review_etl_sources_parse_errors_total",
            MetricName::SourcesRowsRead => "review_etl_sources_rows_read_total",
            MetricName::SourcesBytesRead => "review_etl_sources_bytes_read",

            MetricName::SnapshotReadSuccess => "review_etl_snapshot_read_success_total",
            MetricName::SnapshotReadSuppressed => "review_etl_snapshot_read_suppressed_total",
            MetricName::SnapshotDuplicateRowsRemoved => "review_etl_snapshot_duplicate_rows_removed_total",

            MetricName::JoinMergedRows => "review_etl_join_merged_rows",

            MetricName::AggregateRowsProduced => "review_etl_aggregate_rows_produced",

            MetricName::PublishSuccess => "review_etl_publish_success_total",
            MetricName::PublishError => "review_etl_publish_error_total",
            MetricName::PublishBytes => "review_etl_publish_bytes",

            MetricName::PipelineRuns => "review_etl_pipeline_runs_total",
            MetricName::PipelineDuration => "review_etl_pipeline_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; later calls are ignored.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus text rendering of everything recorded so far, if a recorder is installed.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub mod sources {
    use super::MetricName;

    pub fn parsed(format: &'static str, rows: usize, bytes: usize) {
        ::metrics::counter!(MetricName::SourcesParsed.as_str(), "format" => format).increment(1);
        ::metrics::counter!(MetricName::SourcesRowsRead.as_str(), "format" => format).increment(rows as u64);
        ::metrics::histogram!(MetricName::SourcesBytesRead.as_str(), "format" => format).record(bytes as f64);
    }

    pub fn parse_error(format: &'static str) {
        ::metrics::counter!(MetricName::SourcesParseErrors.as_str(), "format" => format).increment(1);
    }
}

pub mod snapshot {
    use super::MetricName;

    pub fn read_success() {
        ::metrics::counter!(MetricName::SnapshotReadSuccess.as_str()).increment(1);
    }

    pub fn read_suppressed() {
        ::metrics::counter!(MetricName::SnapshotReadSuppressed.as_str()).increment(1);
    }

    pub fn duplicates_removed(count: usize) {
        ::metrics::counter!(MetricName::SnapshotDuplicateRowsRemoved.as_str()).increment(count as u64);
    }
}

pub mod join {
    use super::MetricName;

    pub fn merged_rows(rows: u64) {
        ::metrics::gauge!(MetricName::JoinMergedRows.as_str()).set(rows as f64);
    }
}

pub mod aggregate {
    use super::MetricName;

    pub fn rows_produced(view: &'static str, rows: usize) {
        ::metrics::gauge!(MetricName::AggregateRowsProduced.as_str(), "view" => view).set(rows as f64);
    }
}

pub mod publish {
    use super::MetricName;

    pub fn success(bytes: usize) {
        ::metrics::counter!(MetricName::PublishSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PublishBytes.as_str()).record(bytes as f64);
    }

    pub fn error() {
        ::metrics::counter!(MetricName::PublishError.as_str()).increment(1);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_finished(success: bool, secs: f64) {
        let outcome = if success { "success" } else { "failure" };
        ::metrics::counter!(MetricName::PipelineRuns.as_str(), "outcome" => outcome).increment(1);
        ::metrics::histogram!(MetricName::PipelineDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            MetricName::SourcesParsed,
            MetricName::SnapshotReadSuppressed,
            MetricName::PublishBytes,
            MetricName::PipelineDuration,
        ] {
            assert!(name.to_string().starts_with("review_etl_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        sources::parsed("json", 3, 120);
        snapshot::read_suppressed();
        publish::error();
    }
}

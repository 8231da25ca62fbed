use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::{AggregateEngine, Aggregates};
use crate::app::{ObjectStorePort, PublishReceipt, Publisher};
use crate::combine::combine;
use crate::config::Config;
use crate::error::{RelationalReadError, Result};
use crate::join::{JoinEngine, JoinInputs, JoinOptions};
use crate::observability::metrics;
use crate::sources::{
    BusinessJsonReader, ReviewCsvReader, SnapshotReader, SnapshotSource, SourceFile, SourceManifest, SourceReader,
};
use crate::table::{RowSet, Table};

/// Outcome of one complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub business_rows: usize,
    pub review_rows: usize,
    pub snapshot_rows: usize,
    /// Set when the relational snapshot could not be read and an empty one was used
    pub snapshot_suppressed: bool,
    pub merged_rows: usize,
    pub receipts: Vec<PublishReceipt>,
}

/// The merged table and its views, before anything is published.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub inputs: JoinInputs,
    pub snapshot_suppressed: bool,
    pub merged: Table,
    pub aggregates: Aggregates,
}

/// Read, combine, join, aggregate, publish.
///
/// Everything fails fast except relational snapshot reads: those are logged,
/// counted and replaced by an empty row set so the review and business views
/// still get produced.
pub struct Pipeline {
    config: Config,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(config: Config, store: Arc<dyn ObjectStorePort>) -> Self {
        let publisher = Publisher::new(store, config.publish.outputs.merged.clone());
        Self { config, publisher }
    }

    fn read_family(&self, reader: &dyn SourceReader, sources: &[SourceFile], key: &str) -> Result<RowSet> {
        let mut tables = Vec::with_capacity(sources.len());
        for source in sources {
            tables.push(reader.read(source)?.table);
        }
        Ok(RowSet::new(combine(tables), key))
    }

    /// Read the snapshot, substituting an empty row set when it cannot be
    /// opened, staged or queried. The flag is true when the substitution
    /// happened. A key violation while joining its relations is not a read
    /// failure and aborts the run like any other join error.
    pub fn read_snapshot(&self, source: Option<&SnapshotSource>) -> Result<(RowSet, bool)> {
        let columns = &self.config.columns;
        let result = match source {
            Some(source) => SnapshotReader::new(columns, JoinOptions::from(&self.config.join)).read(source),
            None => Err(RelationalReadError::MissingSnapshot),
        };
        match result {
            Ok(rows) => Ok((rows, false)),
            Err(RelationalReadError::Join(e)) => Err(e.into()),
            Err(e) => {
                warn!("continuing without relational snapshot: {}", e);
                metrics::snapshot::read_suppressed();
                Ok((RowSet::empty(columns.business_id.clone()), true))
            }
        }
    }

    /// Everything up to, but not including, publishing.
    #[instrument(skip_all, fields(businesses = manifest.businesses.len(), reviews = manifest.reviews.len()))]
    pub fn transform(&self, manifest: &SourceManifest) -> Result<Transformed> {
        let columns = &self.config.columns;

        let businesses = self.read_family(&BusinessJsonReader::new(columns), &manifest.businesses, &columns.business_id)?;
        let reviews = self.read_family(
            &ReviewCsvReader::new(columns, self.config.join.anchor),
            &manifest.reviews,
            &columns.review_id,
        )?;
        let (snapshot, snapshot_suppressed) = self.read_snapshot(manifest.snapshot.as_ref())?;
        info!(
            business_rows = businesses.table.row_count(),
            review_rows = reviews.table.row_count(),
            snapshot_rows = snapshot.table.row_count(),
            snapshot_suppressed,
            "sources read"
        );

        let inputs = JoinInputs {
            reviews,
            businesses,
            snapshot,
        };
        let merged = JoinEngine::from_config(&self.config.join, columns).merge(&inputs)?;
        let aggregates = AggregateEngine::new(columns.clone(), &self.config.aggregates).compute(&merged)?;

        Ok(Transformed {
            inputs,
            snapshot_suppressed,
            merged,
            aggregates,
        })
    }

    /// Publish the four artifacts in order. The first failure stops the rest;
    /// artifacts already written stay written.
    pub async fn publish(&self, transformed: &Transformed) -> Result<Vec<PublishReceipt>> {
        let outputs = &self.config.publish.outputs;
        let artifacts = [
            (&transformed.merged, &outputs.merged),
            (&transformed.aggregates.mean_rating_by_business, &outputs.mean_rating),
            (&transformed.aggregates.top_zipcode_mean_rating, &outputs.top_zipcodes),
            (&transformed.aggregates.top_users_by_review_count, &outputs.top_users),
        ];

        let mut receipts = Vec::with_capacity(artifacts.len());
        for (table, name) in artifacts {
            receipts.push(self.publisher.publish(table, name).await?);
        }
        Ok(receipts)
    }

    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, manifest: &SourceManifest) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let started_at = Utc::now();
        let timer = Instant::now();
        info!("starting run");

        let outcome = self.run_inner(manifest).await;
        let secs = timer.elapsed().as_secs_f64();
        metrics::pipeline::run_finished(outcome.is_ok(), secs);

        match outcome {
            Ok((transformed, receipts)) => {
                let report = RunReport {
                    run_id,
                    started_at,
                    finished_at: Utc::now(),
                    business_rows: transformed.inputs.businesses.table.row_count(),
                    review_rows: transformed.inputs.reviews.table.row_count(),
                    snapshot_rows: transformed.inputs.snapshot.table.row_count(),
                    snapshot_suppressed: transformed.snapshot_suppressed,
                    merged_rows: transformed.merged.row_count(),
                    receipts,
                };
                info!(merged_rows = report.merged_rows, duration_secs = secs, "run finished");
                Ok(report)
            }
            Err(e) => {
                error!(duration_secs = secs, "run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_inner(&self, manifest: &SourceManifest) -> Result<(Transformed, Vec<PublishReceipt>)> {
        let transformed = self.transform(manifest)?;
        let receipts = self.publish(&transformed).await?;
        Ok((transformed, receipts))
    }
}

use std::io::Write;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, instrument};

use crate::app::ports::ObjectStorePort;
use crate::error::PublishError;
use crate::observability::metrics;
use crate::table::Table;

/// What was handed to the store for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub name: String,
    pub bytes: usize,
    pub sha256: String,
    pub compressed: bool,
}

/// Serializes tables to CSV and hands them to an object store. Exactly one
/// destination name, the merged table's, is gzip-compressed first.
///
/// No retries: a failed put is returned to the caller as is.
pub struct Publisher {
    store: Arc<dyn ObjectStorePort>,
    compressed_name: String,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStorePort>, compressed_name: impl Into<String>) -> Self {
        Self {
            store,
            compressed_name: compressed_name.into(),
        }
    }

    #[instrument(skip(self, table), fields(rows = table.row_count()))]
    pub async fn publish(&self, table: &Table, name: &str) -> Result<PublishReceipt, PublishError> {
        let csv = to_csv(table, name)?;
        let compressed = name == self.compressed_name;
        let body = if compressed {
            gzip(&csv).map_err(|error| PublishError::Io {
                name: name.to_string(),
                error,
            })?
        } else {
            csv
        };

        let receipt = PublishReceipt {
            name: name.to_string(),
            bytes: body.len(),
            sha256: hex::encode(Sha256::digest(&body)),
            compressed,
        };

        match self.store.put(name, body).await {
            Ok(()) => {
                metrics::publish::success(receipt.bytes);
                info!(bytes = receipt.bytes, compressed, sha256 = %receipt.sha256, "published artifact");
                Ok(receipt)
            }
            Err(e) => {
                metrics::publish::error();
                error!("failed to publish {}: {}", name, e);
                Err(e)
            }
        }
    }
}

/// Header row plus one record per row; nulls become empty fields.
pub fn to_csv(table: &Table, name: &str) -> Result<Vec<u8>, PublishError> {
    let serialize_error = |error: csv::Error| PublishError::Serialize {
        name: name.to_string(),
        error,
    };
    let mut writer = csv::Writer::from_writer(Vec::new());
    if table.column_count() > 0 {
        writer.write_record(table.column_names()).map_err(serialize_error)?;
        for row in table.rows() {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(serialize_error)?;
        }
    }
    writer.into_inner().map_err(|e| PublishError::Io {
        name: name.to_string(),
        error: e.into_error(),
    })
}

pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

use tracing::debug;

use crate::config::ColumnNames;
use crate::constants;
use crate::error::ParseError;
use crate::join::JoinAnchor;
use crate::observability::metrics;
use crate::sources::{SourceFile, SourceReader};
use crate::table::{RowSet, Table, Value};

/// Reads one batch of reviews from a headed CSV export.
///
/// Cells are kept as text (empty cells become null); typing happens where a
/// value is consumed. Row-index columns from dataframe exports are dropped.
/// With the snapshot anchor the business and user id columns are dropped as
/// well, since that join takes them from the snapshot instead.
pub struct ReviewCsvReader {
    key_column: String,
    dropped: Vec<String>,
}

impl ReviewCsvReader {
    pub fn new(columns: &ColumnNames, anchor: JoinAnchor) -> Self {
        let mut dropped: Vec<String> = constants::CSV_INDEX_COLUMNS.iter().map(|s| s.to_string()).collect();
        if anchor == JoinAnchor::Snapshot {
            dropped.push(columns.business_id.clone());
            dropped.push(columns.user_id.clone());
        }
        Self {
            key_column: columns.review_id.clone(),
            dropped,
        }
    }

    fn parse(&self, source: &SourceFile) -> Result<RowSet, ParseError> {
        let csv_error = |error: csv::Error| ParseError::Csv {
            source_name: source.name.clone(),
            error,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(source.bytes.as_slice());

        let header: Vec<String> = reader.headers().map_err(csv_error)?.iter().map(str::to_string).collect();
        let mut rows: Vec<Vec<Value>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(
                record
                    .iter()
                    .map(|cell| if cell.is_empty() { Value::Null } else { Value::from(cell) })
                    .collect(),
            );
        }

        let mut table = Table::from_rows(header, rows).map_err(|error| ParseError::Table {
            source_name: source.name.clone(),
            error,
        })?;
        let dropped: Vec<&str> = self.dropped.iter().map(String::as_str).collect();
        let removed = table.drop_columns(&dropped);
        debug!(
            source = %source.name,
            rows = table.row_count(),
            columns = table.column_count(),
            ?removed,
            "parsed review batch"
        );
        Ok(RowSet::new(table, self.key_column.clone()))
    }
}

impl SourceReader for ReviewCsvReader {
    fn read(&self, source: &SourceFile) -> Result<RowSet, ParseError> {
        let result = self.parse(source);
        match &result {
            Ok(rows) => metrics::sources::parsed("csv", rows.table.row_count(), source.bytes.len()),
            Err(_) => metrics::sources::parse_error("csv"),
        }
        result
    }
}

use std::io::Write;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, instrument, warn};

use crate::config::ColumnNames;
use crate::constants;
use crate::error::RelationalReadError;
use crate::join::{left_join, JoinOptions};
use crate::observability::metrics;
use crate::sources::SnapshotSource;
use crate::table::{RowSet, Table, Value};

/// Reads the relational snapshot: users left-joined with de-duplicated
/// business attributes on the business id.
///
/// Errors are returned, never swallowed here. Whether to carry on without the
/// snapshot is the orchestrator's decision.
pub struct SnapshotReader {
    business_id: String,
    options: JoinOptions,
}

impl SnapshotReader {
    pub fn new(columns: &ColumnNames, options: JoinOptions) -> Self {
        Self {
            business_id: columns.business_id.clone(),
            options,
        }
    }

    pub fn read(&self, source: &SnapshotSource) -> Result<RowSet, RelationalReadError> {
        match source {
            SnapshotSource::Path(path) => self.read_path(path),
            SnapshotSource::Bytes { bytes, .. } => self.read_bytes(bytes),
        }
    }

    /// SQLite needs a file, so byte snapshots are staged in a temp file that
    /// is removed once the read finishes.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<RowSet, RelationalReadError> {
        let mut staged = tempfile::Builder::new().suffix(".sqlite").tempfile()?;
        staged.write_all(bytes)?;
        staged.flush()?;
        self.read_path(staged.path())
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn read_path(&self, path: &Path) -> Result<RowSet, RelationalReadError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(RelationalReadError::Open)?;

        let result = self.read_relations(&conn);

        // The connection is released whether or not the reads succeeded.
        if let Err((_, e)) = conn.close() {
            warn!("failed to close snapshot connection cleanly: {}", e);
        }

        if result.is_ok() {
            metrics::snapshot::read_success();
        }
        result
    }

    fn read_relations(&self, conn: &Connection) -> Result<RowSet, RelationalReadError> {
        let users = read_relation(conn, constants::USERS_RELATION)?;
        let attributes = read_relation(conn, constants::BUSINESS_ATTRIBUTES_RELATION)?;

        let deduped = attributes.dedup_rows();
        let removed = attributes.row_count() - deduped.row_count();
        if removed > 0 {
            debug!(removed, "dropped duplicate business attribute rows");
            metrics::snapshot::duplicates_removed(removed);
        }

        let joined = left_join(&users, &deduped, &self.business_id, &self.options)?;
        info!(
            users = users.row_count(),
            business_attributes = deduped.row_count(),
            rows = joined.row_count(),
            "read relational snapshot"
        );
        Ok(RowSet::new(joined, self.business_id.clone()))
    }
}

/// `SELECT *` from one relation into a table, preserving column order.
fn read_relation(conn: &Connection, relation: &str) -> Result<Table, RelationalReadError> {
    let query_error = |error: rusqlite::Error| RelationalReadError::Query {
        relation: relation.to_string(),
        error,
    };

    let sql = format!("SELECT * FROM \"{}\"", relation.replace('"', "\"\""));
    let mut stmt = conn.prepare(&sql).map_err(query_error)?;
    let header: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = header.len();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut cursor = stmt.query([]).map_err(query_error)?;
    while let Some(row) = cursor.next().map_err(query_error)? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(sql_value(row.get_ref(i).map_err(query_error)?));
        }
        rows.push(values);
    }

    Table::from_rows(header, rows).map_err(|error| RelationalReadError::Table {
        relation: relation.to_string(),
        error,
    })
}

fn sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(dir: &Path, with_users: bool) -> std::path::PathBuf {
        let path = dir.join("user.sqlite");
        let conn = Connection::open(&path).unwrap();
        if with_users {
            conn.execute_batch(
                r#"
                CREATE TABLE Users2 (UserId TEXT, BusinessId TEXT, ReviewId TEXT);
                INSERT INTO Users2 VALUES ('U1', 'B1', 'R1'), ('U2', 'B2', 'R2');
                "#,
            )
            .unwrap();
        }
        conn.execute_batch(
            r#"
            CREATE TABLE business_attributes (BusinessId TEXT, Parking TEXT, Seats INTEGER);
            INSERT INTO business_attributes VALUES ('B1', 'true', 40), ('B1', 'true', 40);
            "#,
        )
        .unwrap();
        path
    }

    fn reader() -> SnapshotReader {
        SnapshotReader::new(&ColumnNames::default(), JoinOptions::default())
    }

    #[test]
    fn test_identical_attribute_rows_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let rows = reader().read_path(&snapshot(dir.path(), true)).unwrap();
        let t = &rows.table;
        assert_eq!(t.row_count(), 2);
        assert_eq!(
            t.column_names().collect::<Vec<_>>(),
            vec!["UserId", "BusinessId", "ReviewId", "Parking", "Seats"]
        );
        assert_eq!(t.values("Parking").unwrap(), &[Value::from("true"), Value::Null]);
        assert_eq!(t.values("Seats").unwrap(), &[Value::Int(40), Value::Null]);
    }

    #[test]
    fn test_missing_users_relation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = reader().read_path(&snapshot(dir.path(), false)).unwrap_err();
        assert!(matches!(err, RelationalReadError::Query { ref relation, .. } if relation == "Users2"));
    }

    #[test]
    fn test_missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = reader().read_path(&dir.path().join("absent.sqlite")).unwrap_err();
        assert!(matches!(err, RelationalReadError::Open(_)));
    }

    #[test]
    fn test_read_from_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = std::fs::read(snapshot(dir.path(), true)).unwrap();
        let rows = reader()
            .read(&SnapshotSource::Bytes {
                name: "user.sqlite".to_string(),
                bytes,
            })
            .unwrap();
        assert_eq!(rows.table.row_count(), 2);
    }

    #[test]
    fn test_garbage_bytes_fail_without_panicking() {
        assert!(reader().read_bytes(b"definitely not sqlite").is_err());
    }
}

use std::collections::HashMap;

use tracing::debug;

use crate::config::ColumnNames;
use crate::error::ParseError;
use crate::observability::metrics;
use crate::sources::{SourceFile, SourceReader};
use crate::table::{RowSet, Table, Value};

/// Reads a business document: a JSON object mapping business id to an object
/// of attributes. Produces one row per business with the id hoisted into the
/// key column and the business-name attribute dropped.
pub struct BusinessJsonReader {
    key_column: String,
    dropped_attribute: String,
}

impl BusinessJsonReader {
    pub fn new(columns: &ColumnNames) -> Self {
        Self {
            key_column: columns.business_id.clone(),
            dropped_attribute: columns.business_name.clone(),
        }
    }

    fn shape_error(source: &SourceFile, message: String) -> ParseError {
        ParseError::Shape {
            source_name: source.name.clone(),
            message,
        }
    }
}

impl SourceReader for BusinessJsonReader {
    fn read(&self, source: &SourceFile) -> Result<RowSet, ParseError> {
        let result = self.parse(source);
        match &result {
            Ok(rows) => metrics::sources::parsed("json", rows.table.row_count(), source.bytes.len()),
            Err(_) => metrics::sources::parse_error("json"),
        }
        result
    }
}

impl BusinessJsonReader {
    fn parse(&self, source: &SourceFile) -> Result<RowSet, ParseError> {
        let doc: serde_json::Value = serde_json::from_slice(&source.bytes).map_err(|error| ParseError::Json {
            source_name: source.name.clone(),
            error,
        })?;
        let businesses = doc
            .as_object()
            .ok_or_else(|| Self::shape_error(source, "document root must be an object of business objects".to_string()))?;

        let mut header = vec![self.key_column.clone()];
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut records = Vec::with_capacity(businesses.len());
        for (id, attrs) in businesses {
            let attrs = attrs
                .as_object()
                .ok_or_else(|| Self::shape_error(source, format!("value for business '{}' is not an object", id)))?;
            for name in attrs.keys() {
                if *name == self.dropped_attribute || positions.contains_key(name) {
                    continue;
                }
                if *name == self.key_column {
                    return Err(Self::shape_error(
                        source,
                        format!("business '{}' has an attribute named like the key column '{}'", id, name),
                    ));
                }
                positions.insert(name.clone(), header.len());
                header.push(name.clone());
            }
            records.push((id, attrs));
        }

        let rows = records
            .into_iter()
            .map(|(id, attrs)| {
                let mut row = vec![Value::Null; header.len()];
                row[0] = Value::Text(id.clone());
                for (name, value) in attrs {
                    if let Some(&pos) = positions.get(name) {
                        row[pos] = json_value(value);
                    }
                }
                row
            })
            .collect();

        let table = Table::from_rows(header, rows).map_err(|error| ParseError::Table {
            source_name: source.name.clone(),
            error,
        })?;
        debug!(
            source = %source.name,
            rows = table.row_count(),
            columns = table.column_count(),
            "parsed business document"
        );
        Ok(RowSet::new(table, self.key_column.clone()))
    }
}

/// Scalars keep their type; arrays and objects are kept as compact JSON text.
fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map_or(Value::Null, Value::Float),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceFormat;

    fn read(json: &str) -> Result<RowSet, ParseError> {
        let reader = BusinessJsonReader::new(&ColumnNames::default());
        reader.read(&SourceFile::new("biz.json", SourceFormat::BusinessJson, json))
    }

    #[test]
    fn test_hoists_key_and_drops_name() {
        let rows = read(r#"{"B1": {"Business - Name": "Cafe", "Category": "Food"}}"#).unwrap();
        assert_eq!(rows.key, "BusinessId");
        assert_eq!(rows.table.column_names().collect::<Vec<_>>(), vec!["BusinessId", "Category"]);
        assert_eq!(rows.table.row(0), vec![Value::from("B1"), Value::from("Food")]);
    }

    #[test]
    fn test_ragged_attributes_are_unioned_in_document_order() {
        let rows = read(
            r#"{
                "B2": {"Address": "1 Main St 85004", "Stars": 4.5},
                "B1": {"Address": "2 Side St 85016", "Open": true, "Tags": ["a", "b"]}
            }"#,
        )
        .unwrap();
        let t = &rows.table;
        assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["BusinessId", "Address", "Stars", "Open", "Tags"]);
        assert_eq!(t.values("BusinessId").unwrap(), &[Value::from("B2"), Value::from("B1")]);
        assert_eq!(t.values("Open").unwrap(), &[Value::Null, Value::Bool(true)]);
        assert_eq!(t.values("Stars").unwrap(), &[Value::Float(4.5), Value::Null]);
        assert_eq!(t.get(1, "Tags"), Some(&Value::from(r#"["a","b"]"#)));
    }

    #[test]
    fn test_missing_name_attribute_is_tolerated() {
        let rows = read(r#"{"B1": {"Category": "Food"}}"#).unwrap();
        assert_eq!(rows.table.row_count(), 1);
    }

    #[test]
    fn test_wrong_shapes_are_parse_errors() {
        assert!(matches!(read("[1, 2]"), Err(ParseError::Shape { .. })));
        assert!(matches!(read(r#"{"B1": 3}"#), Err(ParseError::Shape { .. })));
        assert!(matches!(read(r#"{"B1": {"BusinessId": "x"}}"#), Err(ParseError::Shape { .. })));
        assert!(matches!(read("{not json"), Err(ParseError::Json { .. })));
    }
}

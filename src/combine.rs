//! Row-set combiner: concatenate tables of a nominally common shape.

use tracing::debug;

use crate::table::{Column, Table, Value};

/// Concatenate `tables` in order. The result's schema is the union of all
/// input schemas in first-seen column order; cells for columns an input lacks
/// are `Value::Null`. No rows are removed or reordered.
pub fn combine(tables: Vec<Table>) -> Table {
    let mut names: Vec<String> = Vec::new();
    let mut total_rows = 0usize;
    for t in &tables {
        total_rows += t.row_count();
        for name in t.column_names() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }

    let mut columns: Vec<Vec<Value>> = names.iter().map(|_| Vec::with_capacity(total_rows)).collect();
    for t in &tables {
        for (name, out) in names.iter().zip(columns.iter_mut()) {
            match t.column(name) {
                Some(col) => out.extend(col.values.iter().cloned()),
                None => out.extend(std::iter::repeat(Value::Null).take(t.row_count())),
            }
        }
    }

    debug!(
        inputs = tables.len(),
        rows = total_rows,
        columns = names.len(),
        "combined row-sets"
    );

    let columns = names
        .into_iter()
        .zip(columns)
        .map(|(name, values)| Column { name, values })
        .collect();
    Table::from_parts(columns, total_rows)
}

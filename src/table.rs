//! Column-oriented row-set with an explicit null marker.
//!
//! Columns are addressed by name and kept in insertion order. Every column
//! holds exactly `row_count` values; `Value::Null` stands in for "no value".

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::TableError;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by aggregations. Numeric text is parsed; NaN and
    /// infinities, spelled out or stored, count as missing.
    pub fn as_f64(&self) -> Option<f64> {
        let x = match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) | Value::Null => None,
        };
        x.filter(|x| x.is_finite())
    }

    /// Hashable identity of the value. `None` for nulls, which never match.
    pub fn key(&self) -> Option<ValueKey> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(ValueKey::Bool(*b)),
            Value::Int(i) => Some(ValueKey::Int(*i)),
            // -0.0 and 0.0 are the same key, as are all NaN payloads
            Value::Float(f) if *f == 0.0 => Some(ValueKey::Float(0.0f64.to_bits())),
            Value::Float(f) if f.is_nan() => Some(ValueKey::Float(f64::NAN.to_bits())),
            Value::Float(f) => Some(ValueKey::Float(f.to_bits())),
            Value::Text(s) => Some(ValueKey::Text(s.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            // Debug keeps the decimal point on whole numbers (3.0, not 3)
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Exact, type-sensitive identity of a non-null value. `Text("1")` and
/// `Int(1)` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKey::Bool(b) => write!(f, "{}", b),
            ValueKey::Int(i) => write!(f, "{}", i),
            ValueKey::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            ValueKey::Text(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Empty table with zero columns and zero rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from columns already known to be uniquely named and of
    /// length `row_count`.
    pub(crate) fn from_parts(columns: Vec<Column>, row_count: usize) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == row_count));
        Table { columns, row_count }
    }

    /// Build from a header and row-major values.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let width = header.len();
        let mut columns: Vec<Vec<Value>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
        let row_count = rows.len();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TableError::RaggedRow {
                    row: i,
                    expected: width,
                    found: row.len(),
                });
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }

        let mut table = Table {
            columns: Vec::with_capacity(width),
            row_count,
        };
        for (name, values) in header.into_iter().zip(columns) {
            table.push_column(name, values)?;
        }
        Ok(table)
    }

    /// Append a column. The first column pushed onto an empty table fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<(), TableError> {
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(TableError::DuplicateColumn(name));
        }
        if self.columns.is_empty() && self.row_count == 0 {
            self.row_count = values.len();
        } else if values.len() != self.row_count {
            return Err(TableError::ColumnLength {
                name,
                expected: self.row_count,
                found: values.len(),
            });
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of a column, or a [`TableError::MissingColumn`].
    pub fn values(&self, name: &str) -> Result<&[Value], TableError> {
        self.column(name)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name).and_then(|c| c.values.get(row))
    }

    /// Remove the named columns. Names not present are ignored.
    /// Returns the names that were actually removed.
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        let mut removed = Vec::new();
        self.columns.retain(|c| {
            if names.contains(&c.name.as_str()) {
                removed.push(c.name.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        let idx = self
            .column_index(from)
            .ok_or_else(|| TableError::MissingColumn(from.to_string()))?;
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// New table holding the given rows, in the given order. Indices may repeat.
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: indices.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Table {
            columns,
            row_count: indices.len(),
        }
    }

    /// Cloned values of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.values[index].clone()).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count).map(move |i| self.row(i))
    }

    /// Drop rows that are identical to an earlier row in every column.
    /// The first occurrence is kept and row order is otherwise preserved.
    pub fn dedup_rows(&self) -> Table {
        let mut seen: HashSet<Vec<Option<ValueKey>>> = HashSet::with_capacity(self.row_count);
        let keep: Vec<usize> = (0..self.row_count)
            .filter(|&i| {
                // nulls in the same position count as equal here
                let key: Vec<Option<ValueKey>> = self.columns.iter().map(|c| c.values[i].key()).collect();
                seen.insert(key)
            })
            .collect();
        self.take_rows(&keep)
    }

    /// Map from key value to the row indices holding it, in row order.
    /// Null keys are left out.
    pub fn index_by(&self, key: &str) -> Result<HashMap<ValueKey, Vec<usize>>, TableError> {
        let values = self.values(key)?;
        let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
        for (i, v) in values.iter().enumerate() {
            if let Some(k) = v.key() {
                index.entry(k).or_default().push(i);
            }
        }
        Ok(index)
    }
}

/// A normalized source output: a table plus the name of its key column.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub table: Table,
    pub key: String,
}

impl RowSet {
    pub fn new(table: Table, key: impl Into<String>) -> Self {
        Self {
            table,
            key: key.into(),
        }
    }

    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(Table::new(), key)
    }
}

//! Left-outer joins over [`Table`]s and the join plan that produces the merged table.

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::{ColumnNames, JoinConfig};
use crate::error::JoinError;
use crate::observability::metrics;
use crate::table::{Column, RowSet, Table, Value};

/// What to do when the right side of a join holds the same key more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrictness {
    /// Fail with [`JoinError::KeyViolation`].
    Strict,
    /// Use the first matching right row; every left row appears exactly once.
    #[default]
    FirstMatch,
    /// Emit one output row per matching right row.
    FanOut,
}

/// Which row-set the merged table is anchored on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinAnchor {
    /// reviews ⟕ business on BusinessId ⟕ snapshot on BusinessId
    #[default]
    Reviews,
    /// snapshot ⟕ reviews on ReviewId ⟕ business on BusinessId
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub strictness: KeyStrictness,
    pub right_suffix: String,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            strictness: KeyStrictness::default(),
            right_suffix: "_right".to_string(),
        }
    }
}

impl From<&JoinConfig> for JoinOptions {
    fn from(config: &JoinConfig) -> Self {
        Self {
            strictness: config.strictness,
            right_suffix: config.right_suffix.clone(),
        }
    }
}

/// Left-outer join of `right` onto `left` on the column `key`.
///
/// Keys are compared with exact [`Value`] equality: no coercion between text
/// and numbers, no case folding. Null keys never match. Unmatched left rows get
/// `Value::Null` in every right-only column. The key column appears once, taken
/// from the left. A right-side column whose name already exists on the left is
/// renamed with `options.right_suffix`.
///
/// A right table with no columns at all (a suppressed source) adds nothing.
pub fn left_join(left: &Table, right: &Table, key: &str, options: &JoinOptions) -> Result<Table, JoinError> {
    if left.column_count() == 0 {
        return Ok(Table::new());
    }
    let left_keys = left.values(key).map_err(|_| JoinError::MissingKeyColumn {
        key: key.to_string(),
        side: "left",
    })?;
    if right.column_count() == 0 {
        debug!(key, "right side has no columns, join is a no-op");
        return Ok(left.clone());
    }
    let index = right.index_by(key).map_err(|_| JoinError::MissingKeyColumn {
        key: key.to_string(),
        side: "right",
    })?;

    if options.strictness == KeyStrictness::Strict {
        let right_keys = right.values(key)?;
        if let Some(rows) = index.values().filter(|rows| rows.len() > 1).min_by_key(|rows| rows[0]) {
            return Err(JoinError::KeyViolation {
                key: key.to_string(),
                value: right_keys[rows[0]].to_string(),
            });
        }
    }

    let mut left_rows: Vec<usize> = Vec::with_capacity(left.row_count());
    let mut right_rows: Vec<Option<usize>> = Vec::with_capacity(left.row_count());
    let mut matched = 0usize;
    for (i, v) in left_keys.iter().enumerate() {
        let matches = v.key().and_then(|k| index.get(&k));
        match (matches, options.strictness) {
            (Some(rows), KeyStrictness::FanOut) => {
                matched += 1;
                for &j in rows {
                    left_rows.push(i);
                    right_rows.push(Some(j));
                }
            }
            (Some(rows), _) => {
                matched += 1;
                left_rows.push(i);
                right_rows.push(rows.first().copied());
            }
            (None, _) => {
                left_rows.push(i);
                right_rows.push(None);
            }
        }
    }

    let mut columns: Vec<Column> = left.take_rows(&left_rows).columns().to_vec();
    for col in right.columns().iter().filter(|c| c.name != key) {
        let mut name = col.name.clone();
        while columns.iter().any(|c| c.name == name) {
            name.push_str(&options.right_suffix);
        }
        let values = right_rows
            .iter()
            .map(|j| j.map_or(Value::Null, |j| col.values[j].clone()))
            .collect();
        columns.push(Column { name, values });
    }

    debug!(
        key,
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        matched,
        output_rows = left_rows.len(),
        "left join"
    );
    Ok(Table::from_parts(columns, left_rows.len()))
}

/// Normalized inputs to the join plan.
#[derive(Debug, Clone)]
pub struct JoinInputs {
    /// Combined review batches
    pub reviews: RowSet,
    /// Combined business documents
    pub businesses: RowSet,
    /// Users joined with business attributes, possibly empty after suppression
    pub snapshot: RowSet,
}

/// Runs the join sequence that yields the merged table.
pub struct JoinEngine {
    anchor: JoinAnchor,
    options: JoinOptions,
    columns: ColumnNames,
}

impl JoinEngine {
    pub fn new(anchor: JoinAnchor, options: JoinOptions, columns: ColumnNames) -> Self {
        Self {
            anchor,
            options,
            columns,
        }
    }

    pub fn from_config(config: &JoinConfig, columns: &ColumnNames) -> Self {
        Self::new(config.anchor, JoinOptions::from(config), columns.clone())
    }

    #[instrument(skip_all, fields(anchor = ?self.anchor))]
    pub fn merge(&self, inputs: &JoinInputs) -> Result<Table, JoinError> {
        let business_id = self.columns.business_id.as_str();
        let merged = match self.anchor {
            JoinAnchor::Reviews => {
                let with_business = left_join(&inputs.reviews.table, &inputs.businesses.table, business_id, &self.options)?;
                left_join(&with_business, &inputs.snapshot.table, business_id, &self.options)?
            }
            JoinAnchor::Snapshot => {
                let review_id = self.columns.review_id.as_str();
                let with_reviews = left_join(&inputs.snapshot.table, &inputs.reviews.table, review_id, &self.options)?;
                left_join(&with_reviews, &inputs.businesses.table, business_id, &self.options)?
            }
        };
        info!(
            rows = merged.row_count(),
            columns = merged.column_count(),
            "merged table built"
        );
        metrics::join::merged_rows(merged.row_count() as u64);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(header: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::from_rows(header.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    fn reviews() -> Table {
        table(
            &["ReviewId", "BusinessId", "Stars"],
            vec![
                vec!["R1".into(), "B1".into(), "5".into()],
                vec!["R2".into(), "B9".into(), "3".into()],
                vec!["R3".into(), Value::Null, "4".into()],
            ],
        )
    }

    #[test]
    fn test_unmatched_rows_get_nulls() {
        let businesses = table(&["BusinessId", "Category"], vec![vec!["B1".into(), "Food".into()]]);
        let out = left_join(&reviews(), &businesses, "BusinessId", &JoinOptions::default()).unwrap();

        assert_eq!(out.row_count(), 3);
        assert_eq!(out.column_names().collect::<Vec<_>>(), vec!["ReviewId", "BusinessId", "Stars", "Category"]);
        assert_eq!(out.values("Category").unwrap(), &[Value::from("Food"), Value::Null, Value::Null]);
        assert_eq!(out.values("BusinessId").unwrap()[1], Value::from("B9"));
    }

    #[test]
    fn test_key_comparison_is_exact() {
        let businesses = table(
            &["BusinessId", "Category"],
            vec![vec!["b1".into(), "Lower".into()], vec![Value::Int(1), "Int".into()]],
        );
        let left = table(&["BusinessId"], vec![vec!["B1".into()], vec!["1".into()]]);
        let out = left_join(&left, &businesses, "BusinessId", &JoinOptions::default()).unwrap();
        assert_eq!(out.values("Category").unwrap(), &[Value::Null, Value::Null]);
    }

    fn duplicated_right() -> Table {
        table(
            &["BusinessId", "Parking"],
            vec![vec!["B1".into(), "yes".into()], vec!["B1".into(), "no".into()]],
        )
    }

    #[test]
    fn test_first_match_preserves_row_count() {
        let out = left_join(&reviews(), &duplicated_right(), "BusinessId", &JoinOptions::default()).unwrap();
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.values("Parking").unwrap()[0], Value::from("yes"));
    }

    #[test]
    fn test_strict_rejects_duplicate_keys() {
        let options = JoinOptions {
            strictness: KeyStrictness::Strict,
            ..JoinOptions::default()
        };
        let err = left_join(&reviews(), &duplicated_right(), "BusinessId", &options).unwrap_err();
        assert!(matches!(err, JoinError::KeyViolation { ref value, .. } if value == "B1"));
    }

    #[test]
    fn test_fan_out_emits_every_match() {
        let options = JoinOptions {
            strictness: KeyStrictness::FanOut,
            ..JoinOptions::default()
        };
        let out = left_join(&reviews(), &duplicated_right(), "BusinessId", &options).unwrap();
        assert_eq!(out.row_count(), 4);
        assert_eq!(
            out.values("ReviewId").unwrap(),
            &[Value::from("R1"), Value::from("R1"), Value::from("R2"), Value::from("R3")]
        );
    }

    #[test]
    fn test_colliding_right_column_is_suffixed() {
        let right = table(&["BusinessId", "Stars"], vec![vec!["B1".into(), "n/a".into()]]);
        let out = left_join(&reviews(), &right, "BusinessId", &JoinOptions::default()).unwrap();
        assert_eq!(out.values("Stars").unwrap()[0], Value::from("5"));
        assert_eq!(out.values("Stars_right").unwrap()[0], Value::from("n/a"));
    }

    #[test]
    fn test_columnless_right_is_a_no_op() {
        let out = left_join(&reviews(), &Table::new(), "BusinessId", &JoinOptions::default()).unwrap();
        assert_eq!(out, reviews());
    }

    #[test]
    fn test_missing_key_is_reported() {
        let right = table(&["Other"], vec![vec!["x".into()]]);
        let err = left_join(&reviews(), &right, "BusinessId", &JoinOptions::default()).unwrap_err();
        assert!(matches!(err, JoinError::MissingKeyColumn { side: "right", .. }));

        let err = left_join(&right, &reviews(), "BusinessId", &JoinOptions::default()).unwrap_err();
        assert!(matches!(err, JoinError::MissingKeyColumn { side: "left", .. }));
    }

    #[test]
    fn test_snapshot_anchor_follows_snapshot_rows() {
        let engine = JoinEngine::new(JoinAnchor::Snapshot, JoinOptions::default(), ColumnNames::default());
        let inputs = JoinInputs {
            reviews: RowSet::new(table(&["ReviewId", "Stars"], vec![vec!["R1".into(), "5".into()]]), "ReviewId"),
            businesses: RowSet::new(table(&["BusinessId", "Category"], vec![vec!["B1".into(), "Food".into()]]), "BusinessId"),
            snapshot: RowSet::new(
                table(
                    &["UserId", "ReviewId", "BusinessId"],
                    vec![vec!["U1".into(), "R1".into(), "B1".into()], vec!["U2".into(), "R7".into(), "B2".into()]],
                ),
                "BusinessId",
            ),
        };
        let merged = engine.merge(&inputs).unwrap();
        assert_eq!(merged.row_count(), 2);
        assert_eq!(merged.values("Stars").unwrap(), &[Value::from("5"), Value::Null]);
        assert_eq!(merged.values("Category").unwrap(), &[Value::from("Food"), Value::Null]);
    }
}

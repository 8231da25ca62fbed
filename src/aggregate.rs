//! Summary views derived from the merged table.
//!
//! Grouping keys follow first-appearance order and rankings use a stable
//! descending sort, so ties go to whichever key showed up first. Null keys are
//! left out of every grouping.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument, warn};

use crate::config::{AggregateConfig, ColumnNames};
use crate::constants;
use crate::error::AggregateError;
use crate::observability::metrics;
use crate::table::{Column, Table, Value, ValueKey};

/// The three derived views of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub mean_rating_by_business: Table,
    pub top_zipcode_mean_rating: Table,
    pub top_users_by_review_count: Table,
}

pub struct AggregateEngine {
    columns: ColumnNames,
    top_zipcodes: usize,
    top_users: usize,
}

/// Rows sharing a key, in first-appearance order.
struct Group {
    key: ValueKey,
    value: Value,
    rows: Vec<usize>,
}

fn group_rows<'a>(keys: impl IntoIterator<Item = (usize, &'a Value)>) -> Vec<Group> {
    let mut slots: HashMap<ValueKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for (row, value) in keys {
        let Some(key) = value.key() else { continue };
        match slots.get(&key) {
            Some(&slot) => groups[slot].rows.push(row),
            None => {
                slots.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    value: value.clone(),
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// Arithmetic mean of the numeric values at `rows`; null when there are none.
fn mean(values: &[Value], rows: &[usize]) -> Value {
    let (sum, count) = rows
        .iter()
        .filter_map(|&i| values[i].as_f64())
        .fold((0.0_f64, 0usize), |(s, n), x| (s + x, n + 1));
    if count == 0 {
        Value::Null
    } else {
        Value::Float(sum / count as f64)
    }
}

/// Last five characters of an address, or the whole string when shorter.
pub fn zipcode(address: &Value) -> Option<String> {
    if address.is_null() {
        return None;
    }
    let text = address.to_string();
    let len = text.chars().count();
    Some(text.chars().skip(len.saturating_sub(constants::ZIPCODE_LEN)).collect())
}

fn two_columns(first: &str, first_values: Vec<Value>, second: &str, second_values: Vec<Value>) -> Table {
    let rows = first_values.len();
    Table::from_parts(
        vec![
            Column {
                name: first.to_string(),
                values: first_values,
            },
            Column {
                name: second.to_string(),
                values: second_values,
            },
        ],
        rows,
    )
}

impl AggregateEngine {
    pub fn new(columns: ColumnNames, config: &AggregateConfig) -> Self {
        Self {
            columns,
            top_zipcodes: config.top_zipcodes,
            top_users: config.top_users,
        }
    }

    fn values<'a>(&self, merged: &'a Table, name: &str) -> Result<&'a [Value], AggregateError> {
        merged
            .values(name)
            .map_err(|_| AggregateError::MissingColumn(name.to_string()))
    }

    #[instrument(skip_all, fields(rows = merged.row_count()))]
    pub fn compute(&self, merged: &Table) -> Result<Aggregates, AggregateError> {
        let aggregates = Aggregates {
            mean_rating_by_business: self.mean_rating_by_business(merged)?,
            top_zipcode_mean_rating: self.top_zipcode_mean_rating(merged)?,
            top_users_by_review_count: self.top_users_by_review_count(merged)?,
        };
        metrics::aggregate::rows_produced("mean_rating_by_business", aggregates.mean_rating_by_business.row_count());
        metrics::aggregate::rows_produced("top_zipcode_mean_rating", aggregates.top_zipcode_mean_rating.row_count());
        metrics::aggregate::rows_produced("top_users_by_review_count", aggregates.top_users_by_review_count.row_count());
        info!(
            businesses = aggregates.mean_rating_by_business.row_count(),
            zipcodes = aggregates.top_zipcode_mean_rating.row_count(),
            users = aggregates.top_users_by_review_count.row_count(),
            "aggregates computed"
        );
        Ok(aggregates)
    }

    /// `{BusinessId, AverageReviewStars}`, one row per business, ordered by id.
    pub fn mean_rating_by_business(&self, merged: &Table) -> Result<Table, AggregateError> {
        let business_id = &self.columns.business_id;
        if merged.is_empty() {
            return Ok(two_columns(business_id, vec![], constants::AVERAGE_REVIEW_STARS, vec![]));
        }
        let ids = self.values(merged, business_id)?;
        let stars = self.values(merged, &self.columns.stars)?;

        let mut groups = group_rows(ids.iter().enumerate());
        groups.sort_by(|a, b| a.key.cmp(&b.key));

        let means = groups.iter().map(|g| mean(stars, &g.rows)).collect();
        let keys = groups.into_iter().map(|g| g.value).collect();
        Ok(two_columns(business_id, keys, constants::AVERAGE_REVIEW_STARS, means))
    }

    /// `{Zipcode, AverageReviewStars}` for the densest zipcodes, densest first.
    ///
    /// Density is the number of distinct businesses per zipcode, taken from
    /// the first row of each business. The mean is over every review row in
    /// the selected zipcodes.
    ///
    /// Addresses come from the business documents; when none carried one the
    /// view is empty rather than an error.
    pub fn top_zipcode_mean_rating(&self, merged: &Table) -> Result<Table, AggregateError> {
        let empty = || two_columns(constants::ZIPCODE, vec![], constants::AVERAGE_REVIEW_STARS, vec![]);
        if merged.is_empty() {
            return Ok(empty());
        }
        if !merged.has_column(&self.columns.address) {
            warn!(column = %self.columns.address, "no address column in merged table, zipcode view is empty");
            return Ok(empty());
        }
        let ids = self.values(merged, &self.columns.business_id)?;
        let addresses = self.values(merged, &self.columns.address)?;
        let stars = self.values(merged, &self.columns.stars)?;

        let zips: Vec<Value> = addresses
            .iter()
            .map(|a| zipcode(a).map_or(Value::Null, Value::Text))
            .collect();

        // one row per business, first occurrence wins
        let mut seen: HashSet<ValueKey> = HashSet::new();
        let first_rows: Vec<usize> = ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.key().is_some_and(|k| seen.insert(k)))
            .map(|(i, _)| i)
            .collect();

        let mut density = group_rows(first_rows.iter().map(|&i| (i, &zips[i])));
        density.sort_by(|a, b| b.rows.len().cmp(&a.rows.len()));
        density.truncate(self.top_zipcodes);
        debug!(
            ranked = ?density.iter().map(|g| (g.key.to_string(), g.rows.len())).collect::<Vec<_>>(),
            "densest zipcodes"
        );

        let rank: HashMap<&ValueKey, usize> = density.iter().enumerate().map(|(r, g)| (&g.key, r)).collect();
        let mut per_zip: Vec<Vec<usize>> = vec![Vec::new(); density.len()];
        for (i, zip) in zips.iter().enumerate() {
            if let Some(&r) = zip.key().as_ref().and_then(|k| rank.get(k)) {
                per_zip[r].push(i);
            }
        }

        let means = per_zip.iter().map(|rows| mean(stars, rows)).collect();
        let keys = density.into_iter().map(|g| g.value).collect();
        Ok(two_columns(constants::ZIPCODE, keys, constants::AVERAGE_REVIEW_STARS, means))
    }

    /// `{UserId, NumberOfReviewsWritten}` for the most active users, most active first.
    pub fn top_users_by_review_count(&self, merged: &Table) -> Result<Table, AggregateError> {
        let user_id = &self.columns.user_id;
        if merged.is_empty() {
            return Ok(two_columns(user_id, vec![], constants::NUMBER_OF_REVIEWS_WRITTEN, vec![]));
        }
        let users = self.values(merged, user_id)?;

        let mut groups = group_rows(users.iter().enumerate());
        groups.sort_by(|a, b| b.rows.len().cmp(&a.rows.len()));
        groups.truncate(self.top_users);

        let counts = groups.iter().map(|g| Value::Int(g.rows.len() as i64)).collect();
        let keys = groups.into_iter().map(|g| g.value).collect();
        Ok(two_columns(user_id, keys, constants::NUMBER_OF_REVIEWS_WRITTEN, counts))
    }
}

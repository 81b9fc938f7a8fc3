//! The immutable, ordered row type served by [`crate::provider::DataProvider`].
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One record from a tabular source: an ordered mapping of column name to
/// value. Rows are immutable once loaded; every row handed to a caller is a
/// defensive copy (I3 in the data model).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    /// Build a row from an ordered list of (column, value) pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Row(pairs.into_iter().collect())
    }

    /// The value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Columns in their original order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate the row's (column, value) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Project `self` down to just `columns`, preserving the order `columns`
    /// is given in. Unknown columns are silently skipped.
    pub fn project(&self, columns: &[String]) -> Row {
        Row(columns
            .iter()
            .filter_map(|c| self.0.get(c).map(|v| (c.clone(), v.clone())))
            .collect())
    }

    /// Rename columns per `renames` (old -> new), preserving row order.
    pub fn rename(&self, renames: &IndexMap<String, String>) -> Row {
        Row(self
            .0
            .iter()
            .map(|(k, v)| {
                let new_key = renames.get(k).cloned().unwrap_or_else(|| k.clone());
                (new_key, v.clone())
            })
            .collect())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//! The per-VU context that [`crate::manager::DataManager`] populates on
//! every iteration/step (spec §3, "VU context").
use std::collections::HashMap;

use crate::row::Row;
use crate::value::Value;

/// Holds the rows most recently loaded for one VU, plus the flattened
/// variables map those rows are written into. Global-row keys always win
/// over scenario-row keys on conflict (P4).
#[derive(Debug, Clone, Default)]
pub struct VuContext {
    /// The most recently loaded global-provider row, if any.
    pub global_row: Option<Row>,
    /// The most recently loaded scenario-provider row, if any.
    pub scenario_row: Option<Row>,
    /// The flattened variables visible to the VU's protocol handlers.
    pub variables: HashMap<String, Value>,
}

impl VuContext {
    /// A freshly created, empty context.
    pub fn new() -> Self {
        VuContext::default()
    }

    /// Write every column of `row` into `variables`, unconditionally
    /// overwriting any existing value (global precedence).
    pub(crate) fn apply_global(&mut self, row: Row) {
        for (col, value) in row.iter() {
            self.variables.insert(col.to_string(), value.clone());
        }
        self.global_row = Some(row);
    }

    /// Write every column of `row` into `variables`, only where the key is
    /// currently absent.
    pub(crate) fn apply_scenario(&mut self, row: Row) {
        for (col, value) in row.iter() {
            self.variables
                .entry(col.to_string())
                .or_insert_with(|| value.clone());
        }
        self.scenario_row = Some(row);
    }

    /// Clear all loaded rows and variables, e.g. on VU teardown.
    pub fn clear(&mut self) {
        self.global_row = None;
        self.scenario_row = None;
        self.variables.clear();
    }
}

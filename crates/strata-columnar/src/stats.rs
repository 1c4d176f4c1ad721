#![forbid(unsafe_code)]

use crate::types::{compare_values, ColumnType, KeyValue, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Exact statistics gathered while a column is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStats {
    pub column_type: ColumnType,
    pub row_count: u64,
    pub null_count: u64,
    pub distinct_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl ColumnStats {
    /// A column is a key when it has no nulls and every value is distinct.
    pub fn is_unique(&self) -> bool {
        self.null_count == 0 && self.distinct_count == self.row_count
    }
}

/// Accumulates [`ColumnStats`] one value at a time.
///
/// Distinct counting is exact.
#[derive(Debug)]
pub(crate) struct StatsCollector {
    stats: ColumnStats,
    distinct: HashSet<KeyValue>,
}

impl StatsCollector {
    pub(crate) fn new(column_type: ColumnType) -> Self {
        Self {
            stats: ColumnStats {
                column_type,
                ..ColumnStats::default()
            },
            distinct: HashSet::new(),
        }
    }

    pub(crate) fn observe_null(&mut self) {
        self.stats.row_count += 1;
        self.stats.null_count += 1;
    }

    pub(crate) fn observe(&mut self, value: &Value) {
        let Some(key) = value.key() else {
            self.observe_null();
            return;
        };
        self.stats.row_count += 1;
        self.distinct.insert(key);

        let replace_min = match &self.stats.min {
            None => true,
            Some(min) => compare_values(value, min) == Ordering::Less,
        };
        if replace_min {
            self.stats.min = Some(value.clone());
        }
        let replace_max = match &self.stats.max {
            None => true,
            Some(max) => compare_values(value, max) == Ordering::Greater,
        };
        if replace_max {
            self.stats.max = Some(value.clone());
        }
    }

    pub(crate) fn finish(mut self) -> ColumnStats {
        self.stats.distinct_count = self.distinct.len() as u64;
        self.stats
    }
}

//! Mergeable aggregate states.
//!
//! One state exists per (column, grouping-tree node). Leaf nodes feed raw
//! values through [`AggregateState::add`]; every internal node is built by
//! [`AggregateState::combine`]-ing its direct children, so leaves are never
//! rescanned. `combine` is commutative and associative: merging partial
//! states in any order reproduces a single pass over all values (up to
//! floating-point rounding for the sums).
//!
//! States are plain values with no interior locking; one tree node owns and
//! mutates a state at a time.

use crate::format::{format_datetime, format_duration, format_number, Statistic, NO_DATA};
use std::collections::HashSet;
use std::sync::Arc;
use strata_columnar::{Column, ColumnType, Value};

fn population_std_dev(count: u64, sum: f64, sum_sq: f64) -> f64 {
    let n = count as f64;
    let mean = sum / n;
    // Clamped: rounding can push the difference slightly below zero.
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumericState {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for NumericState {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl NumericState {
    pub fn new() -> Self {
        Self::default()
    }

    /// NaN is treated as a missing value.
    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn combine(&mut self, other: &NumericState) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 0).then(|| population_std_dev(self.count, self.sum, self.sum_sq))
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    fn format(&self, statistic: Statistic) -> String {
        let value = match statistic {
            Statistic::Count => return self.count.to_string(),
            Statistic::Sum => Some(self.sum),
            Statistic::Avg => self.mean(),
            Statistic::StdDev => self.std_dev(),
            Statistic::Min => self.min(),
            Statistic::Max => self.max(),
            _ => return String::new(),
        };
        value.map(format_number).unwrap_or_else(|| NO_DATA.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoolState {
    count: u64,
    true_count: u64,
    false_count: u64,
}

impl BoolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: bool) {
        self.count += 1;
        if value {
            self.true_count += 1;
        } else {
            self.false_count += 1;
        }
    }

    pub fn combine(&mut self, other: &BoolState) {
        self.count += other.count;
        self.true_count += other.true_count;
        self.false_count += other.false_count;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn true_count(&self) -> u64 {
        self.true_count
    }

    pub fn false_count(&self) -> u64 {
        self.false_count
    }

    pub fn ratio(&self) -> Option<f64> {
        (self.count > 0).then(|| self.true_count as f64 / self.count as f64)
    }

    fn format(&self, statistic: Statistic) -> String {
        match statistic {
            Statistic::Count => self.count.to_string(),
            Statistic::True => self.true_count.to_string(),
            Statistic::False => self.false_count.to_string(),
            Statistic::Ratio => self
                .ratio()
                .map(format_number)
                .unwrap_or_else(|| NO_DATA.to_string()),
            _ => String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringState {
    count: u64,
    unique: HashSet<Arc<str>>,
    min: Option<Arc<str>>,
    max: Option<Arc<str>>,
}

impl StringState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Arc<str>) {
        self.count += 1;
        self.observe_bounds(&value);
        self.unique.insert(value);
    }

    fn observe_bounds(&mut self, value: &Arc<str>) {
        if self.min.as_ref().map_or(true, |min| value < min) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |max| value > max) {
            self.max = Some(value.clone());
        }
    }

    pub fn combine(&mut self, other: &StringState) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        for bound in other.min.iter().chain(other.max.iter()) {
            self.observe_bounds(bound);
        }
        self.unique.extend(other.unique.iter().cloned());
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn distinct_count(&self) -> usize {
        self.unique.len()
    }

    pub fn min(&self) -> Option<&str> {
        self.min.as_deref()
    }

    pub fn max(&self) -> Option<&str> {
        self.max.as_deref()
    }

    fn format(&self, statistic: Statistic) -> String {
        match statistic {
            Statistic::Count => self.count.to_string(),
            Statistic::Distinct => self.unique.len().to_string(),
            Statistic::Min => self.min().unwrap_or(NO_DATA).to_string(),
            Statistic::Max => self.max().unwrap_or(NO_DATA).to_string(),
            _ => String::new(),
        }
    }
}

/// Timestamps are epoch nanoseconds; sums are kept as `f64` so the squared
/// sum does not overflow.
#[derive(Clone, Debug, PartialEq)]
pub struct DatetimeState {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: i64,
    max: i64,
}

impl Default for DatetimeState {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: i64::MAX,
            max: i64::MIN,
        }
    }
}

impl DatetimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, nanos: i64) {
        let v = nanos as f64;
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        self.min = self.min.min(nanos);
        self.max = self.max.max(nanos);
    }

    pub fn combine(&mut self, other: &DatetimeState) {
        if other.count == 0 {
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<i64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<i64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<i64> {
        (self.count > 0).then(|| (self.sum / self.count as f64).round() as i64)
    }

    /// Population standard deviation, in nanoseconds.
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 0).then(|| population_std_dev(self.count, self.sum, self.sum_sq))
    }

    /// `max - min`, in nanoseconds.
    pub fn span(&self) -> Option<i64> {
        (self.count > 0).then(|| self.max.saturating_sub(self.min))
    }

    fn format(&self, statistic: Statistic) -> String {
        let rendered = match statistic {
            Statistic::Count => return self.count.to_string(),
            Statistic::Min => self.min().map(format_datetime),
            Statistic::Max => self.max().map(format_datetime),
            Statistic::Avg => self.mean().map(format_datetime),
            Statistic::StdDev => self.std_dev().map(format_duration),
            Statistic::Span => self.span().map(|span| format_duration(span as f64)),
            _ => return String::new(),
        };
        rendered.unwrap_or_else(|| NO_DATA.to_string())
    }
}

/// A mergeable accumulator for one column at one grouping-tree node.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregateState {
    Numeric(NumericState),
    Bool(BoolState),
    String(StringState),
    Datetime(DatetimeState),
}

impl AggregateState {
    /// An empty state for values of `column_type`.
    pub fn for_type(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Number => AggregateState::Numeric(NumericState::new()),
            ColumnType::Boolean => AggregateState::Bool(BoolState::new()),
            ColumnType::String => AggregateState::String(StringState::new()),
            ColumnType::DateTime => AggregateState::Datetime(DatetimeState::new()),
        }
    }

    /// A leaf state over `rows` of `column`.
    pub fn from_column_rows(column: &Column, rows: impl IntoIterator<Item = usize>) -> Self {
        let mut state = Self::for_type(column.column_type());
        for row in rows {
            state.add(&column.value(row));
        }
        state
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            AggregateState::Numeric(_) => ColumnType::Number,
            AggregateState::Bool(_) => ColumnType::Boolean,
            AggregateState::String(_) => ColumnType::String,
            AggregateState::Datetime(_) => ColumnType::DateTime,
        }
    }

    /// Absorb one raw value. Nulls and values of another type are ignored.
    pub fn add(&mut self, value: &Value) {
        match (self, value) {
            (AggregateState::Numeric(s), Value::Number(v)) => s.add(*v),
            (AggregateState::Bool(s), Value::Boolean(v)) => s.add(*v),
            (AggregateState::String(s), Value::String(v)) => s.add(v.clone()),
            (AggregateState::Datetime(s), Value::DateTime(v)) => s.add(*v),
            _ => {}
        }
    }

    /// Fold `other` into `self`. A state of a different kind is ignored.
    pub fn combine(&mut self, other: &AggregateState) {
        match (self, other) {
            (AggregateState::Numeric(a), AggregateState::Numeric(b)) => a.combine(b),
            (AggregateState::Bool(a), AggregateState::Bool(b)) => a.combine(b),
            (AggregateState::String(a), AggregateState::String(b)) => a.combine(b),
            (AggregateState::Datetime(a), AggregateState::Datetime(b)) => a.combine(b),
            _ => {}
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            AggregateState::Numeric(s) => s.count(),
            AggregateState::Bool(s) => s.count(),
            AggregateState::String(s) => s.count(),
            AggregateState::Datetime(s) => s.count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Render `statistic`. Any applicable statistic of an empty state renders
    /// as [`NO_DATA`]; a statistic that does not apply to this kind renders
    /// as an empty string.
    pub fn format(&self, statistic: Statistic) -> String {
        if !statistic.applies_to(self.column_type()) {
            return String::new();
        }
        if self.is_empty() {
            return NO_DATA.to_string();
        }
        match self {
            AggregateState::Numeric(s) => s.format(statistic),
            AggregateState::Bool(s) => s.format(statistic),
            AggregateState::String(s) => s.format(statistic),
            AggregateState::Datetime(s) => s.format(statistic),
        }
    }
}

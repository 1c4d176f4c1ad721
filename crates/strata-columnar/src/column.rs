#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::join::{JoinError, Relation};
use crate::stats::ColumnStats;
use crate::types::{ColumnType, KeyValue, Value};
use std::fmt;
use std::sync::Arc;

/// Identity of a column: its name, a human readable label and the entity
/// type its values denote (empty when the column carries no entity).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: String,
    pub display_name: String,
    pub entity_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            entity_type: String::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = entity_type.into();
        self
    }

    pub fn has_entity_type(&self) -> bool {
        !self.entity_type.is_empty()
    }
}

/// A column definition paired with its logical type.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub def: ColumnDef,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            def: ColumnDef::new(name),
            column_type,
        }
    }

    pub fn with_def(def: ColumnDef, column_type: ColumnType) -> Self {
        Self { def, column_type }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Finalized storage for one column.
#[derive(Debug)]
pub(crate) enum ColumnData {
    Number {
        values: Vec<f64>,
        validity: BitVec,
    },
    Boolean {
        values: BitVec,
        validity: BitVec,
    },
    String {
        dictionary: Vec<Arc<str>>,
        indices: Vec<u32>,
        validity: BitVec,
    },
    DateTime {
        values: Vec<i64>,
        validity: BitVec,
    },
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Number { validity, .. }
            | ColumnData::Boolean { validity, .. }
            | ColumnData::String { validity, .. }
            | ColumnData::DateTime { validity, .. } => validity.len(),
        }
    }

    fn get(&self, row: usize) -> Value {
        match self {
            ColumnData::Number { values, validity } if validity.get(row) => {
                Value::Number(values[row])
            }
            ColumnData::Boolean { values, validity } if validity.get(row) => {
                Value::Boolean(values.get(row))
            }
            ColumnData::String {
                dictionary,
                indices,
                validity,
            } if validity.get(row) => Value::String(dictionary[indices[row] as usize].clone()),
            ColumnData::DateTime { values, validity } if validity.get(row) => {
                Value::DateTime(values[row])
            }
            _ => Value::Null,
        }
    }
}

#[derive(Debug)]
pub(crate) struct StoredColumn {
    pub(crate) data: ColumnData,
    pub(crate) stats: ColumnStats,
}

/// A column whose values are looked up in another table through a relation.
struct JoinedColumn {
    relation: Arc<Relation>,
    source: Column,
}

impl fmt::Debug for JoinedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedColumn")
            .field("hops", &self.relation.hop_count())
            .field("source", &self.source.name())
            .finish()
    }
}

#[derive(Clone, Debug)]
enum ColumnSource {
    Stored(Arc<StoredColumn>),
    Joined(Arc<JoinedColumn>),
}

/// An immutable, cheaply clonable column.
///
/// Stored columns own their (finalized) data. Joined columns own their
/// relation and the column they read from; values are computed on access.
#[derive(Clone, Debug)]
pub struct Column {
    def: ColumnDef,
    column_type: ColumnType,
    len: usize,
    source: ColumnSource,
}

impl Column {
    pub(crate) fn stored(def: ColumnDef, column_type: ColumnType, stored: StoredColumn) -> Self {
        Self {
            def,
            column_type,
            len: stored.data.len(),
            source: ColumnSource::Stored(Arc::new(stored)),
        }
    }

    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn display_name(&self) -> &str {
        &self.def.display_name
    }

    pub fn entity_type(&self) -> &str {
        &self.def.entity_type
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every value is present and unique. Joined columns are never keys.
    pub fn is_key(&self) -> bool {
        match &self.source {
            ColumnSource::Stored(stored) => stored.stats.is_unique(),
            ColumnSource::Joined(_) => false,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.source, ColumnSource::Joined(_))
    }

    /// Build-time statistics (stored columns only).
    pub fn stats(&self) -> Option<&ColumnStats> {
        match &self.source {
            ColumnSource::Stored(stored) => Some(&stored.stats),
            ColumnSource::Joined(_) => None,
        }
    }

    /// The relation backing a joined column.
    pub fn relation(&self) -> Option<&Relation> {
        match &self.source {
            ColumnSource::Stored(_) => None,
            ColumnSource::Joined(joined) => Some(&joined.relation),
        }
    }

    /// Returns the same column under a different definition.
    pub fn with_def(&self, def: ColumnDef) -> Column {
        Column {
            def,
            ..self.clone()
        }
    }

    /// Out-of-range rows and unmatched joins read as [`Value::Null`].
    pub fn value(&self, row: usize) -> Value {
        if row >= self.len {
            return Value::Null;
        }
        match &self.source {
            ColumnSource::Stored(stored) => stored.data.get(row),
            ColumnSource::Joined(joined) => match joined.relation.lookup(row) {
                Some(target) => joined.source.value(target),
                None => Value::Null,
            },
        }
    }

    pub fn number(&self, row: usize) -> Option<f64> {
        self.value(row).as_f64()
    }

    pub fn boolean(&self, row: usize) -> Option<bool> {
        self.value(row).as_bool()
    }

    pub fn string(&self, row: usize) -> Option<Arc<str>> {
        match self.value(row) {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn datetime(&self, row: usize) -> Option<i64> {
        self.value(row).as_datetime()
    }

    pub(crate) fn key(&self, row: usize) -> Option<KeyValue> {
        self.value(row).key()
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len).map(move |row| self.value(row))
    }

    /// Derive a column with one value per `relation` source row, read from
    /// `self` at the row the relation resolves to.
    ///
    /// `self` must live in the relation's target table.
    pub fn create_joined_column(
        &self,
        def: ColumnDef,
        relation: Relation,
    ) -> Result<Column, JoinError> {
        if relation.target_len() != self.len {
            return Err(JoinError::TargetLengthMismatch {
                column: self.name().to_string(),
                expected: relation.target_len(),
                actual: self.len,
            });
        }
        Ok(Column {
            def,
            column_type: self.column_type,
            len: relation.len(),
            source: ColumnSource::Joined(Arc::new(JoinedColumn {
                relation: Arc::new(relation),
                source: self.clone(),
            })),
        })
    }
}

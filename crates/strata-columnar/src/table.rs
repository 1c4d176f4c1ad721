#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::column::{Column, ColumnData, ColumnDef, ColumnSchema, StoredColumn};
use crate::stats::StatsCollector;
use crate::types::{ColumnType, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TableError {
    #[error("row width mismatch for {table}: expected {expected} values, got {actual}")]
    RowWidthMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column {table}[{column}]")]
    DuplicateColumn { table: String, column: String },

    #[error("column length mismatch for {table}[{column}]: expected {expected} rows, got {actual}")]
    ColumnLengthMismatch {
        table: String,
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Ordered, named columns sharing one row count.
///
/// Tables come out of [`TableBuilder::finalize`] read-only; the only later
/// change is [`Table::add_column`], used to attach derived columns before a
/// table is shared.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    rows: usize,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(Column::name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(self.column_index(name)?)
    }

    pub fn column_at(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<Value> {
        Some(self.column(column)?.value(row))
    }

    /// All columns tagged with `entity_type`, in table order.
    pub fn columns_of_entity<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns
            .iter()
            .filter(move |c| !entity_type.is_empty() && c.entity_type() == entity_type)
    }

    pub fn has_entity_type(&self, entity_type: &str) -> bool {
        self.columns_of_entity(entity_type).next().is_some()
    }

    fn tagged<'a>(
        &'a self,
        entity_type: &str,
        pred: impl Fn(&Column) -> bool,
    ) -> Option<&'a Column> {
        if entity_type.is_empty() {
            return None;
        }
        self.columns
            .iter()
            .find(|&c| c.entity_type() == entity_type && pred(c))
    }

    /// The primary-key column for `entity_type`: tagged with it and unique.
    pub fn key_column(&self, entity_type: &str) -> Option<&Column> {
        self.tagged(entity_type, Column::is_key)
    }

    /// The column to follow when joining out of this table towards
    /// `entity_type`: a stored column is preferred over a derived one.
    pub fn link_column(&self, entity_type: &str) -> Option<&Column> {
        self.tagged(entity_type, |c| !c.is_joined())
            .or_else(|| self.tagged(entity_type, |_| true))
    }

    pub fn add_column(&mut self, column: Column) -> Result<(), TableError> {
        if self.column_index.contains_key(column.name()) {
            return Err(TableError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name().to_string(),
            });
        }
        if column.len() != self.rows {
            return Err(TableError::ColumnLengthMismatch {
                table: self.name.clone(),
                column: column.name().to_string(),
                expected: self.rows,
                actual: column.len(),
            });
        }
        self.column_index
            .insert(column.name().to_string(), self.columns.len());
        self.columns.push(column);
        Ok(())
    }
}

/// Streaming, append-only construction of a [`Table`].
pub struct TableBuilder {
    name: String,
    schema: Vec<ColumnSchema>,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

enum ColumnBuilder {
    Number(NumberBuilder),
    Boolean(BoolBuilder),
    Dict(DictBuilder),
    DateTime(DateTimeBuilder),
}

struct NumberBuilder {
    values: Vec<f64>,
    validity: BitVec,
    stats: StatsCollector,
}

struct BoolBuilder {
    values: BitVec,
    validity: BitVec,
    stats: StatsCollector,
}

struct DictBuilder {
    dictionary: Vec<Arc<str>>,
    dict_map: HashMap<Arc<str>, u32>,
    indices: Vec<u32>,
    validity: BitVec,
    stats: StatsCollector,
}

struct DateTimeBuilder {
    values: Vec<i64>,
    validity: BitVec,
    stats: StatsCollector,
}

impl TableBuilder {
    /// Fails when two columns share a name.
    pub fn new(name: impl Into<String>, schema: Vec<ColumnSchema>) -> Result<Self, TableError> {
        let name = name.into();
        let mut seen = HashSet::with_capacity(schema.len());
        for col in &schema {
            if !seen.insert(col.name()) {
                return Err(TableError::DuplicateColumn {
                    table: name,
                    column: col.name().to_string(),
                });
            }
        }

        let builders = schema
            .iter()
            .map(|col| match col.column_type {
                ColumnType::Number => ColumnBuilder::Number(NumberBuilder {
                    values: Vec::new(),
                    validity: BitVec::new(),
                    stats: StatsCollector::new(ColumnType::Number),
                }),
                ColumnType::Boolean => ColumnBuilder::Boolean(BoolBuilder {
                    values: BitVec::new(),
                    validity: BitVec::new(),
                    stats: StatsCollector::new(ColumnType::Boolean),
                }),
                ColumnType::String => ColumnBuilder::Dict(DictBuilder {
                    dictionary: Vec::new(),
                    dict_map: HashMap::new(),
                    indices: Vec::new(),
                    validity: BitVec::new(),
                    stats: StatsCollector::new(ColumnType::String),
                }),
                ColumnType::DateTime => ColumnBuilder::DateTime(DateTimeBuilder {
                    values: Vec::new(),
                    validity: BitVec::new(),
                    stats: StatsCollector::new(ColumnType::DateTime),
                }),
            })
            .collect();

        Ok(Self {
            name,
            schema,
            builders,
            rows: 0,
        })
    }

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Append one row. Values whose type does not match the column are
    /// stored as nulls.
    pub fn append_row(&mut self, row: &[Value]) -> Result<(), TableError> {
        if row.len() != self.builders.len() {
            return Err(TableError::RowWidthMismatch {
                table: self.name.clone(),
                expected: self.builders.len(),
                actual: row.len(),
            });
        }

        for (builder, value) in self.builders.iter_mut().zip(row.iter()) {
            match builder {
                ColumnBuilder::Number(b) => b.push(value),
                ColumnBuilder::Boolean(b) => b.push(value),
                ColumnBuilder::Dict(b) => b.push(value),
                ColumnBuilder::DateTime(b) => b.push(value),
            }
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finalize(self) -> Table {
        let mut columns = Vec::with_capacity(self.builders.len());
        let mut column_index = HashMap::with_capacity(self.builders.len());

        for (schema, builder) in self.schema.into_iter().zip(self.builders) {
            let stored = match builder {
                ColumnBuilder::Number(b) => b.finish(),
                ColumnBuilder::Boolean(b) => b.finish(),
                ColumnBuilder::Dict(b) => b.finish(),
                ColumnBuilder::DateTime(b) => b.finish(),
            };
            column_index.insert(schema.def.name.clone(), columns.len());
            columns.push(Column::stored(schema.def, schema.column_type, stored));
        }

        Table {
            name: self.name,
            columns,
            column_index,
            rows: self.rows,
        }
    }
}

impl NumberBuilder {
    fn push(&mut self, value: &Value) {
        match value {
            Value::Number(n) => {
                self.values.push(*n);
                self.validity.push(true);
                self.stats.observe(value);
            }
            // Type mismatch: treat as null.
            _ => {
                self.values.push(0.0);
                self.validity.push(false);
                self.stats.observe_null();
            }
        }
    }

    fn finish(mut self) -> StoredColumn {
        self.values.shrink_to_fit();
        self.validity.shrink_to_fit();
        StoredColumn {
            data: ColumnData::Number {
                values: self.values,
                validity: self.validity,
            },
            stats: self.stats.finish(),
        }
    }
}

impl BoolBuilder {
    fn push(&mut self, value: &Value) {
        match value {
            Value::Boolean(b) => {
                self.values.push(*b);
                self.validity.push(true);
                self.stats.observe(value);
            }
            _ => {
                self.values.push(false);
                self.validity.push(false);
                self.stats.observe_null();
            }
        }
    }

    fn finish(self) -> StoredColumn {
        StoredColumn {
            data: ColumnData::Boolean {
                values: self.values,
                validity: self.validity,
            },
            stats: self.stats.finish(),
        }
    }
}

impl DictBuilder {
    fn push(&mut self, value: &Value) {
        let Value::String(s) = value else {
            self.indices.push(0);
            self.validity.push(false);
            self.stats.observe_null();
            return;
        };

        let idx = match self.dict_map.get(s) {
            Some(idx) => *idx,
            None => {
                let idx = self.dictionary.len() as u32;
                self.dictionary.push(s.clone());
                self.dict_map.insert(s.clone(), idx);
                idx
            }
        };
        self.indices.push(idx);
        self.validity.push(true);
        self.stats.observe(value);
    }

    fn finish(mut self) -> StoredColumn {
        self.indices.shrink_to_fit();
        self.dictionary.shrink_to_fit();
        StoredColumn {
            data: ColumnData::String {
                dictionary: self.dictionary,
                indices: self.indices,
                validity: self.validity,
            },
            stats: self.stats.finish(),
        }
    }
}

impl DateTimeBuilder {
    fn push(&mut self, value: &Value) {
        match value {
            Value::DateTime(v) => {
                self.values.push(*v);
                self.validity.push(true);
                self.stats.observe(value);
            }
            _ => {
                self.values.push(0);
                self.validity.push(false);
                self.stats.observe_null();
            }
        }
    }

    fn finish(mut self) -> StoredColumn {
        self.values.shrink_to_fit();
        StoredColumn {
            data: ColumnData::DateTime {
                values: self.values,
                validity: self.validity,
            },
            stats: self.stats.finish(),
        }
    }
}

/// Convenience for small tables: build one from a schema and literal rows.
pub fn table_from_rows(
    name: impl Into<String>,
    schema: Vec<ColumnSchema>,
    rows: impl IntoIterator<Item = Vec<Value>>,
) -> Result<Table, TableError> {
    let mut builder = TableBuilder::new(name, schema)?;
    for row in rows {
        builder.append_row(&row)?;
    }
    Ok(builder.finalize())
}

impl From<(&str, ColumnType)> for ColumnSchema {
    fn from((name, column_type): (&str, ColumnType)) -> Self {
        ColumnSchema::new(name, column_type)
    }
}

impl From<(ColumnDef, ColumnType)> for ColumnSchema {
    fn from((def, column_type): (ColumnDef, ColumnType)) -> Self {
        ColumnSchema::with_def(def, column_type)
    }
}

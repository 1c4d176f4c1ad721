#![forbid(unsafe_code)]

use crate::column::Column;
use crate::types::{ColumnType, KeyValue, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum JoinError {
    #[error("cannot join {from}({from_type}) to {to}({to_type}): column types differ")]
    TypeMismatch {
        from: String,
        from_type: ColumnType,
        to: String,
        to_type: ColumnType,
    },

    #[error("join target {column} is not unique: {value} appears more than once")]
    NonUniqueKey { column: String, value: Value },

    #[error("a chained join needs at least one relation")]
    EmptyChain,

    #[error("chained join hop {hop} starts in a table of {actual} rows, previous hop ends in {expected}")]
    BrokenChain {
        hop: usize,
        expected: usize,
        actual: usize,
    },

    #[error("joined column {column} has {actual} rows, relation targets {expected}")]
    TargetLengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Maps a row of `from` to the row of `to` holding an equal value.
///
/// The lookup index over `to` is built once at construction.
#[derive(Debug)]
pub struct JoinRelation {
    from: Column,
    to: Column,
    to_index: HashMap<KeyValue, usize>,
}

impl JoinRelation {
    pub fn new(from: Column, to: Column) -> Result<Self, JoinError> {
        if from.column_type() != to.column_type() {
            return Err(JoinError::TypeMismatch {
                from: from.name().to_string(),
                from_type: from.column_type(),
                to: to.name().to_string(),
                to_type: to.column_type(),
            });
        }

        let mut to_index = HashMap::with_capacity(to.len());
        for row in 0..to.len() {
            let Some(key) = to.key(row) else {
                continue;
            };
            if to_index.insert(key, row).is_some() {
                return Err(JoinError::NonUniqueKey {
                    column: to.name().to_string(),
                    value: to.value(row),
                });
            }
        }

        Ok(Self { from, to, to_index })
    }

    pub fn from_column(&self) -> &Column {
        &self.from
    }

    pub fn to_column(&self) -> &Column {
        &self.to
    }

    /// Rows in the source table.
    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    /// Rows in the target table.
    pub fn target_len(&self) -> usize {
        self.to.len()
    }

    /// Nulls and values with no match resolve to `None`.
    pub fn lookup(&self, row: usize) -> Option<usize> {
        let key = self.from.key(row)?;
        self.to_index.get(&key).copied()
    }
}

/// Several relations composed end to end through intermediate tables.
///
/// Hop `i + 1` reads its `from` column in the table hop `i` lands in; no
/// intermediate column is materialized.
#[derive(Debug)]
pub struct ChainedJoinRelation {
    relations: Vec<JoinRelation>,
}

impl ChainedJoinRelation {
    pub fn new(relations: Vec<JoinRelation>) -> Result<Self, JoinError> {
        if relations.is_empty() {
            return Err(JoinError::EmptyChain);
        }
        for (hop, pair) in relations.windows(2).enumerate() {
            if pair[0].target_len() != pair[1].len() {
                return Err(JoinError::BrokenChain {
                    hop: hop + 1,
                    expected: pair[0].target_len(),
                    actual: pair[1].len(),
                });
            }
        }
        Ok(Self { relations })
    }

    pub fn relations(&self) -> &[JoinRelation] {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.relations[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn target_len(&self) -> usize {
        self.relations[self.relations.len() - 1].target_len()
    }

    pub fn lookup(&self, row: usize) -> Option<usize> {
        self.relations
            .iter()
            .try_fold(row, |row, relation| relation.lookup(row))
    }
}

/// The relation a joined column reads through.
#[derive(Debug)]
pub enum Relation {
    Single(JoinRelation),
    Chained(ChainedJoinRelation),
}

impl Relation {
    /// One relation is used as is; two or more are chained.
    pub fn from_chain(mut relations: Vec<JoinRelation>) -> Result<Self, JoinError> {
        match relations.len() {
            0 => Err(JoinError::EmptyChain),
            1 => Ok(Relation::Single(relations.remove(0))),
            _ => Ok(Relation::Chained(ChainedJoinRelation::new(relations)?)),
        }
    }

    pub fn hop_count(&self) -> usize {
        match self {
            Relation::Single(_) => 1,
            Relation::Chained(chain) => chain.relations.len(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Relation::Single(rel) => rel.len(),
            Relation::Chained(chain) => chain.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn target_len(&self) -> usize {
        match self {
            Relation::Single(rel) => rel.target_len(),
            Relation::Chained(chain) => chain.target_len(),
        }
    }

    pub fn lookup(&self, row: usize) -> Option<usize> {
        match self {
            Relation::Single(rel) => rel.lookup(row),
            Relation::Chained(chain) => chain.lookup(row),
        }
    }
}

impl From<JoinRelation> for Relation {
    fn from(value: JoinRelation) -> Self {
        Relation::Single(value)
    }
}

impl From<ChainedJoinRelation> for Relation {
    fn from(value: ChainedJoinRelation) -> Self {
        Relation::Chained(value)
    }
}

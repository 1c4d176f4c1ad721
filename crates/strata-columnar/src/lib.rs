//! Typed columnar tables for Strata.
//!
//! This crate focuses on:
//! - Typed columns built append-then-finalize, immutable once finalized.
//! - Exact per-column statistics, from which "is key" is derived.
//! - Join relations between same-typed columns, single or chained through
//!   intermediate tables, and joined columns computed on access.

#![forbid(unsafe_code)]

mod bitmap;
mod column;
mod join;
mod stats;
mod table;
mod types;

pub use crate::column::{Column, ColumnDef, ColumnSchema};
pub use crate::join::{ChainedJoinRelation, JoinError, JoinRelation, Relation};
pub use crate::stats::ColumnStats;
pub use crate::table::{table_from_rows, Table, TableBuilder, TableError};
pub use crate::types::{compare_values, ColumnType, KeyValue, Value};

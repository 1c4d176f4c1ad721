//! Hierarchy-aware data model for Strata.
//!
//! - [`DataSourceManager`] loads configured sources on demand, caches them
//!   and enriches each table with ancestor columns.
//! - [`JoinResolver`] synthesizes those columns from the [`EntityRegistry`]'s
//!   hierarchies through join relations into owner tables.
//! - [`AggregateState`] is the mergeable accumulator a grouping tree keeps
//!   per (column, node), rendered through [`Statistic`].

mod aggregate;
mod config;
mod csv_loader;
mod error;
mod format;
mod loader;
mod manager;
mod registry;
mod resolver;

pub use crate::aggregate::{AggregateState, BoolState, DatetimeState, NumericState, StringState};
pub use crate::config::{
    ColumnAnnotation, EntityTypeConfig, HierarchyConfig, ModelConfig, SourceConfig,
};
pub use crate::csv_loader::CsvLoader;
pub use crate::error::{ModelError, ModelResult};
pub use crate::format::{
    format_datetime, format_duration, format_number, Statistic, UnknownStatistic, NO_DATA,
};
pub use crate::loader::{enrich_schema, TableLoader};
pub use crate::manager::DataSourceManager;
pub use crate::registry::{EntityRegistry, EntityType, Hierarchy};
pub use crate::resolver::{
    display_name, short_name, JoinResolver, ResolveError, ResolveReport, SkippedAncestor,
    SynthesizedColumn, TableProvider, VIRTUAL_NAME_MARKER,
};

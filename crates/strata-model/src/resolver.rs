//! Ancestor column synthesis.
//!
//! For a table whose primary entity type sits below the root of one or more
//! hierarchies, [`JoinResolver::resolve`] adds one joined column per ancestor
//! entity type the table does not already expose. Each column reads its
//! values through a chain of [`JoinRelation`]s: the table's link column into
//! the owning table of that level, then that table's link column upwards,
//! until the ancestor's own table is reached.
//!
//! Resolution is fail-soft. Any ancestor that cannot be reached (missing
//! owner table, link column or primary key) is skipped with a warning and
//! reported in [`ResolveReport::skipped`]; the remaining ancestors still
//! resolve.

use crate::registry::EntityRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use strata_columnar::{Column, ColumnDef, JoinError, JoinRelation, Relation, Table, TableError};
use thiserror::Error;

/// Prefixed to a synthesized column name that collides with an existing one.
pub const VIRTUAL_NAME_MARKER: char = '^';

/// Supplies the table owning an entity type's primary key.
pub trait TableProvider {
    fn table_for_entity(&self, entity_type: &str) -> Result<Arc<Table>, ResolveError>;
}

impl<F> TableProvider for F
where
    F: Fn(&str) -> Result<Arc<Table>, ResolveError>,
{
    fn table_for_entity(&self, entity_type: &str) -> Result<Arc<Table>, ResolveError> {
        self(entity_type)
    }
}

/// Why one ancestor column could not be built.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("no table owns entity type {entity_type}")]
    MissingOwner { entity_type: String },

    #[error("table {table} has no primary key column for {entity_type}")]
    MissingPrimaryKey { table: String, entity_type: String },

    #[error("table {table} has no column linking to {entity_type}")]
    MissingLink { table: String, entity_type: String },

    #[error("failed to load table {table}: {message}")]
    LoadFailed { table: String, message: String },

    #[error("cyclic load of table {table}")]
    Cycle { table: String },

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesizedColumn {
    pub name: String,
    pub entity_type: String,
    pub hierarchy: String,
    /// Number of join relations between the table and the ancestor's table.
    pub hops: usize,
}

#[derive(Debug, PartialEq)]
pub struct SkippedAncestor {
    pub entity_type: String,
    pub hierarchy: String,
    pub reason: ResolveError,
}

#[derive(Debug, Default, PartialEq)]
pub struct ResolveReport {
    pub added: Vec<SynthesizedColumn>,
    pub skipped: Vec<SkippedAncestor>,
}

impl ResolveReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.skipped.is_empty()
    }
}

/// The last dot-separated segment of an entity type: `geo.region` → `region`.
pub fn short_name(entity_type: &str) -> &str {
    entity_type.rsplit('.').next().unwrap_or(entity_type)
}

/// `^^region` → `Region`.
pub fn display_name(name: &str) -> String {
    let stripped = name.trim_start_matches(VIRTUAL_NAME_MARKER);
    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Prefix the marker until `base` no longer collides with a taken name, and
/// record the result as taken.
fn unique_name(base: &str, taken: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    while taken.contains(&name) {
        name.insert(0, VIRTUAL_NAME_MARKER);
    }
    taken.insert(name.clone());
    name
}

/// Whether `table` already carries `entity_type` as a column of its own
/// name, or through a previously synthesized column.
fn exposes(table: &Table, entity_type: &str) -> bool {
    let short = short_name(entity_type);
    table
        .columns_of_entity(entity_type)
        .any(|c| c.is_joined() || c.name() == short)
}

/// The nearest level in `range` (searching from the top of the range down
/// towards the root) for which `table` has a link column.
fn nearest_link<'t>(
    table: &'t Table,
    levels: &[String],
    range: std::ops::Range<usize>,
) -> Option<(usize, &'t Column)> {
    range
        .rev()
        .find_map(|level| Some((level, table.link_column(&levels[level])?)))
}

pub struct JoinResolver<'a, P: ?Sized> {
    registry: &'a EntityRegistry,
    provider: &'a P,
}

impl<'a, P: TableProvider + ?Sized> JoinResolver<'a, P> {
    pub fn new(registry: &'a EntityRegistry, provider: &'a P) -> Self {
        Self { registry, provider }
    }

    /// Add ancestor columns for every hierarchy containing `primary_entity`.
    /// Running this on an already enriched table adds nothing.
    pub fn resolve(&self, table: &mut Table, primary_entity: &str) -> ResolveReport {
        let mut report = ResolveReport::default();
        let mut taken: HashSet<String> = table.column_names().map(str::to_string).collect();

        for hierarchy in self.registry.hierarchies_containing(primary_entity) {
            let levels = hierarchy.levels();
            let Some(my_level) = hierarchy.level_of(primary_entity) else {
                continue;
            };

            for target in (0..my_level).rev() {
                let ancestor = &levels[target];
                if exposes(table, ancestor) {
                    continue;
                }

                let result = self.build(table, levels, my_level, target).and_then(
                    |(relation, source)| {
                        let hops = relation.hop_count();
                        let name = unique_name(short_name(ancestor), &mut taken);
                        let def = ColumnDef::new(name.clone())
                            .with_display_name(display_name(&name))
                            .with_entity_type(ancestor.clone());
                        let column = source.create_joined_column(def, relation)?;
                        table.add_column(column)?;
                        Ok((name, hops))
                    },
                );

                match result {
                    Ok((name, hops)) => {
                        log::debug!(
                            "added {}[{name}] for {ancestor} via {hops} relation(s) ({})",
                            table.name(),
                            hierarchy.name()
                        );
                        report.added.push(SynthesizedColumn {
                            name,
                            entity_type: ancestor.clone(),
                            hierarchy: hierarchy.name().to_string(),
                            hops,
                        });
                    }
                    Err(reason) => {
                        log::warn!(
                            "skipping ancestor {ancestor} of {} in hierarchy {}: {reason}",
                            table.name(),
                            hierarchy.name()
                        );
                        report.skipped.push(SkippedAncestor {
                            entity_type: ancestor.clone(),
                            hierarchy: hierarchy.name().to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        report
    }

    /// Build the relation from `table` up to `levels[target]` and the column
    /// in the ancestor's table that supplies the values.
    fn build(
        &self,
        table: &Table,
        levels: &[String],
        my_level: usize,
        target: usize,
    ) -> Result<(Relation, Column), ResolveError> {
        let (mut level, link) =
            nearest_link(table, levels, target..my_level).ok_or_else(|| {
                ResolveError::MissingLink {
                    table: table.name().to_string(),
                    entity_type: levels[target].clone(),
                }
            })?;
        let mut link = link.clone();
        let mut hops = Vec::new();

        loop {
            let entity_type = &levels[level];
            let owner = self.provider.table_for_entity(entity_type)?;
            let key = owner
                .key_column(entity_type)
                .ok_or_else(|| ResolveError::MissingPrimaryKey {
                    table: owner.name().to_string(),
                    entity_type: entity_type.clone(),
                })?
                .clone();
            hops.push(JoinRelation::new(link, key.clone())?);

            if level == target {
                return Ok((Relation::from_chain(hops)?, key));
            }

            let (next_level, next_link) = nearest_link(&owner, levels, target..level)
                .ok_or_else(|| ResolveError::MissingLink {
                    table: owner.name().to_string(),
                    entity_type: levels[target].clone(),
                })?;
            level = next_level;
            link = next_link.clone();
        }
    }
}

use crate::config::{ColumnAnnotation, SourceConfig};
use crate::error::ModelResult;
use crate::resolver::short_name;
use strata_columnar::{ColumnSchema, Table};

/// Reads one kind of source (selected by [`SourceConfig::source_type`]).
///
/// The manager never parses file formats itself: it asks the loader for the
/// raw schema, applies annotations, then hands the enriched schema back to
/// [`TableLoader::load`]. The returned table must have exactly those columns,
/// in that order.
pub trait TableLoader: Send + Sync {
    fn source_type(&self) -> &str;

    fn discover_schema(&self, source: &SourceConfig) -> ModelResult<Vec<ColumnSchema>>;

    fn load(&self, source: &SourceConfig, schema: &[ColumnSchema]) -> ModelResult<Table>;
}

/// Apply the annotations targeting `source` and tag its primary key column.
///
/// The key column is `source.key_column` when set (its tag is forced), else
/// the column named after the entity type's last segment if it is untagged.
pub fn enrich_schema(
    source: &SourceConfig,
    mut schema: Vec<ColumnSchema>,
    annotations: &[ColumnAnnotation],
) -> Vec<ColumnSchema> {
    for annotation in annotations.iter().filter(|a| a.source == source.name) {
        let Some(column) = schema.iter_mut().find(|c| c.name() == annotation.column) else {
            log::warn!(
                "annotation for {}[{}] matches no column",
                source.name,
                annotation.column
            );
            continue;
        };
        if let Some(display_name) = &annotation.display_name {
            column.def.display_name = display_name.clone();
        }
        if let Some(entity_type) = &annotation.entity_type {
            column.def.entity_type = entity_type.clone();
        }
    }

    if let Some(entity_type) = &source.entity_type {
        match &source.key_column {
            Some(key) => match schema.iter_mut().find(|c| c.name() == key) {
                Some(column) => column.def.entity_type = entity_type.clone(),
                None => log::warn!("key column {}[{key}] not found", source.name),
            },
            None => {
                let short = short_name(entity_type);
                if let Some(column) = schema
                    .iter_mut()
                    .find(|c| c.name() == short && !c.def.has_entity_type())
                {
                    column.def.entity_type = entity_type.clone();
                }
            }
        }
    }

    schema
}

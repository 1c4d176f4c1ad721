use strata_columnar::TableError;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing required field `{field}` in {context}")]
    MissingField {
        context: String,
        field: &'static str,
    },

    #[error("unknown entity type `{entity_type}` referenced by {context}")]
    UnknownEntityType {
        entity_type: String,
        context: String,
    },

    #[error("duplicate entity type: {0}")]
    DuplicateEntityType(String),

    #[error("duplicate hierarchy: {0}")]
    DuplicateHierarchy(String),

    #[error("hierarchy {hierarchy} lists entity type {entity_type} more than once")]
    RepeatedHierarchyLevel {
        hierarchy: String,
        entity_type: String,
    },

    #[error("hierarchy {hierarchy} orders {parent} above {child}, but another hierarchy orders them the other way")]
    CyclicHierarchies {
        hierarchy: String,
        parent: String,
        child: String,
    },

    #[error("duplicate source: {0}")]
    DuplicateSource(String),

    #[error("entity type {entity_type} is already owned by table {owner}")]
    DuplicateOwner { entity_type: String, owner: String },

    #[error("no table owns entity type {0}")]
    NoOwner(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("no loader registered for source type `{source_type}` (source {name})")]
    UnknownSourceType { name: String, source_type: String },

    #[error("source {name}: {message}")]
    Load { name: String, message: String },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

//! Serializable configuration: entity types, hierarchies, data sources and
//! column annotations.
//!
//! Documents are JSON:
//!
//! ```json
//! {
//!   "entity_types": [{ "name": "geo.region", "description": "Sales region" }],
//!   "hierarchies": [{ "name": "geo", "levels": ["geo.region", "geo.zone"] }],
//!   "sources": [{ "name": "zones", "type": "csv", "path": "zones.csv", "entity_type": "geo.zone" }],
//!   "annotations": [{ "source": "zones", "column": "region", "entity_type": "geo.region" }]
//! }
//! ```

use crate::error::{ModelError, ModelResult};
use crate::registry::EntityRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub entity_types: Vec<EntityTypeConfig>,
    #[serde(default)]
    pub hierarchies: Vec<HierarchyConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub annotations: Vec<ColumnAnnotation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Entity types ordered root to leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub name: String,
    pub levels: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Selects the loader, e.g. `"csv"`.
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// The entity type whose primary key this source carries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    /// Column carrying the primary entity type. Defaults to the column named
    /// after the entity type's last segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_column: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Loader-specific settings.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            path: None,
            entity_type: None,
            key_column: None,
            description: String::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The configured path, or a `MissingField` error naming this source.
    pub fn require_path(&self) -> ModelResult<&Path> {
        self.path.as_deref().ok_or_else(|| ModelError::MissingField {
            context: format!("source {}", self.name),
            field: "path",
        })
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Display-name and entity-type overrides for one column of one source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAnnotation {
    pub source: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ModelResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Build the entity registry described by this config, including the
    /// owner of every source's primary entity type.
    pub fn build_registry(&self) -> ModelResult<EntityRegistry> {
        let mut registry = EntityRegistry::new();
        for entity in &self.entity_types {
            registry.add_entity_type(&entity.name, &entity.description)?;
        }
        for hierarchy in &self.hierarchies {
            registry.add_hierarchy(&hierarchy.name, hierarchy.levels.clone())?;
        }
        for source in &self.sources {
            if let Some(entity_type) = &source.entity_type {
                if registry.entity_type(entity_type).is_none() {
                    return Err(ModelError::UnknownEntityType {
                        entity_type: entity_type.clone(),
                        context: format!("source {}", source.name),
                    });
                }
                registry.register_owner(entity_type, &source.name)?;
            }
        }
        Ok(registry)
    }

    pub fn validate(&self) -> ModelResult<()> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.is_empty() {
                return Err(ModelError::MissingField {
                    context: "source".to_string(),
                    field: "name",
                });
            }
            if source.source_type.is_empty() {
                return Err(ModelError::MissingField {
                    context: format!("source {}", source.name),
                    field: "type",
                });
            }
            if !names.insert(source.name.as_str()) {
                return Err(ModelError::DuplicateSource(source.name.clone()));
            }
        }

        let registry = self.build_registry()?;

        for annotation in &self.annotations {
            if !names.contains(annotation.source.as_str()) {
                return Err(ModelError::UnknownSource(annotation.source.clone()));
            }
            if let Some(entity_type) = &annotation.entity_type {
                if registry.entity_type(entity_type).is_none() {
                    return Err(ModelError::UnknownEntityType {
                        entity_type: entity_type.clone(),
                        context: format!(
                            "annotation {}[{}]",
                            annotation.source, annotation.column
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

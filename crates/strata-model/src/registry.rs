use crate::error::{ModelError, ModelResult};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub description: String,
}

/// Entity types ordered from root to leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    name: String,
    levels: Vec<String>,
}

impl Hierarchy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn level_of(&self, entity_type: &str) -> Option<usize> {
        self.levels.iter().position(|level| level == entity_type)
    }

    /// Entity types strictly above `entity_type`, nearest first.
    pub fn ancestors(&self, entity_type: &str) -> impl Iterator<Item = &str> + '_ {
        let depth = self.level_of(entity_type).unwrap_or(0);
        self.levels[..depth].iter().rev().map(String::as_str)
    }
}

/// Entity types, hierarchies and the table that owns each entity type's
/// primary key.
///
/// Lookups are index-backed: the hierarchies containing an entity type and
/// the owner of an entity type are both O(1).
#[derive(Clone, Debug, Default)]
pub struct EntityRegistry {
    entity_types: HashMap<String, EntityType>,
    hierarchies: Vec<Hierarchy>,
    hierarchy_index: HashMap<String, usize>,
    containing: HashMap<String, Vec<usize>>,
    /// parent -> children implied by every registered hierarchy.
    children: HashMap<String, HashSet<String>>,
    owners: HashMap<String, String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity_type(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        if self.entity_types.contains_key(&name) {
            return Err(ModelError::DuplicateEntityType(name));
        }
        self.entity_types.insert(
            name.clone(),
            EntityType {
                name,
                description: description.into(),
            },
        );
        Ok(())
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.get(name)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entity_types.values()
    }

    /// Register a hierarchy. Every level must be a defined entity type and
    /// appear once; the parent/child order must not contradict a hierarchy
    /// registered earlier.
    pub fn add_hierarchy(
        &mut self,
        name: impl Into<String>,
        levels: Vec<String>,
    ) -> ModelResult<()> {
        let name = name.into();
        if self.hierarchy_index.contains_key(&name) {
            return Err(ModelError::DuplicateHierarchy(name));
        }

        let mut seen = HashSet::new();
        for level in &levels {
            if !self.entity_types.contains_key(level) {
                return Err(ModelError::UnknownEntityType {
                    entity_type: level.clone(),
                    context: format!("hierarchy {name}"),
                });
            }
            if !seen.insert(level.as_str()) {
                return Err(ModelError::RepeatedHierarchyLevel {
                    hierarchy: name,
                    entity_type: level.clone(),
                });
            }
        }

        for (i, parent) in levels.iter().enumerate() {
            for child in &levels[i + 1..] {
                if self.reaches(child, parent) {
                    return Err(ModelError::CyclicHierarchies {
                        hierarchy: name,
                        parent: parent.clone(),
                        child: child.clone(),
                    });
                }
            }
        }
        for (i, parent) in levels.iter().enumerate() {
            self.children
                .entry(parent.clone())
                .or_default()
                .extend(levels[i + 1..].iter().cloned());
        }

        let idx = self.hierarchies.len();
        for level in &levels {
            self.containing.entry(level.clone()).or_default().push(idx);
        }
        self.hierarchy_index.insert(name.clone(), idx);
        self.hierarchies.push(Hierarchy { name, levels });
        Ok(())
    }

    /// Whether `to` sits below `from` through some chain of hierarchies.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(children) = self.children.get(current) {
                stack.extend(children.iter().map(String::as_str));
            }
        }
        false
    }

    pub fn hierarchies(&self) -> &[Hierarchy] {
        &self.hierarchies
    }

    pub fn hierarchy(&self, name: &str) -> Option<&Hierarchy> {
        self.hierarchies.get(*self.hierarchy_index.get(name)?)
    }

    /// Hierarchies listing `entity_type`, in registration order.
    pub fn hierarchies_containing<'a>(
        &'a self,
        entity_type: &str,
    ) -> impl Iterator<Item = &'a Hierarchy> + 'a {
        self.containing
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&idx| &self.hierarchies[idx])
    }

    /// Record `table` as the owner of `entity_type`'s primary key.
    /// Re-registering the same owner is a no-op.
    pub fn register_owner(
        &mut self,
        entity_type: impl Into<String>,
        table: impl Into<String>,
    ) -> ModelResult<()> {
        let entity_type = entity_type.into();
        let table = table.into();
        match self.owners.get(&entity_type) {
            Some(owner) if *owner == table => Ok(()),
            Some(owner) => Err(ModelError::DuplicateOwner {
                entity_type,
                owner: owner.clone(),
            }),
            None => {
                self.owners.insert(entity_type, table);
                Ok(())
            }
        }
    }

    pub fn owner_of(&self, entity_type: &str) -> Option<&str> {
        self.owners.get(entity_type).map(String::as_str)
    }

    pub fn owners(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owners.iter().map(|(e, t)| (e.as_str(), t.as_str()))
    }
}

//! Configured sources and the lazily loaded, cached tables behind them.
//!
//! One [`RwLock`] guards everything shared (sources, annotations, registry,
//! cached tables). It is held only to snapshot inputs and to install
//! results; discovering, loading and enriching a table all run without it.
//! Concurrent first loads of one source are serialized by a per-source gate,
//! so the source is read once and every caller gets the same `Arc<Table>`.
//! Failed loads are never cached.

use crate::config::{ColumnAnnotation, ModelConfig, SourceConfig};
use crate::csv_loader::CsvLoader;
use crate::error::{ModelError, ModelResult};
use crate::loader::{enrich_schema, TableLoader};
use crate::registry::EntityRegistry;
use crate::resolver::{JoinResolver, ResolveError, ResolveReport, TableProvider};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use strata_columnar::Table;

#[derive(Default)]
struct ManagerState {
    sources: HashMap<String, Arc<SourceConfig>>,
    annotations: Arc<Vec<ColumnAnnotation>>,
    registry: Arc<EntityRegistry>,
    /// Lazily loaded tables, keyed by source name.
    tables: HashMap<String, Arc<Table>>,
    /// Tables handed over through `register_table`; never invalidated.
    registered: HashMap<String, RegisteredTable>,
    /// Bumped on every invalidation so a load that raced with one is not
    /// installed afterwards.
    generation: u64,
}

#[derive(Clone)]
struct RegisteredTable {
    entity_type: String,
    table: Arc<Table>,
}

/// Snapshot of everything a load needs, taken under the read lock.
struct LoadInputs {
    source: Arc<SourceConfig>,
    annotations: Arc<Vec<ColumnAnnotation>>,
    registry: Arc<EntityRegistry>,
    generation: u64,
}

pub struct DataSourceManager {
    state: RwLock<ManagerState>,
    loaders: HashMap<String, Arc<dyn TableLoader>>,
    load_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for DataSourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceManager {
    /// A manager with no sources and the built-in CSV loader.
    pub fn new() -> Self {
        let mut manager = Self {
            state: RwLock::new(ManagerState::default()),
            loaders: HashMap::new(),
            load_gates: Mutex::new(HashMap::new()),
        };
        manager.register_loader(Arc::new(CsvLoader::new()));
        manager
    }

    pub fn from_config(config: ModelConfig) -> ModelResult<Self> {
        let manager = Self::new();
        manager.load_config(config)?;
        Ok(manager)
    }

    /// Register `loader` for its source type, replacing any previous one.
    pub fn register_loader(&mut self, loader: Arc<dyn TableLoader>) {
        self.loaders
            .insert(loader.source_type().to_string(), loader);
    }

    /// Replace sources, annotations and the registry with `config`. Cached
    /// tables are dropped; registered tables are kept. On error nothing
    /// changes.
    pub fn load_config(&self, config: ModelConfig) -> ModelResult<()> {
        config.validate()?;
        let mut registry = config.build_registry()?;

        let mut state = self.state.write().expect("manager state lock poisoned");
        for (name, registered) in &state.registered {
            if config.sources.iter().any(|s| s.name == *name) {
                return Err(ModelError::DuplicateSource(name.clone()));
            }
            if registry.entity_type(&registered.entity_type).is_none() {
                return Err(ModelError::UnknownEntityType {
                    entity_type: registered.entity_type.clone(),
                    context: format!("registered table {name}"),
                });
            }
            registry.register_owner(&registered.entity_type, name)?;
        }

        log::info!(
            "loaded config: {} sources, {} hierarchies",
            config.sources.len(),
            config.hierarchies.len()
        );
        state.sources = config
            .sources
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        state.annotations = Arc::new(config.annotations);
        state.registry = Arc::new(registry);
        state.tables.clear();
        state.generation += 1;
        Ok(())
    }

    pub fn add_source(&self, source: SourceConfig) -> ModelResult<()> {
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

        let mut state = self.state.write().expect("manager state lock poisoned");
        if state.sources.contains_key(&source.name) || state.registered.contains_key(&source.name)
        {
            return Err(ModelError::DuplicateSource(source.name));
        }
        if let Some(entity_type) = &source.entity_type {
            if state.registry.entity_type(entity_type).is_none() {
                return Err(ModelError::UnknownEntityType {
                    entity_type: entity_type.clone(),
                    context: format!("source {}", source.name),
                });
            }
            Arc::make_mut(&mut state.registry).register_owner(entity_type, &source.name)?;
        }
        state.sources.insert(source.name.clone(), Arc::new(source));
        Ok(())
    }

    /// Add a column annotation. The annotated source's cached table, if
    /// any, is dropped so the next load sees it.
    pub fn add_annotation(&self, annotation: ColumnAnnotation) -> ModelResult<()> {
        let mut state = self.state.write().expect("manager state lock poisoned");
        if !state.sources.contains_key(&annotation.source) {
            return Err(ModelError::UnknownSource(annotation.source));
        }
        if let Some(entity_type) = &annotation.entity_type {
            if state.registry.entity_type(entity_type).is_none() {
                return Err(ModelError::UnknownEntityType {
                    entity_type: entity_type.clone(),
                    context: format!("annotation {}[{}]", annotation.source, annotation.column),
                });
            }
        }
        state.tables.remove(&annotation.source);
        state.generation += 1;
        Arc::make_mut(&mut state.annotations).push(annotation);
        Ok(())
    }

    /// Install a prebuilt table as the owner of `primary_entity`, after
    /// adding its ancestor columns.
    pub fn register_table(
        &self,
        mut table: Table,
        primary_entity: &str,
    ) -> ModelResult<(Arc<Table>, ResolveReport)> {
        let name = table.name().to_string();
        let registry = {
            let state = self.state.read().expect("manager state lock poisoned");
            if state.sources.contains_key(&name) || state.registered.contains_key(&name) {
                return Err(ModelError::DuplicateSource(name));
            }
            state.registry.clone()
        };
        if registry.entity_type(primary_entity).is_none() {
            return Err(ModelError::UnknownEntityType {
                entity_type: primary_entity.to_string(),
                context: format!("registered table {name}"),
            });
        }

        let loading = RefCell::new(vec![name.clone()]);
        let provider = OwnerTables {
            manager: self,
            loading: &loading,
        };
        let report = JoinResolver::new(&registry, &provider).resolve(&mut table, primary_entity);
        let table = Arc::new(table);

        let mut state = self.state.write().expect("manager state lock poisoned");
        if state.sources.contains_key(&name) || state.registered.contains_key(&name) {
            return Err(ModelError::DuplicateSource(name));
        }
        Arc::make_mut(&mut state.registry).register_owner(primary_entity, &name)?;
        state.registered.insert(
            name.clone(),
            RegisteredTable {
                entity_type: primary_entity.to_string(),
                table: table.clone(),
            },
        );
        log::info!("registered table {name} as owner of {primary_entity}");
        Ok((table, report))
    }

    /// The table for source `name`, loading and enriching it on first use.
    pub fn load_data(&self, name: &str) -> ModelResult<Arc<Table>> {
        let loading = RefCell::new(Vec::new());
        self.load_tracked(name, &loading)
    }

    /// The table owning `entity_type`'s primary key.
    pub fn table_for_entity(&self, entity_type: &str) -> ModelResult<Arc<Table>> {
        let owner = self
            .owner_of(entity_type)
            .ok_or_else(|| ModelError::NoOwner(entity_type.to_string()))?;
        self.load_data(&owner)
    }

    /// Drop the cached table for `name`. Returns whether one was cached.
    pub fn invalidate_cache(&self, name: &str) -> bool {
        let mut state = self.state.write().expect("manager state lock poisoned");
        state.generation += 1;
        let removed = state.tables.remove(name).is_some();
        if removed {
            log::debug!("invalidated cached table {name}");
        }
        removed
    }

    pub fn invalidate_all_caches(&self) {
        let mut state = self.state.write().expect("manager state lock poisoned");
        state.generation += 1;
        log::debug!("invalidated {} cached tables", state.tables.len());
        state.tables.clear();
    }

    /// Configured source names, sorted.
    pub fn source_names(&self) -> Vec<String> {
        let state = self.state.read().expect("manager state lock poisoned");
        let mut names: Vec<String> = state.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn source(&self, name: &str) -> Option<Arc<SourceConfig>> {
        let state = self.state.read().expect("manager state lock poisoned");
        state.sources.get(name).cloned()
    }

    pub fn registry(&self) -> Arc<EntityRegistry> {
        let state = self.state.read().expect("manager state lock poisoned");
        state.registry.clone()
    }

    pub fn owner_of(&self, entity_type: &str) -> Option<String> {
        let state = self.state.read().expect("manager state lock poisoned");
        state.registry.owner_of(entity_type).map(str::to_string)
    }

    /// Names of loaded and registered tables, sorted.
    pub fn cached_table_names(&self) -> Vec<String> {
        let state = self.state.read().expect("manager state lock poisoned");
        let mut names: Vec<String> = state
            .tables
            .keys()
            .chain(state.registered.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_cached(&self, name: &str) -> bool {
        let state = self.state.read().expect("manager state lock poisoned");
        state.tables.contains_key(name) || state.registered.contains_key(name)
    }

    fn cached(&self, name: &str) -> Option<Arc<Table>> {
        let state = self.state.read().expect("manager state lock poisoned");
        state
            .registered
            .get(name)
            .map(|r| r.table.clone())
            .or_else(|| state.tables.get(name).cloned())
    }

    fn gate(&self, name: &str) -> Arc<Mutex<()>> {
        let mut gates = self.load_gates.lock().expect("load gate lock poisoned");
        gates.entry(name.to_string()).or_default().clone()
    }

    /// Drop the gate for `name` once no other load is holding or waiting on it.
    fn release_gate(&self, name: &str, gate: Arc<Mutex<()>>) {
        let mut gates = self.load_gates.lock().expect("load gate lock poisoned");
        // Clones are only handed out under this lock: the map and `gate`
        // account for two of them.
        let shared = Arc::strong_count(&gate) > 2;
        drop(gate);
        if !shared {
            gates.remove(name);
        }
    }

    /// `loading` holds the sources currently being loaded by this call
    /// chain, innermost last.
    fn load_tracked(&self, name: &str, loading: &RefCell<Vec<String>>) -> ModelResult<Arc<Table>> {
        if let Some(table) = self.cached(name) {
            log::debug!("cache hit for {name}");
            return Ok(table);
        }
        if !self
            .state
            .read()
            .expect("manager state lock poisoned")
            .sources
            .contains_key(name)
        {
            return Err(ModelError::UnknownSource(name.to_string()));
        }

        let gate = self.gate(name);
        let result = {
            // The gate guards no data, so a poisoned one is still usable.
            let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.load_gated(name, loading)
        };
        self.release_gate(name, gate);
        result
    }

    fn load_gated(&self, name: &str, loading: &RefCell<Vec<String>>) -> ModelResult<Arc<Table>> {
        if let Some(table) = self.cached(name) {
            log::debug!("cache hit for {name} after waiting on a concurrent load");
            return Ok(table);
        }
        log::debug!("cache miss for {name}");

        let inputs = {
            let state = self.state.read().expect("manager state lock poisoned");
            LoadInputs {
                source: state
                    .sources
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ModelError::UnknownSource(name.to_string()))?,
                annotations: state.annotations.clone(),
                registry: state.registry.clone(),
                generation: state.generation,
            }
        };
        let loader = self
            .loaders
            .get(&inputs.source.source_type)
            .cloned()
            .ok_or_else(|| ModelError::UnknownSourceType {
                name: name.to_string(),
                source_type: inputs.source.source_type.clone(),
            })?;

        loading.borrow_mut().push(name.to_string());
        let result = self.materialize(&inputs, loader.as_ref(), loading);
        loading.borrow_mut().pop();
        let table = Arc::new(result?);

        let mut state = self.state.write().expect("manager state lock poisoned");
        if state.generation == inputs.generation {
            state.tables.insert(name.to_string(), table.clone());
        } else {
            log::debug!("not caching {name}: invalidated while loading");
        }
        log::info!(
            "loaded {name}: {} rows, {} columns",
            table.row_count(),
            table.column_count()
        );
        Ok(table)
    }

    fn materialize(
        &self,
        inputs: &LoadInputs,
        loader: &dyn TableLoader,
        loading: &RefCell<Vec<String>>,
    ) -> ModelResult<Table> {
        let source = inputs.source.as_ref();
        let schema = loader.discover_schema(source)?;
        let schema = enrich_schema(source, schema, &inputs.annotations);
        let mut table = loader.load(source, &schema)?;
        if table.column_count() != schema.len() {
            return Err(ModelError::Load {
                name: source.name.clone(),
                message: format!(
                    "loader produced {} columns for a {}-column schema",
                    table.column_count(),
                    schema.len()
                ),
            });
        }

        if let Some(entity_type) = &source.entity_type {
            let provider = OwnerTables {
                manager: self,
                loading,
            };
            let report =
                JoinResolver::new(&inputs.registry, &provider).resolve(&mut table, entity_type);
            if !report.skipped.is_empty() {
                log::warn!(
                    "{}: {} ancestor column(s) unresolved",
                    source.name,
                    report.skipped.len()
                );
            }
        }
        Ok(table)
    }
}

/// Resolves owner tables through the manager during one load call chain.
struct OwnerTables<'a> {
    manager: &'a DataSourceManager,
    loading: &'a RefCell<Vec<String>>,
}

impl TableProvider for OwnerTables<'_> {
    fn table_for_entity(&self, entity_type: &str) -> Result<Arc<Table>, ResolveError> {
        let owner = self
            .manager
            .owner_of(entity_type)
            .ok_or_else(|| ResolveError::MissingOwner {
                entity_type: entity_type.to_string(),
            })?;
        if self.loading.borrow().contains(&owner) {
            return Err(ResolveError::Cycle { table: owner });
        }
        self.manager
            .load_tracked(&owner, self.loading)
            .map_err(|err| ResolveError::LoadFailed {
                table: owner,
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strata_columnar::{ColumnSchema, ColumnType, TableBuilder};

    struct Constant;

    impl TableLoader for Constant {
        fn source_type(&self) -> &str {
            "constant"
        }

        fn discover_schema(&self, _source: &SourceConfig) -> ModelResult<Vec<ColumnSchema>> {
            Ok(vec![ColumnSchema::new("n", ColumnType::Number)])
        }

        fn load(&self, source: &SourceConfig, schema: &[ColumnSchema]) -> ModelResult<Table> {
            let mut builder = TableBuilder::new(source.name.clone(), schema.to_vec())?;
            builder.append_row(&[1.into()])?;
            Ok(builder.finalize())
        }
    }

    fn gate_count(manager: &DataSourceManager) -> usize {
        manager.load_gates.lock().unwrap().len()
    }

    #[test]
    fn unknown_sources_never_allocate_a_gate() {
        let manager = DataSourceManager::new();
        for i in 0..1000 {
            assert!(matches!(
                manager.load_data(&format!("nowhere-{i}")),
                Err(ModelError::UnknownSource(_))
            ));
        }
        assert_eq!(gate_count(&manager), 0);
    }

    #[test]
    fn gates_are_dropped_once_a_load_finishes() {
        let mut manager = DataSourceManager::new();
        manager.register_loader(Arc::new(Constant));
        manager
            .add_source(SourceConfig::new("ones", "constant"))
            .unwrap();
        manager
            .add_source(SourceConfig::new("broken", "csv"))
            .unwrap();

        manager.load_data("ones").unwrap();
        assert!(manager.load_data("broken").is_err());
        assert_eq!(gate_count(&manager), 0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    manager.invalidate_cache("ones");
                    manager.load_data("ones").unwrap();
                });
            }
        });
        assert_eq!(gate_count(&manager), 0);
    }
}

use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_columnar::{
    table_from_rows, ColumnDef, ColumnSchema, ColumnType, Table, TableBuilder, Value,
};
use strata_model::{
    ColumnAnnotation, DataSourceManager, EntityTypeConfig, HierarchyConfig, ModelConfig,
    ModelError, ModelResult, SourceConfig, TableLoader,
};

/// Serves fixed rows per source name and counts loads.
#[derive(Default)]
struct MemoryLoader {
    data: HashMap<String, (Vec<&'static str>, Vec<Vec<Value>>)>,
    loads: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryLoader {
    fn with(mut self, source: &str, columns: Vec<&'static str>, rows: Vec<Vec<Value>>) -> Self {
        self.data.insert(source.to_string(), (columns, rows));
        self
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl TableLoader for MemoryLoader {
    fn source_type(&self) -> &str {
        "memory"
    }

    fn discover_schema(&self, source: &SourceConfig) -> ModelResult<Vec<ColumnSchema>> {
        let (columns, _) = self.data.get(&source.name).ok_or_else(|| ModelError::Load {
            name: source.name.clone(),
            message: "no such table".into(),
        })?;
        Ok(columns
            .iter()
            .map(|c| ColumnSchema::new(*c, ColumnType::String))
            .collect())
    }

    fn load(&self, source: &SourceConfig, schema: &[ColumnSchema]) -> ModelResult<Table> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let (_, rows) = &self.data[&source.name];
        let mut builder = TableBuilder::new(source.name.clone(), schema.to_vec())?;
        for row in rows {
            builder.append_row(row)?;
        }
        Ok(builder.finalize())
    }
}

fn rows(values: &[&[&str]]) -> Vec<Vec<Value>> {
    values
        .iter()
        .map(|r| r.iter().map(|v| Value::from(*v)).collect())
        .collect()
}

fn geo_loader() -> MemoryLoader {
    MemoryLoader::default()
        .with("regions", vec!["region"], rows(&[&["eu"], &["us"]]))
        .with(
            "zones",
            vec!["zone", "region"],
            rows(&[&["eu-1", "eu"], &["us-1", "us"], &["us-2", "us"]]),
        )
        .with(
            "machines",
            vec!["machine", "zone_id"],
            rows(&[&["m1", "us-2"], &["m2", "eu-1"]]),
        )
}

fn geo_config() -> ModelConfig {
    let entity = |name: &str| EntityTypeConfig {
        name: name.into(),
        description: String::new(),
    };
    ModelConfig {
        entity_types: vec![entity("geo.region"), entity("geo.zone"), entity("geo.machine")],
        hierarchies: vec![HierarchyConfig {
            name: "geo".into(),
            levels: vec!["geo.region".into(), "geo.zone".into(), "geo.machine".into()],
        }],
        sources: vec![
            SourceConfig::new("regions", "memory").with_entity_type("geo.region"),
            SourceConfig::new("zones", "memory").with_entity_type("geo.zone"),
            SourceConfig::new("machines", "memory").with_entity_type("geo.machine"),
        ],
        annotations: vec![
            ColumnAnnotation {
                source: "zones".into(),
                column: "region".into(),
                display_name: None,
                entity_type: Some("geo.region".into()),
            },
            ColumnAnnotation {
                source: "machines".into(),
                column: "zone_id".into(),
                display_name: Some("Zone".into()),
                entity_type: Some("geo.zone".into()),
            },
        ],
    }
}

fn manager(loader: Arc<MemoryLoader>) -> DataSourceManager {
    let mut manager = DataSourceManager::new();
    manager.register_loader(loader);
    manager.load_config(geo_config()).unwrap();
    manager
}

#[test]
fn loads_are_cached_until_invalidated() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader.clone());

    let first = manager.load_data("regions").unwrap();
    let second = manager.load_data("regions").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loader.loads(), 1);

    assert!(manager.invalidate_cache("regions"));
    assert!(!manager.invalidate_cache("regions"));
    let third = manager.load_data("regions").unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(loader.loads(), 2);
    assert!(manager.source("regions").is_some());
}

#[test]
fn loading_a_leaf_enriches_it_through_owner_tables() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader.clone());

    let machines = manager.load_data("machines").unwrap();
    let zone = machines.column("zone_id").unwrap();
    assert_eq!(zone.display_name(), "Zone");
    assert_eq!(zone.entity_type(), "geo.zone");
    assert_eq!(machines.column("machine").unwrap().entity_type(), "geo.machine");

    let region = machines.column("region").unwrap();
    assert!(region.is_joined());
    assert_eq!(
        region.values().collect::<Vec<_>>(),
        vec![Value::from("us"), Value::from("eu")]
    );

    // Owner tables were loaded once each along the way.
    assert_eq!(
        manager.cached_table_names(),
        vec!["machines", "regions", "zones"]
    );
    assert_eq!(loader.loads(), 3);
    manager.load_data("zones").unwrap();
    assert_eq!(loader.loads(), 3);

    manager.invalidate_all_caches();
    assert!(manager.cached_table_names().is_empty());
    assert_eq!(manager.source_names(), vec!["machines", "regions", "zones"]);
}

#[test]
fn failed_loads_are_not_cached_and_can_be_retried() {
    let loader = Arc::new(geo_loader().with(
        "sensors",
        vec!["sensor"],
        rows(&[&["s1"], &["s2"]]),
    ));
    let manager = manager(loader.clone());
    manager
        .add_source(SourceConfig::new("sensors", "parquet"))
        .unwrap();

    let err = manager.load_data("sensors").unwrap_err();
    assert!(matches!(err, ModelError::UnknownSourceType { .. }), "{err}");
    assert!(!manager.is_cached("sensors"));

    assert!(matches!(
        manager.load_data("nowhere"),
        Err(ModelError::UnknownSource(_))
    ));

    let mut fixed = geo_config();
    fixed.sources.push(SourceConfig::new("sensors", "memory"));
    manager.load_config(fixed).unwrap();
    let sensors = manager.load_data("sensors").unwrap();
    assert_eq!(sensors.row_count(), 2);
    assert!(manager.is_cached("sensors"));
    assert_eq!(loader.loads(), 1);
}

#[test]
fn loader_errors_are_not_cached() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader.clone());
    manager
        .add_source(SourceConfig::new("sensors", "memory"))
        .unwrap();

    // The memory loader has no "sensors" rows.
    assert!(matches!(
        manager.load_data("sensors"),
        Err(ModelError::Load { .. })
    ));
    assert!(!manager.is_cached("sensors"));
    assert!(manager.load_data("regions").is_ok());
}

#[test]
fn invalid_config_leaves_the_manager_untouched() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader.clone());
    manager.load_data("regions").unwrap();

    let mut broken = geo_config();
    broken.hierarchies[0].levels.push("geo.planet".into());
    assert!(matches!(
        manager.load_config(broken),
        Err(ModelError::UnknownEntityType { .. })
    ));

    assert_eq!(manager.source_names().len(), 3);
    assert!(manager.is_cached("regions"));
    assert_eq!(manager.registry().owner_of("geo.zone"), Some("zones"));
}

#[test]
fn concurrent_first_loads_share_one_read() {
    let loader = Arc::new(MemoryLoader {
        delay: Some(Duration::from_millis(50)),
        ..geo_loader()
    });
    let manager = manager(loader.clone());

    let tables: Vec<Arc<Table>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| manager.load_data("zones").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(loader.loads(), 1);
    assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
}

#[test]
fn registered_tables_own_their_entity_and_survive_invalidation() {
    let loader = Arc::new(geo_loader());
    let mut config = geo_config();
    config.sources.retain(|s| s.name != "machines");
    config.annotations.retain(|a| a.source != "machines");
    let mut manager = DataSourceManager::new();
    manager.register_loader(loader.clone());
    manager.load_config(config).unwrap();

    let fleet = table_from_rows(
        "fleet",
        vec![
            ColumnSchema::with_def(
                ColumnDef::new("machine").with_entity_type("geo.machine"),
                ColumnType::String,
            ),
            ColumnSchema::with_def(
                ColumnDef::new("zone").with_entity_type("geo.zone"),
                ColumnType::String,
            ),
        ],
        rows(&[&["m9", "us-1"]]),
    )
    .unwrap();

    let (fleet, report) = manager.register_table(fleet, "geo.machine").unwrap();
    assert_eq!(report.added.len(), 1);
    assert_eq!(report.added[0].hops, 2);
    assert_eq!(fleet.value(0, "region"), Some(Value::from("us")));

    assert_eq!(manager.owner_of("geo.machine").as_deref(), Some("fleet"));
    let by_entity = manager.table_for_entity("geo.machine").unwrap();
    assert!(Arc::ptr_eq(&by_entity, &fleet));

    manager.invalidate_all_caches();
    assert!(manager.is_cached("fleet"));
    assert!(!manager.is_cached("zones"));

    let again = table_from_rows(
        "fleet",
        vec![ColumnSchema::new("x", ColumnType::Number)],
        Vec::<Vec<Value>>::new(),
    )
    .unwrap();
    assert!(matches!(
        manager.register_table(again, "geo.machine"),
        Err(ModelError::DuplicateSource(_))
    ));
}

#[test]
fn owners_and_sources_are_validated() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader);

    assert!(matches!(
        manager.add_source(SourceConfig::new("zones", "memory")),
        Err(ModelError::DuplicateSource(_))
    ));
    assert!(matches!(
        manager.add_source(SourceConfig::new("zones2", "memory").with_entity_type("geo.zone")),
        Err(ModelError::DuplicateOwner { .. })
    ));
    assert!(matches!(
        manager.add_source(SourceConfig::new("moons", "memory").with_entity_type("geo.moon")),
        Err(ModelError::UnknownEntityType { .. })
    ));
    assert!(matches!(
        manager.table_for_entity("geo.moon"),
        Err(ModelError::NoOwner(_))
    ));
    assert!(matches!(
        manager.add_annotation(ColumnAnnotation {
            source: "nowhere".into(),
            column: "x".into(),
            display_name: None,
            entity_type: None,
        }),
        Err(ModelError::UnknownSource(_))
    ));
}

#[test]
fn annotations_added_later_apply_on_the_next_load() {
    let loader = Arc::new(geo_loader());
    let manager = manager(loader);

    let before = manager.load_data("regions").unwrap();
    assert_eq!(before.column("region").unwrap().display_name(), "region");

    manager
        .add_annotation(ColumnAnnotation {
            source: "regions".into(),
            column: "region".into(),
            display_name: Some("Sales region".into()),
            entity_type: None,
        })
        .unwrap();
    assert!(!manager.is_cached("regions"));

    let after = manager.load_data("regions").unwrap();
    assert_eq!(after.column("region").unwrap().display_name(), "Sales region");
}

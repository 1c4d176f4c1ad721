use pretty_assertions::assert_eq;
use strata_columnar::{
    table_from_rows, ChainedJoinRelation, ColumnDef, ColumnSchema, ColumnType, JoinError,
    JoinRelation, Relation, Table, Value,
};

fn tagged(name: &str, entity: &str, column_type: ColumnType) -> ColumnSchema {
    ColumnSchema::with_def(ColumnDef::new(name).with_entity_type(entity), column_type)
}

fn regions() -> Table {
    table_from_rows(
        "regions",
        vec![
            tagged("region", "geo.region", ColumnType::String),
            ColumnSchema::new("label", ColumnType::String),
        ],
        vec![
            vec!["eu".into(), "Europe".into()],
            vec!["us".into(), "Americas".into()],
        ],
    )
    .unwrap()
}

fn zones() -> Table {
    table_from_rows(
        "zones",
        vec![
            tagged("zone", "geo.zone", ColumnType::String),
            tagged("region", "geo.region", ColumnType::String),
        ],
        vec![
            vec!["eu-1".into(), "eu".into()],
            vec!["us-1".into(), "us".into()],
            vec!["us-2".into(), "us".into()],
        ],
    )
    .unwrap()
}

fn machines() -> Table {
    table_from_rows(
        "machines",
        vec![
            tagged("machine", "geo.machine", ColumnType::String),
            tagged("zone", "geo.zone", ColumnType::String),
        ],
        vec![
            vec!["m1".into(), "us-2".into()],
            vec!["m2".into(), "eu-1".into()],
            vec!["m3".into(), Value::Null],
            vec!["m4".into(), "ap-9".into()],
        ],
    )
    .unwrap()
}

#[test]
fn single_relation_maps_rows_by_value() {
    let machines = machines();
    let zones = zones();
    let rel = JoinRelation::new(
        machines.column("zone").unwrap().clone(),
        zones.column("zone").unwrap().clone(),
    )
    .unwrap();

    assert_eq!(rel.len(), 4);
    assert_eq!(rel.target_len(), 3);
    assert_eq!(rel.lookup(0), Some(2));
    assert_eq!(rel.lookup(1), Some(0));
    assert_eq!(rel.lookup(2), None, "null keys never match");
    assert_eq!(rel.lookup(3), None, "dangling keys never match");
}

#[test]
fn chained_relation_composes_hops_without_materializing() {
    let machines = machines();
    let zones = zones();
    let regions = regions();

    let hops = vec![
        JoinRelation::new(
            machines.column("zone").unwrap().clone(),
            zones.column("zone").unwrap().clone(),
        )
        .unwrap(),
        JoinRelation::new(
            zones.column("region").unwrap().clone(),
            regions.column("region").unwrap().clone(),
        )
        .unwrap(),
    ];
    let relation = Relation::from_chain(hops).unwrap();
    assert_eq!(relation.hop_count(), 2);

    let label = regions
        .column("label")
        .unwrap()
        .create_joined_column(ColumnDef::new("region_label"), relation)
        .unwrap();

    assert!(label.is_joined());
    assert!(!label.is_key());
    assert_eq!(label.len(), 4);
    assert_eq!(
        label.values().collect::<Vec<_>>(),
        vec![
            Value::from("Americas"),
            Value::from("Europe"),
            Value::Null,
            Value::Null,
        ]
    );
}

#[test]
fn relation_construction_checks_types_uniqueness_and_chain_shape() {
    let machines = machines();
    let zones = zones();
    let numbers = table_from_rows(
        "n",
        vec![ColumnSchema::new("n", ColumnType::Number)],
        vec![vec![1.into()]],
    )
    .unwrap();

    assert!(matches!(
        JoinRelation::new(
            machines.column("zone").unwrap().clone(),
            numbers.column("n").unwrap().clone(),
        ),
        Err(JoinError::TypeMismatch { .. })
    ));

    let err = JoinRelation::new(
        machines.column("zone").unwrap().clone(),
        zones.column("region").unwrap().clone(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        JoinError::NonUniqueKey {
            column: "region".into(),
            value: Value::from("us"),
        }
    );

    assert_eq!(
        ChainedJoinRelation::new(Vec::new()).unwrap_err(),
        JoinError::EmptyChain
    );

    // Second hop must start in the table the first hop lands in.
    let broken = ChainedJoinRelation::new(vec![
        JoinRelation::new(
            machines.column("zone").unwrap().clone(),
            zones.column("zone").unwrap().clone(),
        )
        .unwrap(),
        JoinRelation::new(
            machines.column("machine").unwrap().clone(),
            machines.column("machine").unwrap().clone(),
        )
        .unwrap(),
    ]);
    assert!(matches!(
        broken,
        Err(JoinError::BrokenChain {
            hop: 1,
            expected: 3,
            actual: 4
        })
    ));
}

#[test]
fn joined_column_must_read_from_the_target_table() {
    let machines = machines();
    let zones = zones();
    let rel = JoinRelation::new(
        machines.column("zone").unwrap().clone(),
        zones.column("zone").unwrap().clone(),
    )
    .unwrap();

    let err = regions()
        .column("label")
        .unwrap()
        .create_joined_column(ColumnDef::new("x"), rel.into())
        .unwrap_err();
    assert!(matches!(err, JoinError::TargetLengthMismatch { .. }));
}

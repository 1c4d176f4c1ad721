use pretty_assertions::assert_eq;
use proptest::prelude::*;
use strata_columnar::{table_from_rows, ColumnSchema, ColumnType, Value};
use strata_model::{AggregateState, NumericState, Statistic, StringState, NO_DATA};

fn numeric(values: &[f64]) -> NumericState {
    let mut state = NumericState::new();
    for v in values {
        state.add(*v);
    }
    state
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0),
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn combining_partitions_in_any_order_matches_a_single_pass(
        rows in proptest::collection::vec((-1000i32..1000, 0usize..6), 0..200),
        reverse in any::<bool>(),
    ) {
        let values: Vec<f64> = rows.iter().map(|(v, _)| f64::from(*v)).collect();
        let direct = numeric(&values);

        let mut partitions = vec![NumericState::new(); 6];
        for (v, part) in &rows {
            partitions[*part].add(f64::from(*v));
        }
        if reverse {
            partitions.reverse();
        }

        // Fold pairwise first, then into the root, to exercise associativity.
        let mut left = NumericState::new();
        let mut right = NumericState::new();
        for (idx, part) in partitions.iter().enumerate() {
            if idx % 2 == 0 { left.combine(part) } else { right.combine(part) }
        }
        let mut merged = right;
        merged.combine(&left);

        prop_assert_eq!(merged.count(), direct.count());
        prop_assert_eq!(merged.sum(), direct.sum());
        prop_assert_eq!(merged.min(), direct.min());
        prop_assert_eq!(merged.max(), direct.max());
        match (merged.std_dev(), direct.std_dev()) {
            (Some(a), Some(b)) => prop_assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0)),
            (a, b) => prop_assert_eq!(a, b),
        }
    }

    #[test]
    fn single_value_has_zero_spread(v in -1e9f64..1e9) {
        let state = numeric(&[v]);
        prop_assert_eq!(state.min(), Some(v));
        prop_assert_eq!(state.max(), Some(v));
        prop_assert_eq!(state.mean(), Some(v));
        prop_assert_eq!(state.std_dev(), Some(0.0));
    }

    #[test]
    fn count_renders_the_number_of_adds(n in 0usize..50) {
        let mut state = AggregateState::for_type(ColumnType::Number);
        for i in 0..n {
            state.add(&Value::Number(i as f64));
        }
        let expected = if n == 0 { NO_DATA.to_string() } else { n.to_string() };
        prop_assert_eq!(state.format(Statistic::Count), expected);
    }
}

#[test]
fn combining_with_an_empty_state_is_a_no_op() {
    for column_type in [
        ColumnType::Number,
        ColumnType::Boolean,
        ColumnType::String,
        ColumnType::DateTime,
    ] {
        let mut state = AggregateState::for_type(column_type);
        for value in [
            Value::Number(2.0),
            Value::Boolean(true),
            Value::from("x"),
            Value::DateTime(5),
        ] {
            state.add(&value);
        }
        assert_eq!(state.count(), 1, "{column_type} accepts only its own values");

        let before = state.clone();
        state.combine(&AggregateState::for_type(column_type));
        assert_eq!(state, before);
    }
}

#[test]
fn mismatched_kinds_are_ignored() {
    let mut numbers = AggregateState::for_type(ColumnType::Number);
    numbers.add(&Value::Number(4.0));
    let before = numbers.clone();

    let mut strings = AggregateState::for_type(ColumnType::String);
    strings.add(&Value::from("a"));
    numbers.combine(&strings);
    assert_eq!(numbers, before);
}

#[test]
fn string_state_tracks_distinct_values_and_bounds() {
    let mut state = StringState::new();
    for s in ["a", "b", "a", "c", "b"] {
        state.add(s.into());
    }
    assert_eq!(state.count(), 5);
    assert_eq!(state.distinct_count(), 3);
    assert_eq!(state.min(), Some("a"));
    assert_eq!(state.max(), Some("c"));

    let mut other = StringState::new();
    other.add("0".into());
    other.add("a".into());
    state.combine(&other);
    assert_eq!(state.distinct_count(), 4);
    assert_eq!(state.min(), Some("0"));
}

#[test]
fn formats_each_kind() {
    let table = table_from_rows(
        "readings",
        vec![
            ColumnSchema::new("load", ColumnType::Number),
            ColumnSchema::new("ok", ColumnType::Boolean),
            ColumnSchema::new("host", ColumnType::String),
            ColumnSchema::new("at", ColumnType::DateTime),
        ],
        vec![
            vec![1.into(), true.into(), "web-1".into(), Value::DateTime(0)],
            vec![2.into(), false.into(), "web-2".into(), Value::DateTime(90_000_000_000)],
            vec![
                Value::Null,
                true.into(),
                "web-1".into(),
                Value::DateTime(180_000_000_000),
            ],
            vec![4.5.into(), Value::Null, Value::Null, Value::Null],
        ],
    )
    .unwrap();

    let render = |column: &str, stats: &[Statistic]| -> Vec<String> {
        let state =
            AggregateState::from_column_rows(table.column(column).unwrap(), 0..table.row_count());
        stats.iter().map(|s| state.format(*s)).collect()
    };

    use Statistic::*;
    assert_eq!(
        render("load", &[Count, Sum, Avg, Min, Max, Ratio]),
        vec!["3", "7.5", "2.5", "1", "4.5", ""]
    );
    assert_eq!(
        render("ok", &[Count, True, False, Ratio, Sum]),
        vec!["3", "2", "1", "0.67", ""]
    );
    assert_eq!(
        render("host", &[Count, Distinct, Min, Max]),
        vec!["3", "2", "web-1", "web-2"]
    );
    assert_eq!(
        render("at", &[Count, Min, Max, Avg, Span]),
        vec![
            "3",
            "1970-01-01T00:00:00Z",
            "1970-01-01T00:03:00Z",
            "1970-01-01T00:01:30Z",
            "3.0m",
        ]
    );
}

#[test]
fn empty_states_render_the_no_data_sentinel() {
    for column_type in [
        ColumnType::Number,
        ColumnType::Boolean,
        ColumnType::String,
        ColumnType::DateTime,
    ] {
        let state = AggregateState::for_type(column_type);
        for stat in Statistic::for_type(column_type) {
            assert_eq!(state.format(stat), NO_DATA, "{column_type} {stat}");
        }
    }
}

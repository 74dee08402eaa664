//! End-to-end query execution against an in-memory store.

use axial_common::utils::error::QueryErrorKind;
use axial_common::{ArrayData, Dtype, MatrixData, Value};
use axial_query::{get_query, has_query, parse, QueryValue};
use axial_store::{DependencyKey, MemoryStore};
use std::collections::BTreeSet;

/// The store every test runs against:
/// - axes `cell`, `gene`, `type`
/// - vectors `cell:type`, `cell:age`, `gene:is_marker`, `type:color`
/// - matrices `cell x gene :: UMIs`, `type x type :: affinity`
fn fixture() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_axis("cell", ["c1", "c2", "c3", "c4"])
        .unwrap();
    store.create_axis("gene", ["g1", "g2"]).unwrap();
    store.create_axis("type", ["T", "B"]).unwrap();
    store.set_scalar("version", Value::Str("1.0".into()));
    store
        .set_vector(
            "cell",
            "type",
            ArrayData::Str(vec!["T".into(), "T".into(), "B".into(), String::new()]),
        )
        .unwrap();
    store
        .set_vector("cell", "age", ArrayData::I32(vec![10, 20, 30, 40]))
        .unwrap();
    store
        .set_vector("gene", "is_marker", ArrayData::Bool(vec![true, false]))
        .unwrap();
    store
        .set_vector(
            "type",
            "color",
            ArrayData::Str(vec!["red".into(), "blue".into()]),
        )
        .unwrap();
    store
        .set_matrix(
            "cell",
            "gene",
            "UMIs",
            MatrixData::from_rows(
                Dtype::I32,
                4,
                2,
                &[1, 2, 3, 4, 5, 6, 7, 8].map(Value::Int),
            )
            .unwrap(),
        )
        .unwrap();
    store
        .set_matrix(
            "type",
            "type",
            "affinity",
            MatrixData::from_rows(Dtype::I32, 2, 2, &[1, 2, 3, 4].map(Value::Int)).unwrap(),
        )
        .unwrap();
    store
}

fn run(store: &MemoryStore, text: &str) -> QueryValue {
    get_query(store, &parse(text).unwrap())
        .unwrap_or_else(|err| panic!("query {text:?} failed:\n{err}"))
        .value
}

fn run_err(store: &MemoryStore, text: &str) -> QueryErrorKind {
    let err = get_query(store, &parse(text).unwrap())
        .expect_err(&format!("query {text:?} unexpectedly succeeded"));
    err.query_kind().expect("execution failures are query errors")
}

fn vector_of(value: QueryValue) -> (Option<String>, Vec<String>, ArrayData) {
    match value {
        QueryValue::Vector(vector) => (vector.axis, (*vector.names).clone(), vector.values),
        other => panic!("expected a vector, found {other:?}"),
    }
}

fn names_of(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|text| (*text).to_string()).collect()
}

// ---- extraction and aggregation over the fixture store ----

#[test]
fn test_sum_of_ages() {
    let store = fixture();
    assert_eq!(
        run(&store, "@ cell : age >> Sum type Int64"),
        QueryValue::Scalar(Value::Int(100))
    );
}

#[test]
fn test_indirect_fetch_with_if_not() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ cell : type : color ?? black"));
    assert_eq!(axis.as_deref(), Some("cell"));
    assert_eq!(names, names_of(&["c1", "c2", "c3", "c4"]));
    assert_eq!(
        values,
        ArrayData::Str(vec![
            "red".into(),
            "red".into(),
            "blue".into(),
            "black".into()
        ])
    );
}

#[test]
fn test_boolean_mask() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ gene [ is_marker ]"));
    assert_eq!(axis.as_deref(), Some("gene"));
    assert_eq!(names, names_of(&["g1"]));
    assert_eq!(values, ArrayData::Str(vec!["g1".into()]));
}

#[test]
fn test_reduce_matrix_columns() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ cell @ gene :: UMIs >| Sum"));
    assert_eq!(axis.as_deref(), Some("gene"));
    assert_eq!(names, names_of(&["g1", "g2"]));
    assert_eq!(values, ArrayData::I64(vec![16, 20]));
}

#[test]
fn test_group_by_axis_mean() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ cell : age / type =@ >> Mean || 0"));
    assert_eq!(axis.as_deref(), Some("type"));
    assert_eq!(names, names_of(&["T", "B"]));
    assert_eq!(values, ArrayData::F64(vec![15.0, 30.0]));
}

#[test]
fn test_count_by() {
    let store = fixture();
    let QueryValue::Matrix(matrix) = run(&store, "@ cell : type =@ * age") else {
        panic!("expected a matrix");
    };
    assert_eq!(matrix.rows_axis.as_deref(), Some("type"));
    assert_eq!(*matrix.row_names, names_of(&["T", "B"]));
    assert_eq!(matrix.columns_axis, None);
    assert_eq!(*matrix.column_names, names_of(&["10", "20", "30", "40"]));
    // The cell with the empty type contributes to no cell.
    assert_eq!(matrix.values.dtype(), Dtype::U8);
    assert_eq!(matrix.get("T", "10"), Some(Value::UInt(1)));
    assert_eq!(matrix.get("T", "20"), Some(Value::UInt(1)));
    assert_eq!(matrix.get("B", "30"), Some(Value::UInt(1)));
    assert_eq!(matrix.get("B", "40"), Some(Value::UInt(0)));
    assert_eq!(matrix.get("T", "40"), Some(Value::UInt(0)));
}

// ---- names ----

#[test]
fn test_name_sets() {
    let store = fixture();
    assert_eq!(
        run(&store, "?"),
        QueryValue::Names(BTreeSet::from(["version".to_string()]))
    );
    assert_eq!(
        run(&store, "@ ?"),
        QueryValue::Names(BTreeSet::from([
            "cell".to_string(),
            "gene".to_string(),
            "type".to_string()
        ]))
    );
    assert_eq!(run(&store, "? axes"), run(&store, "@ ?"));
    assert_eq!(
        run(&store, "@ cell ?"),
        QueryValue::Names(BTreeSet::from(["age".to_string(), "type".to_string()]))
    );
    assert_eq!(
        run(&store, "@ cell @ gene ?"),
        QueryValue::Names(BTreeSet::from(["UMIs".to_string()]))
    );
    // Relayout-aware: the transposed orientation lists the same matrix.
    assert_eq!(run(&store, "@ gene @ cell ?"), run(&store, "@ cell @ gene ?"));
}

// ---- scalar lookups ----

#[test]
fn test_scalar_lookups() {
    let store = fixture();
    assert_eq!(
        run(&store, ". version"),
        QueryValue::Scalar(Value::Str("1.0".into()))
    );
    assert_eq!(
        run(&store, ". threads || 7"),
        QueryValue::Scalar(Value::Int(7))
    );
    assert_eq!(run_err(&store, ". threads"), QueryErrorKind::UnknownProperty);

    assert_eq!(
        run(&store, ": age @ cell = c2"),
        QueryValue::Scalar(Value::Int(20))
    );
    assert_eq!(
        run(&store, ": nope || 5 @ cell = c1"),
        QueryValue::Scalar(Value::Int(5))
    );
    assert_eq!(
        run(&store, ":: UMIs @ cell = c2 @ gene = g2"),
        QueryValue::Scalar(Value::Int(4))
    );
    assert_eq!(
        run(&store, "@ cell = c3 : age"),
        QueryValue::Scalar(Value::Int(30))
    );
    assert_eq!(
        run(&store, "@ cell = c1 : type : color"),
        QueryValue::Scalar(Value::Str("red".into()))
    );
    assert_eq!(
        run_err(&store, ": age @ cell = zz"),
        QueryErrorKind::UnknownEntry
    );
}

// ---- masks ----

#[test]
fn test_mask_variants() {
    let store = fixture();
    let keep = |text: &str| vector_of(run(&store, text)).1;
    assert_eq!(keep("@ cell [ type ]"), names_of(&["c1", "c2", "c3"]));
    assert_eq!(keep("@ cell [ age > 15 ]"), names_of(&["c2", "c3", "c4"]));
    assert_eq!(keep("@ cell [ type & age > 15 ]"), names_of(&["c2", "c3"]));
    assert_eq!(keep("@ cell [! type ]"), names_of(&["c4"]));
    assert_eq!(
        keep("@ cell [ type ^ age > 15 ]"),
        names_of(&["c1", "c4"])
    );
    assert_eq!(
        keep("@ cell [ type | ! age > 15 ]"),
        names_of(&["c1", "c2", "c3"])
    );
}

#[test]
fn test_mask_combination_is_left_to_right() {
    let store = fixture();
    let keep = |text: &str| vector_of(run(&store, text)).1;
    // Same terms, same set when only `&` is involved.
    assert_eq!(
        keep("@ cell [ type & age > 15 ]"),
        keep("@ cell [ age > 15 & type ]")
    );
    // Mixed combinators apply strictly left to right.
    assert_eq!(
        keep("@ cell [ type & age > 15 | age < 15 ]"),
        names_of(&["c1", "c2", "c3"])
    );
    assert_eq!(
        keep("@ cell [ type | age < 15 & age > 15 ]"),
        names_of(&["c2", "c3"])
    );
}

#[test]
fn test_mask_with_square_slice_and_comparison() {
    let store = fixture();
    let (_, names, _) = vector_of(run(&store, "@ type [ affinity @| T > 2 ]"));
    assert_eq!(names, names_of(&["B"]));
}

#[test]
fn test_all_false_mask_yields_empty_vector() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ cell [ age > 100 ] : age"));
    assert_eq!(axis.as_deref(), Some("cell"));
    assert!(names.is_empty());
    assert_eq!(values, ArrayData::I32(vec![]));
}

// ---- chains ----

#[test]
fn test_if_not_variants() {
    let store = fixture();
    let (_, names, values) = vector_of(run(&store, "@ cell : type ??"));
    assert_eq!(names, names_of(&["c1", "c2", "c3"]));
    assert_eq!(
        values,
        ArrayData::Str(vec!["T".into(), "T".into(), "B".into()])
    );

    let (_, _, values) = vector_of(run(&store, "@ cell : type ?? unknown"));
    assert_eq!(
        values,
        ArrayData::Str(vec!["T".into(), "T".into(), "B".into(), "unknown".into()])
    );

    // Without a handler, an empty value cannot fetch through an axis.
    assert_eq!(
        run_err(&store, "@ cell : type : color"),
        QueryErrorKind::UnknownEntry
    );
}

#[test]
fn test_indirect_fetch_with_missing_property() {
    let store = fixture();
    let (_, _, values) = vector_of(run(&store, "@ cell : type : weight || 9 ?? 0"));
    assert_eq!(values, ArrayData::I64(vec![9, 9, 9, 0]));
}

#[test]
fn test_matrix_column_slice_in_chain() {
    let store = fixture();
    let (_, names, values) = vector_of(run(&store, "@ cell :: UMIs @ gene = g1"));
    assert_eq!(names, names_of(&["c1", "c2", "c3", "c4"]));
    assert_eq!(values, ArrayData::I32(vec![1, 3, 5, 7]));

    let (_, names, values) = vector_of(run(&store, "@ cell [ age > 15 ] :: UMIs @ gene = g1"));
    assert_eq!(names, names_of(&["c2", "c3", "c4"]));
    assert_eq!(values, ArrayData::I32(vec![3, 5, 7]));
}

#[test]
fn test_square_slices() {
    let store = fixture();
    let (_, names, values) = vector_of(run(&store, "@ type :: affinity @| T"));
    assert_eq!(names, names_of(&["T", "B"]));
    assert_eq!(values, ArrayData::I32(vec![1, 3]));

    let (_, _, values) = vector_of(run(&store, "@ type :: affinity @- T"));
    assert_eq!(values, ArrayData::I32(vec![1, 2]));

    let (_, _, values) = vector_of(run(&store, "@ cell : type :: affinity @| T ?? 0"));
    assert_eq!(values, ArrayData::I32(vec![1, 1, 3, 0]));
}

// ---- comparisons and element-wise operations ----

#[test]
fn test_comparisons() {
    let store = fixture();
    let (_, _, values) = vector_of(run(&store, "@ cell : age >= 20"));
    assert_eq!(values, ArrayData::Bool(vec![false, true, true, true]));

    let (_, _, values) = vector_of(run(&store, r"@ cell : type ~ \^T\$"));
    assert_eq!(values, ArrayData::Bool(vec![true, true, false, false]));

    let (_, _, values) = vector_of(run(&store, r"@ cell : type !~ T"));
    assert_eq!(values, ArrayData::Bool(vec![false, false, true, true]));

    assert_eq!(
        run_err(&store, "@ cell : age ~ x"),
        QueryErrorKind::UnsupportedType
    );
}

#[test]
fn test_eltwise() {
    let store = fixture();
    let (_, _, values) = vector_of(run(&store, "@ cell : age % Log base 2"));
    let ArrayData::F64(logs) = values else {
        panic!("Log widens to floats");
    };
    assert!((logs[1] - f64::from(20u8).log2()).abs() < 1e-12);

    let (_, _, values) = vector_of(run(&store, "@ cell : age % Fraction"));
    assert_eq!(values, ArrayData::F64(vec![0.1, 0.2, 0.3, 0.4]));

    assert_eq!(
        run_err(&store, "@ cell : type % Abs"),
        QueryErrorKind::UnsupportedType
    );

    let QueryValue::Matrix(matrix) = run(&store, "@ cell @ gene :: UMIs % Convert type Float64")
    else {
        panic!("expected a matrix");
    };
    assert_eq!(matrix.values.dtype(), Dtype::F64);
}

// ---- reductions ----

#[test]
fn test_reductions() {
    let store = fixture();
    assert_eq!(
        run(&store, "@ cell @ gene :: UMIs >> Sum"),
        QueryValue::Scalar(Value::Int(36))
    );
    assert_eq!(
        run(&store, "@ cell : type >> Count"),
        QueryValue::Scalar(Value::UInt(4))
    );
    assert_eq!(
        run(&store, "@ cell : type >> Max"),
        QueryValue::Scalar(Value::Str("T".into()))
    );
    assert_eq!(
        run_err(&store, "@ cell : type >> Mean"),
        QueryErrorKind::UnsupportedType
    );

    let (_, names, values) = vector_of(run(&store, "@ cell @ gene :: UMIs >- Mean"));
    assert_eq!(names, names_of(&["c1", "c2", "c3", "c4"]));
    assert_eq!(values, ArrayData::F64(vec![1.5, 3.5, 5.5, 7.5]));
}

#[test]
fn test_empty_reductions() {
    let store = fixture();
    assert_eq!(
        run_err(&store, "@ cell [ age > 100 ] : age >> Mean"),
        QueryErrorKind::MissingDefault
    );
    assert_eq!(
        run(&store, "@ cell [ age > 100 ] : age >> Mean || 0"),
        QueryValue::Scalar(Value::Float(0.0))
    );
    // Sum declares an empty-input identity.
    assert_eq!(
        run(&store, "@ cell [ age > 100 ] : age >> Sum"),
        QueryValue::Scalar(Value::Int(0))
    );
}

// ---- grouping ----

#[test]
fn test_group_by_observed_values() {
    let store = fixture();
    let (axis, names, values) = vector_of(run(&store, "@ cell : age / type >> Mean"));
    assert_eq!(axis, None);
    assert_eq!(names, names_of(&["", "B", "T"]));
    assert_eq!(values, ArrayData::F64(vec![40.0, 30.0, 15.0]));
}

#[test]
fn test_group_by_empty_group() {
    let store = fixture();
    // Only cells c1 and c2 survive, both of type T, leaving B empty.
    assert_eq!(
        run_err(&store, "@ cell [ age < 25 ] : age / type =@ >> Mean"),
        QueryErrorKind::EmptyGroup
    );
    let (_, names, values) = vector_of(run(
        &store,
        "@ cell [ age < 25 ] : age / type =@ >> Mean || 0",
    ));
    assert_eq!(names, names_of(&["T", "B"]));
    assert_eq!(values, ArrayData::F64(vec![15.0, 0.0]));
}

#[test]
fn test_group_matrix_rows() {
    let store = fixture();
    let QueryValue::Matrix(matrix) = run(&store, "@ cell @ gene :: UMIs -/ type =@ >- Sum || 0")
    else {
        panic!("expected a matrix");
    };
    assert_eq!(*matrix.row_names, names_of(&["T", "B"]));
    assert_eq!(*matrix.column_names, names_of(&["g1", "g2"]));
    assert_eq!(matrix.get("T", "g1"), Some(Value::Int(4)));
    assert_eq!(matrix.get("T", "g2"), Some(Value::Int(6)));
    assert_eq!(matrix.get("B", "g1"), Some(Value::Int(5)));
    assert_eq!(matrix.get("B", "g2"), Some(Value::Int(6)));
}

#[test]
fn test_group_matrix_columns() {
    let store = fixture();
    let QueryValue::Matrix(matrix) = run(&store, "@ cell @ gene :: UMIs |/ is_marker >| Sum")
    else {
        panic!("expected a matrix");
    };
    assert_eq!(*matrix.row_names, names_of(&["c1", "c2", "c3", "c4"]));
    assert_eq!(*matrix.column_names, names_of(&["false", "true"]));
    assert_eq!(matrix.get("c1", "true"), Some(Value::Int(1)));
    assert_eq!(matrix.get("c1", "false"), Some(Value::Int(2)));
    assert_eq!(matrix.get("c4", "true"), Some(Value::Int(7)));
}

// ---- count-by ----

#[test]
fn test_count_by_symmetry() {
    let store = fixture();
    let QueryValue::Matrix(forward) = run(&store, "@ cell : type =@ * age") else {
        panic!("expected a matrix");
    };
    let QueryValue::Matrix(backward) = run(&store, "@ cell : age * type =@") else {
        panic!("expected a matrix");
    };
    assert_eq!(*forward.row_names, *backward.column_names);
    assert_eq!(*forward.column_names, *backward.row_names);
    for (row_index, row) in forward.row_names.iter().enumerate() {
        for (column_index, column) in forward.column_names.iter().enumerate() {
            assert_eq!(
                forward.values.get(row_index, column_index),
                backward.get(column, row).unwrap(),
            );
        }
    }
}

// ---- relayout ----

#[test]
fn test_matrix_relayout() {
    let store = fixture();
    let QueryValue::Matrix(matrix) = run(&store, "@ gene @ cell :: UMIs") else {
        panic!("expected a matrix");
    };
    assert_eq!(matrix.rows_axis.as_deref(), Some("gene"));
    assert_eq!(matrix.get("g1", "c2"), Some(Value::Int(3)));

    assert!(parse("@ gene @ cell :: UMIs")
        .unwrap()
        .requires_relayout(&store));
    assert!(!parse("@ cell @ gene :: UMIs")
        .unwrap()
        .requires_relayout(&store));
    assert!(!parse("@ cell : age").unwrap().requires_relayout(&store));
}

// ---- failure shapes ----

#[test]
fn test_failure_kinds() {
    let store = fixture();
    assert_eq!(run_err(&store, "@ nope"), QueryErrorKind::UnknownAxis);
    assert_eq!(run_err(&store, "@ cell : nope"), QueryErrorKind::UnknownProperty);
    assert_eq!(run_err(&store, "@ cell ]"), QueryErrorKind::InvalidPhrase);
    assert_eq!(run_err(&store, "@ cell @ gene"), QueryErrorKind::IncompleteQuery);
    assert_eq!(run_err(&store, "@ cell [ type"), QueryErrorKind::IncompleteQuery);
}

#[test]
fn test_errors_render_markers() {
    let store = fixture();
    let err = get_query(&store, &parse("@ cell : nope").unwrap()).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("in: @ cell : nope"), "got:\n{rendered}");
    assert!(rendered.contains('▲'), "got:\n{rendered}");
}

// ---- the public helpers ----

#[test]
fn test_has_query() {
    let store = fixture();
    assert!(has_query(&store, &parse("@ cell : age").unwrap()));
    assert!(!has_query(&store, &parse("@ cell : nope").unwrap()));
    assert!(!has_query(&store, &parse("@ nope : age").unwrap()));
}

#[test]
fn test_deps_are_reported() {
    let store = fixture();
    let answer = get_query(&store, &parse("@ cell : age").unwrap()).unwrap();
    assert!(answer.deps.contains(&DependencyKey::Axis("cell".into())));
    assert!(answer
        .deps
        .contains(&DependencyKey::Vector("cell".into(), "age".into())));

    let answer = get_query(&store, &parse("@ cell ?").unwrap()).unwrap();
    assert!(answer
        .deps
        .contains(&DependencyKey::VectorsSet("cell".into())));
}

#[test]
fn test_results_are_stable_across_runs() {
    let store = fixture();
    for text in [
        "@ cell : age >> Sum",
        "@ cell : type : color ?? black",
        "@ cell : type =@ * age",
        "@ cell @ gene :: UMIs >| Sum",
    ] {
        let query = parse(text).unwrap();
        let first = get_query(&store, &query).unwrap();
        let second = get_query(&store, &query).unwrap();
        assert_eq!(first, second, "for {text:?}");
    }
}

#[test]
fn test_dimension_prediction_matches_execution() {
    let store = fixture();
    for text in [
        "?",
        "@ ?",
        "@ cell ?",
        "@ cell @ gene ?",
        ". version",
        ": age @ cell = c2",
        "@ cell = c1 : type : color",
        "@ cell",
        "@ cell : age",
        "@ cell [ type ] : age",
        "@ cell : type : color ?? black",
        "@ cell @ gene :: UMIs",
        "@ cell @ gene :: UMIs >| Sum",
        "@ cell @ gene :: UMIs >> Sum",
        "@ cell : age / type =@ >> Mean || 0",
        "@ cell : type =@ * age",
        "@ cell : age % Abs",
        "@ cell : age > 10",
        "@ gene @ cell :: UMIs -/ is_marker >- Sum || 0",
    ] {
        let query = parse(text).unwrap();
        let answer = get_query(&store, &query).unwrap();
        assert_eq!(
            query.result_dimensions(),
            answer.value.dimensions(),
            "for {text:?}"
        );
    }
}

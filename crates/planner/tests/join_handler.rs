mod support;

use pql_common::PqlError;
use pql_planner::ir::{JoinType, Operator};
use pql_planner::objects::{CallArgs, QlObject};
use pql_planner::planpb::{join_operator, operator::Op, JoinType as WireJoinType};
use pql_planner::{Analyzer, CompilerState, OperatorSerializer};

use support::*;

fn merge(
    state: &mut CompilerState,
    df: &QlObject,
    right: &QlObject,
    how: &str,
    left_on: QlObject,
    right_on: QlObject,
) -> pql_common::Result<QlObject> {
    let how = string(state, how);
    call(
        state,
        df,
        "merge",
        CallArgs::new()
            .arg(right.clone())
            .kwarg("how", how)
            .kwarg("left_on", left_on)
            .kwarg("right_on", right_on),
    )
}

#[test]
fn merge_lowers_to_inner_join_with_key_offsets() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = string(&mut state, "service");
    let right_on = string(&mut state, "remote_addr");
    let joined = merge(&mut state, &df, &right, "inner", left_on, right_on).expect("merge");
    display(&mut state, &joined);

    let join = joined.node().expect("join node");
    assert_eq!(
        state.graph.parents(join).expect("parents"),
        &[df.node().expect("df"), right.node().expect("right")]
    );

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    let op = OperatorSerializer::new(&state.graph, &relations, state.config())
        .serialize(join)
        .expect("serialize");
    let Some(Op::JoinOp(payload)) = op.op else {
        panic!("join payload expected");
    };
    assert_eq!(payload.join_type, i32::from(WireJoinType::Inner));
    assert_eq!(
        payload.equality_conditions,
        vec![join_operator::EqualityCondition {
            left_column_index: 1,
            right_column_index: 3,
        }]
    );
    assert_eq!(payload.rows_per_batch, 1024);
    assert_eq!(payload.column_names.len(), 9);
    assert!(payload.column_names.contains(&"service_x".to_string()));
    assert!(payload.column_names.contains(&"service_y".to_string()));
}

#[test]
fn key_lists_pair_up_by_position() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = strings(&mut state, &["service", "req_path"]);
    let right_on = strings(&mut state, &["service", "remote_addr"]);
    let joined = merge(&mut state, &df, &right, "left", left_on, right_on).expect("merge");

    let node = state.graph.operator(joined.node().expect("join")).expect("op");
    let Operator::Join(join) = &node.op else {
        panic!("join expected");
    };
    assert_eq!(join.join_type, JoinType::LeftOuter);
    assert_eq!(join.left_on.len(), 2);
    assert_eq!(join.right_on.len(), 2);
    for (keys, parent_idx) in [(&join.left_on, 0), (&join.right_on, 1)] {
        for &key in keys {
            let column = state.graph.expression(key).expect("key").as_column().cloned();
            assert_eq!(column.map(|c| c.parent_op_idx), Some(parent_idx));
        }
    }
}

#[test]
fn consumed_arguments_are_deleted() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = strings(&mut state, &["service"]);
    let right_on = string(&mut state, "service");
    let left_on_node = left_on.node().expect("list");
    let right_on_node = right_on.node().expect("string");
    merge(&mut state, &df, &right, "inner", left_on, right_on).expect("merge");

    assert!(!state.graph.contains(left_on_node));
    assert!(!state.graph.contains(right_on_node));
    // sources, join, two key columns
    assert_eq!(state.graph.len(), 5);
}

#[test]
fn right_join_is_recorded_for_the_analyzer() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = string(&mut state, "service");
    let right_on = string(&mut state, "service");
    let joined = merge(&mut state, &df, &right, "right", left_on, right_on).expect("merge");
    let node = state.graph.operator(joined.node().expect("join")).expect("op");
    assert!(matches!(
        &node.op,
        Operator::Join(join) if join.join_type == JoinType::RightOuter
    ));
}

#[test]
fn suffixes_need_exactly_two_strings() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");

    let three = string_tuple(&mut state, &["_a", "_b", "_c"]);
    let err = {
        let how = string(&mut state, "inner");
        let l = string(&mut state, "service");
        let r = string(&mut state, "service");
        call(
            &mut state,
            &df,
            "merge",
            CallArgs::new()
                .arg(right.clone())
                .kwarg("how", how)
                .kwarg("left_on", l)
                .kwarg("right_on", r)
                .kwarg("suffixes", three),
        )
        .expect_err("three suffixes")
    };
    assert!(matches!(err, PqlError::Cardinality { .. }));
    assert_eq!(
        err.message(),
        "'suffixes' must be a tuple with 2 elements. Received 3"
    );

    let first = state.graph.create_string(at(5, 1), "_a").expect("string");
    let second = state.graph.create_int(at(5, 7), 1).expect("int");
    let mixed = QlObject::expr(
        state
            .graph
            .create_tuple(at(5, 1), vec![first, second])
            .expect("tuple"),
    );
    let how = string(&mut state, "inner");
    let l = string(&mut state, "service");
    let r = string(&mut state, "service");
    let err = call(
        &mut state,
        &df,
        "merge",
        CallArgs::new()
            .arg(right)
            .kwarg("how", how)
            .kwarg("left_on", l)
            .kwarg("right_on", r)
            .kwarg("suffixes", mixed),
    )
    .expect_err("non-string suffix");
    assert!(matches!(err, PqlError::Argument { .. }));
    assert_eq!(
        err.to_string(),
        "5:7: 'suffixes' must be a tuple with 2 strings for the left and right suffixes. Received Int"
    );
}

#[test]
fn key_count_mismatch_is_a_cardinality_error() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = strings(&mut state, &["service", "req_path"]);
    let right_on = string(&mut state, "service");
    let err = merge(&mut state, &df, &right, "inner", left_on, right_on).expect_err("mismatch");
    assert!(matches!(err, PqlError::Cardinality { .. }));
    assert_eq!(
        err.message(),
        "'left_on' and 'right_on' must contain the same number of columns. Received 2 and 1"
    );
}

#[test]
fn unknown_join_type_is_rejected() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let right = table(&mut state, "conn_stats");
    let left_on = string(&mut state, "service");
    let right_on = string(&mut state, "service");
    let err = merge(&mut state, &df, &right, "cross", left_on, right_on).expect_err("cross");
    assert!(matches!(err, PqlError::Semantic { .. }));
    assert_eq!(
        err.message(),
        "'cross' join type not supported. Only {inner, left, right, outer} are supported."
    );
}

#[test]
fn right_side_must_be_an_operator() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let not_a_table = QlObject::expr(state.graph.create_string(at(3, 7), "x").expect("str"));
    let left_on = string(&mut state, "service");
    let right_on = string(&mut state, "service");
    let err = merge(&mut state, &df, &not_a_table, "inner", left_on, right_on)
        .expect_err("string right");
    assert_eq!(err.to_string(), "3:7: 'right' must be an operator, got String");
}

mod support;

use pql_common::{DataType, PqlError};
use pql_planner::ir::{FuncOp, NodeType, Operator};
use pql_planner::objects::{CallArgs, DictObject, QlObject};
use pql_planner::planpb::{self, aggregate_expression, operator::Op};
use pql_planner::{Analyzer, CompilerState, OperatorSerializer};
use serde_json::json;

use support::*;

/// `("col", px.<func>)` as the evaluator builds it.
fn agg_spec(state: &mut CompilerState, column: &str, func: &str) -> QlObject {
    let name = state.graph.create_string(at(2, 10), column).expect("string");
    let func = attr_path(state, &px(), &[func]).node().expect("func");
    QlObject::expr(state.graph.create_tuple(at(2, 9), vec![name, func]).expect("tuple"))
}

#[test]
fn agg_splices_the_column_into_the_function() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let spec = agg_spec(&mut state, "latency_ns", "count");
    let tuple = spec.node().expect("tuple");
    let items = state
        .graph
        .expression(tuple)
        .expect("tuple")
        .as_collection()
        .map(<[_]>::to_vec)
        .expect("items");
    let before = state.graph.len();

    let out = call(&mut state, &df, "agg", CallArgs::new().kwarg("n", spec)).expect("agg");

    // tuple and string gone, column and aggregate added
    assert_eq!(state.graph.len(), before - 2 + 2);
    assert!(!state.graph.contains(tuple));
    assert!(!state.graph.contains(items[0]));
    let Operator::BlockingAgg(agg) = &state.graph.operator(out.node().expect("agg")).expect("op").op
    else {
        panic!("aggregate expected");
    };
    assert!(agg.groups.is_empty());
    assert_eq!(agg.aggregate_exprs.len(), 1);
    assert_eq!(agg.aggregate_exprs[0].name, "n");
    assert_eq!(agg.aggregate_exprs[0].expr, items[1]);
    let func = state.graph.expression(items[1]).expect("func").as_func().cloned().expect("func");
    assert_eq!(func.args.len(), 1);
    let column = state.graph.expression(func.args[0]).expect("col").as_column().cloned();
    assert_eq!(
        column.map(|c| (c.name, c.parent_op_idx)),
        Some(("latency_ns".to_string(), 0))
    );
}

#[test]
fn agg_values_must_be_pairs() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let not_tuple = string(&mut state, "latency_ns");
    let err = call(&mut state, &df, "agg", CallArgs::new().kwarg("n", not_tuple))
        .expect_err("not a tuple");
    assert_eq!(err.message(), "Expected 'agg' kwarg argument to be a tuple, not String");

    let triple = string_tuple(&mut state, &["a", "b", "c"]);
    let err = call(&mut state, &df, "agg", CallArgs::new().kwarg("n", triple))
        .expect_err("three items");
    assert!(matches!(err, PqlError::Cardinality { .. }));
    assert_eq!(
        err.message(),
        "Expected 'agg' kwarg argument to be a tuple of size 2, not 3"
    );
}

#[test]
fn agg_errors_point_at_the_offending_expression() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let not_tuple = QlObject::expr(state.graph.create_string(at(5, 3), "latency_ns").expect("string"));
    let err = call(&mut state, &df, "agg", CallArgs::new().kwarg("n", not_tuple))
        .expect_err("not a tuple");
    assert_eq!(err.location(), Some(at(5, 3)));

    let column = state.graph.create_int(at(6, 10), 3).expect("int");
    let func = attr_path(&mut state, &px(), &["count"]).node().expect("func");
    let pair = QlObject::expr(state.graph.create_tuple(at(6, 9), vec![column, func]).expect("tuple"));
    let err = call(&mut state, &df, "agg", CallArgs::new().kwarg("n", pair))
        .expect_err("int column");
    assert_eq!(err.message(), "Expected 'str' for first tuple argument. Received 'Int'");
    assert_eq!(err.location(), Some(at(6, 10)));
}

#[test]
fn head_consumes_its_row_count() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let n = int(&mut state, 10);
    let n_node = n.node().expect("int");
    let out = call(&mut state, &df, "head", CallArgs::new().arg(n)).expect("head");

    assert!(!state.graph.contains(n_node));
    let op = &state.graph.operator(out.node().expect("limit")).expect("op").op;
    assert!(matches!(op, Operator::Limit(limit) if limit.limit == 10));
}

#[test]
fn head_rejects_surplus_arguments() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let a = int(&mut state, 1);
    let b = int(&mut state, 2);
    let err = call(&mut state, &df, "head", CallArgs::new().arg(a).arg(b)).expect_err("two args");
    assert_eq!(err.message(), "head() takes 1 positional arguments but 2 were given");
}

#[test]
fn list_subscript_projects_in_order() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let key = strings(&mut state, &["service", "latency_ns"]);
    let list = key.node().expect("list");
    let out = df.subscript(&mut state, at(4, 3), key).expect("subscript");

    assert!(!state.graph.contains(list));
    let Operator::Map(map) = &state.graph.operator(out.node().expect("map")).expect("op").op else {
        panic!("map expected");
    };
    assert!(!map.keep_input_columns);
    let names: Vec<&str> = map.col_exprs.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["service", "latency_ns"]);
    for column in &map.col_exprs {
        assert_eq!(
            state.graph.node_type(column.expr).expect("type"),
            NodeType::Column
        );
    }
}

#[test]
fn expression_subscript_adopts_the_predicate() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let key = string(&mut state, "latency_ns");
    let column = df.subscript(&mut state, at(5, 4), key).expect("column");
    let zero = int(&mut state, 0);
    let predicate = state
        .graph
        .create_func(
            at(5, 4),
            FuncOp::Gt,
            vec![column.node().expect("col"), zero.node().expect("int")],
        )
        .expect("predicate");
    let before = state.graph.len();

    let out = df
        .subscript(&mut state, at(5, 1), QlObject::expr(predicate))
        .expect("filter");

    assert_eq!(state.graph.len(), before + 1);
    let op = &state.graph.operator(out.node().expect("filter")).expect("op").op;
    assert!(matches!(op, Operator::Filter(filter) if filter.predicate == predicate));
}

#[test]
fn drop_keeps_the_remaining_columns() {
    init_tracing();
    let mut state = state();
    let df = table(&mut state, "http_events");
    let columns = strings(&mut state, &["req_path", "resp_status"]);
    let list = columns.node().expect("list");
    let out = call(&mut state, &df, "drop", CallArgs::new().arg(columns)).expect("drop");
    display(&mut state, &out);
    assert!(!state.graph.contains(list));

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    assert_eq!(
        relations.get(out.node().expect("op")).expect("relation").names(),
        vec!["time_", "service", "latency_ns"]
    );
}

#[test]
fn drop_requires_a_list() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let column = string(&mut state, "req_path");
    let err = call(&mut state, &df, "drop", CallArgs::new().arg(column)).expect_err("string");
    assert_eq!(
        err.message(),
        "Expected 'drop' kwarg argument 'columns' to be a list, not String"
    );
}

#[test]
fn groupby_agg_lowers_to_grouped_aggregate() {
    init_tracing();
    let mut state = state();
    let df = table(&mut state, "http_events");
    let src = df.node().expect("src");
    let by = string(&mut state, "service");
    let grouped = call(&mut state, &df, "groupby", CallArgs::new().arg(by)).expect("groupby");
    let spec = agg_spec(&mut state, "latency_ns", "count");
    let out = call(&mut state, &grouped, "agg", CallArgs::new().kwarg("n", spec)).expect("agg");
    display(&mut state, &out);

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    let agg = out.node().expect("agg");
    assert!(!state.graph.contains(grouped.node().expect("groupby")));
    assert_eq!(
        serde_json::to_value(relations.get(agg).expect("relation")).expect("json"),
        json!({
            "columns": [
                {"name": "service", "data_type": "String", "semantic_type": "StNone"},
                {"name": "n", "data_type": "Int64", "semantic_type": "StNone"},
            ]
        })
    );

    let op = OperatorSerializer::new(&state.graph, &relations, state.config())
        .serialize(agg)
        .expect("serialize");
    let Some(Op::AggOp(payload)) = op.op else {
        panic!("aggregate payload expected");
    };
    assert_eq!(
        payload.groups,
        vec![planpb::Column {
            node: src.0,
            index: 1
        }]
    );
    assert_eq!(payload.group_names, vec!["service"]);
    assert_eq!(payload.value_names, vec!["n"]);
    assert_eq!(payload.values[0].name, "count");
    assert_eq!(
        payload.values[0].args[0].value,
        Some(aggregate_expression::arg::Value::Column(planpb::Column {
            node: src.0,
            index: 2
        }))
    );
    assert_eq!(
        payload.values[0].args_data_types,
        vec![i32::from(DataType::Int64)]
    );
}

#[test]
fn groupby_requires_labels() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let by = int(&mut state, 3);
    let err = call(&mut state, &df, "groupby", CallArgs::new().arg(by)).expect_err("int");
    assert_eq!(err.message(), "'by' expected string or list of strings, got Int");
}

#[test]
fn assigned_column_is_appended_to_the_input() {
    let mut state = state();
    let df = table(&mut state, "http_events");
    let latency = attr_path(&mut state, &df, &["latency_ns"]).node().expect("col");
    let divisor = int(&mut state, 1000).node().expect("int");
    let value = state
        .graph
        .create_func(at(6, 1), FuncOp::Div, vec![latency, divisor])
        .expect("div");
    let QlObject::Dataframe(frame) = &df else {
        panic!("dataframe expected");
    };
    let out = frame
        .assign_column(&mut state, at(6, 1), "latency_us", &QlObject::expr(value))
        .expect("assign");
    display(&mut state, &QlObject::Dataframe(out));

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    let relation = relations.get(out.op()).expect("relation");
    assert_eq!(relation.len(), 6);
    assert_eq!(
        relation.column(5).map(|c| (c.name.as_str(), c.data_type)),
        Some(("latency_us", DataType::Int64))
    );
}

#[test]
fn append_unions_matching_frames() {
    let mut state = state();
    let first = table(&mut state, "http_events");
    let second = table(&mut state, "http_events");
    let out = call(&mut state, &first, "append", CallArgs::new().arg(second.clone()))
        .expect("append");
    display(&mut state, &out);

    let relations = Analyzer::new().analyze(&mut state).expect("analyze");
    let op = OperatorSerializer::new(&state.graph, &relations, state.config())
        .serialize(out.node().expect("union"))
        .expect("serialize");
    let Some(Op::UnionOp(payload)) = op.op else {
        panic!("union payload expected");
    };
    assert_eq!(payload.column_mappings.len(), 2);
    assert_eq!(payload.column_mappings[1].column_indexes, vec![0, 1, 2, 3, 4]);
}

#[test]
#[should_panic(expected = "dict keys and values must have the same length")]
fn dict_with_unpaired_keys_is_an_invariant_violation() {
    let mut state = state();
    let keys = vec![string(&mut state, "a"), string(&mut state, "b")];
    let values = vec![string(&mut state, "x")];
    let dict = DictObject::new(keys, values);
    let _ = dict.pairs().count();
}

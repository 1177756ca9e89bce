#![allow(dead_code)]

use pql_common::{CompilerConfig, DataType, Result, SemanticType, SourceLocation};
use pql_planner::ir::LiteralValue;
use pql_planner::objects::{CallArgs, DictObject, ModuleObject, QlObject};
use pql_planner::{CompilerState, Relation, StaticRegistry, UdtfDefinition};

pub fn at(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new(line, column)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pql_planner=debug")
        .with_test_writer()
        .try_init();
}

pub fn http_events() -> Relation {
    Relation::new()
        .with_semantic_column("time_", DataType::Time64Ns, SemanticType::StTimeNs)
        .with_column("service", DataType::String)
        .with_column("latency_ns", DataType::Int64)
        .with_column("req_path", DataType::String)
        .with_column("resp_status", DataType::Int64)
}

pub fn conn_stats() -> Relation {
    Relation::new()
        .with_semantic_column("time_", DataType::Time64Ns, SemanticType::StTimeNs)
        .with_column("service", DataType::String)
        .with_column("bytes_sent", DataType::Int64)
        .with_column("remote_addr", DataType::String)
}

pub fn latency_quantiles() -> Relation {
    Relation::new()
        .with_semantic_column("time_", DataType::Time64Ns, SemanticType::StTimeNs)
        .with_column("n", DataType::Float64)
        .with_column("total", DataType::Float64)
        .with_column("p50", DataType::Float64)
        .with_column("p99", DataType::Float64)
}

pub fn registry() -> StaticRegistry {
    StaticRegistry::new()
        .with_builtin_operators()
        .with_uda("count", &[DataType::Int64], DataType::Int64)
        .with_uda("count", &[DataType::String], DataType::Int64)
        .with_uda("mean", &[DataType::Int64], DataType::Float64)
        .with_udf("upid_to_pod", &[DataType::String], DataType::String)
        .with_table("http_events", http_events())
        .with_table("conn_stats", conn_stats())
        .with_table("latency_quantiles", latency_quantiles())
        .with_udtf(
            UdtfDefinition::new(
                "GetAgentStatus",
                Relation::new()
                    .with_column("agent_id", DataType::Uint128)
                    .with_column("hostname", DataType::String),
            )
            .with_default_arg("include_kelvin", DataType::Boolean, LiteralValue::Boolean(true)),
        )
}

pub fn state() -> CompilerState {
    state_with(CompilerConfig::default())
}

pub fn state_with(config: CompilerConfig) -> CompilerState {
    CompilerState::with_static_registry(registry(), config)
}

pub fn px() -> QlObject {
    QlObject::Module(ModuleObject::px())
}

pub fn string(state: &mut CompilerState, value: &str) -> QlObject {
    QlObject::expr(state.graph.create_string(at(1, 1), value).expect("string"))
}

pub fn int(state: &mut CompilerState, value: i64) -> QlObject {
    QlObject::expr(state.graph.create_int(at(1, 1), value).expect("int"))
}

pub fn float(state: &mut CompilerState, value: f64) -> QlObject {
    QlObject::expr(state.graph.create_float(at(1, 1), value).expect("float"))
}

pub fn strings(state: &mut CompilerState, values: &[&str]) -> QlObject {
    let items = values
        .iter()
        .map(|v| state.graph.create_string(at(1, 1), *v).expect("string"))
        .collect();
    QlObject::expr(state.graph.create_list(at(1, 1), items).expect("list"))
}

pub fn string_tuple(state: &mut CompilerState, values: &[&str]) -> QlObject {
    let items = values
        .iter()
        .map(|v| state.graph.create_string(at(1, 1), *v).expect("string"))
        .collect();
    QlObject::expr(state.graph.create_tuple(at(1, 1), items).expect("tuple"))
}

pub fn dict(state: &mut CompilerState, pairs: &[(&str, &str)]) -> QlObject {
    let keys = pairs.iter().map(|(k, _)| string(state, k)).collect();
    let values = pairs.iter().map(|(_, v)| string(state, v)).collect();
    QlObject::Dict(DictObject::new(keys, values))
}

/// `obj.name(args)` the way the evaluator dispatches it.
pub fn call(
    state: &mut CompilerState,
    obj: &QlObject,
    name: &str,
    args: CallArgs,
) -> Result<QlObject> {
    let method = obj.get_attribute(state, at(1, 1), name)?;
    method.call(state, at(1, 1), args)
}

/// `obj.a.b.c`.
pub fn attr_path(state: &mut CompilerState, obj: &QlObject, path: &[&str]) -> QlObject {
    let mut current = obj.clone();
    for name in path {
        current = current
            .get_attribute(state, at(1, 1), name)
            .expect("attribute");
    }
    current
}

/// `px.DataFrame(table=name)`.
pub fn table(state: &mut CompilerState, name: &str) -> QlObject {
    let table = string(state, name);
    call(state, &px(), "DataFrame", CallArgs::new().kwarg("table", table)).expect("DataFrame")
}

/// `px.display(df)`.
pub fn display(state: &mut CompilerState, df: &QlObject) {
    call(state, &px(), "display", CallArgs::new().arg(df.clone())).expect("display");
}

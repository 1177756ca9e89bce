#![allow(dead_code)]

use pql_common::{CompilerConfig, DataType, SemanticType, SourceLocation};
use pql_planner::objects::{CallArgs, ModuleObject, QlObject};
use pql_planner::{CompilerState, Relation, StaticRegistry};

pub fn at(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new(line, column)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn registry() -> StaticRegistry {
    StaticRegistry::new()
        .with_builtin_operators()
        .with_uda("count", &[DataType::Int64], DataType::Int64)
        .with_uda("mean", &[DataType::Int64], DataType::Float64)
        .with_table(
            "http_events",
            Relation::new()
                .with_semantic_column("time_", DataType::Time64Ns, SemanticType::StTimeNs)
                .with_column("service", DataType::String)
                .with_column("latency_ns", DataType::Int64),
        )
        .with_table(
            "conn_stats",
            Relation::new()
                .with_column("remote_addr", DataType::String)
                .with_column("bytes_sent", DataType::Int64),
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

pub fn call(state: &mut CompilerState, obj: &QlObject, name: &str, args: CallArgs) -> QlObject {
    let method = obj.get_attribute(state, at(1, 1), name).expect("method");
    method.call(state, at(1, 1), args).expect(name)
}

pub fn table(state: &mut CompilerState, name: &str) -> QlObject {
    let table = string(state, name);
    call(state, &px(), "DataFrame", CallArgs::new().kwarg("table", table))
}

pub fn display(state: &mut CompilerState, df: &QlObject) {
    call(state, &px(), "display", CallArgs::new().arg(df.clone()));
}

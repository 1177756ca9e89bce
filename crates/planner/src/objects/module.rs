use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use pql_common::{NodeId, PqlError, Result, SourceLocation};

use crate::ir::pattern::{self, list_of, Pattern};
use crate::ir::{
    Expression, FuncOp, IrGraph, LiteralValue, MemorySinkOp, MemorySourceOp, NodeType, Operator,
    UdtfArgValue, UdtfSourceOp,
};
use crate::objects::func::{Binding, DefaultValue, FreeHandler, FuncObject, ParsedArgs, Signature};
use crate::objects::{arg_as, delete_consumed, expect_node, otel, ObjectBehavior, ObjectType, QlObject};
use crate::registry::UdtfDefinition;
use crate::state::CompilerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Px,
    Otel,
    OtelTrace,
    OtelMetric,
}

impl ModuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Px => "px",
            ModuleKind::Otel => "px.otel",
            ModuleKind::OtelTrace => "px.otel.trace",
            ModuleKind::OtelMetric => "px.otel.metric",
        }
    }
}

/// A script module: functions and sub-modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleObject {
    kind: ModuleKind,
}

type FunctionTable = BTreeMap<&'static str, (Arc<Signature>, FreeHandler)>;

fn table(entries: Vec<(&'static str, Signature, FreeHandler)>) -> FunctionTable {
    entries
        .into_iter()
        .map(|(name, sig, handler)| (name, (Arc::new(sig), handler)))
        .collect()
}

static PX: LazyLock<FunctionTable> = LazyLock::new(|| {
    table(vec![
        (
            "DataFrame",
            Signature::new(&["table", "select", "start_time", "end_time"])
                .with_default("select", DefaultValue::None)
                .with_default("start_time", DefaultValue::None)
                .with_default("end_time", DefaultValue::None),
            dataframe,
        ),
        (
            "display",
            Signature::new(&["out", "name"]).with_default("name", DefaultValue::str("output")),
            display,
        ),
        ("export", Signature::new(&["out", "export_spec"]), export),
    ])
});

static OTEL: LazyLock<FunctionTable> = LazyLock::new(|| {
    table(vec![(
        "Endpoint",
        Signature::new(&["url", "attributes"]).with_default("attributes", DefaultValue::EmptyDict),
        otel::endpoint,
    )])
});

static OTEL_TRACE: LazyLock<FunctionTable> = LazyLock::new(|| {
    table(vec![(
        "Span",
        Signature::new(&[
            "name",
            "start_time_unix_nano",
            "end_time_unix_nano",
            "span_id",
            "parent_span_id",
            "trace_id",
            "status",
            "kind",
            "attributes",
            "endpoint",
        ])
        .with_default("span_id", DefaultValue::str(""))
        .with_default("parent_span_id", DefaultValue::str(""))
        .with_default("trace_id", DefaultValue::str(""))
        .with_default("status", DefaultValue::str(""))
        .with_default("kind", DefaultValue::int(2))
        .with_default("attributes", DefaultValue::EmptyDict)
        .with_default("endpoint", DefaultValue::None),
        otel::span,
    )])
});

static OTEL_METRIC: LazyLock<FunctionTable> = LazyLock::new(|| {
    table(vec![
        (
            "Metric",
            Signature::new(&["name", "description", "data", "attributes", "endpoint"])
                .with_default("attributes", DefaultValue::EmptyDict)
                .with_default("endpoint", DefaultValue::None),
            otel::metric,
        ),
        (
            "Gauge",
            Signature::new(&["start_time_unix_nano", "time_unix_nano", "value"]),
            otel::gauge,
        ),
        (
            "Summary",
            Signature::new(&[
                "start_time_unix_nano",
                "time_unix_nano",
                "count",
                "sum",
                "quantile_values",
            ]),
            otel::summary,
        ),
    ])
});

impl ModuleObject {
    pub fn new(kind: ModuleKind) -> Self {
        Self { kind }
    }

    /// The root `px` module scripts import.
    pub fn px() -> Self {
        Self::new(ModuleKind::Px)
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    fn functions(&self) -> &'static FunctionTable {
        match self.kind {
            ModuleKind::Px => &*PX,
            ModuleKind::Otel => &*OTEL,
            ModuleKind::OtelTrace => &*OTEL_TRACE,
            ModuleKind::OtelMetric => &*OTEL_METRIC,
        }
    }
}

impl ObjectBehavior for ModuleObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Module
    }

    fn get_method(&self, name: &str) -> Option<FuncObject> {
        let (sig, handler) = self.functions().get(name)?;
        Some(FuncObject::new(
            format!("{}.{name}", self.kind.name()),
            sig.clone(),
            Binding::Free(*handler),
        ))
    }

    fn get_attribute(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        name: &str,
    ) -> Result<Option<QlObject>> {
        let sub = match (self.kind, name) {
            (ModuleKind::Px, "otel") => Some(ModuleKind::Otel),
            (ModuleKind::Otel, "trace") => Some(ModuleKind::OtelTrace),
            (ModuleKind::Otel, "metric") => Some(ModuleKind::OtelMetric),
            _ => None,
        };
        if let Some(kind) = sub {
            return Ok(Some(QlObject::Module(ModuleObject::new(kind))));
        }
        if self.kind != ModuleKind::Px {
            return Ok(None);
        }
        registry_function(state, location, name)
    }
}

/// Resolve `px.<name>` through the function registry.
///
/// Table functions become callables, aggregates become an argument-less Func
/// expression for `agg`, scalar functions become callables building a Func.
fn registry_function(
    state: &mut CompilerState,
    location: SourceLocation,
    name: &str,
) -> Result<Option<QlObject>> {
    if let Some(udtf) = state.registry().udtf(name) {
        let mut sig = Signature::new(&[]);
        for arg in &udtf.args {
            sig.arg_names.push(arg.name.clone());
            if let Some(default) = &arg.default {
                sig = sig.with_default(&arg.name, DefaultValue::Literal(default.clone()));
            }
        }
        return Ok(Some(QlObject::Func(FuncObject::new(
            name,
            Arc::new(sig),
            Binding::TableFunction(Arc::new(udtf)),
        ))));
    }
    if state.registry().is_uda(name) {
        let func = state
            .graph
            .create_func(location, FuncOp::Named(name.to_string()), vec![])?;
        return Ok(Some(QlObject::expr(func)));
    }
    if state.registry().is_udf(name) {
        return Ok(Some(QlObject::Func(FuncObject::new(
            name,
            Arc::new(Signature::new(&[]).with_variadic_args()),
            Binding::ScalarFunction(name.to_string()),
        ))));
    }
    Ok(None)
}

pub(crate) fn call_scalar_function(
    state: &mut CompilerState,
    location: SourceLocation,
    name: &str,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let mut nodes = Vec::with_capacity(args.varargs().len());
    for (idx, arg) in args.varargs().iter().enumerate() {
        match arg {
            QlObject::Expr(e) => nodes.push(e.node),
            other => {
                return Err(PqlError::argument(
                    location,
                    format!(
                        "Expected arg {idx} of '{name}' to be an expression, received {}",
                        other.type_name(graph)
                    ),
                ));
            }
        }
    }
    let func = graph.create_func(location, FuncOp::Named(name.to_string()), nodes)?;
    Ok(QlObject::expr(func))
}

pub(crate) fn call_table_function(
    state: &mut CompilerState,
    location: SourceLocation,
    udtf: &UdtfDefinition,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let mut values = Vec::with_capacity(udtf.args.len());
    for declared in &udtf.args {
        let value = expect_node(
            graph,
            location,
            args.get(&declared.name)?,
            &declared.name,
            &Pattern::Literal,
        )?;
        values.push(UdtfArgValue {
            name: declared.name.clone(),
            value,
            data_type: declared.data_type,
        });
    }
    let id = graph.create_operator(
        location,
        vec![],
        Operator::UdtfSource(UdtfSourceOp {
            name: udtf.name.clone(),
            args: values,
            relation: udtf.relation.clone(),
        }),
    )?;
    Ok(QlObject::dataframe(id))
}

/// Int or Time literal bound of a table scan, if given.
fn time_bound(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
    arg_name: &str,
) -> Result<Option<(i64, NodeId)>> {
    if obj.is_none() {
        return Ok(None);
    }
    let Some(id) = obj.node() else {
        return Err(PqlError::argument(
            location,
            format!("'{arg_name}' must be an int or time, got {}", obj.object_type()),
        ));
    };
    match graph.expression(id).ok().and_then(Expression::literal) {
        Some(LiteralValue::Int64(v)) | Some(LiteralValue::Time64Ns(v)) => Ok(Some((v, id))),
        _ => Err(pattern::wrong_kind(graph, id, arg_name, "an int or time")),
    }
}

/// `px.DataFrame(table, select=None, start_time=None, end_time=None)`.
fn dataframe(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let table_node = arg_as(&state.graph, location, args.get("table")?, "table", NodeType::String)?;
    let table = pattern::string_value(&state.graph, table_node)?;
    if state.schemas().table_relation(&table).is_none() {
        return Err(PqlError::semantic(
            state.graph.location(table_node)?,
            format!("Table '{table}' not found."),
        ));
    }

    let graph = &mut state.graph;
    let mut consumed = vec![table_node];
    let select_arg = args.get("select")?;
    let select = if select_arg.is_none() {
        None
    } else {
        let list = expect_node(graph, location, select_arg, "select", &list_of(Pattern::String))?;
        consumed.push(list);
        Some(pattern::strings_from_collection(graph, list)?)
    };
    let start = time_bound(graph, location, args.get("start_time")?, "start_time")?;
    let stop = time_bound(graph, location, args.get("end_time")?, "end_time")?;
    consumed.extend(start.iter().chain(stop.iter()).map(|&(_, id)| id));

    let mut op = MemorySourceOp::new(table);
    op.select = select;
    op.start_time = start.map(|(v, _)| v);
    op.stop_time = stop.map(|(v, _)| v);
    let id = graph.create_operator(location, vec![], Operator::MemorySource(op))?;
    delete_consumed(graph, consumed)?;
    Ok(QlObject::dataframe(id))
}

/// `px.display(out, name='output')`.
fn display(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let out = expect_node(graph, location, args.get("out")?, "out", &Pattern::Operator)?;
    let name_node = arg_as(graph, location, args.get("name")?, "name", NodeType::String)?;
    let name = pattern::string_value(graph, name_node)?;
    graph.create_operator(location, vec![out], Operator::MemorySink(MemorySinkOp { name }))?;
    delete_consumed(graph, [name_node])?;
    Ok(QlObject::None)
}

/// `px.export(out, export_spec)`.
fn export(
    state: &mut CompilerState,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let out = expect_node(&state.graph, location, args.get("out")?, "out", &Pattern::Operator)?;
    let exporter = match args.get("export_spec")? {
        QlObject::Exporter(exporter) => exporter,
        other => {
            return Err(PqlError::argument(
                location,
                format!(
                    "Expected 'export_spec' to be an Exporter, received {}",
                    other.type_name(&state.graph)
                ),
            ));
        }
    };
    exporter.create_sink(state, location, out)?;
    Ok(QlObject::None)
}

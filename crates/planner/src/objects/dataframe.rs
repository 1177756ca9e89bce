//! Dataframe value and its operation handlers.
//!
//! A [`Dataframe`] points at the operator node a method chain currently ends
//! at. Every handler validates its arguments, adds nodes to the graph, deletes
//! the literal arguments it consumed, and returns a value pointing at the new
//! node.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use pql_common::{NodeId, PqlError, Result, SourceLocation};
use tracing::debug;

use crate::ir::pattern::{self, list_of, Pattern};
use crate::ir::{
    BlockingAggOp, ColumnExpression, DropOp, Expression, FilterOp, GroupByOp, IrGraph, JoinOp,
    JoinType, LimitOp, MapOp, NodeType, Operator, RangeOp,
};
use crate::objects::func::{Binding, DataframeHandler, DefaultValue, FuncObject, ParsedArgs, Signature};
use crate::objects::{delete_consumed, expect_node, ObjectBehavior, ObjectType, QlObject};
use crate::state::CompilerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataframe {
    op: NodeId,
}

type MethodTable = BTreeMap<&'static str, (Arc<Signature>, DataframeHandler)>;

static METHODS: LazyLock<MethodTable> = LazyLock::new(|| {
    let mut methods: MethodTable = BTreeMap::new();
    let mut add = |name, sig: Signature, handler: DataframeHandler| {
        methods.insert(name, (Arc::new(sig), handler));
    };
    add(
        "merge",
        Signature::new(&["right", "how", "left_on", "right_on", "suffixes"]).with_default(
            "suffixes",
            DefaultValue::StrTuple(vec!["_x".to_string(), "_y".to_string()]),
        ),
        join,
    );
    add("agg", Signature::new(&[]).with_variadic_kwargs(), agg);
    add("drop", Signature::new(&["columns"]), drop_columns);
    add(
        "head",
        Signature::new(&["n"]).with_default("n", DefaultValue::int(5)),
        head,
    );
    add("groupby", Signature::new(&["by"]), group_by);
    add("range", Signature::new(&["start", "stop"]), range);
    add("append", Signature::new(&["other"]), append);
    methods
});

static SUBSCRIPT: LazyLock<Arc<Signature>> =
    LazyLock::new(|| Arc::new(Signature::new(&["key"])));

impl Dataframe {
    pub fn new(op: NodeId) -> Self {
        Self { op }
    }

    /// Operator the next method call attaches to.
    pub fn op(&self) -> NodeId {
        self.op
    }

    /// `df[name] = value` and `df.name = value`: a Map keeping every input
    /// column, with `name` replaced in place or appended.
    pub fn assign_column(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        name: &str,
        value: &QlObject,
    ) -> Result<Dataframe> {
        let graph = &mut state.graph;
        let expr = expect_node(graph, location, value, name, &Pattern::Expression)?;
        let id = graph.create_operator(
            location,
            vec![self.op],
            Operator::Map(MapOp {
                col_exprs: vec![ColumnExpression::new(name, expr)],
                keep_input_columns: true,
            }),
        )?;
        debug!(node_id = %id, column = name, "assigned column");
        Ok(Dataframe::new(id))
    }
}

impl ObjectBehavior for Dataframe {
    fn object_type(&self) -> ObjectType {
        ObjectType::Dataframe
    }

    fn get_method(&self, name: &str) -> Option<FuncObject> {
        let (sig, handler) = METHODS.get(name)?;
        Some(FuncObject::new(
            name,
            sig.clone(),
            Binding::Dataframe {
                receiver: *self,
                handler: *handler,
            },
        ))
    }

    /// `df.col` reads a column.
    fn get_attribute(
        &self,
        state: &mut CompilerState,
        location: SourceLocation,
        name: &str,
    ) -> Result<Option<QlObject>> {
        let column = state.graph.create_column(location, name, 0)?;
        Ok(Some(QlObject::expr(column)))
    }

    fn subscript_method(&self) -> Option<FuncObject> {
        Some(FuncObject::new(
            "__getitem__",
            SUBSCRIPT.clone(),
            Binding::Dataframe {
                receiver: *self,
                handler: subscript,
            },
        ))
    }
}

fn join(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let right = expect_node(graph, location, args.get("right")?, "right", &Pattern::Operator)?;
    let how_node = expect_node(graph, location, args.get("how")?, "how", &Pattern::String)?;
    let how = pattern::string_value(graph, how_node)?;
    let join_type = JoinType::from_how(&how).ok_or_else(|| {
        PqlError::semantic(
            graph.location(how_node).unwrap_or(location),
            format!(
                "'{how}' join type not supported. Only {{inner, left, right, outer}} are supported."
            ),
        )
    })?;

    let (left_on_node, left_keys) = key_names(graph, location, args.get("left_on")?, "left_on")?;
    let (right_on_node, right_keys) =
        key_names(graph, location, args.get("right_on")?, "right_on")?;
    let (suffixes_node, suffixes) = parse_suffixes(graph, location, args.get("suffixes")?)?;

    let left_on = create_columns(state, &left_keys, 0)?;
    let right_on = create_columns(state, &right_keys, 1)?;
    let graph = &mut state.graph;
    let id = graph.create_operator(
        location,
        vec![df.op, right],
        Operator::Join(JoinOp {
            join_type,
            left_on,
            right_on,
            suffixes,
        }),
    )?;
    delete_consumed(graph, [how_node, left_on_node, right_on_node, suffixes_node])?;
    debug!(join = %id, left = %df.op, %right, join_type = join_type.name(), "created join");
    Ok(QlObject::dataframe(id))
}

/// Key names from a single label or a list of labels, each paired with the
/// location of the node that named it.
fn key_names(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
    arg_name: &str,
) -> Result<(NodeId, Vec<(String, SourceLocation)>)> {
    let id = expect_node(graph, location, obj, arg_name, &Pattern::Expression)
        .map_err(|_| label_error(graph, location, obj, arg_name))?;
    match graph.expression(id)? {
        Expression::String(name) => Ok((id, vec![(name.clone(), graph.location(id)?)])),
        Expression::List(items) => {
            let names = pattern::strings_from_collection(graph, id)?;
            let locations = items
                .iter()
                .map(|&item| graph.location(item))
                .collect::<Result<Vec<_>>>()?;
            Ok((id, names.into_iter().zip(locations).collect()))
        }
        _ => Err(label_error(graph, location, obj, arg_name)),
    }
}

fn label_error(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
    arg_name: &str,
) -> PqlError {
    let location = obj
        .node()
        .and_then(|id| graph.location(id).ok())
        .unwrap_or(location);
    PqlError::argument(
        location,
        format!(
            "'{arg_name}' must be a label or a list of labels, got {}",
            obj.type_name(graph)
        ),
    )
}

fn create_columns(
    state: &mut CompilerState,
    names: &[(String, SourceLocation)],
    parent_op_idx: usize,
) -> Result<Vec<NodeId>> {
    names
        .iter()
        .map(|(name, at)| state.graph.create_column(*at, name.clone(), parent_op_idx))
        .collect()
}

fn parse_suffixes(
    graph: &IrGraph,
    location: SourceLocation,
    obj: &QlObject,
) -> Result<(NodeId, Vec<String>)> {
    let shape_error = |location: SourceLocation, actual: String| {
        PqlError::argument(
            location,
            format!(
                "'suffixes' must be a tuple with 2 strings for the left and right suffixes. Received {actual}"
            ),
        )
    };
    let Some(id) = obj.node().filter(|&id| Pattern::Collection.matches(graph, id)) else {
        let at = obj
            .node()
            .and_then(|id| graph.location(id).ok())
            .unwrap_or(location);
        return Err(shape_error(at, obj.type_name(graph)));
    };
    let items = graph
        .expression(id)?
        .as_collection()
        .map(<[NodeId]>::to_vec)
        .unwrap_or_default();
    if items.len() != 2 {
        return Err(PqlError::cardinality(
            graph.location(id)?,
            format!(
                "'suffixes' must be a tuple with 2 elements. Received {}",
                items.len()
            ),
        ));
    }
    let mut out = Vec::with_capacity(2);
    for item in items {
        if !Pattern::String.matches(graph, item) {
            return Err(shape_error(
                graph.location(item)?,
                pattern::type_string(graph, item),
            ));
        }
        out.push(pattern::string_value(graph, item)?);
    }
    Ok((id, out))
}

/// `agg(out=("col", fn), ...)`: one aggregate expression per keyword.
fn agg(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let mut aggregate_exprs = Vec::with_capacity(args.kwargs().len());
    let mut consumed = Vec::with_capacity(args.kwargs().len());
    for (out_name, value) in args.kwargs() {
        let graph = &mut state.graph;
        let tuple = match value.node() {
            Some(id) if graph.node_type(id)? == NodeType::Tuple => id,
            node => {
                let at = match node {
                    Some(id) => graph.location(id)?,
                    None => location,
                };
                return Err(PqlError::argument(
                    at,
                    format!(
                        "Expected 'agg' kwarg argument to be a tuple, not {}",
                        value.type_name(graph)
                    ),
                ));
            }
        };
        let items = graph
            .expression(tuple)?
            .as_collection()
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        if items.len() != 2 {
            return Err(PqlError::cardinality(
                graph.location(tuple)?,
                format!(
                    "Expected 'agg' kwarg argument to be a tuple of size 2, not {}",
                    items.len()
                ),
            ));
        }
        let (column_node, func) = (items[0], items[1]);
        if !Pattern::String.matches(graph, column_node) {
            return Err(PqlError::argument(
                graph.location(column_node)?,
                format!(
                    "Expected 'str' for first tuple argument. Received '{}'",
                    pattern::type_string(graph, column_node)
                ),
            ));
        }
        if !Pattern::Func.matches(graph, func) {
            return Err(PqlError::argument(
                graph.location(func)?,
                format!(
                    "Expected 'func' for second tuple argument. Received '{}'",
                    pattern::type_string(graph, func)
                ),
            ));
        }
        if graph
            .expression(func)?
            .as_func()
            .is_some_and(|f| !f.args.is_empty())
        {
            return Err(PqlError::argument(
                graph.location(func)?,
                "Unexpected aggregate function",
            ));
        }

        let column_name = pattern::string_value(graph, column_node)?;
        let column_location = graph.location(column_node)?;
        let column = graph.create_column(column_location, column_name, 0)?;
        if let Expression::Func(f) = graph.expression_mut(func)? {
            f.args.push(column);
        }
        aggregate_exprs.push(ColumnExpression::new(out_name.clone(), func));
        consumed.push(tuple);
    }

    let graph = &mut state.graph;
    let id = graph.create_operator(
        location,
        vec![df.op],
        Operator::BlockingAgg(BlockingAggOp {
            groups: vec![],
            aggregate_exprs,
            partial_agg: true,
            finalize_results: true,
        }),
    )?;
    for tuple in consumed {
        graph.delete_node_and_children(tuple)?;
    }
    Ok(QlObject::dataframe(id))
}

fn drop_columns(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let columns_arg = args.get("columns")?;
    let list = match columns_arg.node() {
        Some(id) if graph.node_type(id)? == NodeType::List => id,
        _ => {
            return Err(PqlError::argument(
                location,
                format!(
                    "Expected 'drop' kwarg argument 'columns' to be a list, not {}",
                    columns_arg.type_name(graph)
                ),
            ));
        }
    };
    let columns = pattern::strings_from_collection(graph, list)?;
    let id = graph.create_operator(location, vec![df.op], Operator::Drop(DropOp { columns }))?;
    graph.delete_node_and_children(list)?;
    Ok(QlObject::dataframe(id))
}

fn head(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let n = expect_node(graph, location, args.get("n")?, "n", &Pattern::Int)?;
    let value = graph.expression(n)?.as_int().unwrap_or_default();
    let id = graph.create_operator(
        location,
        vec![df.op],
        Operator::Limit(LimitOp {
            limit: value,
            abortable_srcs: vec![],
        }),
    )?;
    graph.delete_node(n)?;
    Ok(QlObject::dataframe(id))
}

/// `df[key]`: a string reads a column, a list of strings projects, any other
/// expression filters.
fn subscript(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let key_arg = args.get("key")?;
    let key = match key_arg {
        QlObject::Expr(e) => e.node,
        other => {
            return Err(PqlError::argument(
                location,
                format!(
                    "subscript argument must have an expression. '{}' not allowed",
                    other.type_name(graph)
                ),
            ));
        }
    };

    match graph.expression(key)?.clone() {
        Expression::String(name) => {
            let key_location = graph.location(key)?;
            let column = graph.create_column(key_location, name, 0)?;
            graph.delete_node(key)?;
            Ok(QlObject::expr(column))
        }
        Expression::List(items) => {
            if !list_of(Pattern::String).matches(graph, key) {
                pattern::strings_from_collection(graph, key)?;
            }
            let mut col_exprs = Vec::with_capacity(items.len());
            for item in items {
                let name = pattern::string_value(graph, item)?;
                let item_location = graph.location(item)?;
                let column = graph.create_column(item_location, name.clone(), 0)?;
                col_exprs.push(ColumnExpression::new(name, column));
            }
            let id = graph.create_operator(
                location,
                vec![df.op],
                Operator::Map(MapOp {
                    col_exprs,
                    keep_input_columns: false,
                }),
            )?;
            graph.delete_node_and_children(key)?;
            Ok(QlObject::dataframe(id))
        }
        _ => {
            let id = graph.create_operator(
                location,
                vec![df.op],
                Operator::Filter(FilterOp { predicate: key }),
            )?;
            Ok(QlObject::dataframe(id))
        }
    }
}

fn group_by(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let by = args.get("by")?;
    let graph = &state.graph;
    let Some(id) = by
        .node()
        .filter(|&id| Pattern::String.matches(graph, id) || list_of(Pattern::String).matches(graph, id))
    else {
        let at = by.node().and_then(|id| graph.location(id).ok()).unwrap_or(location);
        return Err(PqlError::argument(
            at,
            format!("'by' expected string or list of strings, got {}", by.type_name(graph)),
        ));
    };
    let (_, names) = key_names(graph, location, by, "by")?;
    let groups = create_columns(state, &names, 0)?;
    let graph = &mut state.graph;
    let group_by = graph.create_operator(location, vec![df.op], Operator::GroupBy(GroupByOp { groups }))?;
    graph.delete_node_and_children(id)?;
    Ok(QlObject::dataframe(group_by))
}

fn range(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let start = expect_node(graph, location, args.get("start")?, "start", &Pattern::Expression)?;
    let stop = expect_node(graph, location, args.get("stop")?, "stop", &Pattern::Expression)?;
    let id = graph.create_operator(location, vec![df.op], Operator::Range(RangeOp { start, stop }))?;
    Ok(QlObject::dataframe(id))
}

fn append(
    state: &mut CompilerState,
    df: &Dataframe,
    location: SourceLocation,
    args: &ParsedArgs,
) -> Result<QlObject> {
    let graph = &mut state.graph;
    let other = expect_node(graph, location, args.get("other")?, "other", &Pattern::Operator)?;
    let id = graph.create_operator(location, vec![df.op, other], Operator::Union)?;
    Ok(QlObject::dataframe(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MemorySourceOp, Relation};
    use crate::objects::CallArgs;
    use crate::registry::StaticRegistry;
    use pql_common::{CompilerConfig, DataType};

    fn setup() -> (CompilerState, Dataframe) {
        let registry = StaticRegistry::new().with_table(
            "t",
            Relation::new()
                .with_column("a", DataType::Int64)
                .with_column("b", DataType::String),
        );
        let mut state = CompilerState::with_static_registry(registry, CompilerConfig::default());
        let src = state
            .graph
            .create_operator(
                SourceLocation::new(1, 1),
                vec![],
                Operator::MemorySource(MemorySourceOp::new("t")),
            )
            .expect("source");
        (state, Dataframe::new(src))
    }

    #[test]
    fn dataframe_attribute_reads_a_column() {
        let (mut state, df) = setup();
        let at = SourceLocation::new(2, 1);
        let attr = QlObject::Dataframe(df)
            .get_attribute(&mut state, at, "a")
            .expect("column attribute");
        let node = attr.node().expect("column");
        assert_eq!(state.graph.node_type(node).expect("type"), NodeType::Column);

        let err = QlObject::None
            .get_attribute(&mut state, at, "a")
            .expect_err("None has no attributes");
        assert_eq!(err.message(), "'None' object has no attribute 'a'");
    }

    #[test]
    fn string_subscript_reads_a_column() {
        let (mut state, df) = setup();
        let at = SourceLocation::new(2, 4);
        let key = state.graph.create_string(at, "b").expect("key");
        let out = QlObject::Dataframe(df)
            .subscript(&mut state, at, QlObject::expr(key))
            .expect("subscript");
        let column = out.node().expect("column node");
        assert!(!state.graph.contains(key));
        assert_eq!(
            state.graph.expression(column).expect("expr").as_column().map(|c| c.name.as_str()),
            Some("b")
        );
    }

    #[test]
    fn head_defaults_to_five_rows() {
        let (mut state, df) = setup();
        let at = SourceLocation::new(3, 1);
        let head = QlObject::Dataframe(df)
            .get_attribute(&mut state, at, "head")
            .expect("method");
        let out = head.call(&mut state, at, CallArgs::new()).expect("head");
        let op = state.graph.operator(out.node().expect("op")).expect("limit");
        assert!(matches!(op.op, Operator::Limit(LimitOp { limit: 5, .. })));
        assert_eq!(state.graph.len(), 2);
    }
}

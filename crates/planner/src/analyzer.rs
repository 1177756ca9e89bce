//! Resolution passes run over a finished IR graph before lowering.
//!
//! The analyzer rewrites script-level operators the runtime has no payload
//! for (right joins, GroupBy, Range, Drop), then walks the operators in
//! dependency order inferring each output [`Relation`] and recording the
//! resolved argument/return types on every function expression.

use std::collections::BTreeMap;

use pql_common::{DataType, NodeId, PqlError, Result, SemanticType};
use tracing::debug;

use crate::ir::{
    ColumnExpression, Expression, GrpcSinkDestination, IrGraph, JoinType, MapOp, Operator,
    Relation, RelationColumn, RelationMap,
};
use crate::registry::{FunctionRegistry, SchemaProvider};
use crate::state::CompilerState;

/// Pre-lowering resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the graph in place and return every operator's output relation.
    ///
    /// Guarantees on success:
    /// - no Join is `RightOuter`;
    /// - no GroupBy with consumers, Range or Drop operator remains;
    /// - every MemorySource has `column_idxs` set;
    /// - every Func expression under an operator carries its argument and
    ///   return types;
    /// - every export sink's expected columns exist on its input with an
    ///   accepted type.
    ///
    /// Error taxonomy:
    /// - `Semantic`: unknown tables, columns or functions and type mismatches
    /// - `Unsupported`: a Range the runtime cannot express
    /// - `Lowering`: a GRPCSource nothing feeds
    pub fn analyze(&self, state: &mut CompilerState) -> Result<RelationMap> {
        let (graph, registry, schemas) = state.split_mut();
        self.normalize_right_joins(graph)?;
        self.merge_group_bys(graph)?;
        self.fold_ranges(graph)?;
        let relations = self.resolve_relations(graph, registry, schemas)?;
        self.check_expected_columns(graph, &relations)?;
        Ok(relations)
    }

    /// Swap parents, keys and suffixes of right joins so they run as left joins.
    fn normalize_right_joins(&self, graph: &mut IrGraph) -> Result<()> {
        for id in graph.operator_ids() {
            let mut join = match &graph.operator(id)?.op {
                Operator::Join(join) if join.join_type == JoinType::RightOuter => join.clone(),
                _ => continue,
            };
            let parents = graph.parents(id)?.to_vec();
            std::mem::swap(&mut join.left_on, &mut join.right_on);
            join.suffixes.reverse();
            join.join_type = JoinType::LeftOuter;
            for (parent_idx, keys) in [(0, &join.left_on), (1, &join.right_on)] {
                for &key in keys {
                    if let Expression::Column(column) = graph.expression_mut(key)? {
                        column.parent_op_idx = parent_idx;
                    }
                }
            }
            graph.set_parents(id, parents.into_iter().rev().collect())?;
            graph.operator_mut(id)?.op = Operator::Join(join);
            debug!(node_id = %id, "rewrote right join as left join");
        }
        Ok(())
    }

    /// Fold each GroupBy into the aggregates that consume it.
    fn merge_group_bys(&self, graph: &mut IrGraph) -> Result<()> {
        for id in graph.operator_ids() {
            let groups = match &graph.operator(id)?.op {
                Operator::GroupBy(group_by) => group_by.groups.clone(),
                _ => continue,
            };
            let children = graph.children(id);
            if children.is_empty() {
                continue;
            }
            for &child in &children {
                if !matches!(graph.operator(child)?.op, Operator::BlockingAgg(_)) {
                    return Err(PqlError::semantic(
                        graph.location(child)?,
                        format!(
                            "groupby must be followed by agg, found {}",
                            graph.node_type(child)?
                        ),
                    ));
                }
            }
            let parent = single_parent(graph, id)?;
            for child in children {
                let location = graph.location(child)?;
                let mut copies = Vec::with_capacity(groups.len());
                for &group in &groups {
                    let name = column_name(graph, group)?;
                    copies.push(graph.create_column(location, name, 0)?);
                }
                if let Operator::BlockingAgg(agg) = &mut graph.operator_mut(child)?.op {
                    agg.groups.extend(copies);
                }
                graph.replace_parent(child, id, parent)?;
            }
            graph.delete_node_and_children(id)?;
            debug!(node_id = %id, "merged groupby into aggregate");
        }
        Ok(())
    }

    /// Turn `Range` over a table scan into the scan's time window.
    fn fold_ranges(&self, graph: &mut IrGraph) -> Result<()> {
        for id in graph.operator_ids() {
            let (start, stop) = match &graph.operator(id)?.op {
                Operator::Range(range) => (range.start, range.stop),
                _ => continue,
            };
            let source = single_parent(graph, id)?;
            if !matches!(graph.operator(source)?.op, Operator::MemorySource(_)) {
                return Err(PqlError::Unsupported(format!(
                    "range {id} is over a {} node; only table scans can be ranged",
                    graph.node_type(source)?
                )));
            }
            if graph.children(source) != [id] {
                return Err(PqlError::Unsupported(format!(
                    "range {id} is over table scan {source}, which feeds other operators"
                )));
            }
            let start = time_literal(graph, start, "start")?;
            let stop = time_literal(graph, stop, "stop")?;
            if let Operator::MemorySource(scan) = &mut graph.operator_mut(source)?.op {
                scan.start_time = Some(start);
                scan.stop_time = Some(stop);
            }
            for child in graph.children(id) {
                graph.replace_parent(child, id, source)?;
            }
            graph.delete_node_and_children(id)?;
            debug!(node_id = %id, source = %source, start, stop, "folded range into table scan");
        }
        Ok(())
    }

    fn resolve_relations(
        &self,
        graph: &mut IrGraph,
        registry: &dyn FunctionRegistry,
        schemas: &dyn SchemaProvider,
    ) -> Result<RelationMap> {
        let channels = channel_edges(graph)?;
        let mut feeders: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for &(sink, source) in &channels {
            feeders.entry(source).or_insert(sink);
        }
        let mut relations = RelationMap::new();
        for id in graph.topological_order(&channels)? {
            let relation = match feeders.get(&id) {
                Some(&sink) => relations.get(sink)?.clone(),
                None => self.resolve_operator(graph, registry, schemas, &relations, id)?,
            };
            debug!(node_id = %id, columns = relation.len(), "resolved relation");
            relations.insert(id, relation);
        }
        Ok(relations)
    }

    fn resolve_operator(
        &self,
        graph: &mut IrGraph,
        registry: &dyn FunctionRegistry,
        schemas: &dyn SchemaProvider,
        relations: &RelationMap,
        id: NodeId,
    ) -> Result<Relation> {
        let op = graph.operator(id)?.op.clone();
        let location = graph.location(id)?;
        let inputs = graph
            .parents(id)?
            .iter()
            .map(|&parent| relations.get(parent))
            .collect::<Result<Vec<&Relation>>>()?;

        match op {
            Operator::MemorySource(scan) => {
                let table = schemas.table_relation(&scan.table).ok_or_else(|| {
                    PqlError::semantic(location, format!("Table '{}' not found.", scan.table))
                })?;
                let (relation, idxs) = match &scan.select {
                    Some(names) => table.select(names).map_err(|missing| {
                        PqlError::semantic(
                            location,
                            format!("Column '{missing}' not found in table '{}'.", scan.table),
                        )
                    })?,
                    None => {
                        let idxs = (0..table.len()).collect();
                        (table, idxs)
                    }
                };
                if let Operator::MemorySource(scan) = &mut graph.operator_mut(id)?.op {
                    scan.column_idxs = idxs;
                }
                Ok(relation)
            }
            Operator::UdtfSource(udtf) => Ok(udtf.relation),
            Operator::GrpcSource(source) => Err(PqlError::Lowering(format!(
                "GRPCSource {id} on channel {} has no matching GRPCSink",
                source.channel
            ))),
            Operator::Map(map) => {
                let mut types = Vec::with_capacity(map.col_exprs.len());
                for column in &map.col_exprs {
                    types.push(resolve_expression(graph, registry, column.expr, &inputs)?);
                }
                Ok(map_relation(inputs[0], &map, &types))
            }
            Operator::Drop(drop) => {
                let input = inputs[0];
                for name in &drop.columns {
                    if !input.has_column(name) {
                        return Err(PqlError::semantic(
                            location,
                            format!("Column '{name}' not found in parent dataframe"),
                        ));
                    }
                }
                let mut relation = Relation::new();
                let mut col_exprs = Vec::new();
                for column in input.columns() {
                    if drop.columns.contains(&column.name) {
                        continue;
                    }
                    let expr = graph.create_column(location, column.name.clone(), 0)?;
                    col_exprs.push(ColumnExpression::new(column.name.clone(), expr));
                    relation.push(column.clone());
                }
                graph.operator_mut(id)?.op = Operator::Map(MapOp {
                    col_exprs,
                    keep_input_columns: false,
                });
                debug!(node_id = %id, dropped = ?drop.columns, "rewrote drop as map");
                Ok(relation)
            }
            Operator::Filter(filter) => {
                let data_type = resolve_expression(graph, registry, filter.predicate, &inputs)?;
                if data_type != DataType::Boolean {
                    return Err(PqlError::semantic(
                        graph.location(filter.predicate)?,
                        format!(
                            "Expected filter expression to evaluate to BOOLEAN, received {data_type}"
                        ),
                    ));
                }
                Ok(inputs[0].clone())
            }
            Operator::Limit(_) => Ok(inputs[0].clone()),
            Operator::BlockingAgg(agg) => {
                let mut relation = Relation::new();
                for &group in &agg.groups {
                    relation.push(lookup_column(graph, &inputs, group)?);
                }
                for value in &agg.aggregate_exprs {
                    let data_type = resolve_aggregate(graph, registry, value.expr, &inputs)?;
                    relation.add_column(value.name.clone(), data_type, SemanticType::StNone);
                }
                Ok(relation)
            }
            Operator::GroupBy(_) => Ok(inputs[0].clone()),
            Operator::Range(_) => Err(PqlError::Unsupported(format!(
                "range {id} was not folded into a table scan"
            ))),
            Operator::Union => {
                let output = inputs[0];
                for (idx, parent) in inputs.iter().enumerate().skip(1) {
                    union_mapping(output, parent).map_err(|msg| {
                        PqlError::semantic(location, format!("Union parent {idx} {msg}"))
                    })?;
                }
                Ok(output.clone())
            }
            Operator::Join(join) => {
                let (left, right) = (inputs[0], inputs[1]);
                for (&l, &r) in join.left_on.iter().zip(&join.right_on) {
                    let left_col = lookup_column(graph, &inputs, l)?;
                    let right_col = lookup_column(graph, &inputs, r)?;
                    if left_col.data_type != right_col.data_type {
                        return Err(PqlError::semantic(
                            location,
                            format!(
                                "Join key '{}' ({}) cannot be compared with '{}' ({})",
                                left_col.name,
                                left_col.data_type,
                                right_col.name,
                                right_col.data_type
                            ),
                        ));
                    }
                }
                let mut relation = Relation::new();
                for out in join_output_columns(left, right, &join.suffixes) {
                    let source = if out.parent_index == 0 { left } else { right };
                    if let Some(column) = source.column(out.column_index) {
                        relation.push(RelationColumn {
                            name: out.name,
                            ..column.clone()
                        });
                    }
                }
                Ok(relation)
            }
            Operator::MemorySink(_) | Operator::GrpcSink(_) | Operator::OTelExportSink(_) => {
                Ok(inputs[0].clone())
            }
        }
    }

    fn check_expected_columns(&self, graph: &IrGraph, relations: &RelationMap) -> Result<()> {
        for id in graph.operator_ids() {
            let Operator::OTelExportSink(sink) = &graph.operator(id)?.op else {
                continue;
            };
            let input = relations.get(single_parent(graph, id)?)?;
            for expected in &sink.expected_columns {
                let location = graph.location(expected.node)?;
                let Some(column) = input.column_by_name(&expected.column_name) else {
                    return Err(PqlError::semantic(
                        location,
                        format!(
                            "Column '{}' not found in parent dataframe for '{}'",
                            expected.column_name, expected.role
                        ),
                    ));
                };
                if !expected.accepted_types.contains(&column.data_type) {
                    let accepted: Vec<&str> =
                        expected.accepted_types.iter().map(DataType::name).collect();
                    return Err(PqlError::semantic(
                        location,
                        format!(
                            "Expected '{}' column '{}' to be one of [{}], received {}",
                            expected.role,
                            expected.column_name,
                            accepted.join(", "),
                            column.data_type
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// `(GRPCSink, GRPCSource)` pairs sharing a channel.
pub fn channel_edges(graph: &IrGraph) -> Result<Vec<(NodeId, NodeId)>> {
    let mut sources = BTreeMap::new();
    let mut sinks = Vec::new();
    for id in graph.operator_ids() {
        match &graph.operator(id)?.op {
            Operator::GrpcSource(source) => {
                sources.insert(source.channel, id);
            }
            Operator::GrpcSink(sink) => {
                if let GrpcSinkDestination::Channel(channel) = sink.destination {
                    sinks.push((id, channel));
                }
            }
            _ => {}
        }
    }
    Ok(sinks
        .into_iter()
        .filter_map(|(sink, channel)| sources.get(&channel).map(|&source| (sink, source)))
        .collect())
}

/// Where one output column of a Map comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSource {
    /// Passed through from this input column offset.
    Input(usize),
    /// Computed by this entry of `col_exprs`.
    Expression(usize),
}

/// Output layout of `map` over `input`, in output order.
///
/// With `keep_input_columns` the input columns come first; an expression
/// named like an input column replaces it in place, the rest are appended.
pub fn map_output_layout(input: &Relation, map: &MapOp) -> Vec<(String, MapSource)> {
    let mut layout: Vec<(String, MapSource)> = if map.keep_input_columns {
        input
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name.clone(), MapSource::Input(idx)))
            .collect()
    } else {
        Vec::new()
    };
    for (idx, column) in map.col_exprs.iter().enumerate() {
        let replaced = layout
            .iter_mut()
            .find(|(name, source)| matches!(source, MapSource::Input(_)) && *name == column.name);
        match replaced {
            Some(entry) => entry.1 = MapSource::Expression(idx),
            None => layout.push((column.name.clone(), MapSource::Expression(idx))),
        }
    }
    layout
}

fn map_relation(input: &Relation, map: &MapOp, types: &[DataType]) -> Relation {
    let mut relation = Relation::new();
    for (name, source) in map_output_layout(input, map) {
        match source {
            MapSource::Input(idx) => {
                if let Some(column) = input.column(idx) {
                    relation.push(column.clone());
                }
            }
            MapSource::Expression(idx) => {
                let data_type = types.get(idx).copied().unwrap_or(DataType::Unknown);
                relation.add_column(name, data_type, SemanticType::StNone);
            }
        }
    }
    relation
}

/// Output column of a join: the parent it comes from and its final name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutputColumn {
    pub parent_index: usize,
    pub column_index: usize,
    pub name: String,
}

/// Left columns then right columns. Names present on both sides get the
/// left or right suffix.
pub fn join_output_columns(
    left: &Relation,
    right: &Relation,
    suffixes: &[String],
) -> Vec<JoinOutputColumn> {
    let suffix = |idx: usize| suffixes.get(idx).map(String::as_str).unwrap_or_default();
    let mut out = Vec::with_capacity(left.len() + right.len());
    for (parent_index, this, other) in [(0, left, right), (1, right, left)] {
        for (column_index, column) in this.columns().iter().enumerate() {
            let name = if other.has_column(&column.name) {
                format!("{}{}", column.name, suffix(parent_index))
            } else {
                column.name.clone()
            };
            out.push(JoinOutputColumn {
                parent_index,
                column_index,
                name,
            });
        }
    }
    out
}

/// Offsets in `parent` of each column of the union `output`, matched by name.
pub fn union_mapping(output: &Relation, parent: &Relation) -> std::result::Result<Vec<usize>, String> {
    if output.len() != parent.len() {
        return Err(format!(
            "has {} columns, expected {}",
            parent.len(),
            output.len()
        ));
    }
    let mut mapping = Vec::with_capacity(output.len());
    for column in output.columns() {
        let idx = parent
            .column_index(&column.name)
            .ok_or_else(|| format!("is missing column '{}'", column.name))?;
        let found = parent.columns()[idx].data_type;
        if found != column.data_type {
            return Err(format!(
                "column '{}' is {found}, expected {}",
                column.name, column.data_type
            ));
        }
        mapping.push(idx);
    }
    Ok(mapping)
}

fn single_parent(graph: &IrGraph, id: NodeId) -> Result<NodeId> {
    match graph.parents(id)? {
        [parent] => Ok(*parent),
        parents => Err(PqlError::Graph(format!(
            "{} node {id} has {} parents, expected 1",
            graph.node_type(id)?,
            parents.len()
        ))),
    }
}

fn column_name(graph: &IrGraph, id: NodeId) -> Result<String> {
    graph
        .expression(id)?
        .as_column()
        .map(|column| column.name.clone())
        .ok_or_else(|| PqlError::Graph(format!("node {id} is not a column")))
}

fn time_literal(graph: &IrGraph, id: NodeId, arg: &str) -> Result<i64> {
    match graph.expression(id)? {
        Expression::Int(v) | Expression::Time(v) => Ok(*v),
        _ => Err(PqlError::Unsupported(format!(
            "range '{arg}' must be an int or time literal, got {}",
            graph.node_type(id)?
        ))),
    }
}

/// Input column a Column expression names.
fn lookup_column(graph: &IrGraph, inputs: &[&Relation], id: NodeId) -> Result<RelationColumn> {
    let column = graph
        .expression(id)?
        .as_column()
        .ok_or_else(|| PqlError::Graph(format!("node {id} is not a column")))?;
    let relation = inputs.get(column.parent_op_idx).ok_or_else(|| {
        PqlError::Graph(format!(
            "column {id} refers to parent {} of an operator with {} parents",
            column.parent_op_idx,
            inputs.len()
        ))
    })?;
    match relation.column_by_name(&column.name) {
        Some(found) => Ok(found.clone()),
        None => Err(PqlError::semantic(
            graph.location(id)?,
            format!("Column '{}' not found in parent dataframe", column.name),
        )),
    }
}

fn type_list(types: &[DataType]) -> String {
    types.iter().map(DataType::name).collect::<Vec<_>>().join(", ")
}

fn record_types(graph: &mut IrGraph, id: NodeId, arg_types: Vec<DataType>, ret: DataType) -> Result<()> {
    if let Expression::Func(func) = graph.expression_mut(id)? {
        func.arg_types = arg_types;
        func.return_type = Some(ret);
    }
    Ok(())
}

/// Data type of a scalar expression, recording resolved function types.
fn resolve_expression(
    graph: &mut IrGraph,
    registry: &dyn FunctionRegistry,
    id: NodeId,
    inputs: &[&Relation],
) -> Result<DataType> {
    match graph.expression(id)?.clone() {
        Expression::Column(_) => Ok(lookup_column(graph, inputs, id)?.data_type),
        Expression::Func(func) => {
            let mut arg_types = Vec::with_capacity(func.args.len());
            for &arg in &func.args {
                arg_types.push(resolve_expression(graph, registry, arg, inputs)?);
            }
            let name = func.op.registry_name();
            let Some(ret) = registry.udf_return_type(name, &arg_types) else {
                let message = if registry.is_uda(name) && !registry.is_udf(name) {
                    format!("'{name}' is an aggregate function and can only be used in agg()")
                } else {
                    format!(
                        "Could not find function '{name}' for argument types ({})",
                        type_list(&arg_types)
                    )
                };
                return Err(PqlError::semantic(graph.location(id)?, message));
            };
            record_types(graph, id, arg_types, ret)?;
            Ok(ret)
        }
        Expression::List(_) | Expression::Tuple(_) => Err(PqlError::semantic(
            graph.location(id)?,
            format!("{} cannot be used as a column expression", graph.node_type(id)?),
        )),
        literal => literal
            .literal()
            .map(|value| value.data_type())
            .ok_or_else(|| PqlError::Graph(format!("node {id} has no data type"))),
    }
}

fn resolve_aggregate(
    graph: &mut IrGraph,
    registry: &dyn FunctionRegistry,
    id: NodeId,
    inputs: &[&Relation],
) -> Result<DataType> {
    let Some(func) = graph.expression(id)?.as_func().cloned() else {
        return Err(PqlError::semantic(
            graph.location(id)?,
            format!(
                "Expected aggregate expression to be a function call, received {}",
                graph.node_type(id)?
            ),
        ));
    };
    let mut arg_types = Vec::with_capacity(func.args.len());
    for &arg in &func.args {
        arg_types.push(resolve_expression(graph, registry, arg, inputs)?);
    }
    let name = func.op.registry_name();
    let location = graph.location(id)?;
    let ret = registry.uda_return_type(name, &arg_types).ok_or_else(|| {
        PqlError::semantic(
            location,
            format!(
                "Could not find aggregate function '{name}' for argument types ({})",
                type_list(&arg_types)
            ),
        )
    })?;
    record_types(graph, id, arg_types, ret)?;
    Ok(ret)
}

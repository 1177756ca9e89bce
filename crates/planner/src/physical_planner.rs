use pql_common::{CompilerConfig, NodeId, PqlError, Result};

use crate::analyzer::{join_output_columns, map_output_layout, union_mapping, MapSource};
use crate::ir::{
    Expression, GrpcSinkDestination, IrGraph, JoinType, Operator, Relation, RelationMap,
};
use crate::planpb::{
    self, aggregate_expression, grpc_sink_operator, join_operator, operator::Op,
    scalar_expression, union_operator, OperatorType,
};

/// Lowers analyzed IR operators to wire operators.
///
/// Contracts:
/// - Column expressions resolve to `(parent node id, column offset)` using the
///   analyzer's relations;
/// - operators the analyzer rewrites away (Drop, GroupBy, Range, right joins)
///   are lowering errors if they are still present;
/// - a table scan with an empty time window lowers to an empty source with
///   the same columns.
#[derive(Debug, Clone, Copy)]
pub struct OperatorSerializer<'a> {
    graph: &'a IrGraph,
    relations: &'a RelationMap,
    config: &'a CompilerConfig,
}

impl<'a> OperatorSerializer<'a> {
    pub fn new(graph: &'a IrGraph, relations: &'a RelationMap, config: &'a CompilerConfig) -> Self {
        Self {
            graph,
            relations,
            config,
        }
    }

    pub fn serialize(&self, id: NodeId) -> Result<planpb::Operator> {
        let node = self.graph.operator(id)?;
        let parents = node.parents.as_slice();
        let relation = self.relations.get(id)?;

        let operator = match &node.op {
            Operator::MemorySource(scan) if scan.has_empty_window() => planpb::Operator::new(
                OperatorType::EmptySource,
                Op::EmptySourceOp(planpb::EmptySourceOperator {
                    column_names: relation.names(),
                    column_types: data_types(relation),
                }),
            ),
            Operator::MemorySource(scan) => planpb::Operator::new(
                OperatorType::MemorySource,
                Op::MemSourceOp(planpb::MemorySourceOperator {
                    name: scan.table.clone(),
                    column_idxs: scan.column_idxs.iter().map(|&i| i as i64).collect(),
                    column_types: data_types(relation),
                    column_names: relation.names(),
                    start_time: scan.start_time,
                    stop_time: scan.stop_time,
                    streaming: scan.streaming,
                }),
            ),
            Operator::Map(map) => {
                let parent = first_parent(id, parents)?;
                let input = self.relations.get(parent)?;
                let mut expressions = Vec::with_capacity(relation.len());
                let mut column_names = Vec::with_capacity(relation.len());
                for (name, source) in map_output_layout(input, map) {
                    let expression = match source {
                        MapSource::Input(index) => column_expression(parent, index),
                        MapSource::Expression(idx) => {
                            self.scalar_expression(map.col_exprs[idx].expr, parents)?
                        }
                    };
                    expressions.push(expression);
                    column_names.push(name);
                }
                planpb::Operator::new(
                    OperatorType::Map,
                    Op::MapOp(planpb::MapOperator {
                        expressions,
                        column_names,
                    }),
                )
            }
            Operator::BlockingAgg(agg) => {
                let mut groups = Vec::with_capacity(agg.groups.len());
                let mut group_names = Vec::with_capacity(agg.groups.len());
                for &group in &agg.groups {
                    let (column, name) = self.column(group, parents)?;
                    groups.push(column);
                    group_names.push(name);
                }
                let mut values = Vec::with_capacity(agg.aggregate_exprs.len());
                for value in &agg.aggregate_exprs {
                    values.push(self.aggregate_expression(value.expr, parents)?);
                }
                planpb::Operator::new(
                    OperatorType::Aggregate,
                    Op::AggOp(planpb::AggregateOperator {
                        windowed: false,
                        values,
                        groups,
                        group_names,
                        value_names: agg.aggregate_exprs.iter().map(|v| v.name.clone()).collect(),
                        partial_agg: agg.partial_agg,
                        finalize_results: agg.finalize_results,
                    }),
                )
            }
            Operator::Filter(filter) => planpb::Operator::new(
                OperatorType::Filter,
                Op::FilterOp(planpb::FilterOperator {
                    expression: Some(self.scalar_expression(filter.predicate, parents)?),
                    columns: self.passthrough_columns(id, parents)?,
                }),
            ),
            Operator::Limit(limit) => planpb::Operator::new(
                OperatorType::Limit,
                Op::LimitOp(planpb::LimitOperator {
                    limit: limit.limit,
                    columns: self.passthrough_columns(id, parents)?,
                    abortable_srcs: limit.abortable_srcs.iter().map(|n| n.0).collect(),
                }),
            ),
            Operator::Union => {
                let mut column_mappings = Vec::with_capacity(parents.len());
                for &parent in parents {
                    let mapping =
                        union_mapping(relation, self.relations.get(parent)?).map_err(|msg| {
                            PqlError::Lowering(format!("union {id} parent {parent} {msg}"))
                        })?;
                    column_mappings.push(union_operator::ColumnMapping {
                        column_indexes: mapping.into_iter().map(|i| i as u64).collect(),
                    });
                }
                planpb::Operator::new(
                    OperatorType::Union,
                    Op::UnionOp(planpb::UnionOperator {
                        column_names: relation.names(),
                        column_mappings,
                    }),
                )
            }
            Operator::Join(join) => {
                let join_type = match join.join_type {
                    JoinType::Inner => planpb::JoinType::Inner,
                    JoinType::LeftOuter => planpb::JoinType::LeftOuter,
                    JoinType::FullOuter => planpb::JoinType::FullOuter,
                    JoinType::RightOuter => {
                        return Err(PqlError::Lowering(format!(
                            "join {id} is still a right join; run the analyzer before lowering"
                        )));
                    }
                };
                let mut equality_conditions = Vec::with_capacity(join.left_on.len());
                for (&left, &right) in join.left_on.iter().zip(&join.right_on) {
                    equality_conditions.push(join_operator::EqualityCondition {
                        left_column_index: self.column(left, parents)?.0.index,
                        right_column_index: self.column(right, parents)?.0.index,
                    });
                }
                let [left, right] = parents else {
                    return Err(PqlError::Lowering(format!(
                        "join {id} has {} parents",
                        parents.len()
                    )));
                };
                let outputs = join_output_columns(
                    self.relations.get(*left)?,
                    self.relations.get(*right)?,
                    &join.suffixes,
                );
                planpb::Operator::new(
                    OperatorType::Join,
                    Op::JoinOp(planpb::JoinOperator {
                        join_type: join_type.into(),
                        equality_conditions,
                        output_columns: outputs
                            .iter()
                            .map(|c| join_operator::ParentColumn {
                                parent_index: c.parent_index as u64,
                                column_index: c.column_index as u64,
                            })
                            .collect(),
                        column_names: outputs.into_iter().map(|c| c.name).collect(),
                        rows_per_batch: self.config.join_rows_per_batch as u64,
                    }),
                )
            }
            Operator::Drop(_) | Operator::GroupBy(_) | Operator::Range(_) => {
                return Err(PqlError::Lowering(format!(
                    "{} node {id} has no runtime operator; run the analyzer before lowering",
                    node_type(self.graph, id)
                )));
            }
            Operator::UdtfSource(udtf) => {
                let mut arg_values = Vec::with_capacity(udtf.args.len());
                for arg in &udtf.args {
                    let literal = self.graph.expression(arg.value)?.literal().ok_or_else(|| {
                        PqlError::Lowering(format!(
                            "argument '{}' of UDTF '{}' is not a literal",
                            arg.name, udtf.name
                        ))
                    })?;
                    arg_values.push(planpb::ScalarValue::from_literal(&literal, Some(arg.data_type)));
                }
                planpb::Operator::new(
                    OperatorType::UdtfSource,
                    Op::UdtfSourceOp(planpb::UdtfSourceOperator {
                        name: udtf.name.clone(),
                        arg_values,
                    }),
                )
            }
            Operator::MemorySink(sink) => planpb::Operator::new(
                OperatorType::MemorySink,
                Op::MemSinkOp(planpb::MemorySinkOperator {
                    name: sink.name.clone(),
                    column_types: data_types(relation),
                    column_names: relation.names(),
                    column_semantic_types: semantic_types(relation),
                }),
            ),
            Operator::GrpcSource(_) => planpb::Operator::new(
                OperatorType::GrpcSource,
                Op::GrpcSourceOp(planpb::GrpcSourceOperator {
                    column_types: data_types(relation),
                    column_names: relation.names(),
                }),
            ),
            Operator::GrpcSink(sink) => {
                let destination = match &sink.destination {
                    GrpcSinkDestination::Channel(channel) => {
                        grpc_sink_operator::Destination::GrpcSourceId(channel.0)
                    }
                    GrpcSinkDestination::Table(table_name) => {
                        grpc_sink_operator::Destination::OutputTable(
                            grpc_sink_operator::OutputTable {
                                table_name: table_name.clone(),
                                column_types: data_types(relation),
                                column_names: relation.names(),
                                column_semantic_types: semantic_types(relation),
                            },
                        )
                    }
                };
                let address = if sink.address.is_empty() {
                    self.config.grpc_address.clone()
                } else {
                    sink.address.clone()
                };
                planpb::Operator::new(
                    OperatorType::GrpcSink,
                    Op::GrpcSinkOp(planpb::GrpcSinkOperator {
                        address,
                        destination: Some(destination),
                    }),
                )
            }
            Operator::OTelExportSink(sink) => planpb::Operator::new(
                OperatorType::OTelExportSink,
                Op::OtelSinkOp(sink.payload.clone()),
            ),
        };
        Ok(operator)
    }

    /// Wire column and name for a Column expression.
    fn column(&self, id: NodeId, parents: &[NodeId]) -> Result<(planpb::Column, String)> {
        let column = self
            .graph
            .expression(id)?
            .as_column()
            .ok_or_else(|| PqlError::Lowering(format!("node {id} is not a column")))?;
        let parent = *parents.get(column.parent_op_idx).ok_or_else(|| {
            PqlError::Lowering(format!(
                "column '{}' refers to missing parent {}",
                column.name, column.parent_op_idx
            ))
        })?;
        let index = self
            .relations
            .get(parent)?
            .column_index(&column.name)
            .ok_or_else(|| {
                PqlError::Lowering(format!(
                    "column '{}' not found on operator {parent}",
                    column.name
                ))
            })?;
        Ok((
            planpb::Column {
                node: parent.0,
                index: index as u64,
            },
            column.name.clone(),
        ))
    }

    fn passthrough_columns(&self, id: NodeId, parents: &[NodeId]) -> Result<Vec<planpb::Column>> {
        let parent = first_parent(id, parents)?;
        let input = self.relations.get(parent)?;
        Ok((0..input.len())
            .map(|index| planpb::Column {
                node: parent.0,
                index: index as u64,
            })
            .collect())
    }

    fn scalar_expression(&self, id: NodeId, parents: &[NodeId]) -> Result<planpb::ScalarExpression> {
        let value = match self.graph.expression(id)? {
            Expression::Column(_) => scalar_expression::Value::Column(self.column(id, parents)?.0),
            Expression::Func(func) => {
                let mut args = Vec::with_capacity(func.args.len());
                for &arg in &func.args {
                    args.push(self.scalar_expression(arg, parents)?);
                }
                scalar_expression::Value::Func(planpb::ScalarFunc {
                    name: func.op.registry_name().to_string(),
                    args,
                    init_args: self.init_args(&func.init_args)?,
                    args_data_types: func.arg_types.iter().map(|&t| t.into()).collect(),
                })
            }
            Expression::List(_) | Expression::Tuple(_) => {
                return Err(PqlError::Lowering(format!(
                    "{} node {id} cannot be lowered to a scalar expression",
                    node_type(self.graph, id)
                )));
            }
            literal => match literal.literal() {
                Some(value) => scalar_expression::Value::Constant(
                    planpb::ScalarValue::from_literal(&value, None),
                ),
                None => {
                    return Err(PqlError::Lowering(format!("node {id} is not a literal")));
                }
            },
        };
        Ok(planpb::ScalarExpression { value: Some(value) })
    }

    fn aggregate_expression(
        &self,
        id: NodeId,
        parents: &[NodeId],
    ) -> Result<planpb::AggregateExpression> {
        let func = self.graph.expression(id)?.as_func().ok_or_else(|| {
            PqlError::Lowering(format!("aggregate value {id} is not a function call"))
        })?;
        let mut args = Vec::with_capacity(func.args.len());
        for &arg in &func.args {
            let value = match self.graph.expression(arg)? {
                Expression::Column(_) => {
                    aggregate_expression::arg::Value::Column(self.column(arg, parents)?.0)
                }
                other => match other.literal() {
                    Some(value) => aggregate_expression::arg::Value::Constant(
                        planpb::ScalarValue::from_literal(&value, None),
                    ),
                    None => {
                        return Err(PqlError::Lowering(format!(
                            "argument {arg} of aggregate '{}' must be a column or a literal",
                            func.op.registry_name()
                        )));
                    }
                },
            };
            args.push(aggregate_expression::Arg { value: Some(value) });
        }
        Ok(planpb::AggregateExpression {
            name: func.op.registry_name().to_string(),
            args,
            init_args: self.init_args(&func.init_args)?,
            args_data_types: func.arg_types.iter().map(|&t| t.into()).collect(),
        })
    }

    fn init_args(&self, ids: &[NodeId]) -> Result<Vec<planpb::ScalarValue>> {
        ids.iter()
            .map(|&id| {
                self.graph
                    .expression(id)?
                    .literal()
                    .map(|value| planpb::ScalarValue::from_literal(&value, None))
                    .ok_or_else(|| {
                        PqlError::Lowering(format!("init argument {id} is not a literal"))
                    })
            })
            .collect()
    }
}

fn first_parent(id: NodeId, parents: &[NodeId]) -> Result<NodeId> {
    parents
        .first()
        .copied()
        .ok_or_else(|| PqlError::Lowering(format!("operator {id} has no parent")))
}

fn column_expression(node: NodeId, index: usize) -> planpb::ScalarExpression {
    planpb::ScalarExpression {
        value: Some(scalar_expression::Value::Column(planpb::Column {
            node: node.0,
            index: index as u64,
        })),
    }
}

fn node_type(graph: &IrGraph, id: NodeId) -> String {
    graph
        .node_type(id)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn data_types(relation: &Relation) -> Vec<i32> {
    relation.data_types().into_iter().map(i32::from).collect()
}

fn semantic_types(relation: &Relation) -> Vec<i32> {
    relation.semantic_types().into_iter().map(i32::from).collect()
}

use pql_common::{NodeId, Result};

use crate::analyzer::channel_edges;
use crate::ir::{Expression, FuncOp, GrpcSinkDestination, IrGraph, Operator};

/// Render the operator graph as human-readable multiline text, one operator
/// per block in dependency order.
pub fn explain_graph(graph: &IrGraph) -> Result<String> {
    let mut s = String::new();
    for id in graph.topological_order(&channel_edges(graph)?)? {
        fmt_operator(graph, id, &mut s)?;
    }
    Ok(s)
}

fn fmt_operator(graph: &IrGraph, id: NodeId, out: &mut String) -> Result<()> {
    let node = graph.operator(id)?;
    let parents: Vec<String> = node.parents.iter().map(|p| p.to_string()).collect();
    out.push_str(&format!(
        "[{id}] {} parents=[{}]\n",
        graph.node_type(id)?,
        parents.join(", ")
    ));
    let pad = "  ";
    match &node.op {
        Operator::MemorySource(scan) => {
            out.push_str(&format!("{pad}table={}\n", scan.table));
            if let Some(select) = &scan.select {
                out.push_str(&format!("{pad}select={select:?}\n"));
            }
            if scan.start_time.is_some() || scan.stop_time.is_some() {
                out.push_str(&format!(
                    "{pad}window={:?}..{:?}\n",
                    scan.start_time, scan.stop_time
                ));
            }
        }
        Operator::Map(map) => {
            for column in &map.col_exprs {
                out.push_str(&format!(
                    "{pad}{} := {}\n",
                    column.name,
                    fmt_expr(graph, column.expr)?
                ));
            }
            if map.keep_input_columns {
                out.push_str(&format!("{pad}keep_input_columns\n"));
            }
        }
        Operator::BlockingAgg(agg) => {
            let groups = agg
                .groups
                .iter()
                .map(|&g| fmt_expr(graph, g))
                .collect::<Result<Vec<_>>>()?;
            out.push_str(&format!("{pad}by=[{}]\n", groups.join(", ")));
            for value in &agg.aggregate_exprs {
                out.push_str(&format!(
                    "{pad}{} := {}\n",
                    value.name,
                    fmt_expr(graph, value.expr)?
                ));
            }
        }
        Operator::GroupBy(group_by) => {
            let groups = group_by
                .groups
                .iter()
                .map(|&g| fmt_expr(graph, g))
                .collect::<Result<Vec<_>>>()?;
            out.push_str(&format!("{pad}by=[{}]\n", groups.join(", ")));
        }
        Operator::Filter(filter) => {
            out.push_str(&format!("{pad}{}\n", fmt_expr(graph, filter.predicate)?));
        }
        Operator::Limit(limit) => {
            out.push_str(&format!("{pad}n={}\n", limit.limit));
        }
        Operator::Union => {}
        Operator::Join(join) => {
            out.push_str(&format!("{pad}type={}\n", join.join_type.name()));
            for (&l, &r) in join.left_on.iter().zip(&join.right_on) {
                out.push_str(&format!(
                    "{pad}{} = {}\n",
                    fmt_expr(graph, l)?,
                    fmt_expr(graph, r)?
                ));
            }
            out.push_str(&format!("{pad}suffixes={:?}\n", join.suffixes));
        }
        Operator::Drop(drop) => {
            out.push_str(&format!("{pad}columns={:?}\n", drop.columns));
        }
        Operator::Range(range) => {
            out.push_str(&format!(
                "{pad}{}..{}\n",
                fmt_expr(graph, range.start)?,
                fmt_expr(graph, range.stop)?
            ));
        }
        Operator::UdtfSource(udtf) => {
            out.push_str(&format!("{pad}udtf={}\n", udtf.name));
            for arg in &udtf.args {
                out.push_str(&format!("{pad}{}={}\n", arg.name, fmt_expr(graph, arg.value)?));
            }
        }
        Operator::MemorySink(sink) => {
            out.push_str(&format!("{pad}name={}\n", sink.name));
        }
        Operator::GrpcSource(source) => {
            out.push_str(&format!("{pad}channel={}\n", source.channel));
        }
        Operator::GrpcSink(sink) => match &sink.destination {
            GrpcSinkDestination::Channel(channel) => {
                out.push_str(&format!("{pad}channel={channel}\n"));
            }
            GrpcSinkDestination::Table(table) => {
                out.push_str(&format!("{pad}table={table}\n"));
            }
        },
        Operator::OTelExportSink(sink) => {
            out.push_str(&format!(
                "{pad}spans={} metrics={}\n",
                sink.payload.spans.len(),
                sink.payload.metrics.len()
            ));
            for expected in &sink.expected_columns {
                out.push_str(&format!(
                    "{pad}  {} <- {}\n",
                    expected.role, expected.column_name
                ));
            }
        }
    }
    Ok(())
}

fn fmt_expr(graph: &IrGraph, id: NodeId) -> Result<String> {
    let rendered = match graph.expression(id)? {
        Expression::Column(column) if column.parent_op_idx == 0 => format!("col({})", column.name),
        Expression::Column(column) => format!("col({}@{})", column.name, column.parent_op_idx),
        Expression::String(v) => format!("{v:?}"),
        Expression::Int(v) => v.to_string(),
        Expression::Float(v) => v.to_string(),
        Expression::Bool(v) => v.to_string(),
        Expression::Time(v) => format!("time({v})"),
        Expression::Uint128(v) => format!("uint128({v})"),
        Expression::Func(func) => {
            let args = func
                .args
                .iter()
                .map(|&a| fmt_expr(graph, a))
                .collect::<Result<Vec<_>>>()?;
            match (&func.op, args.as_slice()) {
                (FuncOp::Named(name), _) => format!("{name}({})", args.join(", ")),
                (op, [lhs, rhs]) => format!("({lhs} {} {rhs})", op.symbol()),
                (op, [operand]) => format!("{} {operand}", op.symbol()),
                (op, _) => format!("{}({})", op.registry_name(), args.join(", ")),
            }
        }
        Expression::List(items) | Expression::Tuple(items) => {
            let items = items
                .iter()
                .map(|&i| fmt_expr(graph, i))
                .collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FilterOp, MemorySourceOp};
    use pql_common::SourceLocation;

    #[test]
    fn renders_operators_with_infix_predicates() {
        let loc = SourceLocation::new(1, 1);
        let mut graph = IrGraph::new();
        let src = graph
            .create_operator(loc, vec![], Operator::MemorySource(MemorySourceOp::new("http")))
            .expect("src");
        let col = graph.create_column(loc, "latency", 0).expect("col");
        let zero = graph.create_int(loc, 0).expect("int");
        let predicate = graph.create_func(loc, FuncOp::Gt, vec![col, zero]).expect("func");
        graph
            .create_operator(loc, vec![src], Operator::Filter(FilterOp { predicate }))
            .expect("filter");

        let text = explain_graph(&graph).expect("explain");
        assert_eq!(
            text,
            "[1] MemorySource parents=[]\n  table=http\n[5] Filter parents=[1]\n  (col(latency) > 0)\n"
        );
    }
}

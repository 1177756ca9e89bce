//! IR graph store.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Every cross reference is an id;
//! deletion refuses to remove a node another live node still refers to.

pub mod expression;
pub mod node;
pub mod operator;
pub mod pattern;
pub mod relation;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use pql_common::{NodeId, PqlError, Result, SourceLocation};
use tracing::debug;

pub use expression::{ColumnRef, Expression, FuncExpr, FuncOp, LiteralValue};
pub use node::{IrNode, NodeKind, NodeType};
pub use operator::*;
pub use relation::{Relation, RelationColumn, RelationMap};

/// Owner of every node created during one compile.
#[derive(Debug, Clone)]
pub struct IrGraph {
    nodes: BTreeMap<NodeId, IrNode>,
    next_id: u64,
}

impl Default for IrGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl IrGraph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Create a node after checking it is structurally well formed.
    ///
    /// Checks that every referenced id is live and of the right family
    /// (parents are operators, everything else is an expression), that the
    /// operator has an acceptable number of parents, and the join key and
    /// suffix counts.
    pub fn create_node(&mut self, location: SourceLocation, kind: NodeKind) -> Result<NodeId> {
        self.check_new(location, &kind)?;
        let id = NodeId(self.next_id);
        self.next_id += 1;
        debug!(node_id = %id, node_type = %kind.node_type(), %location, "created IR node");
        self.nodes.insert(id, IrNode { id, location, kind });
        Ok(id)
    }

    pub fn create_operator(
        &mut self,
        location: SourceLocation,
        parents: Vec<NodeId>,
        op: Operator,
    ) -> Result<NodeId> {
        self.create_node(location, NodeKind::Operator(OperatorIr::new(parents, op)))
    }

    pub fn create_expression(&mut self, location: SourceLocation, expr: Expression) -> Result<NodeId> {
        self.create_node(location, NodeKind::Expression(expr))
    }

    pub fn create_string(&mut self, location: SourceLocation, value: impl Into<String>) -> Result<NodeId> {
        self.create_expression(location, Expression::String(value.into()))
    }

    pub fn create_int(&mut self, location: SourceLocation, value: i64) -> Result<NodeId> {
        self.create_expression(location, Expression::Int(value))
    }

    pub fn create_float(&mut self, location: SourceLocation, value: f64) -> Result<NodeId> {
        self.create_expression(location, Expression::Float(value))
    }

    pub fn create_bool(&mut self, location: SourceLocation, value: bool) -> Result<NodeId> {
        self.create_expression(location, Expression::Bool(value))
    }

    pub fn create_time(&mut self, location: SourceLocation, nanos: i64) -> Result<NodeId> {
        self.create_expression(location, Expression::Time(nanos))
    }

    pub fn create_uint128(&mut self, location: SourceLocation, value: u128) -> Result<NodeId> {
        self.create_expression(location, Expression::Uint128(value))
    }

    pub fn create_column(
        &mut self,
        location: SourceLocation,
        name: impl Into<String>,
        parent_op_idx: usize,
    ) -> Result<NodeId> {
        self.create_expression(
            location,
            Expression::Column(ColumnRef {
                name: name.into(),
                parent_op_idx,
            }),
        )
    }

    pub fn create_list(&mut self, location: SourceLocation, items: Vec<NodeId>) -> Result<NodeId> {
        self.create_expression(location, Expression::List(items))
    }

    pub fn create_tuple(&mut self, location: SourceLocation, items: Vec<NodeId>) -> Result<NodeId> {
        self.create_expression(location, Expression::Tuple(items))
    }

    pub fn create_func(
        &mut self,
        location: SourceLocation,
        op: FuncOp,
        args: Vec<NodeId>,
    ) -> Result<NodeId> {
        self.create_expression(location, Expression::Func(FuncExpr::new(op, args)))
    }

    pub fn get(&self, id: NodeId) -> Result<&IrNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| PqlError::Graph(format!("node {id} does not exist")))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &IrNode> {
        self.nodes.values()
    }

    pub fn location(&self, id: NodeId) -> Result<SourceLocation> {
        Ok(self.get(id)?.location)
    }

    pub fn node_type(&self, id: NodeId) -> Result<NodeType> {
        Ok(self.get(id)?.node_type())
    }

    pub fn operator(&self, id: NodeId) -> Result<&OperatorIr> {
        let node = self.get(id)?;
        node.as_operator().ok_or_else(|| {
            PqlError::Graph(format!("node {id} is a {}, not an operator", node.node_type()))
        })
    }

    /// Mutable access to an operator payload.
    ///
    /// Callers keep every id they write live and of the right family.
    pub fn operator_mut(&mut self, id: NodeId) -> Result<&mut OperatorIr> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| PqlError::Graph(format!("node {id} does not exist")))?;
        let node_type = node.kind.node_type();
        match &mut node.kind {
            NodeKind::Operator(op) => Ok(op),
            NodeKind::Expression(_) => Err(PqlError::Graph(format!(
                "node {id} is a {node_type}, not an operator"
            ))),
        }
    }

    pub fn expression(&self, id: NodeId) -> Result<&Expression> {
        let node = self.get(id)?;
        node.as_expression().ok_or_else(|| {
            PqlError::Graph(format!("node {id} is a {}, not an expression", node.node_type()))
        })
    }

    /// Mutable access to an expression payload. Same contract as
    /// [`IrGraph::operator_mut`].
    pub fn expression_mut(&mut self, id: NodeId) -> Result<&mut Expression> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| PqlError::Graph(format!("node {id} does not exist")))?;
        let node_type = node.kind.node_type();
        match &mut node.kind {
            NodeKind::Expression(expr) => Ok(expr),
            NodeKind::Operator(_) => Err(PqlError::Graph(format!(
                "node {id} is a {node_type}, not an expression"
            ))),
        }
    }

    pub fn parents(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.operator(id)?.parents)
    }

    /// Operator ids in ascending order.
    pub fn operator_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.is_operator())
            .map(|n| n.id)
            .collect()
    }

    /// Operators that list `id` as a parent, ascending and deduplicated.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.as_operator().is_some_and(|op| op.parents.contains(&id)))
            .map(|n| n.id)
            .collect()
    }

    /// Nodes holding any reference to `id`.
    pub fn referrers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.kind.references().contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Delete one node. Fails while anything still refers to it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        let node_type = self.node_type(id)?;
        let referrers = self.referrers(id);
        if !referrers.is_empty() {
            return Err(PqlError::Graph(format!(
                "cannot delete {node_type} node {id}: still referenced by {referrers:?}"
            )));
        }
        self.nodes.remove(&id);
        debug!(node_id = %id, %node_type, "deleted IR node");
        Ok(())
    }

    /// Delete a node, then every owned expression left unreferenced by it.
    ///
    /// Parents of a deleted operator are never touched. Children still
    /// referenced elsewhere are kept.
    pub fn delete_node_and_children(&mut self, id: NodeId) -> Result<()> {
        let owned = self.get(id)?.kind.owned_refs();
        self.delete_node(id)?;
        let unique: BTreeSet<NodeId> = owned.into_iter().collect();
        for child in unique {
            if self.contains(child) && self.referrers(child).is_empty() {
                self.delete_node_and_children(child)?;
            }
        }
        Ok(())
    }

    /// Replace the parents of `child`.
    pub fn set_parents(&mut self, child: NodeId, parents: Vec<NodeId>) -> Result<()> {
        let arity = self.operator(child)?.op.parent_arity();
        if !arity.accepts(parents.len()) {
            return Err(PqlError::Graph(format!(
                "{} node {child} takes {arity} parents, got {}",
                self.node_type(child)?,
                parents.len()
            )));
        }
        for &parent in &parents {
            self.operator(parent)?;
            if parent == child || self.is_ancestor(child, parent)? {
                return Err(PqlError::Graph(format!(
                    "making {parent} a parent of {child} would create a cycle"
                )));
            }
        }
        self.operator_mut(child)?.parents = parents;
        Ok(())
    }

    /// Swap every occurrence of `old` in `child`'s parents for `new`.
    pub fn replace_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let parents = self.parents(child)?;
        if !parents.contains(&old) {
            return Err(PqlError::Graph(format!("{old} is not a parent of {child}")));
        }
        let parents = parents
            .iter()
            .map(|&p| if p == old { new } else { p })
            .collect();
        self.set_parents(child, parents)
    }

    /// Whether `ancestor` is reachable from `id` by following parents.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> Result<bool> {
        let mut stack = self.parents(id)?.to_vec();
        let mut seen = BTreeSet::new();
        while let Some(next) = stack.pop() {
            if next == ancestor {
                return Ok(true);
            }
            if seen.insert(next) {
                stack.extend_from_slice(self.parents(next)?);
            }
        }
        Ok(false)
    }

    /// Operators in dependency order, ties broken by ascending id.
    ///
    /// `extra_edges` adds `(from, to)` dependencies that are not parent links,
    /// such as a GRPCSink feeding the GRPCSource on the same channel.
    pub fn topological_order(&self, extra_edges: &[(NodeId, NodeId)]) -> Result<Vec<NodeId>> {
        let ids = self.operator_ids();
        let mut indegree: BTreeMap<NodeId, usize> = ids.iter().map(|&id| (id, 0)).collect();
        let mut out_edges: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        let mut add_edge = |from: NodeId, to: NodeId, indegree: &mut BTreeMap<NodeId, usize>| {
            out_edges.entry(from).or_default().push(to);
            *indegree.entry(to).or_default() += 1;
        };
        for &id in &ids {
            for &parent in self.parents(id)? {
                add_edge(parent, id, &mut indegree);
            }
        }
        for &(from, to) in extra_edges {
            add_edge(from, to, &mut indegree);
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> = indegree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(ids.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &next in out_edges.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = indegree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(next));
                    }
                }
            }
        }
        if order.len() != indegree.len() {
            return Err(PqlError::Graph("operator graph contains a cycle".to_string()));
        }
        Ok(order)
    }

    fn check_new(&self, location: SourceLocation, kind: &NodeKind) -> Result<()> {
        match kind {
            NodeKind::Operator(op) => {
                let arity = op.op.parent_arity();
                if !arity.accepts(op.parents.len()) {
                    return Err(PqlError::Graph(format!(
                        "{} takes {arity} parents, got {}",
                        kind.node_type(),
                        op.parents.len()
                    )));
                }
                for &parent in &op.parents {
                    self.operator(parent)?;
                }
                for expr in op.op.expression_refs() {
                    self.expression(expr)?;
                }
                if let Operator::Join(join) = &op.op {
                    if join.left_on.len() != join.right_on.len() {
                        return Err(PqlError::cardinality(
                            location,
                            format!(
                                "'left_on' and 'right_on' must contain the same number of columns. Received {} and {}",
                                join.left_on.len(),
                                join.right_on.len()
                            ),
                        ));
                    }
                    if join.suffixes.len() != 2 {
                        return Err(PqlError::cardinality(
                            location,
                            format!(
                                "'suffixes' must be a tuple with 2 elements. Received {}",
                                join.suffixes.len()
                            ),
                        ));
                    }
                }
            }
            NodeKind::Expression(expr) => {
                for child in expr.children() {
                    self.expression(child)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn source(graph: &mut IrGraph, table: &str) -> NodeId {
        graph
            .create_operator(loc(), vec![], Operator::MemorySource(MemorySourceOp::new(table)))
            .expect("source")
    }

    #[test]
    fn ids_start_at_one_and_are_never_reused() {
        let mut graph = IrGraph::new();
        let a = graph.create_int(loc(), 1).expect("int");
        assert_eq!(a, NodeId(1));
        graph.delete_node(a).expect("delete");
        let b = graph.create_int(loc(), 2).expect("int");
        assert_eq!(b, NodeId(2));
        assert!(!graph.contains(a));
    }

    #[test]
    fn delete_refuses_referenced_node() {
        let mut graph = IrGraph::new();
        let s = graph.create_string(loc(), "a").expect("string");
        let list = graph.create_list(loc(), vec![s]).expect("list");
        let err = graph.delete_node(s).expect_err("still referenced");
        assert!(matches!(err, PqlError::Graph(_)));
        graph.delete_node_and_children(list).expect("cascade");
        assert!(graph.is_empty());
    }

    #[test]
    fn cascade_keeps_shared_children() {
        let mut graph = IrGraph::new();
        let shared = graph.create_string(loc(), "a").expect("string");
        let first = graph.create_list(loc(), vec![shared]).expect("list");
        let second = graph.create_tuple(loc(), vec![shared]).expect("tuple");
        graph.delete_node_and_children(first).expect("cascade");
        assert!(graph.contains(shared));
        assert!(graph.contains(second));
    }

    #[test]
    fn cascade_never_deletes_parent_operators() {
        let mut graph = IrGraph::new();
        let src = source(&mut graph, "t");
        let limit = graph
            .create_operator(
                loc(),
                vec![src],
                Operator::Limit(LimitOp {
                    limit: 3,
                    abortable_srcs: vec![],
                }),
            )
            .expect("limit");
        graph.delete_node_and_children(limit).expect("cascade");
        assert!(graph.contains(src));
    }

    #[test]
    fn rejects_wrong_parent_count_and_family() {
        let mut graph = IrGraph::new();
        let src = source(&mut graph, "t");
        let lit = graph.create_int(loc(), 1).expect("int");
        assert!(graph.create_operator(loc(), vec![src], Operator::Union).is_ok());
        let err = graph.create_operator(loc(), vec![], Operator::Union);
        assert!(matches!(err, Err(PqlError::Graph(_))));
        let err = graph.create_operator(loc(), vec![lit], Operator::Union);
        assert!(matches!(err, Err(PqlError::Graph(_))));
    }

    #[test]
    fn join_key_count_mismatch_is_cardinality_error() {
        let mut graph = IrGraph::new();
        let l = source(&mut graph, "l");
        let r = source(&mut graph, "r");
        let a = graph.create_column(loc(), "a", 0).expect("col");
        let err = graph
            .create_operator(
                loc(),
                vec![l, r],
                Operator::Join(JoinOp {
                    join_type: JoinType::Inner,
                    left_on: vec![a],
                    right_on: vec![],
                    suffixes: vec!["_x".into(), "_y".into()],
                }),
            )
            .expect_err("mismatch");
        assert!(matches!(err, PqlError::Cardinality { .. }));
    }

    #[test]
    fn set_parents_rejects_cycles() {
        let mut graph = IrGraph::new();
        let src = source(&mut graph, "t");
        let sink = graph
            .create_operator(
                loc(),
                vec![src],
                Operator::MemorySink(MemorySinkOp { name: "out".into() }),
            )
            .expect("sink");
        let limit = graph
            .create_operator(
                loc(),
                vec![sink],
                Operator::Limit(LimitOp {
                    limit: 1,
                    abortable_srcs: vec![],
                }),
            )
            .expect("limit");
        assert!(graph.set_parents(sink, vec![limit]).is_err());
        assert_eq!(graph.children(src), vec![sink]);
    }

    #[test]
    fn topological_order_breaks_ties_by_id() {
        let mut graph = IrGraph::new();
        let a = source(&mut graph, "a");
        let b = source(&mut graph, "b");
        let union = graph
            .create_operator(loc(), vec![b, a], Operator::Union)
            .expect("union");
        assert_eq!(graph.topological_order(&[]).expect("order"), vec![a, b, union]);
        assert_eq!(
            graph.topological_order(&[(b, a)]).expect("order"),
            vec![b, a, union]
        );
    }
}

use std::collections::{BTreeMap, BTreeSet};

use pql_common::{FragmentId, NodeId, PqlError, Result, UnusedOperatorPolicy};
use pql_planner::ir::{GrpcSinkDestination, IrGraph, Operator};
use pql_planner::{channel_edges, planpb};
use tracing::{debug, warn};

/// One fragment of the plan: operators connected by parent/child edges,
/// bounded by GRPCSink/GRPCSource pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentNode {
    pub id: FragmentId,
    /// Operator ids in dependency order.
    pub operators: Vec<NodeId>,
    pub parents: Vec<FragmentId>,
    pub children: Vec<FragmentId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentDag {
    pub fragments: Vec<FragmentNode>,
}

impl FragmentDag {
    pub fn new() -> Self {
        Self { fragments: vec![] }
    }

    pub fn fragment_of(&self, op: NodeId) -> Option<FragmentId> {
        self.fragments
            .iter()
            .find(|f| f.operators.contains(&op))
            .map(|f| f.id)
    }

    /// Fragment-level DAG, fragments in dependency order.
    pub fn to_proto(&self) -> Result<planpb::Dag> {
        let edges: Vec<(FragmentId, FragmentId)> = self
            .fragments
            .iter()
            .flat_map(|f| f.children.iter().map(move |&c| (f.id, c)))
            .collect();
        let order = topological(self.fragments.iter().map(|f| f.id).collect(), &edges)
            .ok_or_else(|| PqlError::Lowering("fragment graph contains a cycle".to_string()))?;
        let nodes = order
            .into_iter()
            .map(|id| {
                let fragment = &self.fragments[id.0 as usize];
                planpb::DagNode {
                    id: id.0,
                    sorted_parents: sorted(fragment.parents.iter().map(|p| p.0)),
                    sorted_children: sorted(fragment.children.iter().map(|c| c.0)),
                }
            })
            .collect();
        Ok(planpb::Dag { nodes })
    }
}

/// Every channel GRPCSink must have its GRPCSource somewhere in the graph.
pub fn check_channels(graph: &IrGraph) -> Result<()> {
    let paired: BTreeSet<NodeId> = channel_edges(graph)?.into_iter().map(|(sink, _)| sink).collect();
    for id in graph.operator_ids() {
        if let Operator::GrpcSink(sink) = &graph.operator(id)?.op {
            if let GrpcSinkDestination::Channel(channel) = sink.destination {
                if !paired.contains(&id) {
                    return Err(PqlError::Lowering(format!(
                        "GRPCSink {id} references GRPCSource {channel} which is not present in the plan"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Operators with no path to a sink, in dependency order.
///
/// A GRPCSource is live when its subgraph reaches a sink; the GRPCSinks
/// feeding it are then live too.
pub fn unused_operators(graph: &IrGraph) -> Result<Vec<NodeId>> {
    let mut feeders: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (sink, source) in channel_edges(graph)? {
        feeders.entry(source).or_default().push(sink);
    }

    let mut live = BTreeSet::new();
    let mut stack = Vec::new();
    for id in graph.operator_ids() {
        let op = &graph.operator(id)?.op;
        let channel_sink = matches!(
            op,
            Operator::GrpcSink(sink) if matches!(sink.destination, GrpcSinkDestination::Channel(_))
        );
        if op.is_sink() && !channel_sink {
            stack.push(id);
        }
    }
    while let Some(id) = stack.pop() {
        if !live.insert(id) {
            continue;
        }
        stack.extend_from_slice(graph.parents(id)?);
        if let Some(sinks) = feeders.get(&id) {
            stack.extend_from_slice(sinks);
        }
    }

    Ok(graph
        .topological_order(&channel_edges(graph)?)?
        .into_iter()
        .filter(|id| !live.contains(id))
        .collect())
}

/// Apply the unused operator policy; returns how many operators were removed.
pub fn remove_unused(graph: &mut IrGraph, policy: UnusedOperatorPolicy) -> Result<usize> {
    let unused = unused_operators(graph)?;
    if unused.is_empty() {
        return Ok(0);
    }
    match policy {
        UnusedOperatorPolicy::Reject => {
            let ids: Vec<String> = unused.iter().map(|id| id.to_string()).collect();
            Err(PqlError::Lowering(format!(
                "operators [{}] do not reach any sink",
                ids.join(", ")
            )))
        }
        UnusedOperatorPolicy::Prune => {
            for &id in unused.iter().rev() {
                warn!(node_id = %id, node_type = %graph.node_type(id)?, "pruning operator with no sink");
                graph.delete_node_and_children(id)?;
            }
            Ok(unused.len())
        }
    }
}

/// Record on every Limit the sources it may stop early, following parents
/// through Map, Filter and Limit only.
pub fn set_abortable_sources(graph: &mut IrGraph) -> Result<()> {
    for id in graph.operator_ids() {
        if !matches!(graph.operator(id)?.op, Operator::Limit(_)) {
            continue;
        }
        let mut sources = BTreeSet::new();
        let mut stack = graph.parents(id)?.to_vec();
        while let Some(parent) = stack.pop() {
            match &graph.operator(parent)?.op {
                op if op.is_source() => {
                    sources.insert(parent);
                }
                Operator::Map(_) | Operator::Filter(_) | Operator::Limit(_) => {
                    stack.extend_from_slice(graph.parents(parent)?);
                }
                _ => {}
            }
        }
        if let Operator::Limit(limit) = &mut graph.operator_mut(id)?.op {
            limit.abortable_srcs = sources.into_iter().collect();
        }
    }
    Ok(())
}

/// Partition the operators into fragments.
///
/// Fragments are the connected components of the parent/child edges, numbered
/// by their smallest operator id. A channel makes the sink's fragment a parent
/// of the source's fragment.
pub fn build_fragment_dag(graph: &IrGraph) -> Result<FragmentDag> {
    let order = graph.topological_order(&channel_edges(graph)?)?;
    let mut component: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for &id in &order {
        for &parent in graph.parents(id)? {
            let (a, b) = (find(&mut component, id), find(&mut component, parent));
            if a != b {
                component.insert(a.max(b), a.min(b));
            }
        }
    }

    let mut dag = FragmentDag::new();
    let mut by_root: BTreeMap<NodeId, FragmentId> = BTreeMap::new();
    // the smallest member of a component is its root
    let mut roots: Vec<NodeId> = order.iter().map(|&id| find(&mut component, id)).collect();
    roots.sort();
    roots.dedup();
    for root in roots {
        let id = new_fragment(&mut dag);
        by_root.insert(root, id);
    }
    for &op in &order {
        let root = find(&mut component, op);
        let fragment = by_root[&root];
        add_operator(&mut dag, fragment, op);
    }

    for (sink, source) in channel_edges(graph)? {
        let from = by_root[&find(&mut component, sink)];
        let to = by_root[&find(&mut component, source)];
        if from == to {
            return Err(PqlError::Lowering(format!(
                "GRPCSink {sink} and GRPCSource {source} are in the same fragment {from}"
            )));
        }
        add_edge(&mut dag, from, to);
    }
    debug!(fragments = dag.fragments.len(), "partitioned operators");
    Ok(dag)
}

/// Operator-level DAG of one fragment, in dependency order.
pub fn fragment_proto_dag(graph: &IrGraph, fragment: &FragmentNode) -> Result<planpb::Dag> {
    let members: BTreeSet<NodeId> = fragment.operators.iter().copied().collect();
    let mut nodes = Vec::with_capacity(fragment.operators.len());
    for &id in &fragment.operators {
        nodes.push(planpb::DagNode {
            id: id.0,
            sorted_parents: sorted(
                graph
                    .parents(id)?
                    .iter()
                    .filter(|p| members.contains(p))
                    .map(|p| p.0),
            ),
            sorted_children: sorted(
                graph
                    .children(id)
                    .into_iter()
                    .filter(|c| members.contains(c))
                    .map(|c| c.0),
            ),
        });
    }
    Ok(planpb::Dag { nodes })
}

fn find(component: &mut BTreeMap<NodeId, NodeId>, id: NodeId) -> NodeId {
    let mut root = id;
    while let Some(&next) = component.get(&root) {
        if next == root {
            break;
        }
        root = next;
    }
    component.insert(id, root);
    root
}

fn new_fragment(dag: &mut FragmentDag) -> FragmentId {
    let id = FragmentId(dag.fragments.len() as u64);
    dag.fragments.push(FragmentNode {
        id,
        operators: Vec::new(),
        parents: Vec::new(),
        children: Vec::new(),
    });
    id
}

fn add_operator(dag: &mut FragmentDag, fragment: FragmentId, op: NodeId) {
    dag.fragments[fragment.0 as usize].operators.push(op);
}

fn add_edge(dag: &mut FragmentDag, parent: FragmentId, child: FragmentId) {
    if !dag.fragments[parent.0 as usize].children.contains(&child) {
        dag.fragments[parent.0 as usize].children.push(child);
    }
    if !dag.fragments[child.0 as usize].parents.contains(&parent) {
        dag.fragments[child.0 as usize].parents.push(parent);
    }
}

fn sorted(ids: impl Iterator<Item = u64>) -> Vec<u64> {
    let mut out: Vec<u64> = ids.collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Kahn's algorithm, ties broken by ascending id.
fn topological(ids: Vec<FragmentId>, edges: &[(FragmentId, FragmentId)]) -> Option<Vec<FragmentId>> {
    let mut indegree: BTreeMap<FragmentId, usize> = ids.iter().map(|&id| (id, 0)).collect();
    for &(_, to) in edges {
        *indegree.entry(to).or_default() += 1;
    }
    let mut ready: BTreeSet<FragmentId> = indegree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(ids.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for &(from, to) in edges {
            if from != id {
                continue;
            }
            if let Some(d) = indegree.get_mut(&to) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(to);
                }
            }
        }
    }
    (order.len() == indegree.len()).then_some(order)
}

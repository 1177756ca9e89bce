//! Lowering of a finished IR graph into a fragmented `planpb::Plan`.
//!
//! [`DistributedPlanner::plan`] removes operators that reach no sink,
//! resolves the graph with the analyzer, optionally splits it in front of
//! blocking operators, partitions it into fragments at GRPCSink/GRPCSource
//! boundaries and serializes every operator.

pub mod fragment;
pub mod splitter;

use pql_common::{CompilerConfig, FragmentId, NodeId, Result};
use pql_planner::{explain_graph, planpb, Analyzer, CompilerState, OperatorSerializer};
use tracing::info;
use uuid::Uuid;

pub use fragment::{build_fragment_dag, FragmentDag, FragmentNode};
pub use splitter::DistributedSplitter;

#[derive(Debug, Default, Clone)]
pub struct DistributedPlanner {
    incoming_agent_ids: Vec<Uuid>,
}

impl DistributedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agents whose results fan in to this plan.
    pub fn with_incoming_agent_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.incoming_agent_ids = ids;
        self
    }

    pub fn plan(&self, state: &mut CompilerState) -> Result<planpb::Plan> {
        let config = state.config().clone();
        config.validate()?;

        fragment::check_channels(&state.graph)?;
        let pruned = fragment::remove_unused(&mut state.graph, config.unused_operator_policy)?;
        let analyzer = Analyzer::new();
        let mut relations = analyzer.analyze(state)?;
        if config.split_at_blocking_operators {
            let bridges = DistributedSplitter::new(config.grpc_address.clone()).split(&mut state.graph)?;
            if bridges > 0 {
                relations = analyzer.analyze(state)?;
            }
        }
        fragment::set_abortable_sources(&mut state.graph)?;
        if config.plan_options.explain {
            info!(plan = %explain_graph(&state.graph)?, "resolved operator graph");
        }

        let dag = build_fragment_dag(&state.graph)?;
        let plan = serialize_plan(state, &config, &dag, &relations, &self.incoming_agent_ids)?;
        info!(
            fragments = plan.nodes.len(),
            operators = plan.nodes.iter().map(|f| f.nodes.len()).sum::<usize>(),
            pruned,
            "plan lowered"
        );
        Ok(plan)
    }
}

fn serialize_plan(
    state: &CompilerState,
    config: &CompilerConfig,
    dag: &FragmentDag,
    relations: &pql_planner::RelationMap,
    incoming_agent_ids: &[Uuid],
) -> Result<planpb::Plan> {
    let serializer = OperatorSerializer::new(&state.graph, relations, config);
    let mut fragments = Vec::with_capacity(dag.fragments.len());
    for node in &dag.fragments {
        let mut nodes = Vec::with_capacity(node.operators.len());
        for &id in &node.operators {
            nodes.push(planpb::PlanNode {
                id: id.0,
                op: Some(serializer.serialize(id)?),
            });
        }
        fragments.push(planpb::PlanFragment {
            id: node.id.0,
            dag: Some(fragment::fragment_proto_dag(&state.graph, node)?),
            nodes,
        });
    }
    Ok(planpb::Plan {
        dag: Some(dag.to_proto()?),
        nodes: fragments,
        plan_options: Some((&config.plan_options).into()),
        incoming_agent_ids: incoming_agent_ids.iter().map(uuid_proto).collect(),
    })
}

fn uuid_proto(id: &Uuid) -> planpb::Uuid {
    let (high_bits, low_bits) = id.as_u64_pair();
    planpb::Uuid {
        high_bits,
        low_bits,
    }
}

/// Fragment holding `op` in a lowered plan.
pub fn fragment_of(plan: &planpb::Plan, op: NodeId) -> Option<FragmentId> {
    plan.nodes
        .iter()
        .find(|f| f.nodes.iter().any(|n| n.id == op.0))
        .map(|f| FragmentId(f.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_ids_keep_their_bit_halves() {
        let id = Uuid::from_u64_pair(0x0123_4567_89ab_cdef, 42);
        assert_eq!(
            uuid_proto(&id),
            planpb::Uuid {
                high_bits: 0x0123_4567_89ab_cdef,
                low_bits: 42
            }
        );
    }

    #[test]
    fn operators_are_found_by_node_id() {
        let plan = planpb::Plan {
            nodes: vec![
                planpb::PlanFragment {
                    id: 0,
                    nodes: vec![planpb::PlanNode { id: 1, op: None }],
                    ..Default::default()
                },
                planpb::PlanFragment {
                    id: 1,
                    nodes: vec![planpb::PlanNode { id: 3, op: None }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(fragment_of(&plan, NodeId(3)), Some(FragmentId(1)));
        assert_eq!(fragment_of(&plan, NodeId(2)), None);
    }
}

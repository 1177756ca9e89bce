use pql_common::{ChannelId, Result};
use pql_planner::ir::{GrpcSinkDestination, GrpcSinkOp, GrpcSourceOp, IrGraph, Operator};
use tracing::debug;

/// Cuts the graph in front of blocking operators so that the non-blocking
/// prefix can run next to the data and the blocking rest on a merging agent.
#[derive(Debug, Clone, Default)]
pub struct DistributedSplitter {
    address: String,
}

impl DistributedSplitter {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Bridge every edge from a non-blocking operator into a blocking one with
    /// a fresh GRPCSink/GRPCSource pair. Returns the number of bridges added.
    pub fn split(&self, graph: &mut IrGraph) -> Result<usize> {
        let mut next_channel = next_free_channel(graph)?;
        let mut bridges = 0;
        for id in graph.operator_ids() {
            if !graph.operator(id)?.op.is_blocking() {
                continue;
            }
            let location = graph.location(id)?;
            let mut parents = graph.parents(id)?.to_vec();
            let mut changed = false;
            for parent in parents.iter_mut() {
                let parent_op = &graph.operator(*parent)?.op;
                if parent_op.is_blocking() || matches!(parent_op, Operator::GrpcSource(_)) {
                    continue;
                }
                let channel = next_channel;
                next_channel = ChannelId(next_channel.0 + 1);
                let sink = graph.create_operator(
                    location,
                    vec![*parent],
                    Operator::GrpcSink(GrpcSinkOp {
                        destination: GrpcSinkDestination::Channel(channel),
                        address: self.address.clone(),
                    }),
                )?;
                let source = graph.create_operator(
                    location,
                    vec![],
                    Operator::GrpcSource(GrpcSourceOp { channel }),
                )?;
                debug!(
                    node_id = %id,
                    parent = %parent,
                    %channel,
                    sink = %sink,
                    source = %source,
                    "bridged edge into blocking operator"
                );
                *parent = source;
                changed = true;
                bridges += 1;
            }
            if changed {
                graph.set_parents(id, parents)?;
            }
        }
        Ok(bridges)
    }
}

fn next_free_channel(graph: &IrGraph) -> Result<ChannelId> {
    let mut next = 0;
    for id in graph.operator_ids() {
        let channel = match &graph.operator(id)?.op {
            Operator::GrpcSource(source) => Some(source.channel),
            Operator::GrpcSink(GrpcSinkOp {
                destination: GrpcSinkDestination::Channel(channel),
                ..
            }) => Some(*channel),
            _ => None,
        };
        if let Some(channel) = channel {
            next = next.max(channel.0 + 1);
        }
    }
    Ok(ChannelId(next))
}

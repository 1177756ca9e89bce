use std::fmt;

use pql_common::{NodeId, SourceLocation};

use crate::ir::expression::Expression;
use crate::ir::operator::{Operator, OperatorIr};

/// Kind tag of an IR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    MemorySource,
    Map,
    BlockingAgg,
    GroupBy,
    Filter,
    Limit,
    Union,
    Join,
    Drop,
    Range,
    UdtfSource,
    MemorySink,
    GrpcSource,
    GrpcSink,
    OTelExportSink,
    Column,
    String,
    Int,
    Float,
    Bool,
    Time,
    Uint128,
    Func,
    List,
    Tuple,
}

impl NodeType {
    /// Type name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::MemorySource => "MemorySource",
            NodeType::Map => "Map",
            NodeType::BlockingAgg => "BlockingAgg",
            NodeType::GroupBy => "GroupBy",
            NodeType::Filter => "Filter",
            NodeType::Limit => "Limit",
            NodeType::Union => "Union",
            NodeType::Join => "Join",
            NodeType::Drop => "Drop",
            NodeType::Range => "Range",
            NodeType::UdtfSource => "UDTFSource",
            NodeType::MemorySink => "MemorySink",
            NodeType::GrpcSource => "GRPCSource",
            NodeType::GrpcSink => "GRPCSink",
            NodeType::OTelExportSink => "OTelExportSink",
            NodeType::Column => "Column",
            NodeType::String => "String",
            NodeType::Int => "Int",
            NodeType::Float => "Float",
            NodeType::Bool => "Bool",
            NodeType::Time => "Time",
            NodeType::Uint128 => "UInt128",
            NodeType::Func => "Func",
            NodeType::List => "List",
            NodeType::Tuple => "Tuple",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload family of an IR node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Operator(OperatorIr),
    Expression(Expression),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Operator(op) => match &op.op {
                Operator::MemorySource(_) => NodeType::MemorySource,
                Operator::Map(_) => NodeType::Map,
                Operator::BlockingAgg(_) => NodeType::BlockingAgg,
                Operator::GroupBy(_) => NodeType::GroupBy,
                Operator::Filter(_) => NodeType::Filter,
                Operator::Limit(_) => NodeType::Limit,
                Operator::Union => NodeType::Union,
                Operator::Join(_) => NodeType::Join,
                Operator::Drop(_) => NodeType::Drop,
                Operator::Range(_) => NodeType::Range,
                Operator::UdtfSource(_) => NodeType::UdtfSource,
                Operator::MemorySink(_) => NodeType::MemorySink,
                Operator::GrpcSource(_) => NodeType::GrpcSource,
                Operator::GrpcSink(_) => NodeType::GrpcSink,
                Operator::OTelExportSink(_) => NodeType::OTelExportSink,
            },
            NodeKind::Expression(expr) => match expr {
                Expression::Column(_) => NodeType::Column,
                Expression::String(_) => NodeType::String,
                Expression::Int(_) => NodeType::Int,
                Expression::Float(_) => NodeType::Float,
                Expression::Bool(_) => NodeType::Bool,
                Expression::Time(_) => NodeType::Time,
                Expression::Uint128(_) => NodeType::Uint128,
                Expression::Func(_) => NodeType::Func,
                Expression::List(_) => NodeType::List,
                Expression::Tuple(_) => NodeType::Tuple,
            },
        }
    }

    /// Every node id this payload refers to: parents, then expressions.
    pub fn references(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Operator(op) => {
                let mut refs = op.parents.clone();
                refs.extend(op.op.expression_refs());
                refs
            }
            NodeKind::Expression(expr) => expr.children(),
        }
    }

    /// Expression nodes owned by this payload. Parents are not owned.
    pub fn owned_refs(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Operator(op) => op.op.expression_refs(),
            NodeKind::Expression(expr) => expr.children(),
        }
    }
}

/// A node stored in the [`IrGraph`](crate::ir::IrGraph).
#[derive(Debug, Clone, PartialEq)]
pub struct IrNode {
    pub(crate) id: NodeId,
    pub(crate) location: SourceLocation,
    pub(crate) kind: NodeKind,
}

impl IrNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn is_operator(&self) -> bool {
        matches!(self.kind, NodeKind::Operator(_))
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.kind, NodeKind::Expression(_))
    }

    pub fn as_operator(&self) -> Option<&OperatorIr> {
        match &self.kind {
            NodeKind::Operator(op) => Some(op),
            NodeKind::Expression(_) => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match &self.kind {
            NodeKind::Expression(expr) => Some(expr),
            NodeKind::Operator(_) => None,
        }
    }
}
